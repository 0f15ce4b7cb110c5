use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geoscrub_core::{scrub::ScrubOptions, storage::Storage, Engine};
use geoscrub_utils::{IndexUpdater, IndexUpdaterSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer());
    subscriber.init();

    // build/load/update index
    let engine = load_engine().await?;

    // use
    tracing::info!(
        "Scrub result: {:#?}",
        engine
            .csc_scrub(
                Some("Sydney"),
                Some("NSW"),
                Some("GB"),
                &ScrubOptions::default()
            )
            .result
            .and_then(|place| place.city.map(|c| (c.gid, c.name.clone())))
    );
    tracing::info!(
        "Country info: {:#?}",
        engine.country_info("Rep of Ireland").map(|c| c.iso.as_str())
    );

    Ok(())
}

async fn load_engine() -> Result<Engine> {
    let index_file = std::path::Path::new("/tmp/geoscrub-index.bin");
    let storage = Storage::new();

    let updater = IndexUpdater::new(IndexUpdaterSettings {
        filter_languages: vec!["ru", "ja", "ar"],
        ..Default::default()
    })?;

    Ok(if index_file.exists() {
        // load existed index
        let engine = storage
            .load_from(index_file)
            .map_err(|e| anyhow::anyhow!("On load index file: {e}"))?;

        if updater.has_updates(&engine.metadata).await? {
            // rewrite index file
            let engine = updater.build().await?;
            storage.dump_to(index_file, &engine)?;
            engine
        } else {
            engine
        }
    } else {
        // initial
        let engine = updater.build().await?;
        storage.dump_to(index_file, &engine)?;
        engine
    })
}
