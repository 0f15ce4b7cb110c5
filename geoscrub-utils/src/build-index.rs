use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geoscrub_core::{
    index::{CountryPatch, SourceFileOptions},
    storage::Storage,
    Engine,
};
use geoscrub_utils::{IndexUpdater, IndexUpdaterSettings, SourceItem};

use clap::Parser;

/// Build index from files or urls
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
enum Args {
    FromUrls(Urls),
    FromFiles(Files),
}

/// Build index from files
#[derive(clap::Args, Debug)]
#[command(version, about)]
struct Files {
    /// GeoNames entity dump
    #[arg(short, long)]
    geonames: String,

    /// Country info file
    #[arg(short, long)]
    countries: String,

    /// Alternate names file
    #[arg(short, long)]
    names: Option<String>,

    /// Postcodes file
    #[arg(short, long)]
    postcodes: Option<String>,

    /// Languages
    #[arg(short, long)]
    languages: Option<String>,

    /// Dump index to
    #[arg(short, long)]
    output: String,
}

/// Build index from urls
#[derive(clap::Args, Debug)]
#[command(version, about)]
struct Urls {
    /// Entity dump url
    #[arg(short, long)]
    geonames_url: Option<String>,

    #[arg(short = 'f', long)]
    geonames_filename: Option<String>,

    /// Languages
    #[arg(short, long)]
    languages: Option<String>,

    /// Dump index to
    #[arg(short, long)]
    output: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer());
    subscriber.init();

    match Args::parse() {
        Args::FromUrls(args) => {
            let mut settings = IndexUpdaterSettings::default();

            if let Some(geonames_url) = &args.geonames_url {
                settings.geonames = SourceItem {
                    url: geonames_url,
                    filename: args.geonames_filename.as_ref().ok_or_else(|| {
                        anyhow::anyhow!("Entity dump filename required to extract from archive")
                    })?,
                };
            }

            if let Some(languages) = &args.languages {
                settings.filter_languages = languages.split(',').map(AsRef::as_ref).collect();
            }

            let engine = IndexUpdater::new(settings)?
                .build()
                .await
                .expect("On build index");

            Storage::new().dump_to(&args.output, &engine)?;
        }

        Args::FromFiles(args) => {
            let engine = Engine::new_from_files(
                SourceFileOptions {
                    geonames: args.geonames,
                    countries: args.countries,
                    alternate_names: args.names,
                    postcodes: args.postcodes,
                    filter_languages: if let Some(languages) = &args.languages {
                        languages.split(',').map(AsRef::as_ref).collect()
                    } else {
                        Vec::new()
                    },
                },
                &CountryPatch::builtin(),
            )
            .map_err(|e| anyhow::anyhow!("Failed to build index: {e}"))?;

            Storage::new().dump_to(&args.output, &engine)?;
        }
    };

    Ok(())
}
