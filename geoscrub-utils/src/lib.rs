#![doc = include_str!("../README.md")]
use anyhow::Result;
use std::collections::HashMap;
use std::io::{Cursor, Read};

#[cfg(feature = "tracing")]
use std::time::Instant;

use geoscrub_core::{
    index::{CountryPatch, IndexData, SourceFileContentOptions},
    Engine, EngineMetadata, EngineSourceMetadata,
};
use serde::Serialize;

#[derive(Serialize, Clone)]
pub struct SourceItem<'a> {
    pub url: &'a str,
    pub filename: &'a str,
}

#[derive(Clone)]
pub struct IndexUpdaterSettings<'a> {
    pub http_timeout_ms: u64,
    /// GeoNames entity dump, zipped
    pub geonames: SourceItem<'a>,
    /// alternate names dump, zipped
    pub alternate_names: Option<SourceItem<'a>>,
    pub countries_url: &'a str,
    /// postcode dump, zipped
    pub postcodes: Option<SourceItem<'a>>,
    pub filter_languages: Vec<&'a str>,
    /// per-country fixups applied after indexing
    pub patches: Vec<CountryPatch>,
}

impl Default for IndexUpdaterSettings<'_> {
    fn default() -> Self {
        IndexUpdaterSettings {
            http_timeout_ms: 300_000,
            geonames: SourceItem {
                url: "https://download.geonames.org/export/dump/allCountries.zip",
                filename: "allCountries.txt",
            },
            alternate_names: Some(SourceItem {
                url: "https://download.geonames.org/export/dump/alternateNamesV2.zip",
                filename: "alternateNamesV2.txt",
            }),
            countries_url: "https://download.geonames.org/export/dump/countryInfo.txt",
            postcodes: Some(SourceItem {
                url: "https://download.geonames.org/export/zip/allCountries.zip",
                filename: "allCountries.txt",
            }),
            filter_languages: Vec::new(),
            patches: CountryPatch::builtin(),
        }
    }
}

pub struct IndexUpdater<'a> {
    http_client: reqwest::Client,
    settings: IndexUpdaterSettings<'a>,
}

impl<'a> IndexUpdater<'a> {
    pub fn new(settings: IndexUpdaterSettings<'a>) -> Result<Self> {
        Ok(IndexUpdater {
            http_client: reqwest::ClientBuilder::new()
                .timeout(std::time::Duration::from_millis(settings.http_timeout_ms))
                .build()?,
            settings,
        })
    }

    pub async fn has_updates(&self, metadata: &EngineMetadata) -> Result<bool> {
        #[cfg(feature = "tracing")]
        tracing::info!("Check updates");
        if metadata.source.etag.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::info!("Engine hasn't source ETAGs");
            return Ok(true);
        }

        let mut requests = vec![self.get_etag(self.settings.geonames.url)];
        let mut results = vec!["geonames"];
        if let Some(item) = &self.settings.alternate_names {
            requests.push(self.get_etag(item.url));
            results.push("names");
        }
        requests.push(self.get_etag(self.settings.countries_url));
        results.push("countries");
        if let Some(item) = &self.settings.postcodes {
            requests.push(self.get_etag(item.url));
            results.push("postcodes");
        }
        let responses = futures::future::join_all(requests).await;
        let results: HashMap<_, _> = results.into_iter().zip(responses).collect();

        for (entry, etag) in results {
            let current_etag = metadata
                .source
                .etag
                .get(entry)
                .map(AsRef::as_ref)
                .unwrap_or("");
            let new_etag = etag?;
            if current_etag != new_etag {
                #[cfg(feature = "tracing")]
                tracing::info!("New version of {entry}");
                return Ok(true);
            }
        }

        Ok(false)
    }

    pub async fn get_etag(&self, url: &str) -> Result<String> {
        let response = self.http_client.head(url).send().await?;
        #[cfg(feature = "tracing")]
        tracing::info!("Try HEAD {url}");

        Ok(response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_default())
    }

    pub async fn fetch(&self, url: &str, filename: Option<&str>) -> Result<(String, Vec<u8>)> {
        let response = self.http_client.get(url).send().await?;
        #[cfg(feature = "tracing")]
        tracing::info!("Try GET {url}");

        if !response.status().is_success() {
            anyhow::bail!("GET {url} return status {}", response.status())
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_default();

        let content = response.bytes().await?.to_vec();
        #[cfg(feature = "tracing")]
        tracing::info!("Downloaded {url} size: {}", content.len());

        let content = if let Some(filename) = filename {
            #[cfg(feature = "tracing")]
            tracing::info!("Unzip {filename}");
            let cursor = Cursor::new(content);
            let mut archive = zip::read::ZipArchive::new(cursor)?;
            let file = archive
                .by_name(filename)
                .map_err(|e| anyhow::anyhow!("On get file {filename} from archive: {e}"))?;
            file.bytes().collect::<std::io::Result<Vec<_>>>()?
        } else {
            content
        };

        Ok((etag, content))
    }

    pub async fn build(self) -> Result<Engine> {
        let mut requests = vec![self.fetch(
            self.settings.geonames.url,
            Some(self.settings.geonames.filename),
        )];
        let mut results = vec!["geonames"];
        if let Some(item) = &self.settings.alternate_names {
            requests.push(self.fetch(item.url, Some(item.filename)));
            results.push("names");
        }
        requests.push(self.fetch(self.settings.countries_url, None));
        results.push("countries");
        if let Some(item) = &self.settings.postcodes {
            requests.push(self.fetch(item.url, Some(item.filename)));
            results.push("postcodes");
        }
        let responses = futures::future::join_all(requests).await;
        let mut results: HashMap<_, _> = results.into_iter().zip(responses).collect();

        let etag = results
            .iter()
            .filter_map(|(k, v)| {
                let Ok((etag, _)) = v else { return None };
                Some(((*k).to_string(), etag.to_string()))
            })
            .collect();

        #[cfg(feature = "tracing")]
        tracing::info!("Try to build index...");

        #[cfg(feature = "tracing")]
        let now = Instant::now();

        let data = IndexData::new_from_files_content(
            SourceFileContentOptions {
                geonames: String::from_utf8(
                    results
                        .remove(&"geonames")
                        .ok_or_else(|| anyhow::anyhow!("Entity dump required"))?
                        .map_err(|e| anyhow::anyhow!("On fetch entity dump: {e}"))?
                        .1,
                )?,
                alternate_names: if let Some(c) = results.remove(&"names") {
                    Some(String::from_utf8(c?.1)?)
                } else {
                    None
                },
                countries: String::from_utf8(
                    results
                        .remove(&"countries")
                        .ok_or_else(|| anyhow::anyhow!("Country info required"))?
                        .map_err(|e| anyhow::anyhow!("On fetch country info: {e}"))?
                        .1,
                )?,
                postcodes: if let Some(c) = results.remove(&"postcodes") {
                    Some(String::from_utf8(c?.1)?)
                } else {
                    None
                },
                filter_languages: self.settings.filter_languages.clone(),
            },
            &self.settings.patches,
        )
        .map_err(|e| anyhow::anyhow!("Failed to build index: {e}"))?;

        let metadata = EngineMetadata {
            source: EngineSourceMetadata {
                geonames: self.settings.geonames.url.to_owned(),
                alternate_names: self
                    .settings
                    .alternate_names
                    .as_ref()
                    .map(|v| v.url.to_owned()),
                countries: Some(self.settings.countries_url.to_owned()),
                postcodes: self.settings.postcodes.as_ref().map(|v| v.url.to_owned()),
                filter_languages: self
                    .settings
                    .filter_languages
                    .into_iter()
                    .map(String::from)
                    .collect::<Vec<_>>(),
                etag,
            },
            ..Default::default()
        };

        #[cfg(feature = "tracing")]
        tracing::info!("Engine data ready. took {}ms", now.elapsed().as_millis());

        Ok(Engine::new(data, metadata))
    }
}
