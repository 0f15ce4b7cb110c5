#![doc = include_str!("../README.md")]
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub mod expand;
pub mod index;
pub mod normalize;
pub mod scrub;
pub mod storage;

pub use index::{
    CountryPatch, CountryRecord, EntityKind, IndexData, PlaceRecord, PostcodeRecord,
    SourceFileContentOptions, SourceFileOptions,
};
pub use scrub::{FieldStatus, NormField, ScrubOptions, ScrubResult, ScrubbedPlace, StateMatch};

use normalize::normalize;

/// Fatal engine failures. Queries over user input never error; only the
/// backing store and its integrity can.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("index storage: {0}")]
    Io(#[from] std::io::Error),
    #[error("index codec: {0}")]
    Codec(#[from] bincode::Error),
    #[error("index version record missing")]
    VersionMissing,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EngineSourceMetadata {
    pub geonames: String,
    pub countries: Option<String>,
    pub alternate_names: Option<String>,
    pub postcodes: Option<String>,
    pub filter_languages: Vec<String>,
    pub etag: HashMap<String, String>,
}

/// The version record of a built index. Loading refuses to proceed without
/// one, so a half-written or foreign file never serves queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMetadata {
    /// Index was built on version
    pub geoscrub_version: String,
    /// Creation time
    pub created_at: std::time::SystemTime,
    /// Sources metadata
    pub source: EngineSourceMetadata,
    /// Custom metadata info
    pub extra: HashMap<String, String>,
}

impl Default for EngineMetadata {
    fn default() -> Self {
        Self {
            created_at: std::time::SystemTime::now(),
            geoscrub_version: env!("CARGO_PKG_VERSION").to_owned(),
            source: EngineSourceMetadata::default(),
            extra: HashMap::default(),
        }
    }
}

/// Equality predicates over normalized fields; `find` applies them as a
/// conjunction, serving the most specific combination from a prebuilt map.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceQuery<'q> {
    pub country_code: Option<&'q str>,
    pub admin1: Option<&'q str>,
    pub name: Option<&'q str>,
    pub abbr: Option<&'q str>,
    pub admin_names: Option<&'q str>,
    pub lang_name: Option<(&'q str, &'q str)>,
}

#[derive(Default)]
struct PlaceLookups {
    by_cc_admin1_name: HashMap<String, Vec<u64>>,
    by_cc_name: HashMap<String, Vec<u64>>,
    by_name: HashMap<String, Vec<u64>>,
    by_cc_abbr: HashMap<String, Vec<u64>>,
    by_abbr: HashMap<String, Vec<u64>>,
    by_cc_admin_names: HashMap<String, Vec<u64>>,
    by_lang_name: HashMap<String, Vec<u64>>,
}

/// The loaded gazetteer. Immutable after construction; every query method
/// takes `&self` and multiple queries may run on independent threads.
pub struct Engine {
    pub data: IndexData,
    pub metadata: EngineMetadata,

    country_by_iso: HashMap<String, u64>,
    country_by_iso3: HashMap<String, u64>,
    country_by_name: HashMap<String, Vec<u64>>,
    country_by_lang_name: HashMap<String, Vec<u64>>,
    country_by_any_lang: HashMap<String, Vec<u64>>,
    admin1_code_to_gid: HashMap<String, u64>,

    admin1: PlaceLookups,
    admin2: PlaceLookups,
    admind: PlaceLookups,
    cities: PlaceLookups,

    postcode_by_key: HashMap<String, Vec<usize>>,
}

impl Engine {
    pub fn new(data: IndexData, metadata: EngineMetadata) -> Self {
        let mut country_by_iso = HashMap::with_capacity(data.countries.len());
        let mut country_by_iso3 = HashMap::with_capacity(data.countries.len());
        let mut country_by_name: HashMap<String, Vec<u64>> = HashMap::new();
        let mut country_by_lang_name: HashMap<String, Vec<u64>> = HashMap::new();
        let mut country_by_any_lang: HashMap<String, Vec<u64>> = HashMap::new();
        for country in data.countries.values() {
            country_by_iso.insert(country.iso.clone(), country.gid);
            country_by_iso3.insert(country.iso3.clone(), country.gid);
            for name in &country.names {
                country_by_name.entry(name.clone()).or_default().push(country.gid);
            }
            for (lang, names) in &country.names_lang {
                for name in names {
                    country_by_lang_name
                        .entry(format!("{lang}:{name}"))
                        .or_default()
                        .push(country.gid);
                    country_by_any_lang
                        .entry(name.clone())
                        .or_default()
                        .push(country.gid);
                }
            }
        }
        for map in [
            &mut country_by_name,
            &mut country_by_lang_name,
            &mut country_by_any_lang,
        ] {
            for gids in map.values_mut() {
                gids.sort_unstable_by_key(|gid| {
                    (
                        std::cmp::Reverse(data.countries[gid].population),
                        *gid,
                    )
                });
                gids.dedup();
            }
        }

        let mut admin1_code_to_gid = HashMap::with_capacity(data.admin1.len());
        for place in data.admin1.values() {
            if let Some(code) = &place.admin1 {
                admin1_code_to_gid.insert(format!("{}.{}", place.country_code, code), place.gid);
            }
        }

        let admin1 = build_place_lookups(&data.admin1);
        let admin2 = build_place_lookups(&data.admin2);
        let admind = build_place_lookups(&data.admind);
        let cities = build_place_lookups(&data.cities);

        let mut postcode_by_key: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, postcode) in data.postcodes.iter().enumerate() {
            postcode_by_key
                .entry(postcode_key(&postcode.country_code, &postcode.post_code))
                .or_default()
                .push(i);
        }

        Engine {
            data,
            metadata,
            country_by_iso,
            country_by_iso3,
            country_by_name,
            country_by_lang_name,
            country_by_any_lang,
            admin1_code_to_gid,
            admin1,
            admin2,
            admind,
            cities,
            postcode_by_key,
        }
    }

    pub fn new_from_files<P: AsRef<std::path::Path>>(
        options: SourceFileOptions<P>,
        patches: &[CountryPatch],
    ) -> Result<Self, EngineError> {
        Ok(Self::new(
            IndexData::new_from_files(options, patches)?,
            EngineMetadata::default(),
        ))
    }

    pub fn new_from_files_content(
        options: SourceFileContentOptions,
        patches: &[CountryPatch],
    ) -> Result<Self, EngineError> {
        Ok(Self::new(
            IndexData::new_from_files_content(options, patches)?,
            EngineMetadata::default(),
        ))
    }

    /// Get a place record by primary key.
    pub fn get(&self, kind: EntityKind, gid: u64) -> Option<&PlaceRecord> {
        self.data.collection(kind)?.get(&gid)
    }

    /// Country by uppercase ISO2 code.
    pub fn country(&self, iso: &str) -> Option<&CountryRecord> {
        self.country_by_iso
            .get(iso)
            .and_then(|gid| self.data.countries.get(gid))
    }

    pub fn country_by_gid(&self, gid: u64) -> Option<&CountryRecord> {
        self.data.countries.get(&gid)
    }

    /// Countries carrying a normalized lookup key, ordered by population.
    pub fn countries_by_name(&self, key: &str) -> Vec<&CountryRecord> {
        self.country_by_name
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|gid| self.data.countries.get(gid))
            .collect()
    }

    /// Countries carrying a normalized lookup key in a specific language.
    pub fn countries_by_lang_name(&self, lang: &str, key: &str) -> Vec<&CountryRecord> {
        self.country_by_lang_name
            .get(&format!("{lang}:{key}"))
            .into_iter()
            .flatten()
            .filter_map(|gid| self.data.countries.get(gid))
            .collect()
    }

    pub(crate) fn countries_by_any_lang(&self, key: &str) -> Vec<&CountryRecord> {
        self.country_by_any_lang
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|gid| self.data.countries.get(gid))
            .collect()
    }

    /// Capital city of a country by uppercase ISO2 code.
    pub fn capital(&self, country_code: &str) -> Option<&PlaceRecord> {
        let gid = self.country(country_code)?.capital?;
        self.data.cities.get(&gid)
    }

    /// Admin1 record by its `(countryCode, admin1 code)` pair.
    pub fn admin1_by_code(&self, country_code: &str, code: &str) -> Option<&PlaceRecord> {
        self.admin1_code_to_gid
            .get(&format!("{country_code}.{code}"))
            .and_then(|gid| self.data.admin1.get(gid))
    }

    /// Conjunctive lookup over a place collection. Results are ordered by
    /// descending population, ties broken by ascending gid.
    pub fn find(&self, kind: EntityKind, query: &PlaceQuery) -> Vec<&PlaceRecord> {
        let Some((collection, lookups)) = self.lookups(kind) else {
            return Vec::new();
        };

        let gids: Option<&Vec<u64>> = if let Some(name) = query.name {
            match (query.country_code, query.admin1) {
                (Some(cc), Some(a1)) => lookups.by_cc_admin1_name.get(&format!("{cc}.{a1}:{name}")),
                (Some(cc), None) => lookups.by_cc_name.get(&format!("{cc}:{name}")),
                (None, _) => lookups.by_name.get(name),
            }
        } else if let Some(abbr) = query.abbr {
            match query.country_code {
                Some(cc) => lookups.by_cc_abbr.get(&format!("{cc}:{abbr}")),
                None => lookups.by_abbr.get(abbr),
            }
        } else if let Some(key) = query.admin_names {
            match query.country_code {
                Some(cc) => lookups.by_cc_admin_names.get(&format!("{cc}:{key}")),
                None => None,
            }
        } else if let Some((lang, name)) = query.lang_name {
            lookups.by_lang_name.get(&format!("{lang}:{name}"))
        } else {
            None
        };

        let mut out: Vec<&PlaceRecord> = gids
            .into_iter()
            .flatten()
            .filter_map(|gid| collection.get(gid))
            .collect();
        // residual predicates the chosen map did not cover
        if let Some(cc) = query.country_code {
            out.retain(|p| p.country_code == cc);
        }
        if let Some(a1) = query.admin1 {
            out.retain(|p| p.admin1.as_deref() == Some(a1));
        }
        out
    }

    /// Cardinality of a `find`.
    pub fn count(&self, kind: EntityKind, query: &PlaceQuery) -> usize {
        self.find(kind, query).len()
    }

    /// All cities answering to a name, ordered by population.
    pub fn find_cities(&self, name: &str) -> Vec<&PlaceRecord> {
        let key = normalize(name);
        if key.is_empty() {
            return Vec::new();
        }
        self.find(
            EntityKind::City,
            &PlaceQuery {
                name: Some(&key),
                ..Default::default()
            },
        )
    }

    /// Postcode record by `(countryCode, postCode)`.
    pub fn postcode_info(&self, country_code: &str, post_code: &str) -> Option<&PostcodeRecord> {
        self.postcode_by_key
            .get(&postcode_key(country_code, post_code))
            .and_then(|indices| indices.first())
            .and_then(|&i| self.data.postcodes.get(i))
    }

    fn lookups(&self, kind: EntityKind) -> Option<(&HashMap<u64, PlaceRecord>, &PlaceLookups)> {
        match kind {
            EntityKind::Admin1 => Some((&self.data.admin1, &self.admin1)),
            EntityKind::Admin2 => Some((&self.data.admin2, &self.admin2)),
            EntityKind::Admd => Some((&self.data.admind, &self.admind)),
            EntityKind::City => Some((&self.data.cities, &self.cities)),
            EntityKind::Country | EntityKind::Postcode => None,
        }
    }
}

fn postcode_key(country_code: &str, post_code: &str) -> String {
    format!(
        "{}:{}",
        country_code.trim().to_uppercase(),
        post_code.trim().to_uppercase()
    )
}

fn build_place_lookups(collection: &HashMap<u64, PlaceRecord>) -> PlaceLookups {
    let mut lookups = PlaceLookups::default();
    for place in collection.values() {
        let cc = &place.country_code;
        for name in &place.names {
            lookups
                .by_name
                .entry(name.clone())
                .or_default()
                .push(place.gid);
            lookups
                .by_cc_name
                .entry(format!("{cc}:{name}"))
                .or_default()
                .push(place.gid);
            if let Some(a1) = &place.admin1 {
                lookups
                    .by_cc_admin1_name
                    .entry(format!("{cc}.{a1}:{name}"))
                    .or_default()
                    .push(place.gid);
            }
        }
        for abbr in &place.abbr {
            lookups
                .by_abbr
                .entry(abbr.clone())
                .or_default()
                .push(place.gid);
            lookups
                .by_cc_abbr
                .entry(format!("{cc}:{abbr}"))
                .or_default()
                .push(place.gid);
        }
        for key in &place.admin_names {
            lookups
                .by_cc_admin_names
                .entry(format!("{cc}:{key}"))
                .or_default()
                .push(place.gid);
        }
        for (lang, names) in &place.names_lang {
            for name in names {
                lookups
                    .by_lang_name
                    .entry(format!("{lang}:{name}"))
                    .or_default()
                    .push(place.gid);
            }
        }
    }
    for map in [
        &mut lookups.by_cc_admin1_name,
        &mut lookups.by_cc_name,
        &mut lookups.by_name,
        &mut lookups.by_cc_abbr,
        &mut lookups.by_abbr,
        &mut lookups.by_cc_admin_names,
        &mut lookups.by_lang_name,
    ] {
        for gids in map.values_mut() {
            gids.sort_unstable_by_key(|gid| {
                (std::cmp::Reverse(collection[gid].population), *gid)
            });
            gids.dedup();
        }
    }
    lookups
}
