use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::expand;
use crate::normalize::normalize;
use crate::EngineError;

#[cfg(feature = "tracing")]
use std::time::Instant;

pub fn skip_comment_lines(content: &str) -> String {
    content.lines().filter(|l| !l.starts_with('#')).join("\n")
}

fn split_content_to_n_parts(content: &str, n: usize) -> Vec<String> {
    if n <= 1 {
        return vec![content.to_owned()];
    }
    let lines: Vec<&str> = content.lines().collect();
    let chunk = lines.len().div_ceil(n).max(1);
    lines.chunks(chunk).map(|c| c.join("\n")).collect()
}

/// Entity kinds of the gazetteer. One logical collection per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Country,
    Admin1,
    Admin2,
    Admd,
    City,
    Postcode,
}

pub struct SourceFileOptions<'a, P: AsRef<std::path::Path>> {
    /// GeoNames entity dump (the 19-column `allCountries.txt` shape; subsets
    /// such as `cities5000.txt` parse the same way)
    pub geonames: P,
    /// `countryInfo.txt`
    pub countries: P,
    /// `alternateNamesV2.txt`
    pub alternate_names: Option<P>,
    /// postcode dump (`allCountries.txt` of the zip export)
    pub postcodes: Option<P>,
    /// keep only these isolanguage codes from the alternate-names file;
    /// empty keeps everything
    pub filter_languages: Vec<&'a str>,
}

pub struct SourceFileContentOptions<'a> {
    pub geonames: String,
    pub countries: String,
    pub alternate_names: Option<String>,
    pub postcodes: Option<String>,
    pub filter_languages: Vec<&'a str>,
}

// The main 'geoname' table has the following fields :
// ---------------------------------------------------
// geonameid         : integer id of record in geonames database
// name              : name of geographical point (utf8) varchar(200)
// asciiname         : name of geographical point in plain ascii characters, varchar(200)
// alternatenames    : alternatenames, comma separated, convenience attribute from alternatename table, varchar(10000)
// latitude          : latitude in decimal degrees (wgs84)
// longitude         : longitude in decimal degrees (wgs84)
// feature class     : see http://www.geonames.org/export/codes.html, char(1)
// feature code      : see http://www.geonames.org/export/codes.html, varchar(10)
// country code      : ISO-3166 2-letter country code, 2 characters
// cc2               : alternate country codes, comma separated, 200 characters
// admin1 code       : fipscode (subject to change to iso code), varchar(20)
// admin2 code       : code for the second administrative division, a county in the US, varchar(80)
// admin3 code       : code for third level administrative division, varchar(20)
// admin4 code       : code for fourth level administrative division, varchar(20)
// population        : bigint (8 byte int)
// elevation         : in meters, integer
// dem               : digital elevation model, srtm3 or gtopo30
// timezone          : the iana timezone id varchar(40)
// modification date : date of last modification in yyyy-MM-dd format
#[derive(Debug, serde::Deserialize)]
struct GeonameRecordRaw {
    geonameid: u64,
    name: String,
    asciiname: String,
    alternatenames: String,
    latitude: f64,
    longitude: f64,
    feature_class: String,
    feature_code: String,
    country_code: String,
    _cc2: String,
    admin1_code: String,
    admin2_code: String,
    _admin3_code: String,
    _admin4_code: String,
    population: u64,
    _elevation: String,
    _dem: String,
    _timezone: String,
    _modification_date: String,
}

// CountryInfo
// http://download.geonames.org/export/dump/countryInfo.txt
// ISO	ISO3	ISO-Numeric	fips	Country	Capital	Area(in sq km)	Population	Continent	tld	CurrencyCode	CurrencyName	Phone	Postal Code Format	Postal Code Regex	Languages	geonameid	neighbours	EquivalentFipsCode
#[derive(Debug, Clone, serde::Deserialize)]
struct CountryInfoRaw {
    iso: String,
    iso3: String,
    _iso_numeric: String,
    _fips: String,
    name: String,
    _capital: String,
    _area: String,
    population: u64,
    _continent: String,
    _tld: String,
    _currency_code: String,
    _currency_name: String,
    _phone: String,
    _postal_code_format: String,
    _postal_code_regex: String,
    languages: String,
    geonameid: u64,
    neighbours: String,
    _equivalent_fips_code: String,
}

// The table 'alternate names' :
// -----------------------------
// alternateNameId   : the id of this alternate name, int
// geonameid         : geonameId referring to id in table 'geoname', int
// isolanguage       : iso 639 language code 2- or 3-characters, or a pseudo
//                     code such as 'abbr', 'post', 'link', varchar(7)
// alternate name    : alternate name or name variant, varchar(400)
// isPreferredName   : '1', if this alternate name is an official/preferred name
// isShortName       : '1', if this is a short name like 'California' for 'State of California'
// isColloquial      : '1', if this alternate name is a colloquial or slang term
// isHistoric        : '1', if this alternate name is historic and was used in the past
// from              : from period when the name was used
// to                : to period when the name was used
#[derive(Debug, serde::Deserialize)]
struct AlternateNamesRaw {
    _alternate_name_id: u64,
    geonameid: u64,
    isolanguage: String,
    alternate_name: String,
    is_preferred_name: String,
    is_short_name: String,
    is_colloquial: String,
    is_historic: String,
    _from: String,
    _to: String,
}

// GeoNames postal code dump: country code, postal code, place name,
// admin name1, admin code1, admin name2, admin code2, admin name3,
// admin code3, latitude, longitude, accuracy
#[derive(Debug, serde::Deserialize)]
struct PostcodeRaw {
    country_code: String,
    postal_code: String,
    place_name: String,
    admin_name1: String,
    _admin_code1: String,
    _admin_name2: String,
    _admin_code2: String,
    _admin_name3: String,
    _admin_code3: String,
    _latitude: String,
    _longitude: String,
    _accuracy: String,
}

// pseudo isolanguage codes that are not names anyone types in a CSC query
const NON_LANGUAGE_CODES: &[&str] = &[
    "link", "wkdt", "post", "iata", "icao", "faac", "fr_1793", "unlc", "phon", "piny", "tcid",
];

/// Country record: ISO codes, spoken languages and the multilingual lookup
/// keys shared by every indexed entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryRecord {
    pub gid: u64,
    pub iso: String,
    pub iso3: String,
    pub name: String,
    pub asciiname: String,
    /// gid of the capital city (PPLC), when present in the dump
    pub capital: Option<u64>,
    pub neighbours: Vec<String>,
    pub languages: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub population: u64,
    pub feature_class: String,
    pub feature_code: String,
    pub names: HashSet<String>,
    pub names_lang: HashMap<String, Vec<String>>,
    pub abbr: HashSet<String>,
}

impl CountryRecord {
    /// Non-English-speaking countries get the ADM2/ADMD city fallback and
    /// the admin2 state fallback.
    pub fn is_english_speaking(&self) -> bool {
        self.languages
            .iter()
            .any(|l| l == "en" || l.starts_with("en-"))
    }
}

/// Admin divisions and populated places share one shape, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub gid: u64,
    pub kind: EntityKind,
    pub name: String,
    pub asciiname: String,
    pub country_code: String,
    pub admin1: Option<String>,
    pub admin2: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub population: u64,
    pub feature_class: String,
    pub feature_code: String,
    /// normalized lookup keys: primary, ascii, expanded variants,
    /// abbreviations, alternate-language names
    pub names: HashSet<String>,
    /// isolanguage -> normalized names, preferred first, source order after
    pub names_lang: HashMap<String, Vec<String>>,
    pub abbr: HashSet<String>,
    /// admin-division match keys (Admin1/Admin2 kinds only): own names and
    /// abbreviations, plus the parent Admin1 names for Admin2 records
    pub admin_names: HashSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostcodeRecord {
    pub country_code: String,
    pub post_code: String,
    pub place_name: String,
    pub admin_name: String,
}

/// Declarative per-country fixup applied after initial indexing. Aliases are
/// normalized before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CountryPatch {
    AddCountryAlias {
        iso: String,
        lang: Option<String>,
        alias: String,
    },
    RemoveCountryAlias {
        iso: String,
        alias: String,
    },
    AddPlaceAlias {
        kind: EntityKind,
        iso: String,
        /// primary name of the records to patch
        name: String,
        alias: String,
    },
    RemovePlaceAlias {
        kind: EntityKind,
        iso: String,
        alias: String,
    },
}

impl CountryPatch {
    /// Fixups the stock GeoNames dumps need before CSC scrubbing behaves.
    pub fn builtin() -> Vec<CountryPatch> {
        use CountryPatch::*;
        vec![
            // Russian sources routinely write the country as "РФ"
            AddCountryAlias {
                iso: "RU".into(),
                lang: Some("ru".into()),
                alias: "рф".into(),
            },
            AddCountryAlias {
                iso: "IE".into(),
                lang: None,
                alias: "rep of ireland".into(),
            },
            AddCountryAlias {
                iso: "IE".into(),
                lang: None,
                alias: "republic of ireland".into(),
            },
            // the federal-city ADM1 must not shadow Moscow the city
            RemovePlaceAlias {
                kind: EntityKind::Admin1,
                iso: "RU".into(),
                alias: "moscow".into(),
            },
            RemovePlaceAlias {
                kind: EntityKind::Admin1,
                iso: "RU".into(),
                alias: "москва".into(),
            },
            // "Dublin City" the county would swallow plain Dublin lookups
            RemovePlaceAlias {
                kind: EntityKind::Admin2,
                iso: "IE".into(),
                alias: "dublin".into(),
            },
        ]
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct IndexData {
    pub countries: HashMap<u64, CountryRecord>,
    pub admin1: HashMap<u64, PlaceRecord>,
    pub admin2: HashMap<u64, PlaceRecord>,
    pub admind: HashMap<u64, PlaceRecord>,
    pub cities: HashMap<u64, PlaceRecord>,
    pub postcodes: Vec<PostcodeRecord>,
}

impl IndexData {
    pub fn collection(&self, kind: EntityKind) -> Option<&HashMap<u64, PlaceRecord>> {
        match kind {
            EntityKind::Admin1 => Some(&self.admin1),
            EntityKind::Admin2 => Some(&self.admin2),
            EntityKind::Admd => Some(&self.admind),
            EntityKind::City => Some(&self.cities),
            EntityKind::Country | EntityKind::Postcode => None,
        }
    }

    fn collection_mut(&mut self, kind: EntityKind) -> Option<&mut HashMap<u64, PlaceRecord>> {
        match kind {
            EntityKind::Admin1 => Some(&mut self.admin1),
            EntityKind::Admin2 => Some(&mut self.admin2),
            EntityKind::Admd => Some(&mut self.admind),
            EntityKind::City => Some(&mut self.cities),
            EntityKind::Country | EntityKind::Postcode => None,
        }
    }

    pub fn new_from_files<P: AsRef<std::path::Path>>(
        SourceFileOptions {
            geonames,
            countries,
            alternate_names,
            postcodes,
            filter_languages,
        }: SourceFileOptions<P>,
        patches: &[CountryPatch],
    ) -> Result<Self, EngineError> {
        Self::new_from_files_content(
            SourceFileContentOptions {
                geonames: std::fs::read_to_string(geonames)?,
                countries: std::fs::read_to_string(countries)?,
                alternate_names: match alternate_names {
                    Some(p) => Some(std::fs::read_to_string(p)?),
                    None => None,
                },
                postcodes: match postcodes {
                    Some(p) => Some(std::fs::read_to_string(p)?),
                    None => None,
                },
                filter_languages,
            },
            patches,
        )
    }

    pub fn new_from_files_content(
        SourceFileContentOptions {
            geonames,
            countries,
            alternate_names,
            postcodes,
            filter_languages,
        }: SourceFileContentOptions,
        patches: &[CountryPatch],
    ) -> Result<Self, EngineError> {
        #[cfg(feature = "tracing")]
        let now = Instant::now();

        let records = split_content_to_n_parts(&geonames, rayon::current_num_threads())
            .par_iter()
            .map(|chunk| {
                let mut rdr = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .delimiter(b'\t')
                    .from_reader(chunk.as_bytes());

                rdr.deserialize()
                    .filter_map(|row| {
                        let record: GeonameRecordRaw = row.ok()?;
                        Some(record)
                    })
                    .collect::<Vec<GeonameRecordRaw>>()
            })
            .reduce(Vec::new, |mut m1, ref mut m2| {
                m1.append(m2);
                m1
            });

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Read {} gazetteer rows took {}ms",
            records.len(),
            now.elapsed().as_millis(),
        );

        let country_raw: Vec<CountryInfoRaw> = {
            let contents = skip_comment_lines(&countries);
            let mut rdr = csv::ReaderBuilder::new()
                .has_headers(false)
                .delimiter(b'\t')
                .from_reader(contents.as_bytes());
            rdr.deserialize()
                .filter_map(|row| {
                    row.map_err(|e| {
                        #[cfg(feature = "tracing")]
                        tracing::error!("On read country row: {e}");
                        e
                    })
                    .ok()
                })
                .collect()
        };
        let country_gids: HashSet<u64> = country_raw.iter().map(|c| c.geonameid).collect();

        // route gazetteer rows by feature code
        let mut routed: HashMap<EntityKind, Vec<GeonameRecordRaw>> = HashMap::new();
        let mut country_geo: HashMap<u64, (f64, f64)> = HashMap::new();
        for record in records {
            if record.feature_class == "A" && record.feature_code.starts_with("PCL") {
                if country_gids.contains(&record.geonameid) {
                    country_geo.insert(record.geonameid, (record.latitude, record.longitude));
                }
                continue;
            }
            if let Some(kind) = route_feature(&record.feature_class, &record.feature_code) {
                routed.entry(kind).or_default().push(record);
            }
        }

        let relevant_gids: HashSet<u64> = country_gids
            .iter()
            .copied()
            .chain(routed.values().flat_map(|v| v.iter().map(|r| r.geonameid)))
            .collect();

        let mut alt_by_id = match alternate_names {
            Some(contents) => {
                read_alternate_names(&contents, &relevant_gids, &filter_languages)
            }
            None => HashMap::new(),
        };

        // assemble place collections
        let mut data = IndexData::default();
        for kind in [
            EntityKind::Admin1,
            EntityKind::Admin2,
            EntityKind::Admd,
            EntityKind::City,
        ] {
            let raws = routed.remove(&kind).unwrap_or_default();
            let mut places: Vec<PlaceRecord> = raws
                .into_iter()
                .map(|raw| {
                    let (names_lang, abbr) =
                        finalize_alt(alt_by_id.remove(&raw.geonameid).unwrap_or_default());
                    let mut names: HashSet<String> = HashSet::new();
                    names.insert(normalize(&raw.name));
                    if !raw.asciiname.is_empty() {
                        names.insert(normalize(&raw.asciiname));
                    }
                    for alt in raw.alternatenames.split(',') {
                        let key = normalize(alt);
                        if !key.is_empty() {
                            names.insert(key);
                        }
                    }
                    names.extend(names_lang.values().flatten().cloned());
                    names.extend(abbr.iter().cloned());
                    PlaceRecord {
                        gid: raw.geonameid,
                        kind,
                        name: raw.name,
                        asciiname: raw.asciiname,
                        country_code: raw.country_code,
                        admin1: none_if_empty(raw.admin1_code),
                        admin2: none_if_empty(raw.admin2_code),
                        latitude: raw.latitude,
                        longitude: raw.longitude,
                        population: raw.population,
                        feature_class: raw.feature_class,
                        feature_code: raw.feature_code,
                        names,
                        names_lang,
                        abbr,
                        admin_names: HashSet::new(),
                    }
                })
                .collect();

            // dedup key: (countryCode, admin1, normalized primary name);
            // keep the most populous record, ties to the lowest gid
            places.sort_unstable_by_key(|p| {
                (
                    p.country_code.clone(),
                    p.admin1.clone().unwrap_or_default(),
                    normalize(&p.name),
                    std::cmp::Reverse(p.population),
                    p.gid,
                )
            });
            places.dedup_by(|b, a| {
                a.country_code == b.country_code
                    && a.admin1 == b.admin1
                    && normalize(&a.name) == normalize(&b.name)
            });

            let collection = data
                .collection_mut(kind)
                .expect("place kinds always have a collection");
            collection.extend(places.into_iter().map(|p| (p.gid, p)));
        }

        // name-variant expansion; barename clashes are checked against the
        // primary and ascii names already claimed within (country, admin1)
        let mut claimed: HashMap<(String, String, String), (u64, usize)> = HashMap::new();
        for city in data.cities.values() {
            let admin1 = city.admin1.clone().unwrap_or_default();
            let mut keys = vec![normalize(&city.name)];
            let ascii_key = normalize(&city.asciiname);
            if ascii_key != keys[0] {
                keys.push(ascii_key);
            }
            for key in keys {
                if key.is_empty() {
                    continue;
                }
                let slot = claimed
                    .entry((city.country_code.clone(), admin1.clone(), key))
                    .or_insert((city.gid, 0));
                slot.1 += 1;
            }
        }
        for city in data.cities.values_mut() {
            let cc = city.country_code.clone();
            let admin1 = city.admin1.clone().unwrap_or_default();
            let gid = city.gid;
            let variants = expand::city_variants(&cc, &city.name, |bare| {
                claimed
                    .get(&(cc.clone(), admin1.clone(), bare.to_owned()))
                    .map(|&(owner, n)| owner != gid || n > 1)
                    .unwrap_or(false)
            });
            city.names.extend(variants);
        }
        for kind in [EntityKind::Admin1, EntityKind::Admin2, EntityKind::Admd] {
            let collection = data.collection_mut(kind).expect("admin collections exist");
            for place in collection.values_mut() {
                let variants = expand::admin_variants(&place.name);
                place.names.extend(variants);
            }
        }

        // admin-division match keys; Admin2 inherits the parent Admin1 names
        let mut admin1_names_by_code: HashMap<String, HashSet<String>> = HashMap::new();
        for place in data.admin1.values_mut() {
            place.admin_names = place.names.union(&place.abbr).cloned().collect();
            if let Some(code) = &place.admin1 {
                admin1_names_by_code
                    .entry(format!("{}.{}", place.country_code, code))
                    .or_default()
                    .extend(place.names.iter().cloned());
            }
        }
        for place in data.admin2.values_mut() {
            place.admin_names = place.names.union(&place.abbr).cloned().collect();
            if let Some(code) = &place.admin1 {
                if let Some(inherited) =
                    admin1_names_by_code.get(&format!("{}.{}", place.country_code, code))
                {
                    place.admin_names.extend(inherited.iter().cloned());
                }
            }
        }

        // countries; the capital is the PPLC of the country when indexed
        let mut capital_by_iso: HashMap<String, u64> = HashMap::new();
        for city in data.cities.values() {
            if city.feature_code == "PPLC" {
                capital_by_iso.insert(city.country_code.clone(), city.gid);
            }
        }
        for raw in country_raw {
            let (names_lang, abbr) =
                finalize_alt(alt_by_id.remove(&raw.geonameid).unwrap_or_default());
            let mut names: HashSet<String> = HashSet::new();
            names.insert(normalize(&raw.name));
            names.extend(names_lang.values().flatten().cloned());
            names.extend(abbr.iter().cloned());
            names.extend(expand::admin_variants(&raw.name));
            let (latitude, longitude) = country_geo
                .get(&raw.geonameid)
                .copied()
                .unwrap_or((0.0, 0.0));
            data.countries.insert(
                raw.geonameid,
                CountryRecord {
                    gid: raw.geonameid,
                    capital: capital_by_iso.get(&raw.iso).copied(),
                    neighbours: split_csv_field(&raw.neighbours),
                    languages: split_csv_field(&raw.languages),
                    latitude,
                    longitude,
                    population: raw.population,
                    feature_class: "A".to_owned(),
                    feature_code: "PCLI".to_owned(),
                    asciiname: raw.name.clone(),
                    iso: raw.iso,
                    iso3: raw.iso3,
                    name: raw.name,
                    names,
                    names_lang,
                    abbr,
                },
            );
        }

        if let Some(contents) = postcodes {
            let mut rdr = csv::ReaderBuilder::new()
                .has_headers(false)
                .delimiter(b'\t')
                .from_reader(contents.as_bytes());
            data.postcodes = rdr
                .deserialize()
                .filter_map(|row| {
                    let record: PostcodeRaw = row.ok()?;
                    Some(PostcodeRecord {
                        country_code: record.country_code,
                        post_code: record.postal_code,
                        place_name: record.place_name,
                        admin_name: record.admin_name1,
                    })
                })
                .collect();
        }

        for patch in patches {
            data.apply_patch(patch);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Index ready (countries {}, admin1 {}, admin2 {}, admind {}, cities {}, postcodes {}). took {}ms",
            data.countries.len(),
            data.admin1.len(),
            data.admin2.len(),
            data.admind.len(),
            data.cities.len(),
            data.postcodes.len(),
            now.elapsed().as_millis()
        );

        Ok(data)
    }

    fn apply_patch(&mut self, patch: &CountryPatch) {
        match patch {
            CountryPatch::AddCountryAlias { iso, lang, alias } => {
                let alias = normalize(alias);
                if let Some(country) = self.countries.values_mut().find(|c| &c.iso == iso) {
                    country.names.insert(alias.clone());
                    if let Some(lang) = lang {
                        let list = country.names_lang.entry(lang.clone()).or_default();
                        if !list.contains(&alias) {
                            list.push(alias);
                        }
                    }
                }
            }
            CountryPatch::RemoveCountryAlias { iso, alias } => {
                let alias = normalize(alias);
                if let Some(country) = self.countries.values_mut().find(|c| &c.iso == iso) {
                    country.names.remove(&alias);
                    for list in country.names_lang.values_mut() {
                        list.retain(|n| n != &alias);
                    }
                }
            }
            CountryPatch::AddPlaceAlias {
                kind,
                iso,
                name,
                alias,
            } => {
                let alias = normalize(alias);
                let name = normalize(name);
                if let Some(collection) = self.collection_mut(*kind) {
                    for place in collection
                        .values_mut()
                        .filter(|p| &p.country_code == iso && normalize(&p.name) == name)
                    {
                        place.names.insert(alias.clone());
                        if !place.admin_names.is_empty() {
                            place.admin_names.insert(alias.clone());
                        }
                    }
                }
            }
            CountryPatch::RemovePlaceAlias { kind, iso, alias } => {
                let alias = normalize(alias);
                if let Some(collection) = self.collection_mut(*kind) {
                    for place in collection.values_mut().filter(|p| &p.country_code == iso) {
                        place.names.remove(&alias);
                        place.admin_names.remove(&alias);
                        for list in place.names_lang.values_mut() {
                            list.retain(|n| n != &alias);
                        }
                    }
                }
            }
        }
    }
}

// INCLUDE every populated place except:
// PPLF  farm village
// PPLQ  abandoned populated place
// PPLW  destroyed populated place
// PPLH  historical populated place
// STLMT israeli settlement
fn route_feature(feature_class: &str, feature_code: &str) -> Option<EntityKind> {
    match (feature_class, feature_code) {
        ("A", "ADM1") => Some(EntityKind::Admin1),
        ("A", "ADM2") => Some(EntityKind::Admin2),
        ("A", "ADMD") => Some(EntityKind::Admd),
        ("P", "PPLF" | "PPLQ" | "PPLW" | "PPLH" | "STLMT") => None,
        ("P", _) => Some(EntityKind::City),
        _ => None,
    }
}

fn read_alternate_names(
    contents: &str,
    relevant_gids: &HashSet<u64>,
    filter_languages: &[&str],
) -> HashMap<u64, AltNames> {
    #[cfg(feature = "tracing")]
    let now = Instant::now();

    let mut alt_by_id: HashMap<u64, AltNames> = HashMap::new();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_reader(contents.as_bytes());

    for row in rdr.deserialize() {
        let record: AlternateNamesRaw = match row {
            Ok(r) => r,
            Err(_) => continue,
        };
        if !relevant_gids.contains(&record.geonameid) {
            continue;
        }
        if record.is_colloquial == "1" || record.is_historic == "1" {
            continue;
        }
        let lang = record.isolanguage.as_str();
        let key = normalize(&record.alternate_name);
        if key.is_empty() {
            continue;
        }
        if lang == "abbr" {
            alt_by_id.entry(record.geonameid).or_default().abbr.push(key);
            continue;
        }
        if NON_LANGUAGE_CODES.contains(&lang) {
            continue;
        }
        if !filter_languages.is_empty() && !filter_languages.contains(&lang) {
            continue;
        }
        // short forms that are not preferred are mostly noise
        if record.is_short_name == "1" && record.is_preferred_name != "1" {
            continue;
        }
        alt_by_id
            .entry(record.geonameid)
            .or_default()
            .langs
            .push(AltEntry {
                lang: lang.to_owned(),
                name: key,
                preferred: record.is_preferred_name == "1",
            });
    }

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Read alternate names for {} entities took {}ms",
        alt_by_id.len(),
        now.elapsed().as_millis(),
    );

    alt_by_id
}

fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn split_csv_field(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(Default)]
struct AltNames {
    langs: Vec<AltEntry>,
    abbr: Vec<String>,
}

struct AltEntry {
    lang: String,
    name: String,
    preferred: bool,
}

fn finalize_alt(entries: AltNames) -> (HashMap<String, Vec<String>>, HashSet<String>) {
    let mut names_lang: HashMap<String, Vec<String>> = HashMap::new();
    let (preferred, rest): (Vec<_>, Vec<_>) = entries.langs.into_iter().partition(|e| e.preferred);
    for entry in preferred.into_iter().chain(rest) {
        let list = names_lang.entry(entry.lang).or_default();
        if !list.contains(&entry.name) {
            list.push(entry.name);
        }
    }
    (names_lang, entries.abbr.into_iter().collect())
}
