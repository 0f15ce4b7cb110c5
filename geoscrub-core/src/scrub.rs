//! Country/state/city resolution and the CSC scrubbing state machine.
//!
//! A scrub takes a free-form `(city, state, country)` triple and returns the
//! gazetteer record the query most plausibly meant, together with a
//! confidence score and per-field status codes: `O` the input matched as
//! given, `M` the input was present but overridden, `D` the input was
//! missing and the resolver supplied it.

use serde::Serialize;

use crate::index::{CountryRecord, EntityKind, PlaceRecord};
use crate::normalize::{clean_token, normalize};
use crate::{Engine, PlaceQuery};

/// ISO2 codes of US outlying areas that show up as the "state" of a US
/// address but are their own country records in GeoNames.
pub const US_OUTLYING_AREAS: &[&str] = &["AS", "GU", "MP", "PR", "UM", "VI"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldStatus {
    #[serde(rename = "O")]
    Original,
    #[serde(rename = "M")]
    Modified,
    #[serde(rename = "D")]
    Derived,
}

impl FieldStatus {
    pub fn code(&self) -> &'static str {
        match self {
            FieldStatus::Original => "O",
            FieldStatus::Modified => "M",
            FieldStatus::Derived => "D",
        }
    }

    fn penalty(&self) -> f32 {
        match self {
            FieldStatus::Original => 0.0,
            FieldStatus::Modified => 0.1,
            FieldStatus::Derived => 0.2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScrubOptions {
    /// include the full candidate set instead of only the winner
    pub verbose: bool,
}

/// Admin fields a token can be canonicalized against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormField {
    Country,
    Admin1,
    Admin2,
}

/// A state token can resolve to an admin division or, for US outlying
/// areas, to a country record that takes over as the effective country.
#[derive(Debug)]
pub enum StateMatch<'a> {
    Admin(&'a PlaceRecord),
    UsTerritory(&'a CountryRecord),
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrubbedPlace<'a> {
    /// winning populated place; an ADM2/ADMD record when the city was
    /// reached through the non-English fallback
    pub city: Option<&'a PlaceRecord>,
    pub state: Option<&'a PlaceRecord>,
    pub country: Option<&'a CountryRecord>,
}

#[derive(Debug, Serialize)]
pub struct ScrubResult<'a> {
    pub result: Option<ScrubbedPlace<'a>>,
    pub score: f32,
    pub cc_status: Option<FieldStatus>,
    pub st_status: Option<FieldStatus>,
    /// cardinality of the final candidate set before tie-breaking
    pub count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<&'a PlaceRecord>,
}

impl ScrubResult<'_> {
    fn no_match() -> Self {
        ScrubResult {
            result: None,
            score: 0.0,
            cc_status: None,
            st_status: None,
            count: 0,
            candidates: Vec::new(),
        }
    }
}

impl Engine {
    /// Match a country token: ISO2, ISO3, any indexed name, any
    /// alternate-language name. Ambiguity resolves to the most populous
    /// candidate.
    pub fn resolve_country(&self, token: &str) -> Option<&CountryRecord> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        let upper = token.to_uppercase();
        if let Some(gid) = self.country_by_iso.get(&upper) {
            return self.data.countries.get(gid);
        }
        if let Some(gid) = self.country_by_iso3.get(&upper) {
            return self.data.countries.get(gid);
        }
        let key = normalize(token);
        let by_name = self.countries_by_name(&key);
        if !by_name.is_empty() {
            if by_name.len() > 1 {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Ambiguous country token {token:?}: {} candidates",
                    by_name.len()
                );
            }
            return by_name.into_iter().next();
        }
        let by_lang = self.countries_by_any_lang(&key);
        if by_lang.len() > 1 {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Ambiguous country token {token:?}: {} language-name candidates",
                by_lang.len()
            );
        }
        by_lang.into_iter().next()
    }

    /// Facade spelling of [`Engine::resolve_country`].
    pub fn country_info(&self, token: &str) -> Option<&CountryRecord> {
        self.resolve_country(token)
    }

    /// Match a state token within a candidate country: ADM1 names, ADM1
    /// abbreviations, then ADM2 names for non-English-speaking countries.
    /// `country_code = None` searches every country.
    pub fn resolve_state(&self, token: &str, country_code: Option<&str>) -> Option<StateMatch<'_>> {
        let key = normalize(token);
        if key.is_empty() {
            return None;
        }
        let by_name = PlaceQuery {
            country_code,
            name: Some(&key),
            ..Default::default()
        };
        if let Some(first) = self.find(EntityKind::Admin1, &by_name).first().copied() {
            return Some(StateMatch::Admin(first));
        }
        let by_abbr = PlaceQuery {
            country_code,
            abbr: Some(&key),
            ..Default::default()
        };
        if let Some(first) = self.find(EntityKind::Admin1, &by_abbr).first().copied() {
            return Some(StateMatch::Admin(first));
        }
        if let Some(cc) = country_code {
            if cc == "US" {
                let upper = token.trim().to_uppercase();
                if US_OUTLYING_AREAS.contains(&upper.as_str()) {
                    if let Some(country) = self.country(&upper) {
                        return Some(StateMatch::UsTerritory(country));
                    }
                }
            }
            if let Some(country) = self.country(cc) {
                if !country.is_english_speaking() {
                    if let Some(first) = self.find(EntityKind::Admin2, &by_name).first().copied() {
                        return Some(StateMatch::Admin(first));
                    }
                }
            }
        }
        None
    }

    /// Match a city token against populated places, with the ADMD/ADM2
    /// fallback for non-English-speaking countries. Most specific filter
    /// first; largest population wins, ties to the lowest gid.
    pub fn resolve_city(
        &self,
        token: &str,
        country_code: Option<&str>,
        admin1: Option<&str>,
    ) -> Option<&PlaceRecord> {
        let key = normalize(token);
        if key.is_empty() {
            return None;
        }
        match country_code.and_then(|cc| self.country(cc)) {
            Some(country) => {
                let (found, _) = self.city_search(&key, country, admin1);
                found.first().copied()
            }
            None => self
                .find(
                    EntityKind::City,
                    &PlaceQuery {
                        name: Some(&key),
                        ..Default::default()
                    },
                )
                .first()
                .copied(),
        }
    }

    /// Canonicalize an admin1/admin2/country token to its display name.
    pub fn norm(&self, field: NormField, country_code: Option<&str>, value: &str) -> Option<&str> {
        match field {
            NormField::Country => self.resolve_country(value).map(|c| c.name.as_str()),
            NormField::Admin1 => match self.resolve_state(value, country_code)? {
                StateMatch::Admin(rec) => Some(rec.name.as_str()),
                StateMatch::UsTerritory(country) => Some(country.name.as_str()),
            },
            NormField::Admin2 => {
                let key = normalize(value);
                if key.is_empty() {
                    return None;
                }
                self.find(
                    EntityKind::Admin2,
                    &PlaceQuery {
                        country_code,
                        name: Some(&key),
                        ..Default::default()
                    },
                )
                .first()
                .map(|rec| rec.name.as_str())
            }
        }
    }

    /// Scrub a `(city, state, country)` triple.
    ///
    /// Tries the fields as given, then every sensible combination of
    /// overriding or deriving them, and reports what it had to change.
    pub fn csc_scrub(
        &self,
        city: Option<&str>,
        state: Option<&str>,
        cc: Option<&str>,
        options: &ScrubOptions,
    ) -> ScrubResult<'_> {
        let city_token = clean_token(city);
        let state_token = clean_token(state);
        let cc_token = clean_token(cc);

        if city_token.is_none() && state_token.is_none() && cc_token.is_none() {
            return ScrubResult::no_match();
        }

        let mut cc_status: Option<FieldStatus> = None;
        let mut st_status: Option<FieldStatus> = None;

        let mut country: Option<&CountryRecord> = None;
        if let Some(token) = cc_token {
            country = self.resolve_country(token);
            if country.is_some() {
                cc_status = Some(FieldStatus::Original);
            }
        }

        // state; may override or supply the country
        let mut state_rec: Option<&PlaceRecord> = None;
        if let Some(token) = state_token {
            match self.resolve_state(token, country.map(|c| c.iso.as_str())) {
                Some(StateMatch::UsTerritory(territory)) => {
                    country = Some(territory);
                    cc_status = Some(FieldStatus::Modified);
                    st_status = Some(FieldStatus::Original);
                }
                Some(StateMatch::Admin(rec)) => {
                    state_rec = Some(rec);
                    st_status = Some(FieldStatus::Original);
                }
                None => {
                    // the token names a state elsewhere; override the input
                    // country only when (city, state) is globally unambiguous
                    let key = normalize(token);
                    let viable: Vec<&PlaceRecord> = self
                        .find(
                            EntityKind::Admin1,
                            &PlaceQuery {
                                name: Some(&key),
                                ..Default::default()
                            },
                        )
                        .into_iter()
                        .filter(|s| match city_token {
                            Some(city) => !self
                                .city_candidates_in(city, &s.country_code, s.admin1.as_deref())
                                .is_empty(),
                            None => true,
                        })
                        .collect();
                    let chosen = match (country.is_some(), viable.len()) {
                        (_, 0) => None,
                        (true, 1) => viable.first().copied(),
                        (true, _) => None, // ambiguous, keep the input country
                        (false, _) => viable.first().copied(),
                    };
                    if let Some(rec) = chosen {
                        country = self.country(&rec.country_code);
                        cc_status = Some(if cc_token.is_some() {
                            FieldStatus::Modified
                        } else {
                            FieldStatus::Derived
                        });
                        state_rec = Some(rec);
                        st_status = Some(FieldStatus::Original);
                    } else if country.is_none() {
                        // a state token that actually names a country,
                        // e.g. ("San Juan", "PR", None)
                        if let Some(rec) = self.resolve_country(token) {
                            country = Some(rec);
                            cc_status = Some(if cc_token.is_some() {
                                FieldStatus::Modified
                            } else {
                                FieldStatus::Derived
                            });
                            st_status = Some(FieldStatus::Original);
                        }
                    }
                }
            }
        }

        // city
        let mut city_rec: Option<&PlaceRecord> = None;
        let mut count = 0usize;
        let mut candidates: Vec<&PlaceRecord> = Vec::new();
        if let Some(token) = city_token {
            let key = normalize(token);
            let mut loosened = false;
            let mut found = match country {
                Some(c) => {
                    let admin1 = state_rec.and_then(|s| s.admin1.as_deref());
                    let (found, l) = self.city_search(&key, c, admin1);
                    loosened = l;
                    found
                }
                None => Vec::new(),
            };

            if found.is_empty() {
                // drop the country entirely; a (city, state) pair that exists
                // across all countries wins, most populous first
                let viable: Vec<&PlaceRecord> = self
                    .find(
                        EntityKind::City,
                        &PlaceQuery {
                            name: Some(&key),
                            ..Default::default()
                        },
                    )
                    .into_iter()
                    .filter(|candidate| match state_token {
                        Some(st) => self.state_matches_city(st, candidate),
                        None => true,
                    })
                    .collect();
                if let Some(winner) = viable.first().copied() {
                    if country.map(|c| c.iso != winner.country_code).unwrap_or(true) {
                        cc_status = Some(if cc_token.is_some() {
                            FieldStatus::Modified
                        } else {
                            FieldStatus::Derived
                        });
                        country = self.country(&winner.country_code);
                    }
                    if let Some(st) = state_token {
                        if let Some(StateMatch::Admin(rec)) =
                            self.resolve_state(st, Some(&winner.country_code))
                        {
                            state_rec = Some(rec);
                            if st_status.is_none() {
                                st_status = Some(FieldStatus::Original);
                            }
                        }
                    }
                    loosened = false;
                    found = viable;
                }
            }

            if loosened {
                // the resolved state did not contain the city; trust the city
                st_status = Some(FieldStatus::Modified);
                state_rec = found.first().and_then(|c| {
                    let a1 = c.admin1.as_deref()?;
                    self.admin1_by_code(&c.country_code, a1)
                });
            }

            count = found.len();
            city_rec = found.first().copied();
            if options.verbose {
                candidates = found;
            }
        }

        // a single surviving city derives a missing state
        if state_token.is_none() && count == 1 {
            if let Some(rec) = city_rec {
                if let Some(a1) = rec.admin1.as_deref() {
                    if let Some(state) = self.admin1_by_code(&rec.country_code, a1) {
                        state_rec = Some(state);
                        st_status = Some(FieldStatus::Derived);
                    }
                }
            }
        }
        // a country inferred from the state alone
        if cc_token.is_none() && cc_status.is_none() && country.is_some() {
            cc_status = Some(FieldStatus::Derived);
        }

        if city_token.is_some() && city_rec.is_none() {
            return ScrubResult::no_match();
        }
        if city_rec.is_none() && state_rec.is_none() && country.is_none() {
            return ScrubResult::no_match();
        }

        let mut score = 1.0f32;
        for status in [cc_status, st_status].into_iter().flatten() {
            score -= status.penalty();
        }
        let score = score.max(0.0);

        ScrubResult {
            result: Some(ScrubbedPlace {
                city: city_rec,
                state: state_rec,
                country,
            }),
            score,
            cc_status,
            st_status,
            count,
            candidates,
        }
    }

    /// City lookup for a known country: populated places first, then the
    /// ADMD/ADM2 collections when the country is non-English-speaking (so
    /// e.g. a ward like 港区 resolves to Minato-ku). Each collection is
    /// tried with the admin1 constraint, then without; the second part of
    /// the return value reports whether the constraint had to be dropped.
    fn city_search(
        &self,
        key: &str,
        country: &CountryRecord,
        admin1: Option<&str>,
    ) -> (Vec<&PlaceRecord>, bool) {
        let cc = country.iso.as_str();
        let kinds: &[EntityKind] = if country.is_english_speaking() {
            &[EntityKind::City]
        } else {
            &[EntityKind::City, EntityKind::Admd, EntityKind::Admin2]
        };
        for kind in kinds {
            if let Some(a1) = admin1 {
                let found = self.find(
                    *kind,
                    &PlaceQuery {
                        country_code: Some(cc),
                        admin1: Some(a1),
                        name: Some(key),
                        ..Default::default()
                    },
                );
                if !found.is_empty() {
                    return (found, false);
                }
            }
            let found = self.find(
                *kind,
                &PlaceQuery {
                    country_code: Some(cc),
                    name: Some(key),
                    ..Default::default()
                },
            );
            if !found.is_empty() {
                return (found, admin1.is_some());
            }
        }
        (Vec::new(), false)
    }

    fn city_candidates_in(
        &self,
        token: &str,
        country_code: &str,
        admin1: Option<&str>,
    ) -> Vec<&PlaceRecord> {
        let key = normalize(token);
        if key.is_empty() {
            return Vec::new();
        }
        match self.country(country_code) {
            Some(country) => self.city_search(&key, country, admin1).0,
            None => Vec::new(),
        }
    }

    /// Does the state token resolve, within the candidate city's country, to
    /// the candidate's own admin division?
    fn state_matches_city(&self, token: &str, city: &PlaceRecord) -> bool {
        match self.resolve_state(token, Some(&city.country_code)) {
            Some(StateMatch::Admin(state)) => match (&city.admin1, &state.admin1) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            },
            Some(StateMatch::UsTerritory(territory)) => territory.iso == city.country_code,
            None => false,
        }
    }
}
