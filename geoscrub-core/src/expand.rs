use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::normalize;

/// Countries whose populated places carry Township/Twp/City/Village suffix noise.
const SUFFIX_COUNTRIES: &[&str] = &["US", "CA", "AU"];

/// Countries where "X on Y" / "X by (the) Y" places are colloquially shortened
/// to the barename.
const BARENAME_COUNTRIES: &[&str] = &["US", "GB", "IE", "AU", "NZ", "ZA"];

/// Barenames too generic to stand alone as aliases.
const BARENAME_BLACKLIST: &[&str] = &[
    "lake", "lakes", "village", "pines", "reserve", "the park", "city", "come",
];

static SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.+?)\s+(township|twp|city|village)$").unwrap());
static BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)\s*\(.+\)$").unwrap());
static ON_BY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.+?)[\s-](?:on|by)[\s-](?:the[\s-])?.+$").unwrap());
static O_OF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(.+?)\s+o'\s*(.+)$").unwrap());

/// Variant lookup keys for a populated place.
///
/// `barename_taken` is consulted for the "X on Y" rule only: a barename is
/// suppressed when another city of the same `(countryCode, admin1)` already
/// answers to it, so `Hastings-on-Hudson` never shadows a plain `Hastings`.
/// All returned keys are normalized.
pub fn city_variants<F>(country_code: &str, name: &str, mut barename_taken: F) -> Vec<String>
where
    F: FnMut(&str) -> bool,
{
    let mut out = Vec::new();
    push_common_variants(name, &mut out);

    if SUFFIX_COUNTRIES.contains(&country_code) {
        if let Some(caps) = SUFFIX_RE.captures(name) {
            let base = caps.get(1).unwrap().as_str();
            let bare = normalize(base);
            if !BARENAME_BLACKLIST.contains(&bare.as_str()) {
                out.push(bare);
                // Twp and Township are interchangeable in postal usage
                match caps.get(2).unwrap().as_str().to_ascii_lowercase().as_str() {
                    "twp" => out.push(normalize(&format!("{base} Township"))),
                    "township" => out.push(normalize(&format!("{base} Twp"))),
                    _ => {}
                }
            }
        }
    }

    if BARENAME_COUNTRIES.contains(&country_code) {
        if let Some(caps) = ON_BY_RE.captures(name) {
            let bare = normalize(caps.get(1).unwrap().as_str());
            if !BARENAME_BLACKLIST.contains(&bare.as_str())
                && bare != "park"
                && !bare.ends_with(" park")
                && !barename_taken(&bare)
            {
                out.push(bare);
            }
        }
    }

    out
}

/// Variant lookup keys for admin divisions and countries. Suffix and barename
/// rules are city-only; everything else applies.
pub fn admin_variants(name: &str) -> Vec<String> {
    let mut out = Vec::new();
    push_common_variants(name, &mut out);
    out
}

fn push_common_variants(name: &str, out: &mut Vec<String>) {
    // Saint/St on the leading token
    if let Some(rest) = name.strip_prefix("Saint ") {
        out.push(normalize(&format!("St {rest}")));
    } else if let Some(rest) = name.strip_prefix("St. ").or_else(|| name.strip_prefix("St ")) {
        out.push(normalize(&format!("Saint {rest}")));
    }

    // pre-bracket barename: "Westport (historical)" -> "westport"
    if let Some(caps) = BRACKET_RE.captures(name) {
        out.push(normalize(caps.get(1).unwrap().as_str()));
    }

    // stray space after a clipped prefix: "Mc Kenzie" -> "mckenzie", "O Fallon" -> "o'fallon"
    if let Some(rest) = name.strip_prefix("Mc ") {
        out.push(normalize(&format!("Mc{rest}")));
    }
    if let Some(rest) = name.strip_prefix("O ") {
        out.push(normalize(&format!("O'{rest}")));
    }

    // "Land O' Lakes" -> stripped and spelled-out forms
    if let Some(caps) = O_OF_RE.captures(name) {
        let head = caps.get(1).unwrap().as_str();
        let tail = caps.get(2).unwrap().as_str();
        out.push(normalize(&format!("{head} O {tail}")));
        out.push(normalize(&format!("{head} Of {tail}")));
    }
}
