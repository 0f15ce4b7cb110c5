use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical lookup key for a toponym.
///
/// NFKD-decompose, drop combining marks, lowercase, collapse every run of
/// whitespace and internal punctuation (`-`, `_`, `.`, `,`) into a single
/// space, fold curly apostrophes to `'` and trim. Idempotent: both indexed
/// names and query tokens go through here, so only normalized strings are
/// ever compared.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        let c = match c {
            '\u{2019}' | '\u{02BC}' | '\u{02BB}' => '\'',
            c if c.is_whitespace() || matches!(c, '-' | '_' | '.' | ',') => ' ',
            c => c,
        };
        if c == ' ' {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            continue;
        }
        for lower in c.to_lowercase() {
            out.push(lower);
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Trim a raw query field; empty and whitespace-only inputs count as missing.
pub(crate) fn clean_token(input: Option<&str>) -> Option<&str> {
    input.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_and_diacritics() {
        assert_eq!(normalize("São Paulo"), "sao paulo");
        assert_eq!(normalize("MÜNCHEN"), "munchen");
        assert_eq!(normalize("Besançon"), "besancon");
    }

    #[test]
    fn collapses_punctuation_and_whitespace() {
        assert_eq!(normalize("Mentor-on-the-Lake"), "mentor on the lake");
        assert_eq!(normalize("St. Louis"), "st louis");
        assert_eq!(normalize("  Winston - Salem "), "winston salem");
        assert_eq!(normalize("Foo_Bar,Baz"), "foo bar baz");
    }

    #[test]
    fn folds_curly_apostrophes() {
        assert_eq!(normalize("Land O’ Lakes"), "land o' lakes");
        assert_eq!(normalize("Hawaiʻi"), "hawai'i");
    }

    #[test]
    fn keeps_non_latin_scripts() {
        assert_eq!(normalize("札幌市"), "札幌市");
        assert_eq!(normalize("Москва"), "москва");
    }

    #[test]
    fn idempotent() {
        for s in ["São Paulo", "Mentor-on-the-Lake", "Land O’ Lakes", "札幌市"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }
}
