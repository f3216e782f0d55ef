//! Free-text cleanup shared by every normalizer.
//!
//! All functions are total: malformed input degrades to `None` or an empty
//! list, never to an error.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Runs of whitespace, including non-breaking spaces from spreadsheet exports.
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\u{a0}]+").unwrap());

/// Separators for list-valued cells.
static LIST_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[;,\r\n]+").unwrap());

/// Separators inside a muscle token; `/` joins alternatives like "Quads/Glutes".
static MUSCLE_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/+").unwrap());

/// Anything that is not a lowercase letter or digit.
static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Qualifier prefix carried by dynamic stabilizer tokens.
static DYNAMIC_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^dynamic\s*:\s*").unwrap());

/// Canonical spelling of the dynamic qualifier.
pub const DYNAMIC_QUALIFIER: &str = "Dynamic: ";

/// Tokens that mean "no value" in source sheets.
pub const NULL_TOKENS: &[&str] = &["", "none", "n/a", "na", "null", "-", "nan"];

/// Trim and collapse internal whitespace to single spaces.
pub fn collapse_spaces(value: &str) -> String {
    WHITESPACE.replace_all(value.trim(), " ").trim().to_string()
}

/// Empty or whitespace-only input becomes `None`; anything else is
/// space-collapsed.
pub fn normalize_scalar_value(value: Option<&str>) -> Option<String> {
    let cleaned = collapse_spaces(value?);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Identity key for exercise names: lowercase, space-collapsed.
pub fn normalized_key(name: &str) -> String {
    collapse_spaces(name).to_lowercase()
}

/// Case- and punctuation-insensitive key used for synonym table lookups.
///
/// `"Push/Pull"`, `"push-pull"` and `" PUSH  pull "` all map to `"push pull"`.
pub fn lookup_key(value: &str) -> String {
    let lowered = value.to_lowercase();
    NON_ALNUM.replace_all(&lowered, " ").trim().to_string()
}

/// Whether a cleaned token is one of the null markers.
pub fn is_null_token(token: &str) -> bool {
    let lowered = token.trim().to_lowercase();
    NULL_TOKENS.contains(&lowered.as_str())
}

/// Split a stored list value on `;`, `,` or newlines, trimming each token and
/// dropping empties. No casing changes.
pub fn split_list_tokens(value: &str) -> Vec<String> {
    LIST_SEPARATORS
        .split(value)
        .map(collapse_spaces)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Split a source cell on list separators, dropping null tokens.
pub fn split_csv(value: Option<&str>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    split_list_tokens(value)
        .into_iter()
        .filter(|t| !is_null_token(t))
        .collect()
}

/// Split a muscle cell on `;`, `,`, `/` or newlines, dropping null tokens.
///
/// Null markers are checked before the `/` split so `n/a` is not read as two
/// muscles.
pub fn split_muscles(value: &str) -> Vec<String> {
    split_csv(Some(value))
        .iter()
        .flat_map(|token| MUSCLE_SEPARATORS.split(token).map(collapse_spaces))
        .filter(|t| !t.is_empty() && !is_null_token(t))
        .collect()
}

/// Title-case each word. A word starts after whitespace, `-`, `_`, `(` or `/`.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for ch in collapse_spaces(value).chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.push(single_char(ch.to_uppercase()).unwrap_or(ch));
            } else {
                out.push(single_char(ch.to_lowercase()).unwrap_or(ch));
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = matches!(ch, ' ' | '-' | '_' | '(' | '/');
        }
    }
    out
}

/// A case mapping that expands (`ß` to `SS`) is not applied, so title-casing
/// stays idempotent.
fn single_char(mut mapped: impl Iterator<Item = char>) -> Option<char> {
    match (mapped.next(), mapped.next()) {
        (Some(ch), None) => Some(ch),
        _ => None,
    }
}

/// Title-case a list token, keeping a `Dynamic:` qualifier in its canonical
/// spelling.
pub fn title_case_token(token: &str) -> String {
    match DYNAMIC_PREFIX.find(token) {
        Some(m) => format!("{}{}", DYNAMIC_QUALIFIER, title_case(&token[m.end()..])),
        None => title_case(token),
    }
}

/// Prefix a token with the dynamic qualifier unless it already carries it.
pub fn with_dynamic_qualifier(token: &str) -> String {
    if DYNAMIC_PREFIX.is_match(token) {
        title_case_token(token)
    } else {
        format!("{}{}", DYNAMIC_QUALIFIER, title_case(token))
    }
}

/// De-duplicate case-insensitively, keeping the first-seen spelling and the
/// encounter order.
pub fn dedupe_case_insensitive(tokens: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

/// Split, drop null tokens, title-case and de-duplicate a list cell.
///
/// Tokens come back in encounter order; persistence sorts them.
pub fn normalize_list_field(value: Option<&str>) -> Vec<String> {
    dedupe_case_insensitive(split_csv(value).iter().map(|t| title_case_token(t)))
}

/// Case- and whitespace-insensitive equality of two optional values.
pub fn values_equal(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => normalized_key(a) == normalized_key(b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_spaces() {
        assert_eq!(collapse_spaces("  Bench \t  Press \n"), "Bench Press");
        assert_eq!(collapse_spaces("   "), "");
    }

    #[test]
    fn test_normalize_scalar_value() {
        assert_eq!(normalize_scalar_value(None), None);
        assert_eq!(normalize_scalar_value(Some("   ")), None);
        assert_eq!(
            normalize_scalar_value(Some(" Smith  machine ")).as_deref(),
            Some("Smith machine")
        );
    }

    #[test]
    fn test_lookup_key_ignores_punctuation() {
        assert_eq!(lookup_key("Push/Pull"), "push pull");
        assert_eq!(lookup_key(" push-PULL "), "push pull");
        assert_eq!(lookup_key("Smith_Machine"), "smith machine");
    }

    #[test]
    fn test_split_csv_drops_null_tokens() {
        assert_eq!(
            split_csv(Some("Rotator Cuff; none, N/A\nSerratus Anterior")),
            vec!["Rotator Cuff", "Serratus Anterior"]
        );
        assert!(split_csv(None).is_empty());
    }

    #[test]
    fn test_split_muscles_keeps_na_whole() {
        assert!(split_muscles("N/A").is_empty());
        assert_eq!(split_muscles("Quads/Glutes; n/a"), vec!["Quads", "Glutes"]);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("rotator cuff"), "Rotator Cuff");
        assert_eq!(title_case("anterior-deltoid"), "Anterior-Deltoid");
        assert_eq!(title_case("ROTATOR CUFF"), "Rotator Cuff");
        assert_eq!(title_case(&title_case("erector spinae")), "Erector Spinae");
        assert_eq!(title_case("ßquat"), "ßquat");
        assert_eq!(title_case("STRAẞE"), "Straße");
    }

    #[test]
    fn test_dynamic_prefix_preserved() {
        assert_eq!(
            title_case_token("dynamic: rotator cuff"),
            "Dynamic: Rotator Cuff"
        );
        assert_eq!(title_case_token("DYNAMIC:obliques"), "Dynamic: Obliques");
        assert_eq!(with_dynamic_qualifier("hamstrings"), "Dynamic: Hamstrings");
        assert_eq!(
            with_dynamic_qualifier("Dynamic: Hamstrings"),
            "Dynamic: Hamstrings"
        );
    }

    #[test]
    fn test_normalize_list_field_dedupes_preserving_first_casing() {
        assert_eq!(
            normalize_list_field(Some("rotator cuff; Serratus Anterior, ROTATOR CUFF")),
            vec!["Rotator Cuff", "Serratus Anterior"]
        );
    }

    #[test]
    fn test_values_equal() {
        assert!(values_equal(Some("Push"), Some(" push ")));
        assert!(!values_equal(Some("Push"), Some("Pull")));
        assert!(!values_equal(Some("Push"), None));
        assert!(values_equal(None, None));
    }
}
