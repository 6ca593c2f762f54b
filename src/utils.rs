//! Small text helpers shared by the collectors and the composer.
//!
//! - Whitespace normalization for scraped text
//! - Character-bounded truncation (never splits a UTF-8 code point)
//! - Log-friendly previews of long strings

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Collapse every run of whitespace (including newlines and tabs) into a
/// single space and trim both ends.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_whitespace("  Hello \n\n world\t"), "Hello world");
/// ```
pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Keep at most `max_chars` characters of `s`.
///
/// Counts `char`s rather than bytes so multi-byte text is cut on a valid
/// boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the dropped characters appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let total = s.chars().count();
    if total <= max {
        s.to_string()
    } else {
        format!("{}…(+{} chars)", truncate_chars(s, max), total - max)
    }
}
