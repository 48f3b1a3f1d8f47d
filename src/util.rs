use std::env;

use crate::error::{BotError, BotResult};

pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_u64(name: &str) -> BotResult<Option<u64>> {
    match env_optional(name) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| BotError::Config(format!("Invalid {name}"))),
        None => Ok(None),
    }
}

pub(crate) fn env_usize(name: &str) -> BotResult<Option<usize>> {
    match env_optional(name) {
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| BotError::Config(format!("Invalid {name}"))),
        None => Ok(None),
    }
}

pub(crate) fn env_bool(name: &str) -> Option<bool> {
    env_optional(name).map(|value| parse_bool(&value))
}

pub(crate) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    matches!(v.as_str(), "1" | "true" | "yes" | "y" | "on")
}

/// Collapses newlines and whitespace runs into single spaces and trims.
pub(crate) fn flatten_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Zero-based column index to its A1 letter form: 0 -> A, 25 -> Z, 26 -> AA.
pub(crate) fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Table name in A1 form. Always quoted so names with spaces or
/// punctuation survive; embedded quotes are doubled.
pub(crate) fn quote_table_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

pub(crate) fn a1_range(table: &str, span: &str) -> String {
    format!("{}!{span}", quote_table_name(table))
}

/// Truncates to at most `max_chars` characters without splitting a character.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_text_collapses_whitespace() {
        assert_eq!(flatten_text("  a\nb \t\t c  "), "a b c");
        assert_eq!(flatten_text(""), "");
        assert_eq!(flatten_text("\n\n"), "");
    }

    #[test]
    fn column_letter_covers_single_and_double_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(2), "C");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
    }

    #[test]
    fn a1_range_quotes_table_names() {
        assert_eq!(a1_range("Jobs", "A1:Z"), "'Jobs'!A1:Z");
        assert_eq!(a1_range("July Report", "C3"), "'July Report'!C3");
        assert_eq!(a1_range("Bob's", "A1:Z2"), "'Bob''s'!A1:Z2");
    }

    #[test]
    fn truncate_chars_respects_multibyte() {
        assert_eq!(truncate_chars("ชื่องาน", 3), "ชื่");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("YES"));
        assert!(parse_bool(" on "));
        assert!(!parse_bool("off"));
        assert!(!parse_bool(""));
    }
}
