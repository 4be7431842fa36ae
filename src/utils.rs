//! Small helpers shared by the compiler, projector and facade

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("valid whitespace pattern");
    static ref GUID_MARKER: Regex = Regex::new(r"<GUID=([^>]*)>").expect("valid GUID pattern");
}

/// Separator between the aliases of a group's list name
pub const ALIAS_SEPARATOR: char = ';';

/// Formats a DateTime to epoch timestamp (milliseconds since Unix epoch)
///
/// Example output: 1749891834374
pub fn format_epoch_datetime(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Collapse runs of whitespace into one space and trim both ends
pub fn normalize_spaces(value: &str) -> String {
    WHITESPACE_RUN.replace_all(value.trim(), " ").into_owned()
}

/// Split `Sales;Sales Team` into its aliases
pub fn split_aliases(list_name: &str) -> Vec<String> {
    list_name
        .split(ALIAS_SEPARATOR)
        .map(str::trim)
        .filter(|alias| !alias.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_aliases(aliases: &[String]) -> String {
    aliases.join(&ALIAS_SEPARATOR.to_string())
}

/// The first alias of a list name, which is the group's display name
pub fn group_display_name(list_name: &str) -> String {
    split_aliases(list_name)
        .into_iter()
        .next()
        .unwrap_or_default()
}

/// Extract the id from a `...<GUID=id>...` wrapper, or return the value as is
pub fn extract_guid(value: &str) -> &str {
    GUID_MARKER
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(value)
}

/// Names in the directory compare without regard to case
pub fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Default mail file path for a new person: `mail\jdoe`
pub fn default_mail_file(first_name: &str, last_name: &str) -> String {
    let short: String = format!("{}{}", first_name, last_name)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    format!("mail\\{}", short.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_epoch_datetime() {
        let dt = Utc.with_ymd_and_hms(2025, 6, 14, 10, 3, 54).unwrap();
        assert_eq!(format_epoch_datetime(dt), 1749895434000);
    }

    #[test]
    fn test_normalize_spaces() {
        assert_eq!(normalize_spaces("  John   Doe \t/ Acme  "), "John Doe / Acme");
        assert_eq!(normalize_spaces(""), "");
    }

    #[test]
    fn test_aliases() {
        assert_eq!(
            split_aliases("Sales; Sales Team ;"),
            vec!["Sales".to_string(), "Sales Team".to_string()]
        );
        assert_eq!(group_display_name("Sales;Sales Team"), "Sales");
        assert_eq!(group_display_name(""), "");
    }

    #[test]
    fn test_extract_guid() {
        assert_eq!(extract_guid("John Doe <GUID=ABC123>"), "ABC123");
        assert_eq!(extract_guid("ABC123"), "ABC123");
    }

    #[test]
    fn test_default_mail_file() {
        assert_eq!(default_mail_file("John", "Van Doe"), "mail\\johnvandoe");
    }
}
