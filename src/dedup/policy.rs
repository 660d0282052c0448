//! Field-level merge policy for duplicate entries.
//!
//! The resolved entry starts from the newer of the two (by `timestamp`) and
//! then takes from the incoming entry:
//! - list fields: sorted set union
//! - text fields: the incoming value when it is strictly longer
//! - fields the base lacks: copied unchanged

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::entry::{Entry, FieldValue};

/// Parses an entry timestamp.
///
/// Accepts RFC 3339, a naive ISO-8601 date-time (taken as UTC) and a bare
/// `YYYY-MM-DD` date (midnight UTC). Anything else yields `None`, which
/// orders before every parsed timestamp.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

fn entry_timestamp(entry: &Entry) -> Option<DateTime<Utc>> {
    entry.text(Entry::TIMESTAMP).and_then(parse_timestamp)
}

fn union_sorted(base: Option<&FieldValue>, incoming: &[String]) -> FieldValue {
    let mut merged: BTreeSet<String> = match base {
        Some(FieldValue::List(items)) => items.iter().cloned().collect(),
        Some(FieldValue::Text(s)) => std::iter::once(s.clone()).collect(),
        Some(FieldValue::Null) | None => BTreeSet::new(),
    };
    merged.extend(incoming.iter().cloned());
    FieldValue::List(merged.into_iter().collect())
}

fn should_take_text(base: Option<&FieldValue>, incoming: &str) -> bool {
    match base {
        Some(FieldValue::Text(current)) => incoming.chars().count() > current.chars().count(),
        // A structured list is never replaced by a scalar.
        Some(FieldValue::List(_)) => false,
        Some(FieldValue::Null) => !incoming.is_empty(),
        None => true,
    }
}

pub(super) fn resolve(incoming: &Entry, existing: &Entry) -> Entry {
    let mut resolved = if entry_timestamp(incoming) > entry_timestamp(existing) {
        incoming.clone()
    } else {
        existing.clone()
    };

    for (key, value) in incoming {
        match value {
            FieldValue::List(items) => {
                let merged = union_sorted(resolved.get(key), items);
                resolved.insert(key.clone(), merged);
            }
            FieldValue::Text(text) => {
                if should_take_text(resolved.get(key), text) {
                    resolved.insert(key.clone(), value.clone());
                }
            }
            FieldValue::Null => {
                if !resolved.contains_key(key) {
                    resolved.insert(key.clone(), FieldValue::Null);
                }
            }
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2021-01-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2021-01-01T10:00:00+02:00").is_some());
        assert!(parse_timestamp("2021-01-01T10:00:00.123456").is_some());
        assert!(parse_timestamp("2021-01-01").is_some());
        assert!(parse_timestamp("last spring").is_none());
    }

    #[test]
    fn test_naive_and_rfc3339_compare() {
        let a = parse_timestamp("2021-01-01").unwrap();
        let b = parse_timestamp("2021-01-01T00:00:01Z").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_newer_incoming_becomes_base() {
        let old = Entry::new()
            .with("title", "Engineer")
            .with("location", "Berlin")
            .with("timestamp", "2020-01-01");
        let new = Entry::new()
            .with("title", "Eng")
            .with("timestamp", "2021-01-01");
        let resolved = resolve(&new, &old);
        // Base is the newer entry, so the shorter title stays and the
        // base-only field from the older entry is not carried over.
        assert_eq!(resolved.text("title"), Some("Eng"));
        assert_eq!(resolved.text("location"), None);
        assert_eq!(resolved.text("timestamp"), Some("2021-01-01"));
    }

    #[test]
    fn test_older_incoming_only_widens() {
        let existing = Entry::new()
            .with("title", "Eng")
            .with("location", "Berlin")
            .with("timestamp", "2021-01-01");
        let incoming = Entry::new()
            .with("title", "Engineer")
            .with("team", "Platform")
            .with("timestamp", "2020-01-01");
        let resolved = resolve(&incoming, &existing);
        assert_eq!(resolved.text("title"), Some("Engineer"));
        assert_eq!(resolved.text("location"), Some("Berlin"));
        assert_eq!(resolved.text("team"), Some("Platform"));
        assert_eq!(resolved.text("timestamp"), Some("2021-01-01"));
    }

    #[test]
    fn test_longer_timestamp_text_is_overlaid() {
        let existing = Entry::new()
            .with("title", "Engineer")
            .with("timestamp", "2021-06-01");
        let incoming = Entry::new()
            .with("title", "Engineer")
            .with("timestamp", "2020-01-01T08:30:00+02:00");
        let resolved = resolve(&incoming, &existing);
        // The base is the newer entry, but the longer incoming text still wins.
        assert_eq!(resolved.text("timestamp"), Some("2020-01-01T08:30:00+02:00"));
    }

    #[test]
    fn test_missing_timestamps_keep_existing_base() {
        let existing = Entry::new().with("title", "Alpha").with("org", "X");
        let incoming = Entry::new().with("title", "Beta");
        let resolved = resolve(&incoming, &existing);
        assert_eq!(resolved.text("title"), Some("Alpha"));
        assert_eq!(resolved.text("org"), Some("X"));
    }

    #[test]
    fn test_list_union_is_sorted_and_deduplicated() {
        let existing = Entry::new().with("skills", vec!["Python", "Go"]);
        let incoming = Entry::new().with("skills", vec!["Rust", "Go"]);
        let resolved = resolve(&incoming, &existing);
        assert_eq!(
            resolved.list("skills").unwrap(),
            &["Go".to_string(), "Python".to_string(), "Rust".to_string()]
        );
    }

    #[test]
    fn test_list_absorbs_scalar_base() {
        let existing = Entry::new().with("skills", "Python");
        let incoming = Entry::new().with("skills", vec!["Java"]);
        let resolved = resolve(&incoming, &existing);
        assert_eq!(
            resolved.list("skills").unwrap(),
            &["Java".to_string(), "Python".to_string()]
        );
    }

    #[test]
    fn test_null_never_overwrites() {
        let existing = Entry::new().with("description", "Built the thing");
        let incoming = Entry::new()
            .with("description", FieldValue::Null)
            .with("url", FieldValue::Null);
        let resolved = resolve(&incoming, &existing);
        assert_eq!(resolved.text("description"), Some("Built the thing"));
        assert!(resolved.get("url").unwrap().is_null());
    }
}
