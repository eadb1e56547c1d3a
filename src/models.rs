//! Core data models used throughout Spark.
//!
//! These types represent the sources and entries that flow through the
//! ingestion pipeline, the store, and the summary prompts.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::SparkError;
use crate::fingerprint::fingerprint;
use crate::timeparse;

/// Free-form per-entry metadata. Keys vary by connector and are never
/// validated centrally.
pub type Metadata = serde_json::Map<String, Value>;

/// How much an entry matters to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Medium,
    High,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Medium => "medium",
            Importance::High => "high",
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive match against `low`, `medium`, `high`.
impl FromStr for Importance {
    type Err = SparkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Importance::Low),
            "medium" => Ok(Importance::Medium),
            "high" => Ok(Importance::High),
            other => Err(SparkError::InvalidImportance(other.to_string())),
        }
    }
}

/// A named origin of entries (`work-calendar`, `weather-brussels`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// A normalized occurrence of something relevant to the user.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Storage surrogate key; `None` until persisted.
    pub id: Option<i64>,
    /// Content fingerprint, unique per source.
    pub remote_id: Option<String>,
    pub source_id: Option<i64>,
    pub date: DateTime<FixedOffset>,
    pub summary: String,
    /// `None` until set; persisted as [`Importance::Medium`] when unset.
    pub importance: Option<Importance>,
    pub metadata: Metadata,
    /// Owning source name, filled in when loaded from the store.
    pub source_name: Option<String>,
    /// Display form of `date`, recomputed after every load.
    pub date_string: String,
}

impl Entry {
    pub fn new(date: DateTime<FixedOffset>, summary: impl Into<String>) -> Self {
        Self {
            id: None,
            remote_id: None,
            source_id: None,
            date,
            summary: summary.into(),
            importance: None,
            metadata: Metadata::new(),
            source_name: None,
            date_string: String::new(),
        }
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Set a metadata key unless the value is empty.
    ///
    /// Strings are unescaped (backslash escapes) and trimmed first; `null`,
    /// `""` and `0` are skipped.
    pub fn set_metadata_if_not_empty(&mut self, key: &str, value: impl Into<Value>) {
        let value = match value.into() {
            Value::String(s) => {
                let unescaped = unescape(&s).unwrap_or_else(|| s.clone());
                Value::String(unescaped.trim().to_string())
            }
            other => other,
        };

        let empty = match &value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Number(n) => n.as_f64() == Some(0.0),
            _ => false,
        };
        if !empty {
            self.metadata.insert(key.to_string(), value);
        }
    }

    /// Compute the fingerprint for the current date and summary.
    pub fn new_remote_id(&self) -> String {
        fingerprint(&self.date, &self.summary)
    }

    /// Assign the fingerprint unless one is already set.
    pub fn generate_remote_id(&mut self) -> &str {
        if self.remote_id.is_none() {
            self.remote_id = Some(self.new_remote_id());
        }
        self.remote_id.as_deref().unwrap_or_default()
    }

    /// Validate and set the importance; on failure the current value is kept.
    pub fn set_importance(&mut self, value: &str) -> Result<(), SparkError> {
        self.importance = Some(value.parse()?);
        Ok(())
    }

    pub fn importance_or_default(&self) -> Importance {
        self.importance.unwrap_or_default()
    }

    pub fn formatted_date(&self, tz: &Tz) -> String {
        timeparse::format_date(&self.date, tz)
    }

    /// Recompute the display-only fields after a load.
    pub fn refresh_display(&mut self, tz: &Tz) {
        self.date_string = self.formatted_date(tz);
    }
}

/// Resolve a backslash-escaped string the way a quoted string literal would
/// be read. Returns `None` when the input is not a valid literal body.
fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' | '\n' => return None,
            '\\' => {
                let escaped = match chars.next()? {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    'a' => '\u{7}',
                    'b' => '\u{8}',
                    'f' => '\u{c}',
                    'v' => '\u{b}',
                    '\\' => '\\',
                    '"' => '"',
                    'x' => hex_char(&mut chars, 2)?,
                    'u' => hex_char(&mut chars, 4)?,
                    'U' => hex_char(&mut chars, 8)?,
                    _ => return None,
                };
                out.push(escaped);
            }
            other => out.push(other),
        }
    }
    Some(out)
}

fn hex_char(chars: &mut std::str::Chars<'_>, len: usize) -> Option<char> {
    let digits: String = chars.by_ref().take(len).collect();
    if digits.len() != len {
        return None;
    }
    u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
}

/// Drop entries whose fingerprint was already seen in the batch; the first
/// occurrence wins.
pub fn dedupe_entries(entries: Vec<Entry>) -> Vec<Entry> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(entries.len());
    for entry in entries {
        let fingerprint = entry
            .remote_id
            .clone()
            .unwrap_or_else(|| entry.new_remote_id());
        if seen.insert(fingerprint) {
            unique.push(entry);
        } else {
            tracing::debug!(summary = %entry.summary, date = %entry.date, "dropping duplicate entry");
        }
    }
    unique
}

/// The span of time a connector keeps items for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    pub fn around(now: DateTime<Utc>, days_back: u32, days_ahead: u32) -> Self {
        Self {
            from: now - Duration::days(days_back as i64),
            to: now + Duration::days(days_ahead as i64),
        }
    }

    pub fn contains(&self, date: &DateTime<FixedOffset>) -> bool {
        *date >= self.from && *date <= self.to
    }

    /// Whether `[start, end]` intersects the window.
    pub fn overlaps(&self, start: &DateTime<FixedOffset>, end: &DateTime<FixedOffset>) -> bool {
        *start <= self.to && *end >= self.from
    }
}

/// Selection of entries for listing and summaries.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    /// Restrict to one source, by name.
    pub source: Option<String>,
    pub days_back: Option<u32>,
    pub days_ahead: Option<u32>,
}

impl EntryFilter {
    pub fn window(days_back: u32, days_ahead: u32) -> Self {
        Self {
            source: None,
            days_back: Some(days_back),
            days_ahead: Some(days_ahead),
        }
    }

    /// Inclusive bounds relative to `now`; an unset side is unbounded.
    pub fn bounds(&self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (
            self.days_back.map(|d| now - Duration::days(d as i64)),
            self.days_ahead.map(|d| now + Duration::days(d as i64)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry() -> Entry {
        let date = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 9, 30, 0)
            .unwrap();
        Entry::new(date, "Dentist")
    }

    #[test]
    fn test_importance_validation() {
        let mut e = entry();
        let err = e.set_importance("critical").unwrap_err();
        assert!(matches!(err, SparkError::InvalidImportance(ref s) if s == "critical"));
        assert_eq!(err.to_string(), "invalid importance: critical");
        assert!(e.importance.is_none());

        e.set_importance("high").unwrap();
        assert_eq!(e.importance, Some(Importance::High));
    }

    #[test]
    fn test_importance_is_case_sensitive() {
        assert!("High".parse::<Importance>().is_err());
        assert!("".parse::<Importance>().is_err());
        assert_eq!("low".parse::<Importance>().unwrap(), Importance::Low);
    }

    #[test]
    fn test_importance_defaults_to_medium() {
        assert_eq!(entry().importance_or_default(), Importance::Medium);
    }

    #[test]
    fn test_failed_importance_keeps_previous_value() {
        let mut e = entry();
        e.set_importance("low").unwrap();
        assert!(e.set_importance("urgent").is_err());
        assert_eq!(e.importance, Some(Importance::Low));
    }

    #[test]
    fn test_generate_remote_id_is_idempotent() {
        let mut e = entry();
        let first = e.generate_remote_id().to_string();
        e.summary = "Dentist (moved)".to_string();
        let second = e.generate_remote_id().to_string();
        assert_eq!(first, second);
        assert_ne!(second, e.new_remote_id());
    }

    #[test]
    fn test_generate_remote_id_keeps_preassigned_value() {
        let mut e = entry();
        e.remote_id = Some("fixed".to_string());
        assert_eq!(e.generate_remote_id(), "fixed");
    }

    #[test]
    fn test_fingerprint_ignores_metadata() {
        let a = entry();
        let mut b = entry();
        b.set_metadata("Location", "Elsewhere");
        assert_eq!(a.new_remote_id(), b.new_remote_id());
    }

    #[test]
    fn test_set_metadata_overwrites() {
        let mut e = entry();
        e.set_metadata("Key", "old");
        e.set_metadata("Key", "new");
        assert_eq!(e.metadata.len(), 1);
        assert_eq!(e.metadata["Key"], "new");
    }

    #[test]
    fn test_set_metadata_if_not_empty_skips_empty_values() {
        let mut e = entry();
        e.set_metadata_if_not_empty("Blank", "   ");
        e.set_metadata_if_not_empty("Null", Value::Null);
        e.set_metadata_if_not_empty("Zero", 0);
        e.set_metadata_if_not_empty("Location", "  Room 4 ");
        e.set_metadata_if_not_empty("Count", 3);
        assert_eq!(e.metadata.len(), 2);
        assert_eq!(e.metadata["Location"], "Room 4");
        assert_eq!(e.metadata["Count"], 3);
    }

    #[test]
    fn test_set_metadata_if_not_empty_unescapes() {
        let mut e = entry();
        e.set_metadata_if_not_empty("Description", "line one\\nline two");
        assert_eq!(e.metadata["Description"], "line one\nline two");

        // Not a valid literal: kept as-is, only trimmed.
        e.set_metadata_if_not_empty("Comment", " say \"hi\" ");
        assert_eq!(e.metadata["Comment"], "say \"hi\"");
    }

    #[test]
    fn test_formatted_date() {
        let tz: Tz = "Europe/Brussels".parse().unwrap();
        let mut e = entry();
        e.refresh_display(&tz);
        assert_eq!(e.date_string, "2024-06-01 10:30");

        e.date = timeparse::parse_date("2024-06-02", &tz).unwrap();
        assert_eq!(e.formatted_date(&tz), "2024-06-02");
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let mut first = entry();
        first.set_metadata("Location", "Room 1");
        let mut second = entry();
        second.set_metadata("Location", "Room 2");
        let mut other = entry();
        other.summary = "Haircut".to_string();

        let unique = dedupe_entries(vec![first, second, other]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].metadata["Location"], "Room 1");
        assert_eq!(unique[1].summary, "Haircut");
    }

    #[test]
    fn test_window() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let window = Window::around(now, 1, 1);
        let inside = now.fixed_offset();
        let before = (now - Duration::days(2)).fixed_offset();
        let after = (now + Duration::days(2)).fixed_offset();

        assert!(window.contains(&inside));
        assert!(!window.contains(&before));
        assert!(!window.contains(&after));
        assert!(window.overlaps(&before, &inside));
        assert!(window.overlaps(&before, &after));
        assert!(!window.overlaps(&after, &after));
    }

    #[test]
    fn test_filter_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let (from, to) = EntryFilter::window(3, 7).bounds(now);
        assert_eq!(from.unwrap(), Utc.with_ymd_and_hms(2024, 6, 7, 12, 0, 0).unwrap());
        assert_eq!(to.unwrap(), Utc.with_ymd_and_hms(2024, 6, 17, 12, 0, 0).unwrap());
        assert_eq!(EntryFilter::default().bounds(now), (None, None));
    }
}
