//! vCard birthday connector.
//!
//! Every card with a formatted name (`FN`) and a parseable birthday
//! (`BDAY`) becomes a `Birthday <name>` entry on this year's anniversary,
//! at midnight UTC. Cards without either are skipped. `Age` is attached
//! when the birth year is known.

use anyhow::Result;
use chrono::{Datelike, NaiveDate};

use crate::error::SparkError;
use crate::models::Entry;
use crate::timeparse::utc_midnight;

/// One property line of a card, after unfolding.
#[derive(Debug, Clone, PartialEq)]
struct CardProperty {
    name: String,
    params: Vec<(String, String)>,
    value: String,
}

impl CardProperty {
    fn pref(&self) -> u32 {
        self.params
            .iter()
            .find(|(k, _)| k == "PREF")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Default)]
struct Card {
    properties: Vec<CardProperty>,
}

impl Card {
    /// The value of `name` with the lowest `PREF`, or the first one.
    fn preferred_value(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .filter(|p| p.name == name)
            .min_by_key(|p| p.pref())
            .map(|p| p.value.as_str())
            .filter(|v| !v.trim().is_empty())
    }
}

/// Join folded lines: a line starting with a space or tab continues the
/// previous one.
fn unfold(content: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

fn parse_property(line: &str) -> Option<CardProperty> {
    let (head, value) = line.split_once(':')?;
    let mut parts = head.split(';');
    let name = parts.next()?;
    // Strip the optional group prefix (`item1.TEL`).
    let name = name.rsplit('.').next().unwrap_or(name).to_ascii_uppercase();

    let params = parts
        .filter_map(|p| {
            let (k, v) = p.split_once('=')?;
            Some((k.to_ascii_uppercase(), v.trim_matches('"').to_string()))
        })
        .collect();

    Some(CardProperty {
        name,
        params,
        value: unescape(value),
    })
}

fn unescape(value: &str) -> String {
    value
        .replace("\\n", "\n")
        .replace("\\N", "\n")
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\\\", "\\")
}

fn parse_cards(content: &str) -> Vec<Card> {
    let mut cards = Vec::new();
    let mut current: Option<Card> = None;

    for line in unfold(content) {
        let upper = line.to_ascii_uppercase();
        if upper == "BEGIN:VCARD" {
            current = Some(Card::default());
        } else if upper == "END:VCARD" {
            if let Some(card) = current.take() {
                cards.push(card);
            }
        } else if let Some(card) = current.as_mut() {
            if let Some(prop) = parse_property(&line) {
                card.properties.push(prop);
            }
        }
    }
    cards
}

/// Resolve a `BDAY` value to this year's anniversary and the age reached
/// on it (zero when the birth year is unknown).
///
/// Accepts `YYYYMMDD`, `YYYY-MM-DD`, `--MMDD` and `--MM-DD`; a trailing
/// time part is ignored. A 29 February birthday falls on 1 March in
/// non-leap years.
pub fn parse_birthday(value: &str, today: NaiveDate) -> Result<(NaiveDate, i32)> {
    let value = value.trim();
    let value = value.split('T').next().unwrap_or(value);
    if value.is_empty() {
        return Err(SparkError::MissingDate("no birthday".into()).into());
    }

    let year = today.year();
    let normalized = match value.strip_prefix("--") {
        Some(rest) => format!("{}{}", year, rest.replace('-', "")),
        None => value.replace('-', ""),
    };

    let born = NaiveDate::parse_from_str(&normalized, "%Y%m%d")
        .map_err(|_| SparkError::InvalidDate(value.to_string()))?;

    let anniversary = born
        .with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
        .ok_or_else(|| SparkError::InvalidDate(value.to_string()))?;

    Ok((anniversary, year - born.year()))
}

pub fn entries_from_vcards(content: &str, today: NaiveDate) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();

    for card in parse_cards(content) {
        let Some(name) = card.preferred_value("FN") else {
            tracing::debug!("skipping card without a formatted name");
            continue;
        };
        let name = name.trim();

        let Some(bday) = card.preferred_value("BDAY") else {
            tracing::debug!(name, "skipping card without a birthday");
            continue;
        };

        let (date, age) = match parse_birthday(bday, today) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(name, error = %e, "skipping card with invalid birthday");
                continue;
            }
        };

        let mut entry = Entry::new(utc_midnight(date), format!("Birthday {}", name));
        if age > 0 {
            entry.set_metadata("Age", age);
        }
        entries.push(entry);
    }

    if entries.is_empty() {
        return Err(SparkError::EmptyFeed("no birthdays in contacts".into()).into());
    }
    Ok(entries)
}
