//! RSS 2.0, RSS 1.0 (RDF) and Atom connector.
//!
//! Each item becomes an entry built from its title and publication date
//! only. An item without a parseable date fails the whole feed, as does a
//! feed with no items in the window.

use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::SparkError;
use crate::models::{Entry, Window};

/// The parts of a feed item this connector reads.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    /// `pubDate`, Atom `published` or Dublin Core `dc:date`.
    pub published: Option<String>,
    /// Atom `updated`, used when no publication date is present.
    pub updated: Option<String>,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Published,
    Updated,
}

pub fn parse_feed(xml: &[u8]) -> Result<Vec<FeedItem>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut field: Option<Field> = None;
    // Element depth below the current item; only direct children are read,
    // so an Atom `<source>` block cannot overwrite the entry's own fields.
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if current.is_none() {
                    if matches!(e.local_name().as_ref(), b"item" | b"entry") {
                        current = Some(FeedItem::default());
                        depth = 0;
                    }
                } else {
                    depth += 1;
                    field = match e.local_name().as_ref() {
                        _ if depth > 1 => None,
                        b"title" => Some(Field::Title),
                        b"pubDate" | b"published" | b"date" => Some(Field::Published),
                        b"updated" => Some(Field::Updated),
                        _ => None,
                    };
                }
            }
            Ok(Event::Text(te)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = te.unescape().map_err(|e| anyhow!("Invalid feed text: {}", e))?;
                    append(item, f, &text);
                }
            }
            Ok(Event::CData(cdata)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                    append(item, f, &text);
                }
            }
            Ok(Event::End(_)) => {
                field = None;
                if current.is_some() {
                    if depth == 0 {
                        items.extend(current.take());
                    } else {
                        depth -= 1;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("Failed to parse feed: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

fn append(item: &mut FeedItem, field: Field, text: &str) {
    let slot = match field {
        Field::Title => {
            item.title.push_str(text);
            return;
        }
        Field::Published => &mut item.published,
        Field::Updated => &mut item.updated,
    };
    slot.get_or_insert_with(String::new).push_str(text);
}

/// RFC 2822 (RSS) or RFC 3339 (Atom, Dublin Core).
fn parse_feed_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
}

pub fn entries_from_feed(xml: &[u8], window: &Window) -> Result<Vec<Entry>> {
    let items = parse_feed(xml)?;
    if items.is_empty() {
        return Err(SparkError::EmptyFeed("feed has no items".into()).into());
    }

    let mut entries = Vec::new();
    for item in items {
        let raw = item
            .published
            .as_deref()
            .or(item.updated.as_deref())
            .ok_or_else(|| SparkError::MissingDate(format!("feed item {:?}", item.title)))?;
        let date = parse_feed_date(raw).ok_or_else(|| SparkError::InvalidDate(raw.to_string()))?;

        if window.contains(&date) {
            entries.push(Entry::new(date, item.title.trim()));
        }
    }

    if entries.is_empty() {
        return Err(SparkError::EmptyFeed("no feed items in the requested window".into()).into());
    }
    Ok(entries)
}
