//! Manual entry management: `spark entries list|add|show|delete`.
//!
//! Entries created here bypass reconciliation. They are written one at a
//! time and are never removed by a connector sync unless they belong to the
//! synced source.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::SparkError;
use crate::models::{Entry, EntryFilter};
use crate::store::Store;
use crate::timeparse;

/// Source manual entries go to unless another one is named.
pub const MANUAL_SOURCE: &str = "manual";

/// Arguments of `entries add`.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub source: String,
    /// `None` means today, at local midnight.
    pub date: Option<String>,
    pub importance: String,
    pub summary: String,
    pub metadata: Vec<(String, String)>,
}

/// Validate `new` and store it. Returns the new row id.
pub async fn add_entry(store: &dyn Store, tz: &Tz, new: NewEntry) -> Result<i64> {
    let date = timeparse::parse_date(new.date.as_deref().unwrap_or_default(), tz)?;

    let mut entry = Entry::new(date, new.summary);
    entry.set_importance(&new.importance)?;
    for (key, value) in new.metadata {
        entry.set_metadata_if_not_empty(&key, value);
    }

    let source = match store.find_source_by_name(&new.source).await? {
        Some(source) => source,
        None if new.source == MANUAL_SOURCE => {
            store
                .create_source(MANUAL_SOURCE, "Manually added entries")
                .await?
        }
        None => return Err(SparkError::SourceNotFound(new.source).into()),
    };

    entry.source_id = Some(source.id);
    entry.generate_remote_id();
    let id = store.create_entry(&entry).await?;
    tracing::info!(id, source = %source.name, "entry created");
    Ok(id)
}

pub async fn run_add(store: &dyn Store, tz: &Tz, new: NewEntry) -> Result<()> {
    let id = add_entry(store, tz, new).await?;
    println!("Created entry {}", id);
    Ok(())
}

pub async fn run_list(store: &dyn Store, filter: &EntryFilter, now: DateTime<Utc>) -> Result<()> {
    let entries = store.list_entries(filter, now).await?;
    print!("{}", format_table(&entries));
    Ok(())
}

/// Render entries as the fixed-width table printed by `entries list`.
pub fn format_table(entries: &[Entry]) -> String {
    let mut out = format!(
        "{:<6} {:<16} {:<16} {:<10} {}\n",
        "ID", "DATE", "SOURCE", "IMPORTANCE", "SUMMARY"
    );
    for entry in entries {
        out.push_str(&format!(
            "{:<6} {:<16} {:<16} {:<10} {}\n",
            entry.id.unwrap_or_default(),
            entry.date_string,
            entry.source_name.as_deref().unwrap_or("-"),
            entry.importance_or_default(),
            entry.summary
        ));
    }
    if entries.is_empty() {
        out.push_str("No entries.\n");
    }
    out
}

pub async fn run_show(store: &dyn Store, id: i64) -> Result<()> {
    let entry = store
        .find_entry(id)
        .await?
        .ok_or(SparkError::EntryNotFound(id))?;
    print!("{}", format_entry(&entry));
    Ok(())
}

pub fn format_entry(entry: &Entry) -> String {
    let mut out = String::new();
    out.push_str(&format!("id:         {}\n", entry.id.unwrap_or_default()));
    out.push_str(&format!(
        "source:     {}\n",
        entry.source_name.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!("date:       {}\n", entry.date_string));
    out.push_str(&format!("importance: {}\n", entry.importance_or_default()));
    out.push_str(&format!("summary:    {}\n", entry.summary));
    out.push_str(&format!(
        "remote id:  {}\n",
        entry.remote_id.as_deref().unwrap_or("-")
    ));
    if !entry.metadata.is_empty() {
        out.push_str("metadata:\n");
        for (key, value) in &entry.metadata {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("  {}: {}\n", key, value));
        }
    }
    out
}

pub async fn run_delete(store: &dyn Store, id: i64) -> Result<()> {
    if !store.delete_entry(id).await? {
        return Err(SparkError::EntryNotFound(id).into());
    }
    println!("Deleted entry {}", id);
    Ok(())
}
