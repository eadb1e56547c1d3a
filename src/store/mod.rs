//! Storage abstraction for Spark.
//!
//! The [`Store`] trait is the small CRUD contract the reconciliation engine,
//! the entry/source commands and the summary pipeline work against. Two
//! backends implement it: [`SqliteStore`](sqlite::SqliteStore) for the real
//! database file and [`InMemoryStore`](memory::InMemoryStore) for tests.
//!
//! Every entry returned by a store has its display date already computed
//! for the store's local zone.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create_source`](Store::create_source) | Register a named source |
//! | [`find_source_by_name`](Store::find_source_by_name) | Resolve a source name |
//! | [`list_sources`](Store::list_sources) | All sources with entry counts |
//! | [`delete_source`](Store::delete_source) | Remove a source and its entries |
//! | [`find_entry_by_fingerprint`](Store::find_entry_by_fingerprint) | `(source, fingerprint)` to id |
//! | [`upsert_entries`](Store::upsert_entries) | Insert or update a batch |
//! | [`replace_source_entries`](Store::replace_source_entries) | Upsert a batch and hard-delete the rest of the source |
//! | [`create_entry`](Store::create_entry) / [`find_entry`](Store::find_entry) / [`delete_entry`](Store::delete_entry) | Single entries |
//! | [`list_entries`](Store::list_entries) | Filtered listing, date ascending |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Entry, EntryFilter, Source};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// A source together with the number of entries it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub source: Source,
    pub entries: i64,
}

/// What a [`Store::replace_source_entries`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Ids of the batch, in batch order.
    pub ids: Vec<i64>,
    /// Entries of the source that were not in the batch and got deleted.
    pub deleted: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_source(&self, name: &str, description: &str) -> Result<Source>;

    async fn find_source_by_name(&self, name: &str) -> Result<Option<Source>>;

    async fn list_sources(&self) -> Result<Vec<SourceSummary>>;

    /// Delete a source and, with it, all of its entries.
    async fn delete_source(&self, source_id: i64) -> Result<()>;

    async fn find_entry_by_fingerprint(&self, source_id: i64, fingerprint: &str)
        -> Result<Option<i64>>;

    /// Insert or update every entry of the batch.
    ///
    /// Entries with an `id` update that row; entries without one are matched
    /// on `(source_id, remote_id)`. Returns the ids in batch order.
    async fn upsert_entries(&self, entries: &[Entry]) -> Result<Vec<i64>>;

    /// Make `entries` the exact entry set of the source, atomically: upsert
    /// the batch, then hard-delete every other entry of the source.
    async fn replace_source_entries(&self, source_id: i64, entries: &[Entry])
        -> Result<ReplaceOutcome>;

    async fn create_entry(&self, entry: &Entry) -> Result<i64>;

    async fn find_entry(&self, id: i64) -> Result<Option<Entry>>;

    /// Returns whether an entry was deleted.
    async fn delete_entry(&self, id: i64) -> Result<bool>;

    /// Entries matching `filter`, relative to `now`, ordered by date.
    async fn list_entries(&self, filter: &EntryFilter, now: DateTime<Utc>) -> Result<Vec<Entry>>;
}

/// Fingerprint an entry must be stored under.
pub(crate) fn remote_id_of(entry: &Entry) -> String {
    entry
        .remote_id
        .clone()
        .unwrap_or_else(|| entry.new_remote_id())
}

/// Whether `entry` falls inside the filter's date bounds.
pub(crate) fn within_bounds(
    entry: &Entry,
    bounds: &(Option<DateTime<Utc>>, Option<DateTime<Utc>>),
) -> bool {
    let (from, to) = bounds;
    from.map_or(true, |from| entry.date >= from) && to.map_or(true, |to| entry.date <= to)
}
