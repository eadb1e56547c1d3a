//! In-memory [`Store`] implementation for tests.
//!
//! Everything lives in one `RwLock`ed struct, so each operation is atomic
//! with respect to the others.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::SparkError;
use crate::models::{Entry, EntryFilter, Source};

use super::{remote_id_of, within_bounds, ReplaceOutcome, SourceSummary, Store};

#[derive(Default)]
struct Inner {
    sources: Vec<Source>,
    entries: BTreeMap<i64, Entry>,
    last_source_id: i64,
    last_entry_id: i64,
}

impl Inner {
    fn source_name(&self, source_id: Option<i64>) -> Option<String> {
        let id = source_id?;
        self.sources.iter().find(|s| s.id == id).map(|s| s.name.clone())
    }

    fn upsert(&mut self, entry: &Entry) -> Result<i64> {
        let source_id = entry
            .source_id
            .ok_or_else(|| anyhow!("entry {:?} has no source", entry.summary))?;
        let remote_id = remote_id_of(entry);

        let existing = entry.id.filter(|id| self.entries.contains_key(id)).or_else(|| {
            self.entries
                .values()
                .find(|e| e.source_id == Some(source_id) && e.remote_id.as_deref() == Some(&remote_id))
                .and_then(|e| e.id)
        });

        let id = match existing {
            Some(id) => id,
            None => {
                self.last_entry_id += 1;
                self.last_entry_id
            }
        };

        let mut stored = entry.clone();
        stored.id = Some(id);
        stored.remote_id = Some(remote_id);
        stored.importance = Some(entry.importance_or_default());
        stored.source_name = None;
        self.entries.insert(id, stored);
        Ok(id)
    }
}

pub struct InMemoryStore {
    inner: RwLock<Inner>,
    tz: Tz,
}

impl InMemoryStore {
    pub fn new(tz: Tz) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            tz,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn load(&self, inner: &Inner, entry: &Entry) -> Entry {
        let mut loaded = entry.clone();
        loaded.source_name = inner.source_name(entry.source_id);
        loaded.refresh_display(&self.tz);
        loaded
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_source(&self, name: &str, description: &str) -> Result<Source> {
        let mut inner = self.write()?;
        if inner.sources.iter().any(|s| s.name == name) {
            bail!("source already exists: {}", name);
        }
        inner.last_source_id += 1;
        let source = Source {
            id: inner.last_source_id,
            name: name.to_string(),
            description: description.to_string(),
        };
        inner.sources.push(source.clone());
        Ok(source)
    }

    async fn find_source_by_name(&self, name: &str) -> Result<Option<Source>> {
        Ok(self.read()?.sources.iter().find(|s| s.name == name).cloned())
    }

    async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        let inner = self.read()?;
        let mut sources: Vec<SourceSummary> = inner
            .sources
            .iter()
            .map(|s| SourceSummary {
                source: s.clone(),
                entries: inner
                    .entries
                    .values()
                    .filter(|e| e.source_id == Some(s.id))
                    .count() as i64,
            })
            .collect();
        sources.sort_by(|a, b| a.source.name.cmp(&b.source.name));
        Ok(sources)
    }

    async fn delete_source(&self, source_id: i64) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.sources.iter().any(|s| s.id == source_id) {
            return Err(SparkError::SourceNotFound(source_id.to_string()).into());
        }
        inner.entries.retain(|_, e| e.source_id != Some(source_id));
        inner.sources.retain(|s| s.id != source_id);
        Ok(())
    }

    async fn find_entry_by_fingerprint(
        &self,
        source_id: i64,
        fingerprint: &str,
    ) -> Result<Option<i64>> {
        Ok(self
            .read()?
            .entries
            .values()
            .find(|e| e.source_id == Some(source_id) && e.remote_id.as_deref() == Some(fingerprint))
            .and_then(|e| e.id))
    }

    async fn upsert_entries(&self, entries: &[Entry]) -> Result<Vec<i64>> {
        let mut inner = self.write()?;
        entries.iter().map(|e| inner.upsert(e)).collect()
    }

    async fn replace_source_entries(
        &self,
        source_id: i64,
        entries: &[Entry],
    ) -> Result<ReplaceOutcome> {
        let mut inner = self.write()?;
        if !inner.sources.iter().any(|s| s.id == source_id) {
            return Err(SparkError::SourceNotFound(source_id.to_string()).into());
        }

        // Validate the whole batch before touching anything.
        if let Some(stray) = entries.iter().find(|e| e.source_id != Some(source_id)) {
            bail!("entry {:?} does not belong to source {}", stray.summary, source_id);
        }

        let ids = entries
            .iter()
            .map(|e| inner.upsert(e))
            .collect::<Result<Vec<_>>>()?;

        let before = inner.entries.len();
        inner
            .entries
            .retain(|id, e| e.source_id != Some(source_id) || ids.contains(id));
        let deleted = (before - inner.entries.len()) as u64;

        Ok(ReplaceOutcome { ids, deleted })
    }

    async fn create_entry(&self, entry: &Entry) -> Result<i64> {
        let mut inner = self.write()?;
        let mut entry = entry.clone();
        entry.id = None;
        let remote_id = remote_id_of(&entry);
        let source_id = entry.source_id.unwrap_or_default();
        if inner
            .entries
            .values()
            .any(|e| e.source_id == Some(source_id) && e.remote_id.as_deref() == Some(&remote_id))
        {
            bail!("entry already exists: {}", entry.summary);
        }
        inner.upsert(&entry)
    }

    async fn find_entry(&self, id: i64) -> Result<Option<Entry>> {
        let inner = self.read()?;
        Ok(inner.entries.get(&id).map(|e| self.load(&inner, e)))
    }

    async fn delete_entry(&self, id: i64) -> Result<bool> {
        Ok(self.write()?.entries.remove(&id).is_some())
    }

    async fn list_entries(&self, filter: &EntryFilter, now: DateTime<Utc>) -> Result<Vec<Entry>> {
        let inner = self.read()?;
        let bounds = filter.bounds(now);

        let source_id = match &filter.source {
            Some(name) => match inner.sources.iter().find(|s| &s.name == name) {
                Some(s) => Some(s.id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let mut entries: Vec<Entry> = inner
            .entries
            .values()
            .filter(|e| source_id.map_or(true, |id| e.source_id == Some(id)))
            .filter(|e| within_bounds(e, &bounds))
            .map(|e| self.load(&inner, e))
            .collect();
        entries.sort_by_key(|e| (e.date.timestamp(), e.id));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(source_id: i64, hour: u32, summary: &str) -> Entry {
        let mut e = Entry::new(
            Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap().fixed_offset(),
            summary,
        );
        e.source_id = Some(source_id);
        e
    }

    #[tokio::test]
    async fn test_replace_keeps_ids_and_deletes_missing() {
        let store = InMemoryStore::default();
        let source = store.create_source("cal", "").await.unwrap();

        let first = store
            .replace_source_entries(source.id, &[entry(source.id, 9, "A"), entry(source.id, 10, "B")])
            .await
            .unwrap();
        assert_eq!(first.ids.len(), 2);
        assert_eq!(first.deleted, 0);

        let second = store
            .replace_source_entries(source.id, &[entry(source.id, 10, "B")])
            .await
            .unwrap();
        assert_eq!(second.ids, vec![first.ids[1]]);
        assert_eq!(second.deleted, 1);
        assert!(store.find_entry(first.ids[0]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_loaded_entries_have_display_fields() {
        let store = InMemoryStore::default();
        let source = store.create_source("manual", "").await.unwrap();
        let id = store.create_entry(&entry(source.id, 9, "Dentist")).await.unwrap();

        let loaded = store.find_entry(id).await.unwrap().unwrap();
        assert_eq!(loaded.source_name.as_deref(), Some("manual"));
        assert_eq!(loaded.date_string, "2024-06-01 09:00");
        assert_eq!(loaded.importance, Some(crate::models::Importance::Medium));
    }

    #[tokio::test]
    async fn test_duplicate_source_rejected() {
        let store = InMemoryStore::default();
        store.create_source("cal", "").await.unwrap();
        assert!(store.create_source("cal", "again").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_unknown_source_fails() {
        let store = InMemoryStore::default();
        let source = store.create_source("cal", "").await.unwrap();
        store.create_entry(&entry(source.id, 9, "Dentist")).await.unwrap();

        let err = store.delete_source(source.id + 1).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SparkError>(),
            Some(SparkError::SourceNotFound(_))
        ));
        assert_eq!(store.list_sources().await.unwrap().len(), 1);

        store.delete_source(source.id).await.unwrap();
        assert!(store.delete_source(source.id).await.is_err());
    }
}
