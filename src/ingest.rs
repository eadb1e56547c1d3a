//! Ingestion pipeline orchestration.
//!
//! Coordinates the full sync flow: connector → batch dedup → fingerprint
//! lookup → replace of the source's entry set. The per-source entry set is
//! a snapshot of the upstream feed: entries still present keep their row
//! id, new ones are inserted and vanished ones are hard-deleted.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::connector_ical;
use crate::connector_rss;
use crate::connector_vcard;
use crate::connector_weather::{self, ForecastRange};
use crate::error::SparkError;
use crate::fetch;
use crate::geocoder::Geocoder;
use crate::models::{dedupe_entries, Entry, Metadata, Source, Window};
use crate::store::Store;
use crate::timeparse;

/// What one reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries produced by the connector.
    pub fetched: usize,
    /// Entries left after dropping batch duplicates.
    pub unique: usize,
    /// Entries that matched an existing row and kept its id.
    pub matched: usize,
    /// Rows of the source removed because they left the feed.
    pub deleted: u64,
}

/// Make `entries` the stored entry set of `source`.
pub async fn reconcile(
    store: &dyn Store,
    source: &Source,
    entries: Vec<Entry>,
) -> Result<ReconcileReport> {
    let fetched = entries.len();
    let mut batch = dedupe_entries(entries);
    let mut matched = 0;

    for entry in &mut batch {
        let fingerprint = entry.generate_remote_id().to_string();
        match store.find_entry_by_fingerprint(source.id, &fingerprint).await {
            Ok(Some(id)) => {
                entry.id = Some(id);
                matched += 1;
            }
            Ok(None) => entry.id = None,
            Err(e) => {
                tracing::warn!(
                    source = %source.name,
                    summary = %entry.summary,
                    error = %e,
                    "fingerprint lookup failed, treating entry as new"
                );
                entry.id = None;
            }
        }
        entry.source_id = Some(source.id);
    }

    let outcome = store.replace_source_entries(source.id, &batch).await?;
    tracing::info!(
        source = %source.name,
        entries = batch.len(),
        deleted = outcome.deleted,
        "replaced source entries"
    );

    Ok(ReconcileReport {
        fetched,
        unique: batch.len(),
        matched,
        deleted: outcome.deleted,
    })
}

/// A connector invocation, with its connector-specific arguments.
#[derive(Debug, Clone)]
pub enum SyncRequest {
    Ical {
        uri: String,
        collection: String,
        days_back: u32,
        days_ahead: u32,
    },
    Rss {
        uri: String,
        days_back: u32,
        days_ahead: u32,
    },
    Weather {
        location: String,
        days_back: u32,
        days_ahead: u32,
    },
    Vcard {
        uri: String,
    },
    /// A JSON file of [`EntryRecord`]s.
    Json {
        uri: String,
    },
}

impl SyncRequest {
    pub fn connector(&self) -> &'static str {
        match self {
            SyncRequest::Ical { .. } => "ical",
            SyncRequest::Rss { .. } => "rss",
            SyncRequest::Weather { .. } => "weather",
            SyncRequest::Vcard { .. } => "vcard",
            SyncRequest::Json { .. } => "json",
        }
    }
}

/// Collaborators a sync needs.
pub struct SyncContext<'a> {
    pub store: &'a dyn Store,
    pub client: &'a reqwest::Client,
    pub geocoder: &'a dyn Geocoder,
    pub tz: Tz,
    pub forecast_url: String,
}

/// Run the connector and return its entries, without touching the store.
pub async fn fetch_entries(
    ctx: &SyncContext<'_>,
    request: &SyncRequest,
    now: DateTime<Utc>,
) -> Result<Vec<Entry>> {
    match request {
        SyncRequest::Ical {
            uri,
            collection,
            days_back,
            days_ahead,
        } => {
            let content = fetch::fetch_string(ctx.client, uri).await?;
            let window = Window::around(now, *days_back, *days_ahead);
            connector_ical::entries_from_ical(&content, &window, collection, &ctx.tz)
        }
        SyncRequest::Rss {
            uri,
            days_back,
            days_ahead,
        } => {
            let body = fetch::fetch_bytes(ctx.client, uri).await?;
            let window = Window::around(now, *days_back, *days_ahead);
            connector_rss::entries_from_feed(&body, &window)
        }
        SyncRequest::Weather {
            location,
            days_back,
            days_ahead,
        } => {
            let range = ForecastRange {
                past_days: *days_back,
                forecast_days: *days_ahead,
            };
            connector_weather::fetch_forecast_entries(
                ctx.client,
                ctx.geocoder,
                &ctx.forecast_url,
                location,
                &ctx.tz,
                range,
            )
            .await
        }
        SyncRequest::Vcard { uri } => {
            let content = fetch::fetch_string(ctx.client, uri).await?;
            let today = now.with_timezone(&ctx.tz).date_naive();
            connector_vcard::entries_from_vcards(&content, today)
        }
        SyncRequest::Json { uri } => {
            let content = fetch::fetch_string(ctx.client, uri).await?;
            entries_from_json(&content, &ctx.tz)
        }
    }
}

/// Fetch, reconcile and report a sync of `source_name`.
pub async fn run_sync(
    ctx: &SyncContext<'_>,
    source_name: &str,
    request: &SyncRequest,
) -> Result<ReconcileReport> {
    // Resolve the source before any network traffic.
    let source = ctx
        .store
        .find_source_by_name(source_name)
        .await?
        .ok_or_else(|| SparkError::SourceNotFound(source_name.to_string()))?;

    let entries = fetch_entries(ctx, request, Utc::now()).await?;
    let report = reconcile(ctx.store, &source, entries).await?;

    println!("sync {}", request.connector());
    println!("  source: {}", source.name);
    println!("  fetched: {} entries", report.fetched);
    println!("  unique: {}", report.unique);
    println!("  kept existing: {}", report.matched);
    println!("  deleted: {}", report.deleted);
    println!("ok");

    Ok(report)
}

/// One entry as written in an entries JSON file.
///
/// Keys are `Date`, `Summary`, `Importance` and `Metadata` (lowercase
/// spellings are accepted too). `Date` may be RFC 3339, `YYYY-MM-DD HH:MM`
/// or `YYYY-MM-DD`; an empty or missing date means today.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntryRecord {
    #[serde(default, alias = "date")]
    pub date: Option<String>,
    #[serde(alias = "summary")]
    pub summary: String,
    #[serde(default, alias = "importance")]
    pub importance: Option<String>,
    #[serde(default, alias = "metadata")]
    pub metadata: Metadata,
}

impl EntryRecord {
    pub fn into_entry(self, tz: &Tz) -> Result<Entry> {
        let date = timeparse::parse_date(self.date.as_deref().unwrap_or_default(), tz)?;

        let mut entry = Entry::new(date, self.summary);
        if let Some(importance) = self.importance.filter(|i| !i.is_empty()) {
            entry.set_importance(&importance)?;
        }
        entry.metadata = self.metadata;
        Ok(entry)
    }
}

pub fn entries_from_json(content: &str, tz: &Tz) -> Result<Vec<Entry>> {
    let records: Vec<EntryRecord> =
        serde_json::from_str(content).map_err(|e| anyhow::anyhow!("Invalid entries JSON: {}", e))?;
    if records.is_empty() {
        return Err(SparkError::EmptyFeed("entries file has no entries".into()).into());
    }
    records.into_iter().map(|r| r.into_entry(tz)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Importance;
    use crate::store::{InMemoryStore, ReplaceOutcome, SourceSummary};
    use crate::models::EntryFilter;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    fn feed(day_offsets: &[(i64, &str)]) -> Vec<Entry> {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        day_offsets
            .iter()
            .map(|(d, s)| Entry::new((base + Duration::days(*d)).fixed_offset(), *s))
            .collect()
    }

    async fn all_ids(store: &dyn Store, source: &str) -> Vec<(i64, String)> {
        let filter = EntryFilter {
            source: Some(source.to_string()),
            ..Default::default()
        };
        store
            .list_entries(&filter, Utc::now())
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.id.unwrap(), e.summary))
            .collect()
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = InMemoryStore::default();
        let source = store.create_source("cal", "").await.unwrap();
        let upstream = [(0, "A"), (1, "B"), (2, "C")];

        let first = reconcile(&store, &source, feed(&upstream)).await.unwrap();
        assert_eq!(first.matched, 0);
        let before = all_ids(&store, "cal").await;

        let second = reconcile(&store, &source, feed(&upstream)).await.unwrap();
        assert_eq!(second.matched, 3);
        assert_eq!(second.deleted, 0);
        assert_eq!(all_ids(&store, "cal").await, before);
    }

    #[tokio::test]
    async fn test_reconcile_converges_per_source() {
        let store = InMemoryStore::default();
        let cal = store.create_source("cal", "").await.unwrap();
        let other = store.create_source("other", "").await.unwrap();

        reconcile(&store, &cal, feed(&[(0, "A"), (1, "B")])).await.unwrap();
        reconcile(&store, &other, feed(&[(0, "A"), (1, "B")])).await.unwrap();
        let other_before = all_ids(&store, "other").await;

        let report = reconcile(&store, &cal, feed(&[(1, "B"), (3, "D")])).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.matched, 1);

        let summaries: Vec<String> = all_ids(&store, "cal").await.into_iter().map(|(_, s)| s).collect();
        assert_eq!(summaries, vec!["B", "D"]);
        assert_eq!(all_ids(&store, "other").await, other_before);
    }

    #[tokio::test]
    async fn test_reconcile_updates_metadata_in_place() {
        let store = InMemoryStore::default();
        let cal = store.create_source("cal", "").await.unwrap();

        reconcile(&store, &cal, feed(&[(0, "A")])).await.unwrap();
        let id = all_ids(&store, "cal").await[0].0;

        let mut changed = feed(&[(0, "A")]);
        changed[0].set_metadata("Location", "Room 2");
        reconcile(&store, &cal, changed).await.unwrap();

        let stored = store.find_entry(id).await.unwrap().unwrap();
        assert_eq!(stored.metadata["Location"], "Room 2");
    }

    #[tokio::test]
    async fn test_reconcile_drops_batch_duplicates() {
        let store = InMemoryStore::default();
        let cal = store.create_source("cal", "").await.unwrap();

        let report = reconcile(&store, &cal, feed(&[(0, "A"), (0, "A"), (1, "B")]))
            .await
            .unwrap();
        assert_eq!(report.fetched, 3);
        assert_eq!(report.unique, 2);
    }

    /// Delegates to an in-memory store but fails every fingerprint lookup.
    struct FailingLookup(InMemoryStore);

    #[async_trait]
    impl Store for FailingLookup {
        async fn create_source(&self, name: &str, description: &str) -> Result<Source> {
            self.0.create_source(name, description).await
        }
        async fn find_source_by_name(&self, name: &str) -> Result<Option<Source>> {
            self.0.find_source_by_name(name).await
        }
        async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
            self.0.list_sources().await
        }
        async fn delete_source(&self, source_id: i64) -> Result<()> {
            self.0.delete_source(source_id).await
        }
        async fn find_entry_by_fingerprint(&self, _: i64, _: &str) -> Result<Option<i64>> {
            anyhow::bail!("database is locked")
        }
        async fn upsert_entries(&self, entries: &[Entry]) -> Result<Vec<i64>> {
            self.0.upsert_entries(entries).await
        }
        async fn replace_source_entries(
            &self,
            source_id: i64,
            entries: &[Entry],
        ) -> Result<ReplaceOutcome> {
            self.0.replace_source_entries(source_id, entries).await
        }
        async fn create_entry(&self, entry: &Entry) -> Result<i64> {
            self.0.create_entry(entry).await
        }
        async fn find_entry(&self, id: i64) -> Result<Option<Entry>> {
            self.0.find_entry(id).await
        }
        async fn delete_entry(&self, id: i64) -> Result<bool> {
            self.0.delete_entry(id).await
        }
        async fn list_entries(&self, filter: &EntryFilter, now: DateTime<Utc>) -> Result<Vec<Entry>> {
            self.0.list_entries(filter, now).await
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_is_not_fatal() {
        let store = FailingLookup(InMemoryStore::default());
        let cal = store.create_source("cal", "").await.unwrap();

        reconcile(&store, &cal, feed(&[(0, "A")])).await.unwrap();
        let report = reconcile(&store, &cal, feed(&[(0, "A")])).await.unwrap();
        assert_eq!(report.matched, 0);
        // The store still matches on (source, fingerprint): no duplicate row.
        assert_eq!(all_ids(&store, "cal").await.len(), 1);
    }

    #[test]
    fn test_entries_from_json() {
        let tz: Tz = "Europe/Brussels".parse().unwrap();
        let json = r#"[
            {"Date": "2024-06-01T10:00:00Z", "Summary": "Meeting", "Importance": "high",
             "Metadata": {"Location": "HQ"}},
            {"date": "2024-06-02 14:30", "summary": "Call"},
            {"Date": "2024-06-03", "Summary": "Holiday"}
        ]"#;
        let entries = entries_from_json(json, &tz).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].importance, Some(Importance::High));
        assert_eq!(entries[0].metadata["Location"], "HQ");
        assert_eq!(entries[1].date, Utc.with_ymd_and_hms(2024, 6, 2, 12, 30, 0).unwrap());
        assert_eq!(entries[2].formatted_date(&tz), "2024-06-03");
        assert!(entries[1].importance.is_none());
    }

    #[test]
    fn test_entries_from_json_rejects_empty_list() {
        let err = entries_from_json("[]", &Tz::UTC).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SparkError>(),
            Some(SparkError::EmptyFeed(_))
        ));
    }

    #[test]
    fn test_entries_from_json_rejects_bad_importance() {
        let json = r#"[{"Summary": "Meeting", "Importance": "urgent"}]"#;
        let err = entries_from_json(json, &Tz::UTC).unwrap_err();
        assert_eq!(err.to_string(), "invalid importance: urgent");
    }
}
