//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the `sources`/`entries` schema
//! created by [`migrate`](crate::migrate). Batch writes run inside a single
//! transaction, so a failed replace leaves the previous entry set intact.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::SparkError;
use crate::models::{Entry, EntryFilter, Importance, Metadata, Source};

use super::{remote_id_of, ReplaceOutcome, SourceSummary, Store};

const ENTRY_COLUMNS: &str = "e.id, e.source_id, e.remote_id, e.date, e.summary, e.importance, \
                             e.metadata_json, s.name AS source_name";

pub struct SqliteStore {
    pool: SqlitePool,
    tz: Tz,
}

impl SqliteStore {
    /// `tz` is the zone display dates of loaded entries are rendered in.
    pub fn new(pool: SqlitePool, tz: Tz) -> Self {
        Self { pool, tz }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_entry(&self, row: &SqliteRow) -> Result<Entry> {
        let date: String = row.try_get("date")?;
        let date = DateTime::parse_from_rfc3339(&date)
            .with_context(|| format!("Corrupt entry date in database: {}", date))?;
        let metadata_json: String = row.try_get("metadata_json")?;
        let metadata: Metadata = serde_json::from_str(&metadata_json)
            .with_context(|| format!("Corrupt entry metadata in database: {}", metadata_json))?;
        let importance: String = row.try_get("importance")?;
        let importance: Importance = importance
            .parse()
            .with_context(|| format!("Corrupt entry importance in database: {}", importance))?;

        let mut entry = Entry::new(date, row.try_get::<String, _>("summary")?);
        entry.id = Some(row.try_get("id")?);
        entry.source_id = Some(row.try_get("source_id")?);
        entry.remote_id = Some(row.try_get("remote_id")?);
        entry.importance = Some(importance);
        entry.metadata = metadata;
        entry.source_name = row.try_get("source_name")?;
        entry.refresh_display(&self.tz);
        Ok(entry)
    }
}

fn source_of(entry: &Entry) -> Result<i64> {
    entry
        .source_id
        .ok_or_else(|| anyhow::anyhow!("entry {:?} has no source", entry.summary))
}

/// Write one entry inside an open transaction and return its row id.
async fn upsert_entry(conn: &mut SqliteConnection, entry: &Entry, now: i64) -> Result<i64> {
    let source_id = source_of(entry)?;
    let remote_id = remote_id_of(entry);
    let date = entry.date.to_rfc3339();
    let date_ts = entry.date.timestamp();
    let importance = entry.importance_or_default().as_str();
    let metadata_json = serde_json::to_string(&entry.metadata)?;

    if let Some(id) = entry.id {
        let updated = sqlx::query(
            r#"
            UPDATE entries SET
                remote_id = ?, date = ?, date_ts = ?, summary = ?,
                importance = ?, metadata_json = ?, updated_at = ?
            WHERE id = ? AND source_id = ?
            "#,
        )
        .bind(&remote_id)
        .bind(&date)
        .bind(date_ts)
        .bind(&entry.summary)
        .bind(importance)
        .bind(&metadata_json)
        .bind(now)
        .bind(id)
        .bind(source_id)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(id);
        }
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO entries (source_id, remote_id, date, date_ts, summary,
                             importance, metadata_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_id, remote_id) DO UPDATE SET
            date = excluded.date,
            date_ts = excluded.date_ts,
            summary = excluded.summary,
            importance = excluded.importance,
            metadata_json = excluded.metadata_json,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(source_id)
    .bind(&remote_id)
    .bind(&date)
    .bind(date_ts)
    .bind(&entry.summary)
    .bind(importance)
    .bind(&metadata_json)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_source(&self, name: &str, description: &str) -> Result<Source> {
        let now = Utc::now().timestamp();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO sources (name, description, created_at, updated_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to create source {:?}", name))?;

        Ok(Source {
            id,
            name: name.to_string(),
            description: description.to_string(),
        })
    }

    async fn find_source_by_name(&self, name: &str) -> Result<Option<Source>> {
        let row = sqlx::query("SELECT id, name, description FROM sources WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            Ok(Source {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
                description: r.try_get("description")?,
            })
        })
        .transpose()
    }

    async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.name, s.description, COUNT(e.id) AS entries
            FROM sources s
            LEFT JOIN entries e ON e.source_id = s.id
            GROUP BY s.id
            ORDER BY s.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(SourceSummary {
                    source: Source {
                        id: r.try_get("id")?,
                        name: r.try_get("name")?,
                        description: r.try_get("description")?,
                    },
                    entries: r.try_get("entries")?,
                })
            })
            .collect()
    }

    async fn delete_source(&self, source_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entries WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(SparkError::SourceNotFound(source_id.to_string()).into());
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_entry_by_fingerprint(
        &self,
        source_id: i64,
        fingerprint: &str,
    ) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM entries WHERE source_id = ? AND remote_id = ?")
            .bind(source_id)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn upsert_entries(&self, entries: &[Entry]) -> Result<Vec<i64>> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(upsert_entry(&mut *tx, entry, now).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn replace_source_entries(
        &self,
        source_id: i64,
        entries: &[Entry],
    ) -> Result<ReplaceOutcome> {
        if let Some(stray) = entries.iter().find(|e| e.source_id != Some(source_id)) {
            anyhow::bail!("entry {:?} does not belong to source {}", stray.summary, source_id);
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(upsert_entry(&mut *tx, entry, now).await?);
        }

        let deleted = sqlx::query(
            "DELETE FROM entries WHERE source_id = ? AND id NOT IN (SELECT value FROM json_each(?))",
        )
        .bind(source_id)
        .bind(serde_json::to_string(&ids)?)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(ReplaceOutcome { ids, deleted })
    }

    async fn create_entry(&self, entry: &Entry) -> Result<i64> {
        let source_id = source_of(entry)?;
        let now = Utc::now().timestamp();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO entries (source_id, remote_id, date, date_ts, summary,
                                 importance, metadata_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(source_id)
        .bind(remote_id_of(entry))
        .bind(entry.date.to_rfc3339())
        .bind(entry.date.timestamp())
        .bind(&entry.summary)
        .bind(entry.importance_or_default().as_str())
        .bind(serde_json::to_string(&entry.metadata)?)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to create entry {:?}", entry.summary))?;

        Ok(id)
    }

    async fn find_entry(&self, id: i64) -> Result<Option<Entry>> {
        let sql = format!(
            "SELECT {} FROM entries e JOIN sources s ON s.id = e.source_id WHERE e.id = ?",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| self.row_to_entry(&r)).transpose()
    }

    async fn delete_entry(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_entries(&self, filter: &EntryFilter, now: DateTime<Utc>) -> Result<Vec<Entry>> {
        let (from, to) = filter.bounds(now);
        let from = from.map(|d| d.timestamp());
        let to = to.map(|d| d.timestamp());

        let sql = format!(
            r#"
            SELECT {}
            FROM entries e
            JOIN sources s ON s.id = e.source_id
            WHERE (? IS NULL OR s.name = ?)
              AND (? IS NULL OR e.date_ts >= ?)
              AND (? IS NULL OR e.date_ts <= ?)
            ORDER BY e.date_ts ASC, e.id ASC
            "#,
            ENTRY_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(&filter.source)
            .bind(&filter.source)
            .bind(from)
            .bind(from)
            .bind(to)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|r| self.row_to_entry(r)).collect()
    }
}
