//! History entries in Postgres: one row per entry, upserted by id.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::history::Durable;
use crate::model::{ActorId, HistoryEntry};

#[async_trait]
impl Durable for super::Db {
    async fn write(&self, entry: &HistoryEntry) -> Result<()> {
        // Single statement, so a row is either fully written or not at all.
        sqlx::query(
            "INSERT INTO history_entries (id, submitter, submitter_handle, payload, date, created_at, pending)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET pending = EXCLUDED.pending, submitter_handle = EXCLUDED.submitter_handle",
        )
        .bind(entry.id)
        .bind(entry.submitter.0)
        .bind(&entry.submitter_handle)
        .bind(&entry.payload)
        .bind(entry.date)
        .bind(entry.created_at)
        .bind(entry.pending)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Persistence(format!("history upsert {}: {e}", entry.id)))?;
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT id, submitter, submitter_handle, payload, date, created_at, pending
             FROM history_entries ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(HistoryRow::into_entry).collect())
    }

    async fn read_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<HistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT id, submitter, submitter_handle, payload, date, created_at, pending
             FROM history_entries WHERE date BETWEEN $1 AND $2 ORDER BY created_at ASC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(HistoryRow::into_entry).collect())
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    submitter: i64,
    submitter_handle: Option<String>,
    payload: String,
    date: NaiveDate,
    created_at: chrono::DateTime<chrono::Utc>,
    pending: bool,
}

impl HistoryRow {
    fn into_entry(self) -> HistoryEntry {
        HistoryEntry {
            id: self.id,
            submitter: ActorId(self.submitter),
            submitter_handle: self.submitter_handle,
            payload: self.payload,
            date: self.date,
            created_at: self.created_at,
            pending: self.pending,
        }
    }
}
