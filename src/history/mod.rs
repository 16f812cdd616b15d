//! Append-only submission history with a pending/resolved flag.
//!
//! The store keeps every entry in memory for queries and writes each change
//! through to a [`Durable`] backend before returning. Backends: a JSON file
//! ([`file::JsonFileBackend`]) and Postgres ([`crate::db::Db`]).

pub mod file;
pub mod report;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::model::{ActorId, HistoryEntry};

/// Backing store for history entries, keyed by entry id.
#[async_trait]
pub trait Durable: Send + Sync {
    /// Insert or replace one entry. Must not leave a partial write behind.
    async fn write(&self, entry: &HistoryEntry) -> Result<()>;

    async fn read_all(&self) -> Result<Vec<HistoryEntry>>;

    /// Entries whose `date` lies in `from..=to`.
    async fn read_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| e.date >= from && e.date <= to)
            .collect())
    }
}

/// Filter for [`HistoryStore::query`]. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub submitter: Option<ActorId>,
    pub pending: Option<bool>,
}

impl HistoryFilter {
    /// Every entry, pending or not.
    pub fn all() -> Self {
        Self::default()
    }

    /// Resolved entries only; what reports show.
    pub fn resolved() -> Self {
        Self {
            pending: Some(false),
            ..Self::default()
        }
    }

    pub fn pending_only() -> Self {
        Self {
            pending: Some(true),
            ..Self::default()
        }
    }

    fn matches(&self, entry: &HistoryEntry) -> bool {
        self.pending.is_none_or(|p| entry.pending == p)
            && self.from.is_none_or(|d| entry.date >= d)
            && self.to.is_none_or(|d| entry.date <= d)
            && self.submitter.is_none_or(|s| entry.submitter == s)
    }
}

pub struct HistoryStore {
    backend: Arc<dyn Durable>,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl HistoryStore {
    /// Load everything the backend holds.
    pub async fn open(backend: Arc<dyn Durable>) -> Result<Self> {
        let entries = backend.read_all().await?;
        Ok(Self::with_entries(backend, entries))
    }

    /// Load only entries dated `from..=to`, for reporting.
    pub async fn open_range(
        backend: Arc<dyn Durable>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Self> {
        let entries = backend.read_range(from, to).await?;
        Ok(Self::with_entries(backend, entries))
    }

    fn with_entries(backend: Arc<dyn Durable>, mut entries: Vec<HistoryEntry>) -> Self {
        entries.sort_by_key(|e| e.created_at);
        debug!(entries = entries.len(), "history loaded");
        Self {
            backend,
            entries: Mutex::new(entries),
        }
    }

    /// Add a pending entry and persist it.
    ///
    /// The entry stays in memory even when the write fails; the error is
    /// returned for the caller to log.
    pub async fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.push(entry.clone());
        self.backend.write(&entry).await
    }

    /// Flip the submitter's most recent pending entry to resolved.
    ///
    /// Returns `Ok(false)` when nothing was pending, so repeated calls are
    /// harmless.
    pub async fn resolve_latest_pending(&self, submitter: ActorId) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries
            .iter_mut()
            .rev()
            .find(|e| e.submitter == submitter && e.pending)
        else {
            return Ok(false);
        };
        entry.pending = false;
        let entry = entry.clone();
        self.backend.write(&entry).await?;
        Ok(true)
    }

    /// Matching entries, oldest first.
    pub async fn query(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    /// Backend that keeps writes in memory and can be told to fail.
    #[derive(Default)]
    struct MemoryBackend {
        rows: Mutex<Vec<HistoryEntry>>,
        fail: bool,
    }

    #[async_trait]
    impl Durable for MemoryBackend {
        async fn write(&self, entry: &HistoryEntry) -> Result<()> {
            if self.fail {
                return Err(crate::error::Error::Persistence("disk full".to_string()));
            }
            let mut rows = self.rows.lock().await;
            rows.retain(|e| e.id != entry.id);
            rows.push(entry.clone());
            Ok(())
        }

        async fn read_all(&self) -> Result<Vec<HistoryEntry>> {
            Ok(self.rows.lock().await.clone())
        }
    }

    fn entry(submitter: i64, payload: &str) -> HistoryEntry {
        let now = Utc::now();
        HistoryEntry {
            id: Uuid::new_v4(),
            submitter: ActorId(submitter),
            submitter_handle: None,
            payload: payload.to_string(),
            date: now.date_naive(),
            created_at: now,
            pending: true,
        }
    }

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let backend = Arc::new(MemoryBackend::default());
        let store = HistoryStore::open(backend.clone()).await.unwrap();
        store.append(entry(1, "79991234567")).await.unwrap();

        assert!(store.resolve_latest_pending(ActorId(1)).await.unwrap());
        assert!(!store.resolve_latest_pending(ActorId(1)).await.unwrap());

        let rows = backend.read_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].pending);
    }

    #[tokio::test]
    async fn resolve_flips_only_the_latest_pending() {
        let backend = Arc::new(MemoryBackend::default());
        let store = HistoryStore::open(backend).await.unwrap();
        store.append(entry(1, "79990000001")).await.unwrap();
        store.append(entry(1, "79990000002")).await.unwrap();

        store.resolve_latest_pending(ActorId(1)).await.unwrap();

        let still_pending = store.query(&HistoryFilter::pending_only()).await;
        assert_eq!(still_pending.len(), 1);
        assert_eq!(still_pending[0].payload, "79990000001");
        assert_eq!(store.query(&HistoryFilter::all()).await.len(), 2);
    }

    #[tokio::test]
    async fn failed_write_keeps_entry_in_memory() {
        let backend = Arc::new(MemoryBackend {
            fail: true,
            ..MemoryBackend::default()
        });
        let store = HistoryStore::open(backend).await.unwrap();
        assert!(store.append(entry(1, "79991234567")).await.is_err());
        assert_eq!(store.query(&HistoryFilter::pending_only()).await.len(), 1);
    }

    #[tokio::test]
    async fn resolved_filter_excludes_pending() {
        let backend = Arc::new(MemoryBackend::default());
        let store = HistoryStore::open(backend).await.unwrap();
        store.append(entry(1, "79990000001")).await.unwrap();
        store.append(entry(2, "79990000002")).await.unwrap();
        store.resolve_latest_pending(ActorId(2)).await.unwrap();

        let resolved = store.query(&HistoryFilter::resolved()).await;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].submitter, ActorId(2));

        let filter = HistoryFilter {
            submitter: Some(ActorId(1)),
            ..HistoryFilter::all()
        };
        assert_eq!(store.query(&filter).await.len(), 1);

        let pending = store.query(&HistoryFilter::pending_only()).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].submitter, ActorId(1));
    }
}
