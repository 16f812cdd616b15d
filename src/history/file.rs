//! JSON file backend.
//!
//! The whole history is rewritten on each change: serialized to a sibling
//! temp file, then renamed over the original, so a reader never sees a
//! half-written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::Durable;
use crate::error::{Error, Result};
use crate::model::HistoryEntry;

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    entries: Vec<HistoryEntry>,
    last_updated: Option<DateTime<Utc>>,
}

pub struct JsonFileBackend {
    path: PathBuf,
    rows: Mutex<BTreeMap<Uuid, HistoryEntry>>,
}

impl JsonFileBackend {
    /// Open the file at `path`, creating parent directories as needed.
    /// A missing file is an empty history; an unreadable one is an error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let rows = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let file: HistoryFile = serde_json::from_str(&content).map_err(|e| {
                    Error::Persistence(format!("corrupt history file {}: {e}", path.display()))
                })?;
                file.entries.into_iter().map(|e| (e.id, e)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), entries = rows.len(), "history file opened");
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Durable for JsonFileBackend {
    async fn write(&self, entry: &HistoryEntry) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let previous = rows.insert(entry.id, entry.clone());

        let mut entries: Vec<_> = rows.values().cloned().collect();
        entries.sort_by_key(|e| e.created_at);
        let file = HistoryFile {
            entries,
            last_updated: Some(Utc::now()),
        };

        let tmp = self.temp_path();
        let result = async {
            let json = serde_json::to_vec_pretty(&file)?;
            tokio::fs::write(&tmp, json).await?;
            tokio::fs::rename(&tmp, &self.path).await?;
            Ok::<_, Error>(())
        }
        .await;

        if let Err(e) = result {
            // Keep the in-memory view in step with what is on disk.
            match previous {
                Some(old) => rows.insert(old.id, old),
                None => rows.remove(&entry.id),
            };
            return Err(Error::Persistence(format!(
                "write {}: {e}",
                self.path.display()
            )));
        }

        debug!(id = %entry.id, pending = entry.pending, "history entry written");
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.rows.lock().await.values().cloned().collect())
    }
}
