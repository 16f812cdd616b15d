//! History persistence through the coordinator, with the JSON file backend.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{A, O1, O2, RecordingTransport};
use handoff_rs::engine::Coordinator;
use handoff_rs::history::file::JsonFileBackend;
use handoff_rs::history::{HistoryFilter, HistoryStore};
use handoff_rs::model::{InputKind, Resolution};
use handoff_rs::transport::AllowList;
use uuid::Uuid;

fn temp_file() -> PathBuf {
    std::env::temp_dir()
        .join("handoff-history-test")
        .join(Uuid::new_v4().to_string())
        .join("handoff_history.json")
}

async fn coordinator_on(path: &Path) -> Coordinator {
    let backend = Arc::new(JsonFileBackend::open(path).await.unwrap());
    let history = HistoryStore::open(backend).await.unwrap();
    Coordinator::new(
        vec![O1, O2],
        Arc::new(RecordingTransport::default()),
        Arc::new(AllowList::open()),
        history,
    )
}

#[tokio::test]
async fn resolved_history_survives_restart() {
    let path = temp_file();

    {
        let coordinator = coordinator_on(&path).await;
        coordinator.register(A, Some("alice")).await;
        coordinator.begin(A, InputKind::Submission).await.unwrap();
        coordinator.submit(A, "89991234567").await.unwrap();
        coordinator.claim(O1, A).await.unwrap();
        coordinator
            .resolve(O1, A, Resolution::Success)
            .await
            .unwrap();
    }

    let backend = Arc::new(JsonFileBackend::open(&path).await.unwrap());
    let history = HistoryStore::open(backend).await.unwrap();
    let resolved = history.query(&HistoryFilter::resolved()).await;
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].payload, "79991234567");
    assert_eq!(resolved[0].submitter_handle.as_deref(), Some("alice"));
    assert!(!resolved[0].pending);

    let coordinator = coordinator_on(&path).await;
    let chunks = coordinator
        .report(O2, &HistoryFilter::resolved())
        .await
        .unwrap();
    assert!(chunks[0].contains("@alice"));
    assert!(chunks[0].contains("+79991234567"));
}

#[tokio::test]
async fn pending_entries_are_kept_across_restart() {
    let path = temp_file();

    {
        let coordinator = coordinator_on(&path).await;
        coordinator.begin(A, InputKind::Submission).await.unwrap();
        coordinator.submit(A, "89991234567").await.unwrap();
    }

    let backend = Arc::new(JsonFileBackend::open(&path).await.unwrap());
    let history = HistoryStore::open(backend).await.unwrap();
    assert!(history.query(&HistoryFilter::resolved()).await.is_empty());
    let pending = history.query(&HistoryFilter::pending_only()).await;
    assert_eq!(pending.len(), 1);
    assert!(pending[0].pending);
}

#[tokio::test]
async fn corrupt_history_file_is_an_error() {
    let path = temp_file();
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&path, b"{ not json").await.unwrap();

    assert!(JsonFileBackend::open(&path).await.is_err());
}
