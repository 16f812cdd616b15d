//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use handoff_rs::engine::{Accepted, Coordinator};
use handoff_rs::error::{Error, Result};
use handoff_rs::history::{Durable, HistoryStore};
use handoff_rs::model::{ActorId, HistoryEntry, InputKind};
use handoff_rs::transport::{Action, AllowList, Membership, NoticeHandle, Retraction, Transport};
use tokio::sync::Notify;

pub const O1: ActorId = ActorId(100);
pub const O2: ActorId = ActorId(200);
pub const O3: ActorId = ActorId(300);
pub const A: ActorId = ActorId(1);
pub const B: ActorId = ActorId(2);

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentNotice {
    pub handle: NoticeHandle,
    pub text: String,
    pub actions: Vec<Action>,
}

/// Records everything sent; retraction removes from the live set.
#[derive(Default)]
pub struct RecordingTransport {
    next_id: AtomicU64,
    notices: Mutex<Vec<SentNotice>>,
    live: Mutex<HashSet<NoticeHandle>>,
    plains: Mutex<Vec<(ActorId, String)>>,
    failing: Mutex<HashSet<ActorId>>,
    failing_retract: Mutex<HashSet<ActorId>>,
    held: Mutex<HashMap<ActorId, Arc<Notify>>>,
}

impl RecordingTransport {
    /// Make every delivery to `actor` fail.
    pub fn fail_for(&self, actor: ActorId) {
        self.failing.lock().unwrap().insert(actor);
    }

    /// Make every retraction of a notice sent to `actor` fail.
    pub fn fail_retract_for(&self, actor: ActorId) {
        self.failing_retract.lock().unwrap().insert(actor);
    }

    /// Hold notices to `actor` until the returned gate is notified.
    pub fn hold_for(&self, actor: ActorId) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.held.lock().unwrap().insert(actor, gate.clone());
        gate
    }

    /// The recipient deleted the notice on their side.
    pub fn dismiss(&self, handle: NoticeHandle) {
        self.live.lock().unwrap().remove(&handle);
    }

    pub fn notices_to(&self, actor: ActorId) -> Vec<SentNotice> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.handle.actor == actor)
            .cloned()
            .collect()
    }

    /// Claim notices ever sent for `submitter`, to any operator.
    pub fn claim_notices_for(&self, submitter: ActorId) -> Vec<SentNotice> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.actions.contains(&Action::Claim { submitter }))
            .cloned()
            .collect()
    }

    pub fn is_live(&self, handle: NoticeHandle) -> bool {
        self.live.lock().unwrap().contains(&handle)
    }

    pub fn live_for(&self, actor: ActorId) -> Vec<NoticeHandle> {
        self.live
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.actor == actor)
            .copied()
            .collect()
    }

    pub fn plains_to(&self, actor: ActorId) -> Vec<String> {
        self.plains
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == actor)
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn check(&self, actor: ActorId) -> Result<()> {
        if self.failing.lock().unwrap().contains(&actor) {
            Err(Error::Delivery(format!("chat {actor} unreachable")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_notice(&self, to: ActorId, text: &str, actions: &[Action]) -> Result<NoticeHandle> {
        self.check(to)?;
        let gate = self.held.lock().unwrap().get(&to).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let handle = NoticeHandle {
            actor: to,
            message_id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        self.notices.lock().unwrap().push(SentNotice {
            handle,
            text: text.to_string(),
            actions: actions.to_vec(),
        });
        self.live.lock().unwrap().insert(handle);
        Ok(handle)
    }

    async fn retract(&self, handle: NoticeHandle) -> Result<Retraction> {
        if self.failing_retract.lock().unwrap().contains(&handle.actor) {
            return Err(Error::Delivery(format!("cannot delete notice in chat {}", handle.actor)));
        }
        if self.live.lock().unwrap().remove(&handle) {
            Ok(Retraction::Retracted)
        } else {
            Ok(Retraction::NotFound)
        }
    }

    async fn send_plain(&self, to: ActorId, text: &str) -> Result<()> {
        self.check(to)?;
        self.plains.lock().unwrap().push((to, text.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// History backend
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBackend {
    rows: Mutex<Vec<HistoryEntry>>,
    fail: AtomicBool,
}

impl MemoryBackend {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn rows_for(&self, submitter: ActorId) -> Vec<HistoryEntry> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.submitter == submitter)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Durable for MemoryBackend {
    async fn write(&self, entry: &HistoryEntry) -> Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Error::Persistence("disk full".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|e| e.id != entry.id);
        rows.push(entry.clone());
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.rows.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub transport: Arc<RecordingTransport>,
    pub backend: Arc<MemoryBackend>,
}

/// Two operators, open membership, in-memory history.
pub async fn harness() -> Harness {
    harness_with(vec![O1, O2], Arc::new(AllowList::open())).await
}

pub async fn harness_with(operators: Vec<ActorId>, membership: Arc<dyn Membership>) -> Harness {
    let transport = Arc::new(RecordingTransport::default());
    let backend = Arc::new(MemoryBackend::default());
    let history = HistoryStore::open(backend.clone()).await.unwrap();
    let coordinator = Arc::new(Coordinator::new(
        operators,
        transport.clone(),
        membership,
        history,
    ));
    Harness {
        coordinator,
        transport,
        backend,
    }
}

impl Harness {
    /// Walk `submitter` through "add number" and send `text`.
    pub async fn queue_number(&self, submitter: ActorId, text: &str) -> Result<Accepted> {
        self.coordinator
            .register(submitter, Some(&format!("user{}", submitter.0)))
            .await;
        self.coordinator.begin(submitter, InputKind::Submission).await?;
        self.coordinator.submit(submitter, text).await
    }
}
