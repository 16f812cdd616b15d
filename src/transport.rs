//! Seams to the outside world: message delivery and the eligibility gate.
//!
//! The coordinator only ever talks to a [`Transport`] and a [`Membership`].
//! [`ConsoleTransport`] writes outbound traffic as JSON lines so any chat
//! adapter can sit on the other side of a pipe.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{ActorId, Resolution};

/// A named action attached to a notice (rendered as a button by adapters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Claim { submitter: ActorId },
    Skip { submitter: ActorId },
    Resolve { submitter: ActorId, resolution: Resolution },
    Reply { target: ActorId },
}

impl Action {
    /// Claim/skip notices are withdrawn once someone claims the submission.
    pub fn is_retractable(&self) -> bool {
        matches!(self, Action::Claim { .. } | Action::Skip { .. })
    }
}

/// Opaque reference to a delivered notice, usable for retraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoticeHandle {
    pub actor: ActorId,
    pub message_id: u64,
}

/// Result of a retraction attempt. `NotFound` is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retraction {
    Retracted,
    NotFound,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message carrying actions; the handle allows later retraction.
    async fn send_notice(&self, to: ActorId, text: &str, actions: &[Action]) -> Result<NoticeHandle>;

    /// Best-effort deletion of a previously delivered notice.
    async fn retract(&self, handle: NoticeHandle) -> Result<Retraction>;

    /// Fire-and-forget informational message.
    async fn send_plain(&self, to: ActorId, text: &str) -> Result<()>;
}

#[async_trait]
pub trait Membership: Send + Sync {
    /// May this actor start a submission or support message?
    async fn is_eligible(&self, actor: ActorId) -> bool;
}

// ---------------------------------------------------------------------------
// Membership implementations
// ---------------------------------------------------------------------------

/// Static allow-list. `None` admits everyone.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allowed: Option<HashSet<ActorId>>,
}

impl AllowList {
    pub fn open() -> Self {
        Self { allowed: None }
    }

    pub fn only(ids: impl IntoIterator<Item = ActorId>) -> Self {
        Self {
            allowed: Some(ids.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Membership for AllowList {
    async fn is_eligible(&self, actor: ActorId) -> bool {
        self.allowed.as_ref().is_none_or(|ids| ids.contains(&actor))
    }
}

// ---------------------------------------------------------------------------
// Console transport
// ---------------------------------------------------------------------------

/// One outbound line written by [`ConsoleTransport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Notice {
        handle: NoticeHandle,
        text: String,
        actions: Vec<Action>,
    },
    Plain {
        to: ActorId,
        text: String,
    },
    Retract {
        handle: NoticeHandle,
    },
}

/// Writes outbound traffic as JSON lines on stdout.
pub struct ConsoleTransport {
    next_id: AtomicU64,
    /// Claim notices not yet retracted. Other notices are never retracted
    /// and are not tracked.
    live: Mutex<HashSet<NoticeHandle>>,
    out: Mutex<tokio::io::Stdout>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
            out: Mutex::new(tokio::io::stdout()),
        }
    }

    async fn emit(&self, line: &Outbound) -> Result<()> {
        let mut json = serde_json::to_vec(line)?;
        json.push(b'\n');
        let mut out = self.out.lock().await;
        out.write_all(&json)
            .await
            .map_err(|e| Error::Delivery(format!("stdout write: {e}")))?;
        out.flush()
            .await
            .map_err(|e| Error::Delivery(format!("stdout flush: {e}")))?;
        Ok(())
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send_notice(&self, to: ActorId, text: &str, actions: &[Action]) -> Result<NoticeHandle> {
        let handle = NoticeHandle {
            actor: to,
            message_id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        self.emit(&Outbound::Notice {
            handle,
            text: text.to_string(),
            actions: actions.to_vec(),
        })
        .await?;
        if actions.iter().any(Action::is_retractable) {
            self.live.lock().await.insert(handle);
        }
        Ok(handle)
    }

    async fn retract(&self, handle: NoticeHandle) -> Result<Retraction> {
        if !self.live.lock().await.remove(&handle) {
            return Ok(Retraction::NotFound);
        }
        self.emit(&Outbound::Retract { handle }).await?;
        Ok(Retraction::Retracted)
    }

    async fn send_plain(&self, to: ActorId, text: &str) -> Result<()> {
        self.emit(&Outbound::Plain {
            to,
            text: text.to_string(),
        })
        .await
    }
}
