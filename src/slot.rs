//! The processing slot: at most one submission is being worked at a time.
//!
//! The slot is plain data. Atomicity comes from the coordinator keeping the
//! slot and the queue behind one lock, so a claim is a single check-and-set
//! over both.

use chrono::{DateTime, Utc};

use crate::model::{ActorId, Submission};
use crate::queue::SubmissionQueue;

/// Who is working on what.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub submitter: ActorId,
    pub operator: ActorId,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ProcessingSlot {
    current: Option<Assignment>,
}

impl ProcessingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot for `submitter`'s queued submission.
    ///
    /// Succeeds only when the slot is empty and the submission is still
    /// queued; the submission is then dequeued and returned. `None` means
    /// the claim lost and nothing changed.
    pub fn try_claim(
        &mut self,
        queue: &mut SubmissionQueue,
        submitter: ActorId,
        operator: ActorId,
    ) -> Option<Submission> {
        if self.current.is_some() {
            return None;
        }
        let submission = queue.dequeue(submitter).ok()?;
        self.current = Some(Assignment {
            submitter,
            operator,
            claimed_at: Utc::now(),
        });
        Some(submission)
    }

    /// Clear the slot unconditionally, returning what it held.
    pub fn release(&mut self) -> Option<Assignment> {
        self.current.take()
    }

    pub fn current(&self) -> Option<Assignment> {
        self.current
    }

    pub fn holds(&self, submitter: ActorId) -> bool {
        self.current.is_some_and(|a| a.submitter == submitter)
    }

    pub fn is_free(&self) -> bool {
        self.current.is_none()
    }
}
