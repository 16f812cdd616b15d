//! FIFO of submissions waiting for an operator.
//!
//! At most one submission per submitter. Arrival order is what operators see
//! first, but any queued submission may be claimed.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::model::{ActorId, Submission};

#[derive(Debug, Default)]
pub struct SubmissionQueue {
    items: VecDeque<Submission>,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. `in_process` is the submitter currently holding
    /// the processing slot, if any; they may not queue a second item either.
    pub fn enqueue(&mut self, submission: Submission, in_process: Option<ActorId>) -> Result<()> {
        let submitter = submission.submitter;
        if in_process == Some(submitter) || self.contains(submitter) {
            return Err(Error::DuplicateSubmitter(submitter));
        }
        self.items.push_back(submission);
        Ok(())
    }

    /// Remove and return the submission for `submitter`.
    pub fn dequeue(&mut self, submitter: ActorId) -> Result<Submission> {
        let pos = self
            .items
            .iter()
            .position(|s| s.submitter == submitter)
            .ok_or_else(|| Error::NotFound(format!("queued submission from {submitter}")))?;
        let mut submission = self
            .items
            .remove(pos)
            .ok_or_else(|| Error::NotFound(format!("queued submission from {submitter}")))?;
        submission.queued = false;
        Ok(submission)
    }

    pub fn contains(&self, submitter: ActorId) -> bool {
        self.items.iter().any(|s| s.submitter == submitter)
    }

    pub fn get(&self, submitter: ActorId) -> Option<&Submission> {
        self.items.iter().find(|s| s.submitter == submitter)
    }

    pub fn head(&self) -> Option<&Submission> {
        self.items.front()
    }

    /// First submission queued behind `submitter`.
    pub fn next_after(&self, submitter: ActorId) -> Option<&Submission> {
        self.items
            .iter()
            .skip_while(|s| s.submitter != submitter)
            .nth(1)
    }

    /// Ordered snapshot, head first.
    pub fn peek_all(&self) -> Vec<Submission> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Phone;

    fn submission(id: i64) -> Submission {
        Submission::new(ActorId(id), None, Phone::parse("89991234567").unwrap())
    }

    #[test]
    fn enqueue_rejects_second_submission_from_same_submitter() {
        let mut queue = SubmissionQueue::new();
        queue.enqueue(submission(1), None).unwrap();
        let err = queue.enqueue(submission(1), None).unwrap_err();
        assert!(matches!(err, Error::DuplicateSubmitter(ActorId(1))));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn enqueue_rejects_submitter_in_process() {
        let mut queue = SubmissionQueue::new();
        let err = queue.enqueue(submission(7), Some(ActorId(7))).unwrap_err();
        assert!(matches!(err, Error::DuplicateSubmitter(_)));
        assert!(queue.is_empty());
    }

    #[test]
    fn dequeue_preserves_order_of_the_rest() {
        let mut queue = SubmissionQueue::new();
        for id in 1..=3 {
            queue.enqueue(submission(id), None).unwrap();
        }
        let taken = queue.dequeue(ActorId(2)).unwrap();
        assert!(!taken.queued);
        let order: Vec<_> = queue.peek_all().iter().map(|s| s.submitter).collect();
        assert_eq!(order, vec![ActorId(1), ActorId(3)]);
        assert!(matches!(queue.dequeue(ActorId(2)), Err(Error::NotFound(_))));
    }

    #[test]
    fn next_after_walks_arrival_order() {
        let mut queue = SubmissionQueue::new();
        for id in 1..=3 {
            queue.enqueue(submission(id), None).unwrap();
        }
        assert_eq!(queue.next_after(ActorId(1)).unwrap().submitter, ActorId(2));
        assert!(queue.next_after(ActorId(3)).is_none());
        assert!(queue.next_after(ActorId(9)).is_none());
    }
}
