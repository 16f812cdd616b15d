//! Bookkeeping for outstanding claim notices.
//!
//! One handle per operator per submission, kept only while the submission
//! is queued and unclaimed. The transport I/O lives in `engine::fanout`;
//! this is the data it works against.

use std::collections::{HashMap, HashSet};

use crate::model::ActorId;
use crate::transport::NoticeHandle;

#[derive(Debug, Default)]
pub struct NotificationRecord {
    by_submitter: HashMap<ActorId, HashMap<ActorId, NoticeHandle>>,
    /// Submitters whose notices are still being sent.
    in_flight: HashSet<ActorId>,
}

impl NotificationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `submitter` as announced before any notice is sent, so no other
    /// fan-out starts meanwhile.
    pub fn begin_fanout(&mut self, submitter: ActorId) {
        self.by_submitter.entry(submitter).or_default();
        self.in_flight.insert(submitter);
    }

    /// Fan-out finished. Returns true when the record ended up empty (every
    /// send failed or every operator already skipped) and was dropped.
    pub fn end_fanout(&mut self, submitter: ActorId) -> bool {
        self.in_flight.remove(&submitter);
        match self.by_submitter.get(&submitter) {
            Some(handles) if handles.is_empty() => {
                self.by_submitter.remove(&submitter);
                true
            }
            _ => false,
        }
    }

    pub fn record(&mut self, submitter: ActorId, operator: ActorId, handle: NoticeHandle) {
        self.by_submitter
            .entry(submitter)
            .or_default()
            .insert(operator, handle);
    }

    /// Remove the whole record for `submitter`, returning every handle
    /// except `winner`'s.
    pub fn take_losers(&mut self, submitter: ActorId, winner: ActorId) -> Vec<NoticeHandle> {
        self.in_flight.remove(&submitter);
        self.by_submitter
            .remove(&submitter)
            .map(|handles| {
                handles
                    .into_iter()
                    .filter(|(operator, _)| *operator != winner)
                    .map(|(_, handle)| handle)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove one operator's handle. The submitter's record is dropped once
    /// its last handle is gone and no fan-out is still sending.
    pub fn take_one(&mut self, submitter: ActorId, operator: ActorId) -> Option<NoticeHandle> {
        let handles = self.by_submitter.get_mut(&submitter)?;
        let handle = handles.remove(&operator);
        if handles.is_empty() && !self.in_flight.contains(&submitter) {
            self.by_submitter.remove(&submitter);
        }
        handle
    }

    pub fn is_active(&self, submitter: ActorId) -> bool {
        self.by_submitter.contains_key(&submitter)
    }

    /// Any submission with live notices blocks further fan-out.
    pub fn is_empty(&self) -> bool {
        self.by_submitter.is_empty()
    }

    pub fn handles(&self, submitter: ActorId) -> Vec<NoticeHandle> {
        self.by_submitter
            .get(&submitter)
            .map(|h| h.values().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(actor: i64, id: u64) -> NoticeHandle {
        NoticeHandle {
            actor: ActorId(actor),
            message_id: id,
        }
    }

    #[test]
    fn take_losers_keeps_winner_out_and_clears_record() {
        let mut record = NotificationRecord::new();
        record.record(ActorId(1), ActorId(10), handle(10, 1));
        record.record(ActorId(1), ActorId(20), handle(20, 2));
        record.record(ActorId(1), ActorId(30), handle(30, 3));

        let mut losers = record.take_losers(ActorId(1), ActorId(20));
        losers.sort_by_key(|h| h.message_id);
        assert_eq!(losers, vec![handle(10, 1), handle(30, 3)]);
        assert!(!record.is_active(ActorId(1)));
        assert!(record.is_empty());
    }

    #[test]
    fn fanout_in_flight_keeps_record_alive() {
        let mut record = NotificationRecord::new();
        record.begin_fanout(ActorId(1));
        assert!(!record.is_empty());

        record.record(ActorId(1), ActorId(10), handle(10, 1));
        record.take_one(ActorId(1), ActorId(10));
        assert!(record.is_active(ActorId(1)));

        assert!(record.end_fanout(ActorId(1)));
        assert!(record.is_empty());
    }

    #[test]
    fn end_fanout_after_collapse_does_not_resurrect() {
        let mut record = NotificationRecord::new();
        record.begin_fanout(ActorId(1));
        record.record(ActorId(1), ActorId(10), handle(10, 1));
        record.take_losers(ActorId(1), ActorId(10));
        assert!(!record.end_fanout(ActorId(1)));
        assert!(!record.is_active(ActorId(1)));
    }

    #[test]
    fn take_one_drops_empty_record() {
        let mut record = NotificationRecord::new();
        record.record(ActorId(1), ActorId(10), handle(10, 1));
        record.record(ActorId(1), ActorId(20), handle(20, 2));

        assert_eq!(record.take_one(ActorId(1), ActorId(10)), Some(handle(10, 1)));
        assert!(record.is_active(ActorId(1)));
        assert_eq!(record.take_one(ActorId(1), ActorId(10)), None);
        assert_eq!(record.take_one(ActorId(1), ActorId(20)), Some(handle(20, 2)));
        assert!(record.is_empty());
    }
}
