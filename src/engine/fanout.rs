//! Notification fan-out and collapse.
//!
//! A claimable submission is announced to every operator at once, and only
//! while the processing slot is free and no other submission has live
//! notices. When one operator claims it, every other notice is retracted.

use opentelemetry::KeyValue;
use tracing::{debug, info, warn};

use super::coordinator::Coordinator;
use crate::model::{ActorId, Submission};
use crate::telemetry::metrics;
use crate::transport::{Action, NoticeHandle, Retraction};

impl Coordinator {
    /// Send a claim/skip notice for `submission` to every operator.
    ///
    /// Does nothing when the slot is taken, another submission is already
    /// announced, or the submission has left the queue. If every operator
    /// skips before the fan-out finishes, the next queued submission is
    /// announced in turn. Returns the number of notices delivered.
    pub async fn announce(&self, submission: &Submission) -> usize {
        let mut current = submission.clone();
        let mut delivered_total = 0;

        loop {
            let submitter = current.submitter;
            {
                let mut desk = self.desk.lock().await;
                if !desk.slot.is_free()
                    || !desk.notices.is_empty()
                    || !desk.queue.contains(submitter)
                {
                    debug!(%submitter, "announce skipped");
                    return delivered_total;
                }
                desk.notices.begin_fanout(submitter);
            }

            let delivered = self.fan_out(&current).await;
            delivered_total += delivered;

            let next = {
                let mut desk = self.desk.lock().await;
                let dropped = desk.notices.end_fanout(submitter);
                if dropped && delivered > 0 && desk.slot.is_free() {
                    desk.queue.next_after(submitter).cloned()
                } else {
                    None
                }
            };
            info!(%submitter, delivered, "submission announced");

            match next {
                Some(next) => current = next,
                None => return delivered_total,
            }
        }
    }

    async fn fan_out(&self, submission: &Submission) -> usize {
        let submitter = submission.submitter;
        let text = format!(
            "New number: {}\nFrom: {}\n\nChoose an action:",
            submission.payload,
            submission.label()
        );
        let actions = [Action::Claim { submitter }, Action::Skip { submitter }];

        let mut delivered = 0;
        for &operator in &self.operators {
            let handle = match self.transport.send_notice(operator, &text, &actions).await {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(%operator, %submitter, error = %e, "notice delivery failed");
                    continue;
                }
            };

            let live = {
                let mut desk = self.desk.lock().await;
                let live = desk.notices.is_active(submitter);
                if live {
                    desk.notices.record(submitter, operator, handle);
                }
                live
            };
            if live {
                delivered += 1;
            } else {
                // Claimed while this notice was in transit.
                self.retract(handle).await;
            }
        }
        delivered
    }

    /// Retract every notice for `submitter` except the winner's and drop the
    /// record. Individual retraction failures are logged and skipped.
    pub async fn collapse(&self, submitter: ActorId, winner: ActorId) -> usize {
        let losers = self
            .desk
            .lock()
            .await
            .notices
            .take_losers(submitter, winner);
        let count = losers.len();
        for handle in losers {
            self.retract(handle).await;
        }
        debug!(%submitter, %winner, retracted = count, "notices collapsed");
        count
    }

    pub(crate) async fn retract(&self, handle: NoticeHandle) {
        let outcome = match self.transport.retract(handle).await {
            Ok(Retraction::Retracted) => "retracted",
            Ok(Retraction::NotFound) => {
                debug!(operator = %handle.actor, "notice already gone");
                "not_found"
            }
            Err(e) => {
                warn!(operator = %handle.actor, error = %e, "notice retraction failed");
                "error"
            }
        };
        metrics::retractions().add(1, &[KeyValue::new("outcome", outcome)]);
    }
}
