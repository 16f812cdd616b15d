//! The coordinator. The public API for submitting, claiming and resolving.
//!
//! Queue, processing slot, notification record and sessions live together
//! behind one lock (the desk). Every decision is made inside a short
//! critical section; transport and history I/O happen after the lock is
//! dropped, and their failures are logged rather than propagated.

use std::sync::Arc;

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::sync::Mutex;
use tracing::{Instrument, info, warn};

use crate::error::{Error, Result};
use crate::history::{HistoryFilter, HistoryStore, report};
use crate::model::*;
use crate::notify::NotificationRecord;
use crate::queue::SubmissionQueue;
use crate::session::Sessions;
use crate::slot::{Assignment, ProcessingSlot};
use crate::telemetry::metrics;
use crate::telemetry::spans::{record_operator, record_state_transition, start_submission_span};
use crate::transport::{Action, Membership, NoticeHandle, Transport};

/// Everything that must change together.
#[derive(Debug, Default)]
pub(crate) struct Desk {
    pub(crate) queue: SubmissionQueue,
    pub(crate) slot: ProcessingSlot,
    pub(crate) notices: NotificationRecord,
    pub(crate) sessions: Sessions,
}

/// A submission accepted into the queue.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub payload: Phone,
    /// Valid numbers after the first that were not queued.
    pub dropped: usize,
}

/// What a text message turned into, depending on the sender's session.
#[derive(Debug, Clone)]
pub enum TextOutcome {
    Submitted(Accepted),
    SupportForwarded,
    ReplyDelivered { target: ActorId },
    /// No input was expected from this actor.
    Ignored,
}

/// A completed resolution.
#[derive(Debug, Clone, Copy)]
pub struct Resolved {
    pub assignment: Assignment,
    pub resolution: Resolution,
}

pub struct Coordinator {
    pub(crate) desk: Mutex<Desk>,
    pub(crate) operators: Vec<ActorId>,
    pub(crate) transport: Arc<dyn Transport>,
    membership: Arc<dyn Membership>,
    history: HistoryStore,
}

impl Coordinator {
    pub fn new(
        operators: Vec<ActorId>,
        transport: Arc<dyn Transport>,
        membership: Arc<dyn Membership>,
        history: HistoryStore,
    ) -> Self {
        Self {
            desk: Mutex::new(Desk::default()),
            operators,
            transport,
            membership,
            history,
        }
    }

    pub fn is_operator(&self, actor: ActorId) -> bool {
        self.operators.contains(&actor)
    }

    fn require_operator(&self, actor: ActorId) -> Result<()> {
        if self.is_operator(actor) {
            Ok(())
        } else {
            Err(Error::NotAnOperator(actor))
        }
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Record that an actor showed up, refreshing its handle.
    pub async fn register(&self, actor: ActorId, handle: Option<&str>) {
        self.desk.lock().await.sessions.touch(actor, handle);
    }

    /// Start waiting for a phone number or a support message.
    pub async fn begin(&self, actor: ActorId, kind: InputKind) -> Result<()> {
        if self.is_operator(actor) {
            return Err(Error::InvalidInput(
                "operators cannot submit or write to support".to_string(),
            ));
        }
        if !self.membership.is_eligible(actor).await {
            return Err(Error::NotEligible(actor));
        }

        let span = start_submission_span("begin", actor);
        let mut desk = self.desk.lock().await;
        let state = desk.sessions.state(actor);
        if state.is_outstanding() {
            return Err(Error::DuplicateSubmitter(actor));
        }
        if matches!(state, SessionState::AwaitingInput { .. }) {
            transition(&mut desk.sessions, &span, actor, SessionState::Idle)?;
        }
        transition(
            &mut desk.sessions,
            &span,
            actor,
            SessionState::AwaitingInput { kind },
        )
    }

    /// Leave `AwaitingInput`. Returns false when there was nothing to cancel.
    pub async fn cancel(&self, actor: ActorId) -> Result<bool> {
        let mut desk = self.desk.lock().await;
        if !matches!(desk.sessions.state(actor), SessionState::AwaitingInput { .. }) {
            return Ok(false);
        }
        let span = start_submission_span("cancel", actor);
        transition(&mut desk.sessions, &span, actor, SessionState::Idle)?;
        Ok(true)
    }

    pub async fn session_state(&self, actor: ActorId) -> SessionState {
        self.desk.lock().await.sessions.state(actor)
    }

    /// Route free text according to the sender's session.
    pub async fn handle_text(
        &self,
        actor: ActorId,
        handle: Option<&str>,
        text: &str,
    ) -> Result<TextOutcome> {
        self.register(actor, handle).await;
        let state = self.session_state(actor).await;

        if self.is_operator(actor) {
            return match state {
                SessionState::AwaitingReplyTarget { target } => {
                    self.deliver_reply(actor, target, text).await?;
                    Ok(TextOutcome::ReplyDelivered { target })
                }
                _ => Ok(TextOutcome::Ignored),
            };
        }

        match state {
            SessionState::Queued | SessionState::AwaitingResult => {
                Err(Error::DuplicateSubmitter(actor))
            }
            SessionState::AwaitingInput {
                kind: InputKind::Submission,
            } => self.submit(actor, text).await.map(TextOutcome::Submitted),
            SessionState::AwaitingInput {
                kind: InputKind::SupportMessage,
            } => {
                self.forward_support(actor, text).await?;
                Ok(TextOutcome::SupportForwarded)
            }
            SessionState::Idle | SessionState::AwaitingReplyTarget { .. } => {
                Ok(TextOutcome::Ignored)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate `text`, queue its first phone number and announce it when
    /// nothing else is in flight.
    ///
    /// Invalid input leaves the session in `AwaitingInput` so the submitter
    /// can retry.
    pub async fn submit(&self, actor: ActorId, text: &str) -> Result<Accepted> {
        let span = start_submission_span("submit", actor);
        async {
            let scan = PhoneScan::scan(text);
            let Some(payload) = scan.first else {
                metrics::submissions().add(1, &[KeyValue::new("result", "invalid")]);
                return Err(Error::InvalidInput(match scan.invalid {
                    0 => "no phone number found".to_string(),
                    n => format!("{n} line(s) not recognized as a phone number"),
                }));
            };

            let (submission, announce) = {
                let mut desk = self.desk.lock().await;
                let state = desk.sessions.state(actor);
                if state.is_outstanding() {
                    metrics::submissions().add(1, &[KeyValue::new("result", "duplicate")]);
                    return Err(Error::DuplicateSubmitter(actor));
                }
                if state
                    != (SessionState::AwaitingInput {
                        kind: InputKind::Submission,
                    })
                {
                    return Err(Error::InvalidTransition {
                        from: state,
                        to: SessionState::Queued,
                    });
                }

                let handle = desk.sessions.handle(actor).map(str::to_string);
                let submission = Submission::new(actor, handle, payload.clone());
                let in_process = desk.slot.current().map(|a| a.submitter);
                if let Err(e) = desk.queue.enqueue(submission.clone(), in_process) {
                    metrics::submissions().add(1, &[KeyValue::new("result", "duplicate")]);
                    return Err(e);
                }
                transition(&mut desk.sessions, &span, actor, SessionState::Queued)?;
                let announce = desk.slot.is_free() && desk.notices.is_empty();
                (submission, announce)
            };

            metrics::submissions().add(1, &[KeyValue::new("result", "queued")]);
            info!(payload = %submission.payload, announce, "submission queued");

            if let Err(e) = self
                .history
                .append(HistoryEntry::pending_for(&submission))
                .await
            {
                metrics::persistence_failures().add(1, &[]);
                warn!(error = %e, "history append failed, continuing in memory");
            }

            if announce {
                self.announce(&submission).await;
            }

            Ok(Accepted {
                payload,
                dropped: scan.dropped,
            })
        }
        .instrument(span.clone())
        .await
    }

    /// Ordered snapshot of the queue.
    pub async fn queue_snapshot(&self) -> Vec<Submission> {
        self.desk.lock().await.queue.peek_all()
    }

    pub async fn current_assignment(&self) -> Option<Assignment> {
        self.desk.lock().await.slot.current()
    }

    /// Notices still outstanding for a submission.
    pub async fn live_notices(&self, submitter: ActorId) -> Vec<NoticeHandle> {
        self.desk.lock().await.notices.handles(submitter)
    }

    // -----------------------------------------------------------------------
    // Claim / skip
    // -----------------------------------------------------------------------

    /// Take exclusive processing rights to `submitter`'s submission.
    ///
    /// Exactly one of any number of concurrent claims succeeds; the rest get
    /// `ClaimConflict` and change nothing.
    pub async fn claim(&self, operator: ActorId, submitter: ActorId) -> Result<Submission> {
        self.require_operator(operator)?;
        let span = start_submission_span("claim", submitter);
        record_operator(&span, operator);

        async {
            let claimed = {
                let mut desk = self.desk.lock().await;
                let Desk { queue, slot, .. } = &mut *desk;
                slot.try_claim(queue, submitter, operator)
            };

            let Some(submission) = claimed else {
                metrics::claims().add(1, &[KeyValue::new("result", "conflict")]);
                info!("claim lost");
                return Err(Error::ClaimConflict { submitter });
            };

            metrics::claims().add(1, &[KeyValue::new("result", "won")]);
            let waited = Utc::now() - submission.created_at;
            metrics::claim_wait_ms().record(waited.num_milliseconds() as f64, &[]);
            info!(payload = %submission.payload, "submission claimed");

            self.collapse(submitter, operator).await;

            if let Err(e) = self
                .transport
                .send_plain(
                    submitter,
                    "Your number has been taken into processing, wait for the code.",
                )
                .await
            {
                warn!(error = %e, "could not tell submitter about the claim");
            }

            Ok(submission)
        }
        .instrument(span.clone())
        .await
    }

    /// Dismiss one operator's notice. The submission stays queued; once every
    /// operator has skipped it, the next queued submission is announced.
    pub async fn skip(&self, operator: ActorId, submitter: ActorId) -> Result<()> {
        self.require_operator(operator)?;

        let (handle, next) = {
            let mut desk = self.desk.lock().await;
            if !desk.queue.contains(submitter) {
                return Err(Error::NotFound(format!("queued submission from {submitter}")));
            }
            let handle = desk.notices.take_one(submitter, operator);
            let next = if handle.is_some() && desk.notices.is_empty() && desk.slot.is_free() {
                desk.queue.next_after(submitter).cloned()
            } else {
                None
            };
            (handle, next)
        };

        info!(%submitter, %operator, "notice skipped");
        if let Some(handle) = handle {
            self.retract(handle).await;
        }
        if let Some(next) = next {
            self.announce(&next).await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Result / resolution
    // -----------------------------------------------------------------------

    /// Send the operator's result to the submitter being processed and ask
    /// them to confirm the status.
    pub async fn deliver_result(&self, operator: ActorId, content: &str) -> Result<ActorId> {
        self.require_operator(operator)?;

        let submitter = {
            let mut desk = self.desk.lock().await;
            let assignment = desk
                .slot
                .current()
                .filter(|a| a.operator == operator)
                .ok_or_else(|| Error::NotFound("no submission in process".to_string()))?;
            let submitter = assignment.submitter;
            if desk.sessions.state(submitter) == SessionState::Queued {
                let span = start_submission_span("deliver_result", submitter);
                record_operator(&span, operator);
                transition(
                    &mut desk.sessions,
                    &span,
                    submitter,
                    SessionState::AwaitingResult,
                )?;
            }
            submitter
        };

        let text = format!("Result for your number:\n{content}\n\nPlease confirm the status:");
        let actions = [
            Action::Resolve {
                submitter,
                resolution: Resolution::Success,
            },
            Action::Resolve {
                submitter,
                resolution: Resolution::Failed,
            },
        ];
        self.transport.send_notice(submitter, &text, &actions).await?;
        Ok(submitter)
    }

    /// Finish work on `submitter`'s submission.
    ///
    /// Accepted from the submitter once a result was delivered, or from the
    /// operator holding the slot at any time. Marks history resolved, frees
    /// the slot and announces the next queued submission. A repeated
    /// resolution fails with `NotFound` and changes nothing.
    pub async fn resolve(
        &self,
        actor: ActorId,
        submitter: ActorId,
        resolution: Resolution,
    ) -> Result<Resolved> {
        let span = start_submission_span("resolve", submitter);

        async {
            let (assignment, next) = {
                let mut desk = self.desk.lock().await;
                let assignment = desk
                    .slot
                    .current()
                    .filter(|a| a.submitter == submitter)
                    .ok_or_else(|| Error::NotFound("status already handled".to_string()))?;
                record_operator(&span, assignment.operator);

                let state = desk.sessions.state(submitter);
                let allowed = if actor == assignment.operator {
                    state.is_outstanding()
                } else {
                    actor == submitter && state == SessionState::AwaitingResult
                };
                if !allowed {
                    return Err(Error::NotFound("status already handled".to_string()));
                }

                transition(&mut desk.sessions, &span, submitter, SessionState::Idle)?;
                desk.slot.release();
                let next = if desk.notices.is_empty() {
                    desk.queue.head().cloned()
                } else {
                    None
                };
                (assignment, next)
            };

            metrics::resolutions().add(1, &[KeyValue::new("status", resolution.to_string())]);
            info!(%resolution, "submission resolved");

            match self.history.resolve_latest_pending(submitter).await {
                Ok(true) => {}
                Ok(false) => warn!("no pending history entry to resolve"),
                Err(e) => {
                    metrics::persistence_failures().add(1, &[]);
                    warn!(error = %e, "history resolve failed, continuing in memory");
                }
            }

            let label = {
                let desk = self.desk.lock().await;
                actor_label(submitter, desk.sessions.handle(submitter))
            };
            if actor != assignment.operator {
                let text = format!("Status from submitter: {resolution}\nFrom: {label}");
                if let Err(e) = self.transport.send_plain(assignment.operator, &text).await {
                    warn!(error = %e, "could not tell operator about the status");
                }
            }
            if actor != submitter {
                let text = format!("Result of processing your number: {resolution}");
                if let Err(e) = self.transport.send_plain(submitter, &text).await {
                    warn!(error = %e, "could not tell submitter about the status");
                }
            }

            if let Some(next) = next {
                self.announce(&next).await;
            }

            Ok(Resolved {
                assignment,
                resolution,
            })
        }
        .instrument(span.clone())
        .await
    }

    // -----------------------------------------------------------------------
    // Support channel
    // -----------------------------------------------------------------------

    async fn forward_support(&self, actor: ActorId, text: &str) -> Result<()> {
        let operator = *self
            .operators
            .first()
            .ok_or_else(|| Error::Config("no operators configured".to_string()))?;
        let label = {
            let desk = self.desk.lock().await;
            actor_label(actor, desk.sessions.handle(actor))
        };
        let message = format!("Support message from {label}:\n\n{text}");
        self.transport
            .send_notice(operator, &message, &[Action::Reply { target: actor }])
            .await?;

        let mut desk = self.desk.lock().await;
        let span = start_submission_span("support", actor);
        transition(&mut desk.sessions, &span, actor, SessionState::Idle)?;
        Ok(())
    }

    /// Make the operator's next text a support reply to `target`.
    pub async fn begin_reply(&self, operator: ActorId, target: ActorId) -> Result<()> {
        self.require_operator(operator)?;
        let mut desk = self.desk.lock().await;
        let span = start_submission_span("reply", target);
        record_operator(&span, operator);
        transition(
            &mut desk.sessions,
            &span,
            operator,
            SessionState::AwaitingReplyTarget { target },
        )
    }

    async fn deliver_reply(&self, operator: ActorId, target: ActorId, text: &str) -> Result<()> {
        self.transport
            .send_plain(target, &format!("Reply from support:\n\n{text}"))
            .await?;
        let mut desk = self.desk.lock().await;
        let span = start_submission_span("reply", target);
        record_operator(&span, operator);
        transition(&mut desk.sessions, &span, operator, SessionState::Idle)
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Send `text` to every known non-operator actor. Returns (sent, failed).
    pub async fn broadcast(&self, operator: ActorId, text: &str) -> Result<(usize, usize)> {
        self.require_operator(operator)?;
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("broadcast text is empty".to_string()));
        }

        let recipients: Vec<_> = {
            let desk = self.desk.lock().await;
            desk.sessions
                .known_actors()
                .into_iter()
                .filter(|a| !self.is_operator(*a))
                .collect()
        };

        let message = format!("Operator:\n{text}");
        let (mut sent, mut failed) = (0, 0);
        for actor in recipients {
            match self.transport.send_plain(actor, &message).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(%actor, error = %e, "broadcast delivery failed");
                    failed += 1;
                }
            }
        }
        info!(sent, failed, "broadcast finished");
        Ok((sent, failed))
    }

    /// Resolved history rendered as message-sized chunks.
    pub async fn report(&self, operator: ActorId, filter: &HistoryFilter) -> Result<Vec<String>> {
        self.require_operator(operator)?;
        Ok(report::render(&self.history.query(filter).await))
    }
}

/// Validated session transition, recorded on `span`.
pub(crate) fn transition(
    sessions: &mut Sessions,
    span: &tracing::Span,
    actor: ActorId,
    to: SessionState,
) -> Result<()> {
    let from = sessions.transition(actor, to)?;
    record_state_transition(span, actor, from, to);
    Ok(())
}
