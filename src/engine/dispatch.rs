//! Dispatcher: consumes inbound events one at a time, in arrival order,
//! maps each to a coordinator operation and tells the actor how it went.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, warn};

use super::coordinator::{Coordinator, TextOutcome};
use crate::error::{Error, Result};
use crate::history::HistoryFilter;
use crate::model::{ActorId, InputKind, Resolution};

/// One event from the chat side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Start {
        actor: ActorId,
        #[serde(default)]
        handle: Option<String>,
    },
    BeginSubmission {
        actor: ActorId,
    },
    BeginSupport {
        actor: ActorId,
    },
    Cancel {
        actor: ActorId,
    },
    Text {
        actor: ActorId,
        #[serde(default)]
        handle: Option<String>,
        text: String,
    },
    Claim {
        operator: ActorId,
        submitter: ActorId,
    },
    Skip {
        operator: ActorId,
        submitter: ActorId,
    },
    DeliverResult {
        operator: ActorId,
        content: String,
    },
    Resolve {
        actor: ActorId,
        submitter: ActorId,
        resolution: Resolution,
    },
    Reply {
        operator: ActorId,
        target: ActorId,
    },
    Broadcast {
        operator: ActorId,
        text: String,
    },
    Report {
        operator: ActorId,
        #[serde(default)]
        from: Option<NaiveDate>,
        #[serde(default)]
        to: Option<NaiveDate>,
    },
}

impl Inbound {
    /// The actor who should hear about the outcome.
    pub fn origin(&self) -> ActorId {
        match self {
            Inbound::Start { actor, .. }
            | Inbound::BeginSubmission { actor }
            | Inbound::BeginSupport { actor }
            | Inbound::Cancel { actor }
            | Inbound::Text { actor, .. }
            | Inbound::Resolve { actor, .. } => *actor,
            Inbound::Claim { operator, .. }
            | Inbound::Skip { operator, .. }
            | Inbound::DeliverResult { operator, .. }
            | Inbound::Reply { operator, .. }
            | Inbound::Broadcast { operator, .. }
            | Inbound::Report { operator, .. } => *operator,
        }
    }
}

/// The dispatch loop: receive events, apply them, until shutdown.
pub struct Dispatcher {
    coordinator: Arc<Coordinator>,
    shutdown: Arc<Notify>,
}

impl Clone for Dispatcher {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl Dispatcher {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the dispatcher to shut down.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Process events until shutdown or until every sender is gone.
    pub async fn run(&self, mut events: mpsc::Receiver<Inbound>) -> Result<()> {
        info!("dispatcher started");
        loop {
            let event = tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("dispatcher shutting down");
                    return Ok(());
                }
                event = events.recv() => event,
            };
            let Some(event) = event else {
                info!("inbound stream closed");
                return Ok(());
            };
            self.dispatch(event).await;
        }
    }

    /// Apply one event and report the outcome to its origin. Never fails:
    /// errors become messages to the actor.
    pub async fn dispatch(&self, event: Inbound) {
        let origin = event.origin();
        debug!(?event, "inbound event");
        let replies = match self.apply(event).await {
            Ok(replies) => replies,
            Err(e) => {
                if matches!(e, Error::Delivery(_) | Error::Persistence(_) | Error::Other(_)) {
                    error!(actor = %origin, error = %e, "event failed");
                } else {
                    debug!(actor = %origin, error = %e, "event rejected");
                }
                vec![describe_error(&e)]
            }
        };
        for reply in replies {
            if let Err(e) = self.coordinator.transport.send_plain(origin, &reply).await {
                warn!(actor = %origin, error = %e, "reply delivery failed");
            }
        }
    }

    async fn apply(&self, event: Inbound) -> Result<Vec<String>> {
        let c = &self.coordinator;
        let replies = match event {
            Inbound::Start { actor, handle } => {
                c.register(actor, handle.as_deref()).await;
                if c.is_operator(actor) {
                    vec!["You are signed in as an operator. Wait for numbers from users.".into()]
                } else {
                    vec!["Welcome! Choose \"Add number\" to hand in a number.".into()]
                }
            }
            Inbound::BeginSubmission { actor } => {
                c.register(actor, None).await;
                c.begin(actor, InputKind::Submission).await?;
                vec!["Send a phone number, one per message.".into()]
            }
            Inbound::BeginSupport { actor } => {
                c.register(actor, None).await;
                c.begin(actor, InputKind::SupportMessage).await?;
                vec!["Write your message to support.".into()]
            }
            Inbound::Cancel { actor } => {
                c.cancel(actor).await?;
                Vec::new()
            }
            Inbound::Text {
                actor,
                handle,
                text,
            } => match c.handle_text(actor, handle.as_deref(), &text).await? {
                TextOutcome::Submitted(accepted) => {
                    let mut reply = format!("Number {} added to the queue.", accepted.payload);
                    if accepted.dropped > 0 {
                        reply.push_str(&format!(
                            "\n{} more number(s) were not added: numbers are accepted one at a time.",
                            accepted.dropped
                        ));
                    }
                    reply.push_str("\nWait until your number is taken into processing.");
                    vec![reply]
                }
                TextOutcome::SupportForwarded => {
                    vec!["Your message was sent to support. Wait for a reply.".into()]
                }
                TextOutcome::ReplyDelivered { target } => {
                    vec![format!("Reply sent to {target}.")]
                }
                TextOutcome::Ignored => Vec::new(),
            },
            Inbound::Claim {
                operator,
                submitter,
            } => {
                let submission = c.claim(operator, submitter).await?;
                vec![format!(
                    "You took number {}\nFrom: {}\n\nSend the result for processing.",
                    submission.payload,
                    submission.label()
                )]
            }
            Inbound::Skip {
                operator,
                submitter,
            } => {
                c.skip(operator, submitter).await?;
                vec!["Number skipped.".into()]
            }
            Inbound::DeliverResult { operator, content } => {
                c.deliver_result(operator, &content).await?;
                vec!["Result sent to the user. Waiting for status confirmation.".into()]
            }
            Inbound::Resolve {
                actor,
                submitter,
                resolution,
            } => {
                let resolved = c.resolve(actor, submitter, resolution).await?;
                vec![format!("Status recorded: {}", resolved.resolution)]
            }
            Inbound::Reply { operator, target } => {
                c.begin_reply(operator, target).await?;
                vec!["Write your reply to the user.".into()]
            }
            Inbound::Broadcast { operator, text } => {
                let (sent, failed) = c.broadcast(operator, &text).await?;
                vec![format!(
                    "Broadcast finished:\nsent: {sent}\nfailed: {failed}"
                )]
            }
            Inbound::Report { operator, from, to } => {
                let filter = HistoryFilter {
                    from,
                    to,
                    ..HistoryFilter::resolved()
                };
                c.report(operator, &filter).await?
            }
        };
        Ok(replies)
    }
}

/// The message an actor sees when their event was rejected.
pub fn describe_error(error: &Error) -> String {
    match error {
        Error::DuplicateSubmitter(_) => {
            "Please wait: your previous number is still being processed.".to_string()
        }
        Error::ClaimConflict { .. } | Error::NotFound(_) => {
            "This number has already been handled or removed from the queue.".to_string()
        }
        Error::InvalidInput(reason) => format!("Nothing was accepted: {reason}."),
        Error::NotEligible(_) => {
            "To use the bot, subscribe to the channel first, then try again.".to_string()
        }
        Error::NotAnOperator(_) => "Only operators can do that.".to_string(),
        Error::InvalidTransition { .. } => "That action is not available right now.".to_string(),
        Error::Delivery(_) => "The message could not be delivered. Try again.".to_string(),
        _ => "Something went wrong. Try again later.".to_string(),
    }
}
