//! Submission lifecycle span helpers.
//!
//! Provides span creation and session-transition recording for
//! submissions flowing through the coordinator.

use tracing::Span;

use crate::model::{ActorId, SessionState};

/// Start a span covering one coordinator operation on a submission.
///
/// The `handoff.operator` field is declared empty and filled in once an
/// operator is involved.
pub fn start_submission_span(operation: &'static str, submitter: ActorId) -> Span {
    tracing::info_span!(
        "handoff.submission",
        "handoff.operation" = operation,
        "handoff.submitter" = %submitter,
        "handoff.operator" = tracing::field::Empty,
    )
}

/// Record the operator on a submission span.
pub fn record_operator(span: &Span, operator: ActorId) {
    span.record("handoff.operator", tracing::field::display(operator));
}

/// Record a session state transition as an event on the given span.
pub fn record_state_transition(span: &Span, actor: ActorId, from: SessionState, to: SessionState) {
    span.in_scope(|| {
        tracing::info!(%actor, %from, %to, "state_transition");
    });
}
