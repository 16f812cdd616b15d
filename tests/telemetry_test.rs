//! Integration tests for telemetry initialization, span helpers and metrics.

use handoff_rs::model::{ActorId, InputKind, SessionState};
use handoff_rs::telemetry::{metrics, spans};
use opentelemetry::KeyValue;

#[test]
fn telemetry_initializes_without_endpoint() {
    // The global subscriber can only be set once per process; a second
    // init returning Err is acceptable here.
    let config = handoff_rs::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "handoff-test".to_string(),
        default_filter: "debug".to_string(),
    };
    let _guard = handoff_rs::telemetry::init_telemetry(config);
}

#[test]
fn submission_span_records_operator_and_transition() {
    let span = spans::start_submission_span("claim", ActorId(1));
    spans::record_operator(&span, ActorId(100));
    spans::record_state_transition(
        &span,
        ActorId(1),
        SessionState::AwaitingInput {
            kind: InputKind::Submission,
        },
        SessionState::Queued,
    );
}

#[test]
fn metric_instruments_accept_measurements() {
    metrics::submissions().add(1, &[KeyValue::new("result", "queued")]);
    metrics::claims().add(1, &[KeyValue::new("result", "won")]);
    metrics::retractions().add(1, &[KeyValue::new("outcome", "retracted")]);
    metrics::resolutions().add(1, &[KeyValue::new("status", "success")]);
    metrics::persistence_failures().add(1, &[]);
    metrics::claim_wait_ms().record(12.5, &[]);
}
