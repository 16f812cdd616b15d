//! Metric instrument factories for handoff-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"handoff-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for handoff-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("handoff-rs")
}

/// Counter: submission attempts.
/// Labels: `result` ("queued" | "duplicate" | "invalid").
pub fn submissions() -> Counter<u64> {
    meter()
        .u64_counter("handoff.submissions")
        .with_description("Number of submission attempts")
        .build()
}

/// Counter: claim attempts.
/// Labels: `result` ("won" | "conflict").
pub fn claims() -> Counter<u64> {
    meter()
        .u64_counter("handoff.claims")
        .with_description("Number of claim attempts")
        .build()
}

/// Counter: notice retractions.
/// Labels: `outcome` ("retracted" | "not_found" | "error").
pub fn retractions() -> Counter<u64> {
    meter()
        .u64_counter("handoff.retractions")
        .with_description("Number of notice retractions")
        .build()
}

/// Counter: resolved submissions.
/// Labels: `status` ("success" | "failed").
pub fn resolutions() -> Counter<u64> {
    meter()
        .u64_counter("handoff.resolutions")
        .with_description("Number of resolved submissions")
        .build()
}

/// Counter: history writes that did not reach the durable store.
pub fn persistence_failures() -> Counter<u64> {
    meter()
        .u64_counter("handoff.persistence.failures")
        .with_description("History writes that failed")
        .build()
}

/// Histogram: time a submission spent queued before being claimed.
pub fn claim_wait_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("handoff.claim.wait_ms")
        .with_description("Queue wait before claim in milliseconds")
        .with_unit("ms")
        .build()
}
