//! # handoff-rs
//!
//! Hands submissions from many submitters to a small pool of operators,
//! one at a time.
//!
//! Provides the submission queue, the single processing slot, claim
//! notice fan-out and collapse, per-actor session state, a durable
//! history store (JSON file or Postgres), and OpenTelemetry observability.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod history;
pub mod model;
pub mod notify;
pub mod queue;
pub mod session;
pub mod slot;
pub mod telemetry;
pub mod transport;
