//! Coordination engine: the coordinator, its fan-out, and the inbound
//! dispatcher that drives it.

pub mod coordinator;
pub mod dispatch;
pub mod fanout;

pub use coordinator::{Accepted, Coordinator, Resolved, TextOutcome};
pub use dispatch::{Dispatcher, Inbound};
