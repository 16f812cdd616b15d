//! Error types for handoff-rs.

use thiserror::Error;

use crate::model::{ActorId, SessionState};

#[derive(Debug, Error)]
pub enum Error {
    /// The submitter already has a submission queued or in process.
    #[error("submitter {0} already has a submission outstanding")]
    DuplicateSubmitter(ActorId),

    #[error("not found: {0}")]
    NotFound(String),

    /// A claim lost the race: the slot is taken or the item is gone.
    #[error("submission from {submitter} is already taken")]
    ClaimConflict { submitter: ActorId },

    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("actor {0} is not eligible")]
    NotEligible(ActorId),

    #[error("actor {0} is not an operator")]
    NotAnOperator(ActorId),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
