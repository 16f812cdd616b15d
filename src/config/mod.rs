//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on malformed values.
//! The database URL is wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::model::ActorId;
use secrecy::SecretString;

/// Default location of the JSON history file.
pub const DEFAULT_HISTORY_PATH: &str = "data/handoff_history.json";

#[derive(Debug)]
pub struct Config {
    /// Allow-listed operators, in notification order.
    pub operator_ids: Vec<ActorId>,
    /// Actors allowed to submit; `None` admits everyone.
    pub eligible_ids: Option<Vec<ActorId>>,
    pub store: StoreConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Where history lives. All the history commands need.
#[derive(Debug)]
pub struct StoreConfig {
    pub history_path: PathBuf,
    pub database_url: Option<SecretString>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let operator_ids = parse_ids(&required_var("OPERATOR_IDS")?);
        if operator_ids.is_empty() {
            return Err(Error::Config(
                "OPERATOR_IDS must list at least one numeric id".to_string(),
            ));
        }

        Ok(Self {
            operator_ids,
            eligible_ids: std::env::var("ELIGIBLE_IDS").ok().map(|v| parse_ids(&v)),
            store: StoreConfig::from_env(),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: log_level(),
        })
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            history_path: std::env::var("HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_HISTORY_PATH)),
            database_url: std::env::var("DATABASE_URL").ok().map(SecretString::from),
        }
    }
}

/// `LOG_LEVEL`, defaulting to `info`.
pub fn log_level() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

/// Comma-separated ids; entries that are not integers are skipped.
pub fn parse_ids(raw: &str) -> Vec<ActorId> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .map(ActorId)
        .collect()
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
