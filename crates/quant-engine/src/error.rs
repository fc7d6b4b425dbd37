//! Engine error types

use crate::store::StoreError;
use thiserror::Error;

/// Failures reported by a data source capability.
///
/// Every variant is treated the same way by the loops: the cache keeps its
/// last known good value and the loop carries on.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{target} unavailable: HTTP {status}")]
    Unavailable { target: String, status: u16 },

    #[error("Request to {target} failed: {message}")]
    Request { target: String, message: String },

    #[error("Failed to parse {target}: {message}")]
    Parse { target: String, message: String },

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl SourceError {
    pub fn parse(target: impl Into<String>, message: impl ToString) -> Self {
        SourceError::Parse {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<String>, err: impl ToString) -> Self {
        SourceError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<config::ValidationError> for EngineError {
    fn from(err: config::ValidationError) -> Self {
        EngineError::Config(err.to_string())
    }
}
