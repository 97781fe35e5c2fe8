//! Shared error taxonomy used across every crate in the workspace.

use thiserror::Error;

/// The kernel's shared error type. Crate-specific subsystems (history,
/// registry, sandbox, dispatch) define their own narrower error enums and
/// convert into this one at the boundary where they hand control back to a
/// caller outside the subsystem.
#[derive(Debug, Error)]
pub enum AskrError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AskrError>;
