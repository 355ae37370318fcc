//! Error types for auditq
//!
//! Centralized error handling using thiserror. Audit failures have their own
//! type in [`crate::audit::AuditError`] because the engine turns them into data.

use thiserror::Error;

/// All error types that can abort an auditq operation
#[derive(Debug, Error)]
pub enum AuditqError {
    /// Target registry missing or unreadable
    #[error("Registry error: {0}")]
    Registry(String),

    /// Outcome store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type alias for auditq operations
pub type Result<T> = std::result::Result<T, AuditqError>;
