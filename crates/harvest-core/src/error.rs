use thiserror::Error;

use crate::resource::Stage;

/// Application-wide error types for harvest.
#[derive(Error, Debug)]
pub enum AppError {
    /// Conflicting or invalid invocation options. Fatal before any work starts.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A plugin's discovery stage failed. Fatal for that scraper's run only.
    #[error("Scrape failed: {0}")]
    ScrapeError(String),

    /// HTTP request failed (retrieving resource content).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Object storage operation failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stage was marked successful while an earlier stage was not.
    ///
    /// This is a programming-defect signal, never expected in correct
    /// operation; the offending resource's processing is aborted loudly.
    #[error("State violation for {scraper}/{url}: {stage} success without prerequisite")]
    StateViolation {
        scraper: String,
        url: String,
        stage: Stage,
    },

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying on a
    /// future `--resume` / `--resume-upload` invocation.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::StorageError(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}
