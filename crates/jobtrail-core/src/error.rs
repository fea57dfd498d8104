use thiserror::Error;

/// Application-wide error types for jobtrail.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed with a non-success status or a client error.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The requested page no longer exists (HTTP 404/410).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// A page could not be parsed into the expected structure.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A snapshot was written for an ad that has no listing reference.
    #[error("Snapshot for ad {unique_ad_id} (posted {post_date}) has no listing reference")]
    OrphanSnapshot {
        unique_ad_id: String,
        post_date: chrono::NaiveDate,
    },

    /// Writing an export file failed.
    #[error("Export error: {0}")]
    ExportError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if the resource is gone for good and should be recorded as closed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}
