use thiserror::Error;

/// Application-wide error types for crawlq.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed crawl request, rejected before anything is enqueued.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Unknown or evicted job identifier.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// A second outcome write was attempted for the same job.
    #[error("Outcome already written for job {0}")]
    OutcomeAlreadyWritten(String),

    /// HTTP request failed (fetching a page).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The renderer could not produce a page.
    #[error("Render error: {0}")]
    RenderError(String),

    /// An extraction expression could not be evaluated.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Page load exceeded the configured maximum.
    #[error("Page load timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Queue store unreachable or a query failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::DatabaseError(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true for failures that happen while executing a job.
    ///
    /// These are captured into the job's outcome instead of being propagated.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_)
                | AppError::RenderError(_)
                | AppError::ExtractionError(_)
                | AppError::Timeout(_)
                | AppError::NetworkError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::DatabaseError("connection refused".into()).is_retryable());
        assert!(AppError::HttpError("connect failed".into()).is_retryable());
        assert!(!AppError::ValidationError("no urls".into()).is_retryable());
        assert!(!AppError::NotFound("abc".into()).is_retryable());
    }

    #[test]
    fn test_execution_failures() {
        assert!(AppError::RenderError("crashed".into()).is_execution_failure());
        assert!(AppError::Timeout(30).is_execution_failure());
        assert!(!AppError::DatabaseError("down".into()).is_execution_failure());
        assert!(!AppError::ValidationError("bad".into()).is_execution_failure());
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(
            AppError::Timeout(30).to_string(),
            "Page load timed out after 30 seconds"
        );
    }
}
