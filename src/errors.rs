//! Error types for the PotterBuddy answer pipeline
//!
//! Every failure carries an [`ErrorKind`] so callers can decide whether to
//! retry, degrade, or show a fallback message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rag::lifecycle::RequestState;

/// Coarse classification of pipeline failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidQuery,
    RetrievalUnavailable,
    NoResults,
    GenerationUnavailable,
    EmptyGeneration,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidQuery => "invalid_query",
            ErrorKind::RetrievalUnavailable => "retrieval_unavailable",
            ErrorKind::NoResults => "no_results",
            ErrorKind::GenerationUnavailable => "generation_unavailable",
            ErrorKind::EmptyGeneration => "empty_generation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Main error type for the answer pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Query rejected before any external call
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Chunk store or embedder unreachable
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// No candidate passed the relevance threshold
    #[error("No sufficiently relevant passages found")]
    NoResults,

    /// Generator unreachable or returned an error
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// Generator returned nothing usable
    #[error("Generator returned an empty response")]
    EmptyGeneration,

    /// External call exceeded its deadline
    #[error("{stage:?} timed out after {duration_ms}ms")]
    Timeout {
        stage: RequestState,
        duration_ms: u64,
    },

    /// Caller abandoned the request
    #[error("Request cancelled during {stage:?}")]
    Cancelled { stage: RequestState },

    /// Lifecycle transition errors
    #[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic errors with context
    #[error("Pipeline error: {0}")]
    Generic(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            PipelineError::RetrievalUnavailable(_) => ErrorKind::RetrievalUnavailable,
            PipelineError::NoResults => ErrorKind::NoResults,
            PipelineError::GenerationUnavailable(_) => ErrorKind::GenerationUnavailable,
            PipelineError::EmptyGeneration => ErrorKind::EmptyGeneration,
            PipelineError::Timeout { .. } => ErrorKind::Timeout,
            PipelineError::Cancelled { .. } => ErrorKind::Cancelled,
            PipelineError::InvalidTransition { .. }
            | PipelineError::ConfigError(_)
            | PipelineError::HttpError(_)
            | PipelineError::SerializationError(_)
            | PipelineError::IoError(_)
            | PipelineError::Generic(_) => ErrorKind::Internal,
        }
    }

    /// Whether a caller may reasonably try the same request again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RetrievalUnavailable | ErrorKind::GenerationUnavailable | ErrorKind::Timeout
        )
    }
}

/// Convert anyhow errors to PipelineError
impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Generic(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Timeout {
            stage: RequestState::Generating,
            duration_ms: 4500,
        };
        assert!(err.to_string().contains("Generating"));
        assert!(err.to_string().contains("4500"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(PipelineError::NoResults.kind(), ErrorKind::NoResults);
        assert_eq!(PipelineError::EmptyGeneration.kind(), ErrorKind::EmptyGeneration);
        assert_eq!(
            PipelineError::ConfigError("bad".to_string()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::RetrievalUnavailable("down".to_string()).is_retryable());
        assert!(PipelineError::GenerationUnavailable("503".to_string()).is_retryable());
        assert!(PipelineError::Timeout {
            stage: RequestState::Retrieving,
            duration_ms: 10
        }
        .is_retryable());
        assert!(!PipelineError::NoResults.is_retryable());
        assert!(!PipelineError::EmptyGeneration.is_retryable());
        assert!(!PipelineError::Cancelled {
            stage: RequestState::Generating
        }
        .is_retryable());
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let err: PipelineError = anyhow::anyhow!("root cause").context("outer").into();
        let text = err.to_string();
        assert!(text.contains("outer"));
        assert!(text.contains("root cause"));
    }
}
