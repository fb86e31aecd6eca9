//! Backend error types.
//!
//! Collections are created lazily by the write path, so a missing collection is
//! reported as its own variant and callers decide whether it is a failure.

use std::fmt;

/// Errors that can occur while querying the document search engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The queried collection (index) does not exist yet.
    #[error("Collection not found: {collection}")]
    CollectionNotFound {
        /// Name of the missing collection.
        collection: String,
    },

    /// The search engine rejected or failed to execute the query.
    #[error("Query error: {message}")]
    QueryError {
        /// Description of the failure as reported by the engine.
        message: String,
    },

    /// The search engine could not be reached.
    #[error("Backend unavailable: {message}")]
    Unavailable {
        /// Description of the transport failure.
        message: String,
    },

    /// An internal error occurred while talking to the backend.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl BackendError {
    /// Creates a new `CollectionNotFound` error.
    #[must_use]
    pub fn collection_not_found(collection: impl Into<String>) -> Self {
        Self::CollectionNotFound {
            collection: collection.into(),
        }
    }

    /// Creates a new `QueryError` error.
    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::QueryError {
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the error signals a collection that does not exist yet.
    #[must_use]
    pub fn is_collection_not_found(&self) -> bool {
        matches!(self, Self::CollectionNotFound { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CollectionNotFound { .. } => ErrorCategory::NotFound,
            Self::QueryError { .. } => ErrorCategory::Query,
            Self::Unavailable { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of backend errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Collection does not exist.
    NotFound,
    /// Query rejected by the engine.
    Query,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Query => write!(f, "query"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackendError::collection_not_found("patient");
        assert_eq!(err.to_string(), "Collection not found: patient");

        let err = BackendError::query("failed to parse query");
        assert_eq!(err.to_string(), "Query error: failed to parse query");

        let err = BackendError::unavailable("connection refused");
        assert_eq!(err.to_string(), "Backend unavailable: connection refused");
    }

    #[test]
    fn test_error_predicates() {
        assert!(BackendError::collection_not_found("patient").is_collection_not_found());
        assert!(!BackendError::query("boom").is_collection_not_found());
        assert!(!BackendError::unavailable("down").is_collection_not_found());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            BackendError::collection_not_found("patient").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(BackendError::query("x").category(), ErrorCategory::Query);
        assert_eq!(
            BackendError::unavailable("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
