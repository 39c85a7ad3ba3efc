//! Error types for mikrohosts.

use thiserror::Error;

/// Failure of a single source fetch.
///
/// Every variant is recoverable: the aggregator turns it into a provenance
/// comment and moves on to the next source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid source URI: {0}")]
    InvalidUri(String),

    #[error("Protocol \"{0}\" is not allowed")]
    ProtocolNotAllowed(String),

    #[error("{0}")]
    Transport(String),

    #[error("The file is too big (detected by {detected_by}, limit: {limit_kib} KiB)")]
    TooLarge {
        detected_by: &'static str,
        limit_kib: u64,
    },

    #[error("Invalid content type header ({0})")]
    InvalidContentType(String),

    #[error("Empty response body")]
    EmptyBody,
}

/// Cache backend failure. Callers treat every variant as a cache miss.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Empty cache key")]
    EmptyKey,

    #[error("Empty cache value")]
    EmptyValue,

    #[error("Cache unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    #[error("Corrupted cache entry: {0}")]
    Corrupted(#[from] serde_json::Error),
}

/// Caller input rejected at the request boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid '{field}': {constraint}")]
pub struct ValidationError {
    pub field: &'static str,
    pub constraint: String,
}

impl ValidationError {
    pub fn new(field: &'static str, constraint: impl Into<String>) -> Self {
        Self {
            field,
            constraint: constraint.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_messages() {
        let err = FetchError::TooLarge {
            detected_by: "header \"Content-Length\"",
            limit_kib: 2048,
        };
        assert_eq!(
            err.to_string(),
            "The file is too big (detected by header \"Content-Length\", limit: 2048 KiB)"
        );
        assert_eq!(
            FetchError::InvalidContentType("text/html".to_string()).to_string(),
            "Invalid content type header (text/html)"
        );
        assert_eq!(
            FetchError::Transport("HTTP 404 Not Found".to_string()).to_string(),
            "HTTP 404 Not Found"
        );
    }

    #[test]
    fn test_validation_error_names_field() {
        let err = ValidationError::new("limit", "must be at least 1");
        assert_eq!(err.field, "limit");
        assert_eq!(err.to_string(), "Invalid 'limit': must be at least 1");
    }

    #[test]
    fn test_cache_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CacheError = io.into();
        assert!(matches!(err, CacheError::Unavailable(_)));
        assert!(err.to_string().contains("denied"));
    }
}
