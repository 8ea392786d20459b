//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// The API rejected the subscription key (HTTP 401/403). Fatal.
    #[error("EDINET API rejected the subscription key (HTTP {status}): {message}")]
    Auth {
        /// HTTP or embedded API status code
        status: u16,
        /// Message returned by the API
        message: String,
    },

    /// No subscription key was configured. Fatal.
    #[error("APIKEY is not set; export it or add it to .env")]
    MissingApiKey,

    /// Timeout, connection failure, 429 or 5xx. Retryable.
    #[error("Transient network error for {url}: {reason}")]
    TransientNetwork {
        /// Request URL without the subscription key
        url: String,
        /// What went wrong
        reason: String,
    },

    /// The payload could not be decoded.
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse {
        /// Request URL without the subscription key
        url: String,
        /// Decoder message
        reason: String,
    },

    /// Non-retryable HTTP status other than auth failures.
    #[error("HTTP {status} for {url}")]
    Http {
        /// Request URL without the subscription key
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Requested resource does not exist upstream.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Client construction error
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// Database error
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Invalid date range
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start date of the range
        start: String,
        /// End date of the range
        end: String,
    },

    /// Invalid filer code
    #[error("Invalid filer code: {0} (expected E followed by 5 digits)")]
    InvalidFilerCode(String),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Classify a non-success status returned by the API.
    ///
    /// | Status | Error |
    /// |--------|-------|
    /// | 401, 403 | `Auth` |
    /// | 404 | `NotFound` |
    /// | 408, 429, 5xx | `TransientNetwork` |
    /// | other | `Http` |
    pub fn from_status(status: u16, url: &str, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::Auth {
                status,
                message: message.into(),
            },
            404 => Self::NotFound(url.to_string()),
            408 | 429 | 500..=599 => Self::TransientNetwork {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            },
            _ => Self::Http {
                url: url.to_string(),
                status,
            },
        }
    }

    /// Whether retrying the same request may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }

    /// Whether the error must stop the whole run.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::MissingApiKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let auth = DataError::Auth {
            status: 401,
            message: "invalid key".to_string(),
        };
        assert!(auth.is_fatal());
        assert!(!auth.is_transient());

        let transient = DataError::TransientNetwork {
            url: "https://example.com".to_string(),
            reason: "timeout".to_string(),
        };
        assert!(transient.is_transient());
        assert!(!transient.is_fatal());

        let malformed = DataError::MalformedResponse {
            url: "https://example.com".to_string(),
            reason: "expected value".to_string(),
        };
        assert!(!malformed.is_transient());
        assert!(!malformed.is_fatal());
    }

    #[test]
    fn test_from_status() {
        let url = "https://api.example/documents.json";
        assert!(DataError::from_status(401, url, "denied").is_fatal());
        assert!(DataError::from_status(403, url, "denied").is_fatal());
        assert!(DataError::from_status(503, url, "").is_transient());
        assert!(DataError::from_status(429, url, "").is_transient());
        assert!(matches!(
            DataError::from_status(404, url, ""),
            DataError::NotFound(_)
        ));
        assert!(matches!(
            DataError::from_status(400, url, ""),
            DataError::Http { status: 400, .. }
        ));
    }
}
