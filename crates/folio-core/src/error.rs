//! Error types for folio-core

use thiserror::Error;

/// Result type alias using folio-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in folio-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Connection-level failure reaching the remote service
    #[error("Network error: {0}")]
    Network(String),

    /// A remote call exceeded its timeout
    #[error("Request timed out")]
    Timeout,

    /// The sync credential was rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The remote service answered with a non-success status
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Message parsed from the response body
        message: String,
    },

    /// Structural misconfiguration of the remote backend (e.g. an access
    /// policy that denies every read). Distinct from transient failures;
    /// the gateway degrades instead of propagating it.
    #[error("Backend configuration error: {0}")]
    BackendConfiguration(String),

    /// Local data that cannot be serialized or applied
    #[error("Validation error: {0}")]
    Validation(String),

    /// Local persistent store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_display_includes_status() {
        let err = Error::Server {
            status: 503,
            message: "policy check failed".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("503"));
        assert!(rendered.contains("policy check failed"));
    }

    #[test]
    fn timeout_display() {
        assert_eq!(Error::Timeout.to_string(), "Request timed out");
    }
}
