use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing user input. Raised before any remote call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A non-success answer from the cluster or job API, or a resource
    /// that entered an error state while being polled.
    #[error("remote operation failed: {message}")]
    RemoteOperation {
        /// HTTP status, when the failure came from a response.
        status: Option<u16>,
        message: String,
        /// Provider error payload, kept verbatim.
        detail: Option<serde_json::Value>,
    },

    #[error("transfer of {path} failed: {message}")]
    Transfer {
        path: String,
        message: String,
        retryable: bool,
    },

    #[error("resource not found: {0}")]
    ResourceAbsent(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("gave up waiting after {0:?}")]
    DeadlineExceeded(Duration),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// A failure reported in an HTTP response.
    pub fn remote(status: u16, message: impl Into<String>, detail: Option<serde_json::Value>) -> Self {
        Error::RemoteOperation {
            status: Some(status),
            message: message.into(),
            detail,
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Connection failures, timeouts, 5xx and 429 answers are transient;
    /// every other failure is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RemoteOperation {
                status: Some(status),
                ..
            } => *status == 429 || (500..600).contains(status),
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Transfer { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// The provider payload attached to a remote failure.
    pub fn detail(&self) -> Option<&serde_json::Value> {
        match self {
            Error::RemoteOperation { detail, .. } => detail.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        assert!(Error::remote(503, "unavailable", None).is_retryable());
        assert!(Error::remote(500, "internal", None).is_retryable());
        assert!(Error::remote(429, "slow down", None).is_retryable());
    }

    #[test]
    fn client_errors_are_terminal() {
        assert!(!Error::remote(400, "bad request", None).is_retryable());
        assert!(!Error::remote(403, "forbidden", None).is_retryable());
        assert!(!Error::validation("unknown machine type").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn error_state_without_status_is_terminal() {
        let err = Error::RemoteOperation {
            status: None,
            message: "cluster entered ERROR".into(),
            detail: Some(json!({"state": "ERROR"})),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.detail(), Some(&json!({"state": "ERROR"})));
    }

    #[test]
    fn transfer_carries_its_own_classification() {
        let transient = Error::Transfer {
            path: "a.txt".into(),
            message: "reset".into(),
            retryable: true,
        };
        let denied = Error::Transfer {
            path: "a.txt".into(),
            message: "access denied".into(),
            retryable: false,
        };
        assert!(transient.is_retryable());
        assert!(!denied.is_retryable());
    }
}
