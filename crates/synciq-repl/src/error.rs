//! Error types for the replication orchestration layer.

use std::time::Duration;

use synciq_transport::ApiError;
use thiserror::Error;

/// Errors returned by orchestration operations.
#[derive(Debug, Error)]
pub enum ReplError {
    /// An accessor call failed. Propagated verbatim and never retried.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// An object required by the operation does not exist on the array.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Object kind, e.g. "target policy".
        kind: &'static str,
        /// Name or id that was looked up.
        name: String,
    },

    /// The awaited condition was not observed before the poll deadline.
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout {
        /// Description of the awaited condition.
        what: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// The caller withdrew interest before the operation completed.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("configuration error: {msg}")]
    Config {
        /// Error message describing the issue.
        msg: String,
    },
}

impl ReplError {
    /// Returns true if the poll deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReplError::Timeout { .. })
    }

    /// Returns true if the caller's cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReplError::Cancelled)
    }
}

/// Result alias for orchestration operations.
pub type Result<T> = std::result::Result<T, ReplError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinguishable() {
        let timeout = ReplError::Timeout {
            what: "writes_enabled".to_string(),
            timeout: Duration::from_secs(600),
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_cancelled());

        assert!(ReplError::Cancelled.is_cancelled());
        assert!(!ReplError::Cancelled.is_timeout());

        let api: ReplError = ApiError::NotFound {
            kind: "report",
            name: "r1".to_string(),
        }
        .into();
        assert!(!api.is_timeout());
        assert!(!api.is_cancelled());
    }

    #[test]
    fn test_api_error_passes_through() {
        let err: ReplError = ApiError::Status {
            path: "/platform/11/sync/jobs".to_string(),
            status: 500,
            message: "internal".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "array returned 500 for /platform/11/sync/jobs: internal"
        );
    }
}
