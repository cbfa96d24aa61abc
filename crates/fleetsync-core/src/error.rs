// ── Core error types ──
//
// Consumers never see WebSocket frames or HTTP status codes directly.
// Command-level failures collapse into `CommandError`, the three outcomes a
// control caller has to handle; everything else is a `CoreError`.

use std::time::Duration;

use thiserror::Error;

/// Failure outcome of a single command, identical regardless of which
/// transport served it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Sent, but no matching response arrived in time.
    #[error("Command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Channel not open and no fallback succeeded, or the channel dropped
    /// while the command was outstanding.
    #[error("Transport unavailable: {reason}")]
    TransportUnavailable { reason: String },

    /// The remote explicitly refused the command.
    #[error("Command rejected by remote: {reason}")]
    RemoteRejected { reason: String },
}

impl CommandError {
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            reason: reason.into(),
        }
    }

    /// Timeouts may be retried at the caller's discretion; rejections and
    /// transport failures are not worth an immediate retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<fleetsync_api::Error> for CommandError {
    fn from(err: fleetsync_api::Error) -> Self {
        match err {
            fleetsync_api::Error::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            fleetsync_api::Error::Rejected { reason } => Self::RemoteRejected { reason },
            fleetsync_api::Error::Http { status, message } if (400..500).contains(&status) => {
                Self::RemoteRejected {
                    reason: format!("HTTP {status}: {message}"),
                }
            }
            other => Self::TransportUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<fleetsync_api::Error> for CoreError {
    fn from(err: fleetsync_api::Error) -> Self {
        match err {
            fleetsync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            fleetsync_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS setup failed: {msg}"),
            },
            fleetsync_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            other => CoreError::Internal(other.to_string()),
        }
    }
}
