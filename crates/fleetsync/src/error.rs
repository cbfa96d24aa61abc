//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use fleetsync_config::ConfigError;
use fleetsync_core::{CommandError, CoreError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Fleet server unavailable: {reason}")]
    #[diagnostic(
        code(fleetsync::unavailable),
        help(
            "Check that the fleet server is running and the channel URL is right.\n\
             Set --rest-url (or rest_url in your profile) to fall back to HTTP."
        )
    )]
    Unavailable { reason: String },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Command timed out after {timeout_ms} ms")]
    #[diagnostic(
        code(fleetsync::timeout),
        help("Increase the timeout with --timeout or check the robot's responsiveness.")
    )]
    Timeout { timeout_ms: u64 },

    #[error("Command rejected: {reason}")]
    #[diagnostic(code(fleetsync::rejected))]
    Rejected { reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fleetsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fleetsync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: fleetsync config add {name} --channel-url ws://HOST:8765/"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(fleetsync::config))]
    Config(Box<ConfigError>),

    #[error("Keyring access failed: {reason}")]
    #[diagnostic(
        code(fleetsync::keyring),
        help("Set token_env on the profile or pass --token instead.")
    )]
    Keyring { reason: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(fleetsync::internal))]
    Internal { message: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(fleetsync::json), help("Pass --params as a JSON object."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unavailable { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Error mapping ────────────────────────────────────────────────────

impl From<CommandError> for CliError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Timeout { timeout_ms } => CliError::Timeout { timeout_ms },
            CommandError::TransportUnavailable { reason } => CliError::Unavailable { reason },
            CommandError::RemoteRejected { reason } => CliError::Rejected { reason },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::Unavailable {
                reason: format!("{url}: {reason}"),
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Command(err) => err.into(),
            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}
