//! Error types for directory operations.
//!
//! Connection and bind problems are deliberately *not* part of this taxonomy:
//! they are reported through boolean status values so callers can present
//! their own fallback messaging. The variants here cover configuration
//! problems, directory-server failures, and logic invariant violations.

use thiserror::Error;

/// Main error type for posixdir operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration could not be parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// A distinguished name failed to parse
    #[error("Invalid distinguished name: {0}")]
    InvalidDn(String),

    /// The server terminated the session mid-operation
    #[error("Session terminated by server: {0}")]
    SessionTerminated(String),

    /// The directory server rejected an operation with a result code
    #[error("Directory operation failed: code {code}: {message}")]
    Directory {
        /// LDAP result code returned by the server
        code: u32,
        /// Diagnostic message returned by the server
        message: String,
    },

    /// Transport-level failure talking to the directory server
    #[error("Transport error: {0}")]
    Transport(String),

    /// A lookup expected at most one entry but matched several
    #[error("Ambiguous lookup: {attribute}={value} matched {count} entries")]
    TooManyResults {
        /// Attribute the lookup filtered on
        attribute: String,
        /// Value the lookup filtered on
        value: String,
        /// Number of entries the directory returned
        count: usize,
    },

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// No bound connection is available
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Specialized result type for posixdir operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidDn(_) => "INVALID_DN",
            Self::SessionTerminated(_) => "SESSION_TERMINATED",
            Self::Directory { .. } => "DIRECTORY_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::TooManyResults { .. } => "TOO_MANY_RESULTS",
            Self::Timeout(_) => "TIMEOUT",
            Self::Unavailable(_) => "UNAVAILABLE",
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Transport(_) | Self::Directory { .. }
        )
    }

    /// Returns true if the failure is the transient disconnect class that the
    /// query engine recovers from with a single reconnect.
    #[must_use]
    pub const fn is_session_terminated(&self) -> bool {
        matches!(self, Self::SessionTerminated(_))
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Config(err.to_string())
    }
}
