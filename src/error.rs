//! Error taxonomy shared by every component (spec §7).
//!
//! A single [`BrokerError`] enum crosses all module boundaries. The
//! dispatcher is the one place that turns a `BrokerError` into a JSON-RPC
//! error body; every other module just returns `Result<_, BrokerError>`.

use thiserror::Error;

/// One of the `kind` values the wire protocol puts in `error.data.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseError,
    NotFound,
    InvalidArgument,
    NoMatchingProfile,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ParseError => "parse_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NoMatchingProfile => "no_matching_profile",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    /// A single profile file failed to parse. Isolated to that file; never
    /// aborts reload of siblings (spec §4.1, §7).
    #[error("failed to parse profile {path}: {reason}")]
    ProfileParse { path: String, reason: String },

    /// Referenced profile name / tag / capability does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or ill-typed tool argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Router produced no winner and no fallback profile exists.
    #[error("no profile matched the prompt and no fallback is configured")]
    NoMatchingProfile,

    /// A tool call exceeded its per-tool timeout budget (spec §5).
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Unexpected internal failure (I/O, serialization, poisoned lock, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::ProfileParse { .. } => ErrorKind::ParseError,
            BrokerError::NotFound(_) => ErrorKind::NotFound,
            BrokerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            BrokerError::NoMatchingProfile => ErrorKind::NoMatchingProfile,
            BrokerError::Timeout(_) => ErrorKind::Timeout,
            BrokerError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self {
        BrokerError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        BrokerError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
