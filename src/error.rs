//! Error types used by the roomvisor runtime and its collaborators.
//!
//! - [`LookupError`]: the channel lookup collaborator could not resolve a name.
//! - [`SessionError`]: one session attempt ended with a failure; carries the
//!   close-code classification the channel supervisor needs to pick a retry track.
//! - [`StoreError`]: the storage collaborator failed.
//! - [`OrchestratorError`]: an orchestrator operation could not be completed.
//!
//! All types provide `as_label` (stable snake_case, for logs) in the same manner.

use std::fmt;

use thiserror::Error;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// No close frame was received (connection dropped).
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Internal error; also used for closures synthesized after keepalive failures.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Upstream "server is restarting, reconnect later" code.
pub const CLOSE_SERVER_RESTART: u16 = 4200;

/// Failure to resolve a channel into a session identifier.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Upstream reports the channel does not exist.
    #[error("channel '{channel}' not found")]
    NotFound { channel: String },

    /// Request was rejected (e.g. bot protection).
    #[error("lookup blocked for channel '{channel}'")]
    Blocked { channel: String },

    /// Response could not be decoded or lacks the session identifier.
    #[error("invalid lookup response: {reason}")]
    InvalidResponse { reason: String },

    /// Request did not complete in time.
    #[error("lookup timed out")]
    Timeout,

    /// Any other HTTP status.
    #[error("unexpected lookup status {status}")]
    UnexpectedStatus { status: u16 },

    /// Request could not be sent at all.
    #[error("lookup transport error: {reason}")]
    Transport { reason: String },
}

impl LookupError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LookupError::NotFound { .. } => "lookup_not_found",
            LookupError::Blocked { .. } => "lookup_blocked",
            LookupError::InvalidResponse { .. } => "lookup_invalid_response",
            LookupError::Timeout => "lookup_timeout",
            LookupError::UnexpectedStatus { .. } => "lookup_unexpected_status",
            LookupError::Transport { .. } => "lookup_transport",
        }
    }
}

/// A wire-level connection closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    /// Close code (RFC 6455 or upstream-specific).
    pub code: u16,
    /// Close reason, possibly empty.
    pub reason: String,
}

impl Closure {
    /// Creates a closure with the given code and reason.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Closure synthesized when the keepalive gave up.
    pub fn keepalive(code: u16) -> Self {
        Self::new(code, "ping timeout")
    }

    /// Stream ended without a close frame.
    pub fn abnormal() -> Self {
        Self::new(CLOSE_ABNORMAL, "connection dropped")
    }

    /// Returns `true` if `code` belongs to the severe set.
    pub fn is_severe(&self, severe_codes: &[u16]) -> bool {
        severe_codes.contains(&self.code)
    }
}

impl fmt::Display for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "code {}", self.code)
        } else {
            write!(f, "code {} ({})", self.code, self.reason)
        }
    }
}

/// Retry track a session failure is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Closure with a severe code: server restart or keepalive timeout.
    SevereClosure,
    /// Everything else, ordinary closures included.
    Generic,
}

impl FailureClass {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            FailureClass::SevereClosure => "connection",
            FailureClass::Generic => "generic",
        }
    }
}

/// # Errors that end one session attempt.
///
/// Per-message problems (decode failures, storage failures) never surface here;
/// the session loop logs and swallows them.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SessionError {
    /// The channel could not be resolved; no connection was attempted.
    #[error("resolution failed: {0}")]
    Lookup(#[from] LookupError),

    /// The transport could not be opened.
    #[error("connect failed: {reason}")]
    Connect { reason: String },

    /// The connection was closed (by the peer, the network, or the keepalive).
    #[error("connection closed: {0}")]
    Closed(Closure),

    /// Protocol violation on our side (e.g. the subscribe frame could not be encoded).
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// Transport-level I/O failure that is not a closure.
    #[error("transport error: {reason}")]
    Io { reason: String },
}

impl SessionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SessionError::Lookup(_) => "session_lookup",
            SessionError::Connect { .. } => "session_connect",
            SessionError::Closed(_) => "session_closed",
            SessionError::Protocol { .. } => "session_protocol",
            SessionError::Io { .. } => "session_io",
        }
    }

    /// Close code, if this failure is a closure.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            SessionError::Closed(c) => Some(c.code),
            _ => None,
        }
    }

    /// Selects the retry track for this failure.
    pub fn classify(&self, severe_codes: &[u16]) -> FailureClass {
        match self {
            SessionError::Closed(c) if c.is_severe(severe_codes) => FailureClass::SevereClosure,
            _ => FailureClass::Generic,
        }
    }
}

/// Errors produced by the storage collaborator.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "store_database",
            StoreError::NotFound(_) => "store_not_found",
            StoreError::Serialization(_) => "store_serialization",
            StoreError::Io(_) => "store_io",
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Errors raised by [`Orchestrator`](crate::Orchestrator) operations.
///
/// "Already in the desired state" is never an error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Name is empty after sanitisation.
    #[error("invalid channel name {raw:?}")]
    InvalidName { raw: String },

    /// The storage collaborator failed.
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// The lookup collaborator rejected the channel.
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// `shutdown` has begun; no new supervision is accepted.
    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

impl OrchestratorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            OrchestratorError::InvalidName { .. } => "invalid_name",
            OrchestratorError::Storage(e) => e.as_label(),
            OrchestratorError::Lookup(e) => e.as_label(),
            OrchestratorError::ShuttingDown => "shutting_down",
        }
    }
}
