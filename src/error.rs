//! Error types for the Firebird wire client
//!
//! Every failure surfaces as one [`Error`]. [`Error::kind`] buckets errors into
//! the five categories callers act on; connection, protocol and timeout errors
//! are fatal to the session that raised them.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Broad error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failure, rejected handshake or failed attach
    Connection,
    /// Malformed or unexpected data from the server
    Protocol,
    /// Server-reported SQL error or invalid statement usage
    Statement,
    /// The operation was cancelled before it was sent
    Cancellation,
    /// A connect or statement timeout expired
    Timeout,
}

/// Error or warning reported by the server in a status vector
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerError {
    /// First gds code of the vector (0 for a pure warning)
    pub gds_code: u32,
    /// All gds/warning codes in order
    pub codes: Vec<u32>,
    /// String and number arguments in order
    pub arguments: Vec<String>,
    /// Five-character SQLSTATE, if the server sent one
    pub sql_state: Option<String>,
}

impl ServerError {
    /// Whether the vector reports a failure rather than only warnings
    pub fn is_error(&self) -> bool {
        self.gds_code != 0
    }

    /// Human-readable text built from the codes and their arguments
    pub fn message(&self) -> String {
        let mut parts: Vec<String> = self.codes.iter().map(|c| c.to_string()).collect();
        parts.extend(self.arguments.iter().cloned());
        parts.join("; ")
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql_state {
            Some(state) => write!(f, "[{}] {}", state, self.message()),
            None => write!(f, "{}", self.message()),
        }
    }
}

/// Main error type for the client
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Buffer underflow - not enough data to read
    #[error("buffer underflow: need {needed} bytes but only {available} available")]
    BufferUnderflow { needed: usize, available: usize },

    /// Operation code not understood in this position
    #[error("unexpected operation: {0}")]
    UnexpectedOperation(u32),

    /// General protocol error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Value does not fit its declared field
    #[error("field {index}: {message}")]
    FieldEncoding { index: usize, message: String },

    // =========================================================================
    // Connection Errors
    // =========================================================================
    /// Server rejected every offered protocol version
    #[error("connection rejected by server")]
    ConnectionRejected,

    /// Server accepted a protocol version that was not offered
    #[error("server selected unsupported protocol version {0}")]
    UnsupportedProtocolVersion(u32),

    /// Authentication plugin unknown or not allowed
    #[error("authentication plugin not supported: {0}")]
    UnsupportedAuthPlugin(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Wire encryption could not be negotiated
    #[error("wire encryption negotiation failed: {0}")]
    WireCrypt(String),

    /// Server error while connecting or attaching
    #[error("attach failed: {0}")]
    Attach(ServerError),

    /// Connection closed unexpectedly, or session already broken or closed
    #[error("connection closed")]
    ConnectionClosed,

    /// Connection timeout
    #[error("connection timeout after {0:?}")]
    ConnectionTimeout(Duration),

    /// Invalid connection string
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // =========================================================================
    // Statement Errors
    // =========================================================================
    /// Server-reported SQL error
    #[error("server error {}: {}", .0.gds_code, .0)]
    Server(ServerError),

    /// Operation not valid in the current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Transaction already committed or rolled back
    #[error("transaction is no longer active")]
    TransactionClosed,

    /// Requested positioning is not supported by the cursor strategy
    #[error("cursor operation not supported: {0}")]
    UnsupportedCursorOperation(String),

    // =========================================================================
    // Cancellation and Timeouts
    // =========================================================================
    /// Operation cancelled before being sent
    #[error("operation cancelled")]
    Cancelled,

    /// Statement timeout expired
    #[error("statement timeout after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BufferUnderflow { .. }
            | Error::UnexpectedOperation(_)
            | Error::Protocol(_) => ErrorKind::Protocol,
            Error::ConnectionRejected
            | Error::UnsupportedProtocolVersion(_)
            | Error::UnsupportedAuthPlugin(_)
            | Error::AuthenticationFailed(_)
            | Error::WireCrypt(_)
            | Error::Attach(_)
            | Error::ConnectionClosed
            | Error::InvalidConnectionString(_)
            | Error::Io(_) => ErrorKind::Connection,
            Error::ConnectionTimeout(_) | Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancellation,
            Error::FieldEncoding { .. }
            | Error::Server(_)
            | Error::InvalidState(_)
            | Error::TransactionClosed
            | Error::UnsupportedCursorOperation(_) => ErrorKind::Statement,
        }
    }

    /// Check if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    /// Whether the session that raised this error can no longer be used
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection | ErrorKind::Protocol | ErrorKind::Timeout
        )
    }

    /// Server gds code, if this is a server-reported error
    pub fn gds_code(&self) -> Option<u32> {
        match self {
            Error::Server(e) | Error::Attach(e) => Some(e.gds_code),
            _ => None,
        }
    }

    /// SQLSTATE, if the server reported one
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Error::Server(e) | Error::Attach(e) => e.sql_state.as_deref(),
            _ => None,
        }
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}
