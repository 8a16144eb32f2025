//! Driver error types.

use std::io;
use thiserror::Error;

use super::failure::ServerFailure;
use crate::bolt::error::{BoltError, HandshakeError};

// ============================================================================
// DriverError
// ============================================================================

/// Errors surfaced by sessions, streams and pipelines.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The transport could not be established (refused, unreachable, timed out)
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// INIT/HELLO was refused
    #[error("Authentication error: {0}")]
    Authentication(ServerFailure),

    /// The channel is broken or closed; the session must reconnect
    #[error("Channel closed")]
    ChannelClosed,

    /// A message could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server rejected a statement or transaction control request
    #[error("Statement failed: {0}")]
    Statement(ServerFailure),

    /// Operation not permitted in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The server skipped the request because an earlier one in the batch failed
    #[error("Request ignored: {0}")]
    Ignored(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// The server failure behind this error, if any.
    pub fn server_failure(&self) -> Option<&ServerFailure> {
        match self {
            Self::Authentication(f) | Self::Statement(f) => Some(f),
            _ => None,
        }
    }

    /// Status code as sent by the server.
    pub fn status_code(&self) -> Option<&str> {
        self.server_failure().map(|f| f.code.as_str())
    }

    /// Whether an external retry policy may try the unit of work again.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout(_) => true,
            Self::Statement(f) => f.is_retryable(),
            _ => false,
        }
    }
}

impl From<BoltError> for DriverError {
    fn from(err: BoltError) -> Self {
        match err {
            BoltError::Io(e) => DriverError::Io(e),
            BoltError::Handshake(e) => DriverError::Handshake(e),
            BoltError::Connection(msg) => DriverError::Connect(msg),
            BoltError::Timeout => DriverError::Timeout("no response within the I/O timeout".to_string()),
            BoltError::ChannelClosed => DriverError::ChannelClosed,
            other @ (BoltError::PackStream(_)
            | BoltError::Decode(_)
            | BoltError::Encode(_)
            | BoltError::MessageTooLarge { .. }) => DriverError::Protocol(other.to_string()),
        }
    }
}

// ============================================================================
// Result Type
// ============================================================================

pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================
