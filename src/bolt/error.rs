//! Wire-level error types.

use std::fmt;
use std::io;

use super::packstream::PackStreamError;

/// Result type for wire-level operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Errors raised below the session layer: transport, framing, encoding.
#[derive(Debug)]
pub enum BoltError {
    /// Transport read/write failure
    Io(io::Error),
    /// Version negotiation failed
    Handshake(HandshakeError),
    /// Malformed PackStream bytes, or a value too large to encode
    PackStream(PackStreamError),
    /// Well-formed PackStream that is not a valid message
    Decode(String),
    /// Message the negotiated protocol version cannot carry
    Encode(String),
    /// Could not establish the transport
    Connection(String),
    /// Message exceeded the configured size limit
    MessageTooLarge { size: usize, max: usize },
    /// An I/O deadline expired
    Timeout,
    /// Channel is broken or closed; no I/O was attempted
    ChannelClosed,
}

impl fmt::Display for BoltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoltError::Io(e) => write!(f, "I/O error: {}", e),
            BoltError::Handshake(e) => write!(f, "Handshake error: {}", e),
            BoltError::PackStream(e) => write!(f, "PackStream error: {}", e),
            BoltError::Decode(msg) => write!(f, "Decode error: {}", msg),
            BoltError::Encode(msg) => write!(f, "Encode error: {}", msg),
            BoltError::Connection(msg) => write!(f, "Connection error: {}", msg),
            BoltError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max: {})", size, max)
            }
            BoltError::Timeout => write!(f, "Operation timed out"),
            BoltError::ChannelClosed => write!(f, "Channel closed"),
        }
    }
}

impl BoltError {
    /// Whether this error leaves the byte stream in an unknown position.
    ///
    /// Encoding failures happen before anything is written and are not fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BoltError::Encode(_) | BoltError::Handshake(_))
            && !matches!(self, BoltError::PackStream(PackStreamError::ValueTooLarge(..)))
    }
}

impl std::error::Error for BoltError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BoltError::Io(e) => Some(e),
            BoltError::Handshake(e) => Some(e),
            BoltError::PackStream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BoltError {
    fn from(err: io::Error) -> Self {
        BoltError::Io(err)
    }
}

impl From<HandshakeError> for BoltError {
    fn from(err: HandshakeError) -> Self {
        BoltError::Handshake(err)
    }
}

impl From<PackStreamError> for BoltError {
    fn from(err: PackStreamError) -> Self {
        BoltError::PackStream(err)
    }
}

/// Handshake-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Preamble did not start with the Bolt magic
    InvalidMagic { expected: [u8; 4], received: [u8; 4] },
    /// Server answered with zero: none of our proposals is acceptable
    NoCompatibleVersion,
    /// Server chose a version we never proposed
    UnexpectedVersion(u32),
    /// Reply was not a version at all
    InvalidData(String),
    /// Transport closed before the reply arrived
    ConnectionClosed,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidMagic { expected, received } => write!(
                f,
                "Invalid magic number: expected {:02X?}, received {:02X?}",
                expected, received
            ),
            HandshakeError::NoCompatibleVersion => {
                write!(f, "No compatible protocol version found")
            }
            HandshakeError::UnexpectedVersion(raw) => {
                write!(f, "Server selected a version that was not proposed: 0x{:08X}", raw)
            }
            HandshakeError::InvalidData(msg) => write!(f, "Invalid handshake data: {}", msg),
            HandshakeError::ConnectionClosed => write!(f, "Connection closed during handshake"),
        }
    }
}

impl std::error::Error for HandshakeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_errors_render() {
        assert!(HandshakeError::NoCompatibleVersion.to_string().contains("No compatible"));
        assert!(HandshakeError::UnexpectedVersion(0x0000_0105)
            .to_string()
            .contains("0x00000105"));
    }

    #[test]
    fn test_encode_failures_are_not_fatal() {
        assert!(!BoltError::Encode("BEGIN".into()).is_fatal());
        assert!(!BoltError::PackStream(PackStreamError::ValueTooLarge("map", 1)).is_fatal());
        assert!(BoltError::PackStream(PackStreamError::UnexpectedEof).is_fatal());
        assert!(BoltError::Timeout.is_fatal());
        let io_err: BoltError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(io_err.is_fatal());
    }
}
