//! PackStream, the binary value format carried inside Bolt messages.
//!
//! Scalars (null, booleans, 64-bit integers and floats), byte arrays,
//! UTF-8 strings, lists, string-keyed maps and tagged structures. Messages
//! themselves are structures; so are graph, temporal and spatial values.

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod types;

pub use decoder::{decode, PackStreamDecoder, MAX_DEPTH};
pub use encoder::{encode, PackStreamEncoder};
pub use types::{PackStreamStructure, PackStreamValue};

use std::fmt;

/// PackStream errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamError {
    /// Input ended in the middle of a value
    UnexpectedEof,
    /// Marker byte not defined by PackStream
    UnknownMarker(u8),
    /// String bytes were not valid UTF-8
    InvalidUtf8(String),
    /// Map key was not a string
    InvalidMapKey,
    /// Collection or structure too large for its size field
    ValueTooLarge(&'static str, usize),
    /// Bytes left over after a complete value
    TrailingBytes(usize),
    /// Structure with the wrong shape for its tag
    InvalidStructure(String),
    /// Containers nested deeper than the decoder accepts
    TooDeep(usize),
}

impl fmt::Display for PackStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackStreamError::UnexpectedEof => write!(f, "Unexpected end of PackStream data"),
            PackStreamError::UnknownMarker(m) => write!(f, "Unknown PackStream marker: 0x{:02X}", m),
            PackStreamError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            PackStreamError::InvalidMapKey => write!(f, "Map keys must be strings"),
            PackStreamError::ValueTooLarge(kind, len) => write!(f, "{} too large: {}", kind, len),
            PackStreamError::TrailingBytes(n) => write!(f, "{} trailing bytes after value", n),
            PackStreamError::InvalidStructure(msg) => write!(f, "Invalid structure: {}", msg),
            PackStreamError::TooDeep(max) => write!(f, "Containers nested deeper than {} levels", max),
        }
    }
}

impl std::error::Error for PackStreamError {}
