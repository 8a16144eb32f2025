//! # Bolt wire protocol
//!
//! Everything below the session layer:
//!
//! - [`packstream`] - the binary value encoding
//! - [`codec`] - chunked message framing for Tokio
//! - [`handshake`] - magic preamble and version negotiation
//! - [`message`] - request and response messages, per protocol version
//! - [`error`] - protocol error types
//!
//! Most callers want [`crate::driver`] instead.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;

pub use codec::{ChunkCodec, ClientCodec, ServerCodec};
pub use error::{BoltError, BoltResult, HandshakeError};
pub use handshake::{BoltVersion, VersionProposal, BOLT_MAGIC};
pub use message::{
    AccessMode, AuthToken, BeginMessage, BoltRequest, BoltResponse, FailureMessage, InitMessage,
    Notification, NotificationSeverity, QueryStats, RecordMessage, RunMessage, SuccessMessage,
};
pub use packstream::{PackStreamError, PackStreamStructure, PackStreamValue};
