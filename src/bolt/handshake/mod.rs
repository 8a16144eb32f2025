//! Bolt version negotiation.
//!
//! The client opens with the magic `60 60 B0 17` and four 4-byte version
//! proposals, preferred first. The server answers with the single version
//! it picked, or four zero bytes when none of them is acceptable.

mod negotiation;
mod version;

pub use negotiation::{client_preamble, interpret_reply, VersionSelector};
pub use version::{BoltVersion, VersionProposal};

pub use super::error::HandshakeError;

/// Identifies a Bolt connection.
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Client preamble: magic plus four proposals.
pub const HANDSHAKE_SIZE: usize = 20;

/// Server reply: the chosen version.
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;
