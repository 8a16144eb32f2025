//! Handshake preamble construction and version selection.

use super::{BoltVersion, HandshakeError, VersionProposal, BOLT_MAGIC, HANDSHAKE_SIZE};

/// The bytes an HTTP server sends back when a Bolt client hits its port.
const HTTP_REPLY: [u8; 4] = *b"HTTP";

/// Build the 20-byte client preamble: magic followed by four proposal slots.
///
/// Unused slots are zero. More than four proposals is an error.
pub fn client_preamble(proposals: &[VersionProposal]) -> Result<[u8; HANDSHAKE_SIZE], HandshakeError> {
    if proposals.is_empty() || proposals.len() > 4 {
        return Err(HandshakeError::InvalidData(format!(
            "between 1 and 4 version proposals required, got {}",
            proposals.len()
        )));
    }
    let mut data = [0u8; HANDSHAKE_SIZE];
    data[..4].copy_from_slice(&BOLT_MAGIC);
    for (slot, proposal) in data[4..].chunks_exact_mut(4).zip(proposals) {
        slot.copy_from_slice(&proposal.to_bytes());
    }
    Ok(data)
}

/// Interpret the server's 4-byte reply against what we offered.
pub fn interpret_reply(
    reply: [u8; 4],
    proposals: &[VersionProposal],
) -> Result<BoltVersion, HandshakeError> {
    if reply == [0; 4] {
        return Err(HandshakeError::NoCompatibleVersion);
    }
    if reply == HTTP_REPLY {
        return Err(HandshakeError::InvalidData(
            "server replied with HTTP; the port is not a Bolt endpoint".to_string(),
        ));
    }
    BoltVersion::from_bytes(reply)
        .filter(|version| proposals.iter().any(|p| p.accepts(*version)))
        .ok_or(HandshakeError::UnexpectedVersion(u32::from_be_bytes(reply)))
}

/// Responder side of the handshake: picks the first client proposal it can serve.
///
/// Used by loopback servers; clients only need [`client_preamble`] and
/// [`interpret_reply`].
#[derive(Debug, Clone)]
pub struct VersionSelector {
    supported: Vec<BoltVersion>,
}

impl VersionSelector {
    pub fn new(supported: Vec<BoltVersion>) -> Self {
        Self { supported }
    }

    /// Validate a client preamble and choose a version.
    pub fn select(&self, preamble: &[u8]) -> Result<BoltVersion, HandshakeError> {
        if preamble.len() != HANDSHAKE_SIZE {
            return Err(HandshakeError::InvalidData(format!(
                "expected {} bytes, got {}",
                HANDSHAKE_SIZE,
                preamble.len()
            )));
        }
        let magic = [preamble[0], preamble[1], preamble[2], preamble[3]];
        if magic != BOLT_MAGIC {
            return Err(HandshakeError::InvalidMagic {
                expected: BOLT_MAGIC,
                received: magic,
            });
        }

        preamble[4..]
            .chunks_exact(4)
            .map(|slot| VersionProposal::from_bytes([slot[0], slot[1], slot[2], slot[3]]))
            .filter(|proposal| !proposal.is_empty())
            .find_map(|proposal| proposal.versions().find(|v| self.supported.contains(v)))
            .ok_or(HandshakeError::NoCompatibleVersion)
    }

    /// The 4-byte reply for a selection outcome; zero when nothing matched.
    pub fn reply(outcome: &Result<BoltVersion, HandshakeError>) -> [u8; 4] {
        match outcome {
            Ok(version) => version.to_bytes(),
            Err(_) => [0; 4],
        }
    }
}

impl Default for VersionSelector {
    fn default() -> Self {
        Self::new(BoltVersion::ALL.to_vec())
    }
}
