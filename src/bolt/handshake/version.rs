//! Bolt protocol versions and handshake proposals.

use std::cmp::Ordering;
use std::fmt;

/// A negotiated Bolt protocol version.
///
/// The discriminant is the big-endian handshake word `[0, 0, minor, major]`,
/// so `V4_3` is `0x0000_0304`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BoltVersion {
    V1 = 0x0000_0001,
    V2 = 0x0000_0002,
    V3 = 0x0000_0003,
    V4_0 = 0x0000_0004,
    V4_1 = 0x0000_0104,
    V4_2 = 0x0000_0204,
    V4_3 = 0x0000_0304,
    V4_4 = 0x0000_0404,
}

impl BoltVersion {
    /// Every version this client speaks, newest first.
    pub const ALL: [BoltVersion; 8] = [
        BoltVersion::V4_4,
        BoltVersion::V4_3,
        BoltVersion::V4_2,
        BoltVersion::V4_1,
        BoltVersion::V4_0,
        BoltVersion::V3,
        BoltVersion::V2,
        BoltVersion::V1,
    ];

    pub fn from_parts(major: u8, minor: u8) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.major() == major && v.minor() == minor)
    }

    /// Parse a handshake word. The range byte is ignored.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::from_parts(bytes[3], bytes[2])
    }

    pub fn to_bytes(self) -> [u8; 4] {
        (self as u32).to_be_bytes()
    }

    pub fn major(self) -> u8 {
        (self as u32 & 0xFF) as u8
    }

    pub fn minor(self) -> u8 {
        ((self as u32 >> 8) & 0xFF) as u8
    }

    /// HELLO/GOODBYE and BEGIN/COMMIT/ROLLBACK messages exist (3.0+).
    pub fn has_explicit_transactions(self) -> bool {
        self.major() >= 3
    }

    /// Failures are acknowledged with ACK_FAILURE rather than RESET (1.x, 2.x).
    pub fn uses_ack_failure(self) -> bool {
        self.major() < 3
    }

    /// PULL and DISCARD take an `{n, qid}` map and `db` may be selected (4.0+).
    pub fn has_pull_n(self) -> bool {
        self.major() >= 4
    }

    pub fn supports_database(self) -> bool {
        self.major() >= 4
    }
}

impl fmt::Display for BoltVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

impl PartialOrd for BoltVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BoltVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major(), self.minor()).cmp(&(other.major(), other.minor()))
    }
}

/// One of the four version slots offered in the handshake.
///
/// `range` extends the offer downwards: 4.4 with range 2 accepts 4.4, 4.3 and 4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionProposal {
    pub major: u8,
    pub minor: u8,
    pub range: u8,
}

impl VersionProposal {
    pub const fn exact(major: u8, minor: u8) -> Self {
        Self { major, minor, range: 0 }
    }

    pub const fn range(major: u8, minor: u8, range: u8) -> Self {
        Self { major, minor, range }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        [0, self.range, self.minor, self.major]
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            major: bytes[3],
            minor: bytes[2],
            range: bytes[1],
        }
    }

    pub fn is_empty(self) -> bool {
        self.major == 0
    }

    pub fn accepts(self, version: BoltVersion) -> bool {
        version.major() == self.major
            && version.minor() <= self.minor
            && version.minor() >= self.minor.saturating_sub(self.range)
    }

    /// Versions covered by this proposal, newest first.
    pub fn versions(self) -> impl Iterator<Item = BoltVersion> {
        BoltVersion::ALL.into_iter().filter(move |v| self.accepts(*v))
    }

    /// The default offer: 4.4 down to 4.0, then 3, 2 and 1.
    pub fn defaults() -> Vec<VersionProposal> {
        vec![
            VersionProposal::range(4, 4, 4),
            VersionProposal::exact(3, 0),
            VersionProposal::exact(2, 0),
            VersionProposal::exact(1, 0),
        ]
    }
}

impl From<BoltVersion> for VersionProposal {
    fn from(version: BoltVersion) -> Self {
        VersionProposal::exact(version.major(), version.minor())
    }
}

impl fmt::Display for VersionProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.range == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(
                f,
                "{}.{}-{}.{}",
                self.major,
                self.minor.saturating_sub(self.range),
                self.major,
                self.minor
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_words_put_major_last() {
        assert_eq!(BoltVersion::V4_3.to_bytes(), [0, 0, 3, 4]);
        assert_eq!(BoltVersion::V1.to_bytes(), [0, 0, 0, 1]);
        assert_eq!(BoltVersion::from_bytes([0, 0, 1, 4]), Some(BoltVersion::V4_1));
        assert_eq!(BoltVersion::from_bytes([0, 0, 0, 5]), None);
    }

    #[test]
    fn test_ordering_follows_major_then_minor() {
        assert!(BoltVersion::V3 < BoltVersion::V4_0);
        assert!(BoltVersion::V4_0 < BoltVersion::V4_1);
        assert_eq!(BoltVersion::ALL.iter().max(), Some(&BoltVersion::V4_4));
    }

    #[test]
    fn test_feature_gates() {
        assert!(BoltVersion::V1.uses_ack_failure());
        assert!(!BoltVersion::V2.has_explicit_transactions());
        assert!(BoltVersion::V3.has_explicit_transactions());
        assert!(!BoltVersion::V3.has_pull_n());
        assert!(BoltVersion::V4_2.supports_database());
    }

    #[test]
    fn test_ranged_proposal_covers_lower_minors() {
        let proposal = VersionProposal::range(4, 4, 2);
        assert_eq!(proposal.to_bytes(), [0, 2, 4, 4]);
        let covered: Vec<_> = proposal.versions().collect();
        assert_eq!(covered, vec![BoltVersion::V4_4, BoltVersion::V4_3, BoltVersion::V4_2]);
        assert!(!proposal.accepts(BoltVersion::V4_1));
        assert_eq!(proposal.to_string(), "4.2-4.4");
    }
}
