//! Etags: opaque version tokens used for optimistic concurrency.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A 16-byte version token attached to documents and attachments.
///
/// Rendered as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`. Engines that allocate
/// etags from a counter put the sequence number in the low eight bytes, so
/// etags from one engine order the same way their writes did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Etag([u8; 16]);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid etag '{0}'")]
pub struct EtagParseError(pub String);

impl Etag {
    pub const EMPTY: Etag = Etag([0; 16]);

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn from_sequence(sequence: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[8..].copy_from_slice(&sequence.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Low eight bytes interpreted as a big-endian counter.
    pub fn sequence(&self) -> u64 {
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[8..]);
        u64::from_be_bytes(low)
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.0);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

impl FromStr for Etag {
    type Err = EtagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| *c != '-').collect();
        let decoded = hex::decode(&compact).map_err(|_| EtagParseError(s.to_string()))?;
        let bytes: [u8; 16] = decoded
            .try_into()
            .map_err(|_| EtagParseError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Etag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Etag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_dashed_hex() {
        let etag = Etag::from_sequence(0x2a);
        assert_eq!(etag.to_string(), "00000000-0000-0000-0000-00000000002a");
    }

    #[test]
    fn parse_accepts_display_form() {
        let etag = Etag::from_sequence(123_456);
        let parsed: Etag = etag.to_string().parse().unwrap();
        assert_eq!(parsed, etag);
        assert_eq!(parsed.sequence(), 123_456);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!("0000-1111".parse::<Etag>().is_err());
        assert!("not-an-etag".parse::<Etag>().is_err());
    }

    #[test]
    fn sequence_etags_order_by_sequence() {
        assert!(Etag::from_sequence(2) > Etag::from_sequence(1));
        assert!(Etag::from_sequence(256) > Etag::from_sequence(255));
    }

    #[test]
    fn serde_uses_string_form() {
        let etag = Etag::from_sequence(9);
        let json = serde_json::to_string(&etag).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000009\"");
        let back: Etag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, etag);
    }
}
