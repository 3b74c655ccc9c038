//! Time-sortable 128-bit node identifiers.
//!
//! An [`ArchonId`] packs a 48-bit millisecond Unix timestamp into the high
//! bits and 80 bits of randomness into the low bits, so that both the
//! numeric value and its fixed-width lowercase hex text encoding sort
//! lexicographically in (approximate) creation order. Hex (rather than a
//! denser base32) is used because the on-disk layout shards node and
//! attachment files by the first hex characters of their key.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

const TIMESTAMP_BITS: u32 = 48;
const RANDOM_BITS: u32 = 128 - TIMESTAMP_BITS;
const RANDOM_MASK: u128 = (1u128 << RANDOM_BITS) - 1;
/// 128 bits / 4 bits-per-hex-digit.
const ENCODED_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchonId(u128);

impl ArchonId {
    /// Mints a new id from the current wall-clock time and a fresh random suffix.
    ///
    /// Infallible: a clock before the Unix epoch clamps the timestamp component to zero
    /// rather than panicking.
    #[must_use]
    pub fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let mut random = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut random);
        let random_seed = u128::from_be_bytes(random);
        Self::from_parts(millis, random_seed)
    }

    fn from_parts(millis: u128, random_seed: u128) -> Self {
        let timestamp = millis & ((1u128 << TIMESTAMP_BITS) - 1);
        let random = random_seed & RANDOM_MASK;
        Self((timestamp << RANDOM_BITS) | random)
    }

    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }

    /// The millisecond timestamp this id was minted with.
    #[must_use]
    pub const fn timestamp_millis(self) -> u64 {
        (self.0 >> RANDOM_BITS) as u64
    }

    /// Lowercase hex text form, fixed at [`ENCODED_LEN`] characters.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:032x}", self.0)
    }

    /// The first two hex characters, used as the node/attachment shard prefix.
    #[must_use]
    pub fn shard_prefix(self) -> String {
        self.to_hex()[..2].to_string()
    }
}

impl Default for ArchonId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArchonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    #[error("id must be exactly {ENCODED_LEN} hex characters, got {0}")]
    WrongLength(usize),
    #[error("invalid hex character {0:?} in id")]
    InvalidChar(char),
}

impl FromStr for ArchonId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ENCODED_LEN {
            return Err(ParseIdError::WrongLength(s.len()));
        }
        let mut value: u128 = 0;
        for ch in s.chars() {
            let digit = ch.to_digit(16).ok_or(ParseIdError::InvalidChar(ch))?;
            value = (value << 4) | digit as u128;
        }
        Ok(Self(value))
    }
}

impl serde::Serialize for ArchonId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ArchonId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_text() {
        let id = ArchonId::new();
        let text = id.to_string();
        assert_eq!(text.len(), ENCODED_LEN);
        assert_eq!(text.parse::<ArchonId>().unwrap(), id);
    }

    #[test]
    fn lexicographic_order_tracks_creation_order() {
        let earlier = ArchonId::from_parts(1_000, 0);
        let later = ArchonId::from_parts(2_000, 0);
        assert!(earlier < later);
        assert!(earlier.to_string() < later.to_string());
    }

    #[test]
    fn shard_prefix_is_first_two_hex_chars() {
        let id = ArchonId::from_parts(0xABCDEF, 0);
        assert_eq!(id.shard_prefix(), id.to_hex()[..2]);
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(matches!(
            "too-short".parse::<ArchonId>(),
            Err(ParseIdError::WrongLength(_))
        ));
        assert!(matches!(
            "zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz".parse::<ArchonId>(),
            Err(ParseIdError::InvalidChar(_))
        ));
    }
}
