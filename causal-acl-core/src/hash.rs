// SPDX-License-Identifier: MIT OR Apache-2.0

//! BLAKE3 digests used as content-addresses of operations.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serde::{deserialize_hex, serialize_hex};

/// Size of BLAKE3 hashes.
pub const HASH_LEN: usize = blake3::OUT_LEN;

/// 32-byte BLAKE3 hash.
///
/// Hashes are ordered by their byte representation. This order is the tie-break used whenever
/// two operations have no causal relation to each other, so it must never depend on anything
/// local to a replica.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash(blake3::Hash);

impl Hash {
    /// Digest of the given bytes.
    pub fn new(buf: impl AsRef<[u8]>) -> Self {
        Self(blake3::hash(buf.as_ref()))
    }

    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(blake3::Hash::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// First eight hex characters, handy in log output.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(8);
        hex
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = HashError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; HASH_LEN] = value
            .try_into()
            .map_err(|_| HashError::InvalidLength(value.len(), HASH_LEN))?;
        Ok(Self::from_bytes(bytes))
    }
}

impl FromStr for Hash {
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::try_from(hex::decode(value)?.as_slice())
    }
}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash").field(&self.short()).finish()
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(self.0.as_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;
        Hash::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum HashError {
    #[error("hash has {0} bytes instead of {1}")]
    InvalidLength(usize, usize),

    #[error("hash is not valid hex: {0}")]
    InvalidHexEncoding(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::{HASH_LEN, Hash, HashError};

    #[test]
    fn ordering_follows_bytes() {
        let low = Hash::from_bytes([0; HASH_LEN]);
        let mut high_bytes = [0; HASH_LEN];
        high_bytes[0] = 1;
        let high = Hash::from_bytes(high_bytes);

        assert!(low < high);

        let mut hashes = vec![high, low, Hash::new(b"abc")];
        hashes.sort();
        assert_eq!(hashes[0], low);
    }

    #[test]
    fn hex_roundtrip_through_display() {
        let hash = Hash::new(b"operation");
        let parsed: Hash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
        assert_eq!(hash.short().len(), 8);
    }

    #[test]
    fn cbor_and_json_encodings() {
        let hash = Hash::new([1, 2, 3]);

        // CBOR writes a 32-byte byte string.
        let mut bytes: Vec<u8> = Vec::new();
        ciborium::ser::into_writer(&hash, &mut bytes).unwrap();
        assert_eq!(bytes.len(), 2 + HASH_LEN);
        assert_eq!(&bytes[2..], hash.as_bytes());

        // JSON writes a hex string.
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let hash_again: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, hash_again);
    }

    #[test]
    fn invalid_length() {
        let bytes = vec![254, 100, 4, 7];
        let result: Result<Hash, HashError> = bytes.as_slice().try_into();
        assert!(matches!(result, Err(HashError::InvalidLength(4, 32))));
    }

    #[test]
    fn invalid_hex_encoding() {
        let result: Result<Hash, HashError> = "notreallyahexstring".parse();
        assert!(matches!(result, Err(HashError::InvalidHexEncoding(_))));
    }
}
