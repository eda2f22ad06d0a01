// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ed25519 identities of the devices authoring operations.
//!
//! A participant in an access-control graph is identified by its public key. Signing and
//! verification are provided here so applications have a ready-made capability, but the engine
//! itself only ever consumes signatures through the `Verifier` trait.
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash as StdHash;
use std::str::FromStr;

use ed25519_dalek::{
    PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, SIGNATURE_LENGTH, Signer, SigningKey, Verifier,
    VerifyingKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serde::{deserialize_hex, serialize_hex};

/// Private Ed25519 key used for signing operations.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Generates a new private key using the systems random number generator (CSPRNG) as a seed.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let mut csprng = OsRng;
        Self(SigningKey::generate(&mut csprng))
    }

    /// Create a private key from its 32 secret bytes.
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self(SigningKey::from_bytes(bytes))
    }

    /// Returns private key represented as bytes.
    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_LENGTH] {
        self.0.as_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn sign(&self, bytes: &[u8]) -> Signature {
        Signature(self.0.sign(bytes))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret material.
        f.debug_tuple("PrivateKey").field(&self.public_key()).finish()
    }
}

/// Public Ed25519 key, doubling as the identifier of a participant.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LENGTH]) -> Result<Self, IdentityError> {
        let key = VerifyingKey::from_bytes(bytes).map_err(|_| IdentityError::InvalidPublicKey)?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Verify a signature over the given bytes.
    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> bool {
        self.0.verify(bytes, &signature.0).is_ok()
    }
}

impl StdHash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        f.debug_tuple("PublicKey").field(&&hex[..8]).finish()
    }
}

impl FromStr for PublicKey {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(value)?;
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len(), PUBLIC_KEY_LENGTH))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(self.as_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            serde::de::Error::custom(IdentityError::InvalidLength(
                bytes.len(),
                PUBLIC_KEY_LENGTH,
            ))
        })?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LENGTH]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.to_bytes()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.to_bytes());
        f.debug_tuple("Signature").field(&&hex[..8]).finish()
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;
        let bytes: [u8; SIGNATURE_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            serde::de::Error::custom(IdentityError::InvalidLength(
                bytes.len(),
                SIGNATURE_LENGTH,
            ))
        })?;
        Ok(Self::from_bytes(&bytes))
    }
}

/// Error types for identity types.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("invalid key or signature length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    #[error("bytes do not represent a valid ed25519 public key")]
    InvalidPublicKey,

    #[error("invalid hex encoding in key string")]
    InvalidHexEncoding(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::{PrivateKey, PublicKey};

    #[test]
    fn sign_and_verify() {
        let private_key = PrivateKey::from_bytes(&[7; 32]);
        let public_key = private_key.public_key();

        let signature = private_key.sign(b"grant");
        assert!(public_key.verify(b"grant", &signature));
        assert!(!public_key.verify(b"revoke", &signature));

        let other = PrivateKey::from_bytes(&[8; 32]).public_key();
        assert!(!other.verify(b"grant", &signature));
    }

    #[test]
    fn deterministic_keys() {
        let a = PrivateKey::from_bytes(&[1; 32]).public_key();
        let b = PrivateKey::from_bytes(&[1; 32]).public_key();
        assert_eq!(a, b);
    }

    #[test]
    fn public_key_hex_and_serde() {
        let public_key = PrivateKey::new().public_key();

        let parsed: PublicKey = public_key.to_hex().parse().unwrap();
        assert_eq!(parsed, public_key);

        let json = serde_json::to_string(&public_key).unwrap();
        let from_json: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(from_json, public_key);

        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&public_key, &mut bytes).unwrap();
        let from_cbor: PublicKey = ciborium::de::from_reader(&bytes[..]).unwrap();
        assert_eq!(from_cbor, public_key);
    }

    #[test]
    fn invalid_public_key_length() {
        assert!("abcd".parse::<PublicKey>().is_err());
    }
}
