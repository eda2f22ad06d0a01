// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core operation types of the access-control graph.
//!
//! An [`Operation`] is identified by the BLAKE3 hash of its canonical [`Header`] encoding, which
//! is the CBOR array `[parents, author, kind, payload]`. Parents are sorted and deduplicated
//! before encoding, so the same causal predecessors always produce the same id. The author's
//! Ed25519 signature covers the same bytes but is not part of the id.
//!
//! ```
//! use causal_acl_core::{Action, Operation, PowerLevel, PrivateKey, validate_operation};
//!
//! let alice = PrivateKey::new();
//! let bob = PrivateKey::new();
//!
//! let root = Operation::new(&alice, vec![], Action::Message { body: b"hello".to_vec() });
//! let grant = Operation::new(
//!     &alice,
//!     vec![root.id()],
//!     Action::Grant {
//!         member: bob.public_key(),
//!         level: PowerLevel::MODERATOR,
//!     },
//! );
//!
//! assert!(validate_operation(&grant).is_ok());
//! assert!(grant.verify_signature());
//! ```
use std::fmt;

use serde::de::{Error as SerdeError, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::hash::Hash;
use crate::identity::{PrivateKey, PublicKey, Signature};
use crate::power::PowerLevel;

/// Discriminant of an [`Action`], encoded as a single integer tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    Grant,
    Revoke,
    Message,
}

impl OperationKind {
    pub fn tag(&self) -> u8 {
        match self {
            OperationKind::Grant => 0,
            OperationKind::Revoke => 1,
            OperationKind::Message => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(OperationKind::Grant),
            1 => Some(OperationKind::Revoke),
            2 => Some(OperationKind::Message),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Grant => "grant",
            OperationKind::Revoke => "revoke",
            OperationKind::Message => "message",
        };
        write!(f, "{name}")
    }
}

/// Effect an operation has on the access-control state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Assign `level` to `member`. The first surviving grant for a participant is their join.
    Grant {
        member: PublicKey,
        level: PowerLevel,
    },

    /// Remove `member` from the access-control state.
    Revoke { member: PublicKey },

    /// Opaque application payload. Takes part in ordering but never changes permissions.
    Message { body: Vec<u8> },
}

impl Action {
    pub fn kind(&self) -> OperationKind {
        match self {
            Action::Grant { .. } => OperationKind::Grant,
            Action::Revoke { .. } => OperationKind::Revoke,
            Action::Message { .. } => OperationKind::Message,
        }
    }

    /// Participant whose level is modified, `None` for messages.
    pub fn target(&self) -> Option<PublicKey> {
        match self {
            Action::Grant { member, .. } | Action::Revoke { member } => Some(*member),
            Action::Message { .. } => None,
        }
    }

    /// Payload bytes as they appear in the canonical encoding.
    pub fn payload(&self) -> Vec<u8> {
        // Encoding keys, integers and tuples into a vector can not fail.
        match self {
            Action::Grant { member, level } => {
                encode_cbor(&(member, level)).expect("grant payload is always encodable")
            }
            Action::Revoke { member } => {
                encode_cbor(member).expect("revoke payload is always encodable")
            }
            Action::Message { body } => body.clone(),
        }
    }

    /// Reconstruct an action from its kind and canonical payload bytes.
    pub fn from_payload(kind: OperationKind, payload: &[u8]) -> Result<Self, DecodeError> {
        let action = match kind {
            OperationKind::Grant => {
                let (member, level): (PublicKey, PowerLevel) = decode_cbor(payload)?;
                Action::Grant { member, level }
            }
            OperationKind::Revoke => {
                let member: PublicKey = decode_cbor(payload)?;
                Action::Revoke { member }
            }
            OperationKind::Message => Action::Message {
                body: payload.to_vec(),
            },
        };
        Ok(action)
    }
}

/// Signed and hashed part of an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Causal predecessors, sorted ascending without duplicates. Empty only for the root.
    pub parents: Vec<Hash>,
    pub author: PublicKey,
    pub action: Action,
}

impl Header {
    /// Create a header, bringing the parents into canonical order.
    pub fn new(author: PublicKey, parents: impl IntoIterator<Item = Hash>, action: Action) -> Self {
        let mut parents: Vec<Hash> = parents.into_iter().collect();
        parents.sort();
        parents.dedup();
        Self {
            parents,
            author,
            action,
        }
    }

    /// Canonical CBOR encoding, input to both hashing and signing.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Same as the payload: every field is plain bytes or integers and the writer is a vector.
        encode_cbor(self).expect("CBOR encoder failed due to a critical IO error")
    }

    pub fn hash(&self) -> Hash {
        Hash::new(self.to_bytes())
    }

    pub fn sign(&self, private_key: &PrivateKey) -> Signature {
        private_key.sign(&self.to_bytes())
    }

    pub fn verify(&self, signature: &Signature) -> bool {
        self.author.verify(&self.to_bytes(), signature)
    }
}

impl Serialize for Header {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let payload = self.action.payload();
        let mut seq = serializer.serialize_seq(Some(4))?;
        seq.serialize_element(&self.parents)?;
        seq.serialize_element(&self.author)?;
        seq.serialize_element(&self.action.kind().tag())?;
        seq.serialize_element(serde_bytes::Bytes::new(&payload))?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Header {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct HeaderVisitor;

        impl<'de> Visitor<'de> for HeaderVisitor {
            type Value = Header;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("Header encoded as a sequence")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let parents: Vec<Hash> = seq
                    .next_element()
                    .map_err(|_| SerdeError::custom("invalid parents, expected array of hashes"))?
                    .ok_or(SerdeError::custom("parents missing"))?;

                let author: PublicKey = seq
                    .next_element()
                    .map_err(|_| SerdeError::custom("invalid author, expected bytes"))?
                    .ok_or(SerdeError::custom("author missing"))?;

                let tag: u8 = seq
                    .next_element()
                    .map_err(|_| SerdeError::custom("invalid kind, expected u8"))?
                    .ok_or(SerdeError::custom("kind missing"))?;

                let kind = OperationKind::from_tag(tag)
                    .ok_or(SerdeError::custom(format!("unknown operation kind {tag}")))?;

                let payload: serde_bytes::ByteBuf = seq
                    .next_element()
                    .map_err(|_| SerdeError::custom("invalid payload, expected bytes"))?
                    .ok_or(SerdeError::custom("payload missing"))?;

                let action = Action::from_payload(kind, &payload)
                    .map_err(|err| SerdeError::custom(format!("invalid {kind} payload: {err}")))?;

                // Parents are taken as given, canonical order is checked by validation.
                Ok(Header {
                    parents,
                    author,
                    action,
                })
            }
        }

        deserializer.deserialize_seq(HeaderVisitor)
    }
}

/// Content-addressed, signed operation.
///
/// `id` travels with the operation, it is only trusted after [`validate_operation`] confirmed it
/// matches the header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Hash,
    pub header: Header,
    pub signature: Signature,
}

impl Operation {
    /// Create and sign a new operation.
    pub fn new(private_key: &PrivateKey, parents: Vec<Hash>, action: Action) -> Self {
        let header = Header::new(private_key.public_key(), parents, action);
        let signature = header.sign(private_key);
        Self {
            id: header.hash(),
            header,
            signature,
        }
    }

    pub fn id(&self) -> Hash {
        self.id
    }

    pub fn parents(&self) -> &[Hash] {
        &self.header.parents
    }

    pub fn author(&self) -> PublicKey {
        self.header.author
    }

    pub fn action(&self) -> &Action {
        &self.header.action
    }

    pub fn kind(&self) -> OperationKind {
        self.header.action.kind()
    }

    pub fn is_root(&self) -> bool {
        self.header.parents.is_empty()
    }

    /// Check the signature against the author's public key.
    pub fn verify_signature(&self) -> bool {
        self.header.verify(&self.signature)
    }
}

/// Checks that an operation is internally consistent.
///
/// This does not look at the signature, which is verified by an injected capability, nor at the
/// graph the operation is meant to be admitted into.
pub fn validate_operation(operation: &Operation) -> Result<(), OperationError> {
    if operation
        .header
        .parents
        .windows(2)
        .any(|pair| pair[0] >= pair[1])
    {
        return Err(OperationError::UnsortedParents);
    }

    let actual = operation.header.hash();
    if actual != operation.id {
        return Err(OperationError::IdMismatch {
            claimed: operation.id,
            actual,
        });
    }

    Ok(())
}

/// Encode an operation, including id and signature, for handing it to a transport layer.
pub fn encode_operation(operation: &Operation) -> Result<Vec<u8>, EncodeError> {
    encode_cbor(operation)
}

/// Decode an operation received from a transport layer.
///
/// The result still needs to be validated before it is admitted anywhere.
pub fn decode_operation(bytes: &[u8]) -> Result<Operation, DecodeError> {
    decode_cbor(bytes)
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OperationError {
    #[error("operation id {claimed} does not match content hash {actual}")]
    IdMismatch { claimed: Hash, actual: Hash },

    #[error("parents need to be sorted ascending and must not contain duplicates")]
    UnsortedParents,
}

#[cfg(test)]
mod tests {
    use crate::{Hash, PowerLevel, PrivateKey};

    use super::{
        Action, Header, Operation, OperationError, OperationKind, decode_operation,
        encode_operation, validate_operation,
    };

    fn alice() -> PrivateKey {
        PrivateKey::from_bytes(&[1; 32])
    }

    fn bob() -> PrivateKey {
        PrivateKey::from_bytes(&[2; 32])
    }

    #[test]
    fn id_is_pure_function_of_content() {
        let grant = Action::Grant {
            member: bob().public_key(),
            level: PowerLevel::MODERATOR,
        };
        let parent = Hash::new(b"root");

        let a = Operation::new(&alice(), vec![parent], grant.clone());
        let b = Operation::new(&alice(), vec![parent], grant);
        assert_eq!(a.id(), b.id());

        let c = Operation::new(
            &alice(),
            vec![parent],
            Action::Grant {
                member: bob().public_key(),
                level: PowerLevel::USER,
            },
        );
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn parents_are_canonical() {
        let x = Hash::new(b"x");
        let y = Hash::new(b"y");
        let action = Action::Message { body: vec![1, 2] };

        let a = Operation::new(&alice(), vec![x, y], action.clone());
        let b = Operation::new(&alice(), vec![y, x, y], action);

        assert_eq!(a.id(), b.id());
        assert_eq!(b.parents().len(), 2);
        assert!(b.parents()[0] < b.parents()[1]);
    }

    #[test]
    fn signature_is_not_part_of_id() {
        let op = Operation::new(&alice(), vec![], Action::Message { body: vec![] });
        let resigned = op.header.sign(&bob());
        let forged = Operation {
            signature: resigned,
            ..op.clone()
        };

        assert_eq!(forged.id(), op.id());
        assert!(validate_operation(&forged).is_ok());
        assert!(op.verify_signature());
        assert!(!forged.verify_signature());
    }

    #[test]
    fn tampered_content_is_detected() {
        let op = Operation::new(
            &alice(),
            vec![Hash::new(b"root")],
            Action::Revoke {
                member: bob().public_key(),
            },
        );

        let mut tampered = op.clone();
        tampered.header.action = Action::Revoke {
            member: alice().public_key(),
        };

        assert!(matches!(
            validate_operation(&tampered),
            Err(OperationError::IdMismatch { .. })
        ));
        assert!(!tampered.verify_signature());
    }

    #[test]
    fn unsorted_parents_are_invalid() {
        let x = Hash::new(b"x");
        let y = Hash::new(b"y");
        let (low, high) = if x < y { (x, y) } else { (y, x) };

        let header = Header {
            parents: vec![high, low],
            author: alice().public_key(),
            action: Action::Message { body: vec![] },
        };
        let op = Operation {
            id: header.hash(),
            signature: header.sign(&alice()),
            header,
        };

        assert_eq!(
            validate_operation(&op),
            Err(OperationError::UnsortedParents)
        );
    }

    #[test]
    fn transport_encoding() {
        let op = Operation::new(
            &alice(),
            vec![Hash::new(b"root")],
            Action::Grant {
                member: bob().public_key(),
                level: PowerLevel::new(80),
            },
        );

        let bytes = encode_operation(&op).unwrap();
        let decoded = decode_operation(&bytes).unwrap();
        assert_eq!(decoded, op);
        assert_eq!(decoded.kind(), OperationKind::Grant);
        assert!(validate_operation(&decoded).is_ok());
        assert!(decoded.verify_signature());

        assert!(decode_operation(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn unknown_kind_tag() {
        assert_eq!(OperationKind::from_tag(2), Some(OperationKind::Message));
        assert_eq!(OperationKind::from_tag(7), None);
    }

    #[test]
    fn targets() {
        let member = bob().public_key();
        assert_eq!(Action::Revoke { member }.target(), Some(member));
        assert_eq!(Action::Message { body: vec![] }.target(), None);
    }
}
