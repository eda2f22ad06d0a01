// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data types of a content-addressed access-control graph.
//!
//! Every replica agrees on these types: BLAKE3 [`Hash`] ids, Ed25519 identities, integer
//! [`PowerLevel`]s and signed [`Operation`]s with a canonical CBOR encoding. The conflict
//! resolution engine working on top of them lives in the `causal-acl` crate.
pub mod cbor;
pub mod hash;
pub mod identity;
pub mod operation;
pub mod power;
mod serde;
pub mod traits;

pub use cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
pub use hash::{HASH_LEN, Hash, HashError};
pub use identity::{IdentityError, PrivateKey, PublicKey, Signature};
pub use operation::{
    Action, Header, Operation, OperationError, OperationKind, decode_operation, encode_operation,
    validate_operation,
};
pub use power::PowerLevel;
pub use traits::{Ed25519Verifier, Verifier};
