// SPDX-License-Identifier: MIT OR Apache-2.0

//! [CBOR](https://cbor.io/) helpers.
//!
//! Headers are hashed and signed in their CBOR form, and operations travel between replicas as
//! CBOR as well.
use std::io::Read;

use ciborium::de::Error as DeserializeError;
use ciborium::ser::Error as SerializeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encode a value as CBOR bytes.
pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)?;
    Ok(bytes)
}

/// Decode a value from a reader holding CBOR bytes.
pub fn decode_cbor<T: for<'a> Deserialize<'a>, R: Read>(reader: R) -> Result<T, DecodeError> {
    Ok(ciborium::from_reader(reader)?)
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("writing CBOR failed: {0}")]
    Io(std::io::Error),

    #[error("value can not be represented in CBOR: {0}")]
    Value(String),
}

impl From<SerializeError<std::io::Error>> for EncodeError {
    fn from(err: SerializeError<std::io::Error>) -> Self {
        match err {
            SerializeError::Io(err) => Self::Io(err),
            SerializeError::Value(message) => Self::Value(message),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("reading CBOR failed: {0}")]
    Io(std::io::Error),

    /// Malformed input, with the byte offset it was detected at.
    #[error("malformed CBOR at byte {0}")]
    Syntax(usize),

    /// Well-formed CBOR which does not describe the expected value.
    #[error("unexpected CBOR value (offset {0:?}): {1}")]
    Semantic(Option<usize>, String),

    #[error("CBOR input nested too deeply")]
    RecursionLimitExceeded,
}

impl From<DeserializeError<std::io::Error>> for DecodeError {
    fn from(err: DeserializeError<std::io::Error>) -> Self {
        match err {
            DeserializeError::Io(err) => Self::Io(err),
            DeserializeError::Syntax(offset) => Self::Syntax(offset),
            DeserializeError::Semantic(offset, message) => Self::Semantic(offset, message),
            DeserializeError::RecursionLimitExceeded => Self::RecursionLimitExceeded,
        }
    }
}
