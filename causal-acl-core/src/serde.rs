// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte fields as hex strings in JSON and as plain byte strings in CBOR.
use serde::{Deserialize, Serialize};
use serde_bytes::{ByteBuf, Bytes};

pub fn serialize_hex<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if serializer.is_human_readable() {
        hex::serde::serialize(value, serializer)
    } else {
        Bytes::new(value).serialize(serializer)
    }
}

pub fn deserialize_hex<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    if deserializer.is_human_readable() {
        hex::serde::deserialize(deserializer)
    } else {
        ByteBuf::deserialize(deserializer).map(ByteBuf::into_vec)
    }
}
