//! Value encoding for cache payloads.
//!
//! Every stored payload carries a one-byte format tag followed by the body:
//!
//! - `0x01`: JSON, used for anything `serde_json` can represent.
//! - `0x02`: MessagePack, used when JSON cannot represent the value
//!   (for example maps keyed by tuples or other non-string keys).
//!
//! Payloads written without a tag (plain JSON written by another client, for
//! instance) are decoded as JSON first and MessagePack second.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::error::{CacheError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

const TAG_JSON: u8 = 0x01;
const TAG_MSGPACK: u8 = 0x02;

/// Wire format of an encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    MessagePack,
}

impl Format {
    fn tag(self) -> u8 {
        match self {
            Format::Json => TAG_JSON,
            Format::MessagePack => TAG_MSGPACK,
        }
    }

    /// Detect the format of an encoded payload, `None` for untagged bytes.
    pub fn of(bytes: &[u8]) -> Option<Format> {
        match bytes.first() {
            Some(&TAG_JSON) => Some(Format::Json),
            Some(&TAG_MSGPACK) => Some(Format::MessagePack),
            _ => None,
        }
    }
}

/// Encode a value, preferring JSON and falling back to MessagePack.
pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    match serde_json::to_vec(value) {
        Ok(body) => Ok(with_tag(Format::Json, body)),
        Err(json_err) => {
            debug!("JSON cannot represent value ({}), using MessagePack", json_err);
            serialize_as(value, Format::MessagePack)
        }
    }
}

/// Encode a value in an explicit format.
pub fn serialize_as<T: Serialize + ?Sized>(value: &T, format: Format) -> Result<Vec<u8>> {
    let body = match format {
        Format::Json => {
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?
        }
        Format::MessagePack => rmp_serde::to_vec_named(value)
            .map_err(|e| CacheError::Serialization(e.to_string()))?,
    };
    Ok(with_tag(format, body))
}

/// Decode a payload produced by [`serialize`] or an untagged legacy payload.
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    match Format::of(bytes) {
        Some(Format::Json) => serde_json::from_slice(&bytes[1..])
            .map_err(|e| CacheError::Deserialization(format!("json: {}", e))),
        Some(Format::MessagePack) => rmp_serde::from_slice(&bytes[1..])
            .map_err(|e| CacheError::Deserialization(format!("msgpack: {}", e))),
        None => match serde_json::from_slice(bytes) {
            Ok(value) => Ok(value),
            Err(json_err) => rmp_serde::from_slice(bytes).map_err(|msgpack_err| {
                CacheError::Deserialization(format!(
                    "untagged payload is neither json ({}) nor msgpack ({})",
                    json_err, msgpack_err
                ))
            }),
        },
    }
}

fn with_tag(format: Format, body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(format.tag());
    out.extend_from_slice(&body);
    out
}
