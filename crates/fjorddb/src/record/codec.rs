use serde::{Serialize, de::DeserializeOwned};
use serde_cbor::{from_slice, to_vec};
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error as ThisError;

///
/// SerializeError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SerializeError {
    #[error("serialize failed: {0}")]
    Serialize(String),

    #[error("deserialize failed: {0}")]
    Deserialize(String),
}

///
/// RecordCodec
///
/// Tagged, forward-compatible record encoding. CBOR maps keyed by field
/// name tolerate added and reordered fields on both sides of an upgrade.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct RecordCodec;

impl RecordCodec {
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, SerializeError> {
        to_vec(value).map_err(|e| SerializeError::Serialize(e.to_string()))
    }

    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SerializeError> {
        Self::decode_bounded(bytes, usize::MAX)
    }

    /// Decode with a caller-provided size limit.
    ///
    /// Input size is bounded before decode and any panic during decode is
    /// caught and reported as a deserialize error; no panic escapes.
    pub fn decode_bounded<T: DeserializeOwned>(
        bytes: &[u8],
        max_bytes: usize,
    ) -> Result<T, SerializeError> {
        if bytes.len() > max_bytes {
            return Err(SerializeError::Deserialize(format!(
                "payload exceeds maximum allowed size: {} bytes (limit {max_bytes})",
                bytes.len()
            )));
        }

        let result = catch_unwind(AssertUnwindSafe(|| from_slice(bytes)));

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(SerializeError::Deserialize(err.to_string())),
            Err(_) => Err(SerializeError::Deserialize(
                "panic during CBOR deserialization".into(),
            )),
        }
    }
}

///
/// TESTS
///
