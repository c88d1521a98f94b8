use crate::record::{RecordCodec, RecordKind, SerializeError};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// Stable polymorphic type code: the first eight big-endian bytes of the
/// SHA-256 of the record name. Deterministic across processes and releases.
#[must_use]
#[expect(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn type_code_for_name(name: &str) -> i64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest[..8]);
    // Mask the sign bit so codes stay tuple-encodable without widening.
    (u64::from_be_bytes(raw) & (i64::MAX as u64)) as i64
}

#[must_use]
pub fn type_code<R: RecordKind>() -> i64 {
    type_code_for_name(R::RECORD_NAME)
}

///
/// StoredRecord
///
/// One record fetched from a polymorphic directory before the caller picks
/// a concrete type. The type code discriminates; `decode` materializes.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredRecord {
    pub type_code: i64,
    pub bytes: Vec<u8>,
}

impl StoredRecord {
    /// True when this stored record was written by type `R`.
    #[must_use]
    pub fn is<R: RecordKind>(&self) -> bool {
        self.type_code == type_code::<R>()
    }

    pub fn decode<R: DeserializeOwned>(&self) -> Result<R, SerializeError> {
        RecordCodec::decode(&self.bytes)
    }
}

///
/// TESTS
///
