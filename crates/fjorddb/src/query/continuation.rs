use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use sha2::{Digest, Sha256};
use thiserror::Error as ThisError;

///
/// ContinuationError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ContinuationError {
    #[error("continuation token is not valid base64")]
    InvalidBase64,

    #[error("unsupported continuation token version: {version}")]
    BadVersion { version: u8 },

    #[error("continuation token truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("continuation token was produced by a different plan")]
    FingerprintMismatch,
}

const TOKEN_VERSION: u8 = 1;
const FINGERPRINT_LEN: usize = 32;

const HAS_REMAINING: u8 = 0b0000_0001;
const HAS_ORIGINAL: u8 = 0b0000_0010;

///
/// ScanType
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanType {
    FullScan,
    InUnion,
    InJoin,
}

impl ScanType {
    const fn encode(self) -> u8 {
        match self {
            Self::FullScan => 0,
            Self::InUnion => 1,
            Self::InJoin => 2,
        }
    }

    const fn decode(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::FullScan),
            1 => Some(Self::InUnion),
            2 => Some(Self::InJoin),
            _ => None,
        }
    }
}

///
/// Continuation
///
/// Opaque resume token produced by scanning operators. Layout:
/// `version | scanType | reverse | lastKeyLen | lastKey | limits? |
/// fingerprintLen | fingerprint`. Resumption is legal iff the consuming
/// plan's fingerprint matches the one baked into the token.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Continuation {
    pub scan_type: ScanType,
    pub reverse: bool,
    pub last_key: Vec<u8>,
    pub remaining_limit: Option<u32>,
    pub original_limit: Option<u32>,
    pub fingerprint: [u8; FINGERPRINT_LEN],
}

impl Continuation {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.last_key.len() + FINGERPRINT_LEN);
        out.push(TOKEN_VERSION);
        out.push(self.scan_type.encode());
        out.push(u8::from(self.reverse));

        out.extend_from_slice(
            &u32::try_from(self.last_key.len())
                .unwrap_or(u32::MAX)
                .to_be_bytes(),
        );
        out.extend_from_slice(&self.last_key);

        let mut flags = 0u8;
        if self.remaining_limit.is_some() {
            flags |= HAS_REMAINING;
        }
        if self.original_limit.is_some() {
            flags |= HAS_ORIGINAL;
        }
        out.push(flags);
        if let Some(remaining) = self.remaining_limit {
            out.extend_from_slice(&remaining.to_be_bytes());
        }
        if let Some(original) = self.original_limit {
            out.extend_from_slice(&original.to_be_bytes());
        }

        out.push(FINGERPRINT_LEN as u8);
        out.extend_from_slice(&self.fingerprint);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ContinuationError> {
        let mut cursor = Cursor { bytes, offset: 0 };

        let version = cursor.u8()?;
        if version != TOKEN_VERSION {
            return Err(ContinuationError::BadVersion { version });
        }
        let scan_type = ScanType::decode(cursor.u8()?)
            .ok_or(ContinuationError::BadVersion { version })?;
        let reverse = cursor.u8()? != 0;

        let key_len = cursor.u32()? as usize;
        let last_key = cursor.take(key_len)?.to_vec();

        let flags = cursor.u8()?;
        let remaining_limit = if flags & HAS_REMAINING != 0 {
            Some(cursor.u32()?)
        } else {
            None
        };
        let original_limit = if flags & HAS_ORIGINAL != 0 {
            Some(cursor.u32()?)
        } else {
            None
        };

        let fingerprint_len = cursor.u8()? as usize;
        if fingerprint_len != FINGERPRINT_LEN {
            return Err(ContinuationError::Truncated {
                offset: cursor.offset,
            });
        }
        let mut fingerprint = [0u8; FINGERPRINT_LEN];
        fingerprint.copy_from_slice(cursor.take(FINGERPRINT_LEN)?);

        Ok(Self {
            scan_type,
            reverse,
            last_key,
            remaining_limit,
            original_limit,
            fingerprint,
        })
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.encode())
    }

    pub fn from_base64(token: &str) -> Result<Self, ContinuationError> {
        let bytes = BASE64
            .decode(token)
            .map_err(|_| ContinuationError::InvalidBase64)?;
        Self::decode(&bytes)
    }

    /// Check this token against the consuming plan's fingerprint.
    pub fn verify(&self, fingerprint: &[u8; FINGERPRINT_LEN]) -> Result<(), ContinuationError> {
        if &self.fingerprint == fingerprint {
            Ok(())
        } else {
            Err(ContinuationError::FingerprintMismatch)
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Cursor<'_> {
    fn u8(&mut self) -> Result<u8, ContinuationError> {
        let byte = *self
            .bytes
            .get(self.offset)
            .ok_or(ContinuationError::Truncated {
                offset: self.offset,
            })?;
        self.offset += 1;
        Ok(byte)
    }

    fn u32(&mut self) -> Result<u32, ContinuationError> {
        let raw = self.take(4)?;
        let mut out = [0u8; 4];
        out.copy_from_slice(raw);
        Ok(u32::from_be_bytes(out))
    }

    fn take(&mut self, len: usize) -> Result<&'_ [u8], ContinuationError> {
        let end = self.offset + len;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(ContinuationError::Truncated {
                offset: self.offset,
            })?;
        self.offset = end;
        Ok(slice)
    }
}

/// Stable plan fingerprint: SHA-256 over the operator description, the
/// sorted index-name set, and the sort-field chain. Identical plans hash
/// identically; any change in shape produces a distinct fingerprint.
#[must_use]
pub fn plan_fingerprint(
    operator_description: &str,
    index_names: &[&str],
    sort_fields: &[&str],
) -> [u8; FINGERPRINT_LEN] {
    let mut sorted_indexes: Vec<&str> = index_names.to_vec();
    sorted_indexes.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(operator_description.as_bytes());
    hasher.update([0u8]);
    for name in sorted_indexes {
        hasher.update(name.as_bytes());
        hasher.update([0x1f]);
    }
    hasher.update([0u8]);
    for sort_field in sort_fields {
        hasher.update(sort_field.as_bytes());
        hasher.update([0x1f]);
    }

    let digest = hasher.finalize();
    let mut out = [0u8; FINGERPRINT_LEN];
    out.copy_from_slice(&digest);
    out
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{Continuation, ContinuationError, ScanType, plan_fingerprint};
    use proptest::prelude::*;

    fn token() -> Continuation {
        Continuation {
            scan_type: ScanType::FullScan,
            reverse: true,
            last_key: vec![1, 2, 3],
            remaining_limit: Some(17),
            original_limit: Some(100),
            fingerprint: plan_fingerprint("scan(Employee)", &["by_dept"], &["name"]),
        }
    }

    #[test]
    fn round_trips_through_bytes_and_base64() {
        let token = token();
        assert_eq!(Continuation::decode(&token.encode()).expect("decode"), token);
        assert_eq!(
            Continuation::from_base64(&token.to_base64()).expect("decode"),
            token
        );
    }

    #[test]
    fn rejects_bad_version_and_truncation() {
        let mut bytes = token().encode();
        bytes[0] = 9;
        assert_eq!(
            Continuation::decode(&bytes),
            Err(ContinuationError::BadVersion { version: 9 })
        );

        let bytes = token().encode();
        assert!(matches!(
            Continuation::decode(&bytes[..bytes.len() - 5]),
            Err(ContinuationError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_garbage_base64() {
        assert_eq!(
            Continuation::from_base64("!!not-base64!!"),
            Err(ContinuationError::InvalidBase64)
        );
    }

    #[test]
    fn fingerprints_are_stable_and_shape_sensitive() {
        let a = plan_fingerprint("scan(Employee)", &["b", "a"], &["name"]);
        let b = plan_fingerprint("scan(Employee)", &["a", "b"], &["name"]);
        // Index order does not matter; the set does.
        assert_eq!(a, b);

        assert_ne!(a, plan_fingerprint("scan(Employee)", &["a"], &["name"]));
        assert_ne!(a, plan_fingerprint("scan(Employee)", &["a", "b"], &[]));
        assert_ne!(a, plan_fingerprint("scan(Order)", &["a", "b"], &["name"]));
    }

    #[test]
    fn verify_gates_on_fingerprint() {
        let token = token();
        assert!(token
            .verify(&plan_fingerprint("scan(Employee)", &["by_dept"], &["name"]))
            .is_ok());
        assert_eq!(
            token.verify(&plan_fingerprint("scan(Employee)", &[], &[])),
            Err(ContinuationError::FingerprintMismatch)
        );
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            reverse in any::<bool>(),
            last_key in proptest::collection::vec(any::<u8>(), 0..64),
            remaining in proptest::option::of(any::<u32>()),
            original in proptest::option::of(any::<u32>()),
        ) {
            let token = Continuation {
                scan_type: ScanType::InJoin,
                reverse,
                last_key,
                remaining_limit: remaining,
                original_limit: original,
                fingerprint: plan_fingerprint("p", &[], &[]),
            };
            prop_assert_eq!(Continuation::decode(&token.encode()).unwrap(), token);
        }
    }
}
