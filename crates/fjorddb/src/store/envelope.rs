use thiserror::Error as ThisError;

/// 4-byte frame magic preceding every stored value.
pub const MAGIC: [u8; 4] = *b"FJRD";

/// Current envelope version.
pub const VERSION: u8 = 1;

const FLAG_SPLIT: u8 = 0b0000_0001;
const FLAG_COMPRESSED: u8 = 0b0000_0010;
const KNOWN_FLAGS: u8 = FLAG_SPLIT | FLAG_COMPRESSED;

const HEADER_LEN: usize = 6;
const DESCRIPTOR_LEN: usize = 16;

///
/// CorruptValue
///
/// Decoding failures surfaced by the item store. Every variant is a
/// data-correctness failure, not a transient condition.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CorruptValue {
    #[error("bad envelope magic")]
    BadMagic,

    #[error("unknown envelope version: {version}")]
    UnknownVersion { version: u8 },

    #[error("unknown envelope flags: 0b{flags:08b}")]
    UnknownFlags { flags: u8 },

    #[error("envelope truncated: {len} bytes")]
    Truncated { len: usize },

    #[error("incomplete chunk set: expected {expected} chunks, found {found}")]
    IncompleteChunks { expected: u32, found: u32 },

    #[error("chunk {index} out of declared order")]
    ChunkOutOfOrder { index: i64 },

    #[error("reassembled length {found} does not match descriptor {expected}")]
    LengthMismatch { expected: u64, found: u64 },

    #[error("decompression failed: {0}")]
    Decompress(String),
}

///
/// SplitDescriptor
///
/// Small payload stored at the item key when the value is chunked.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SplitDescriptor {
    /// Total payload length across all chunks, post-compression.
    pub total_len: u64,
    pub chunk_count: u32,
    pub chunk_size: u32,
}

impl SplitDescriptor {
    fn encode(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.total_len.to_be_bytes());
        out.extend_from_slice(&self.chunk_count.to_be_bytes());
        out.extend_from_slice(&self.chunk_size.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, CorruptValue> {
        if bytes.len() != DESCRIPTOR_LEN {
            return Err(CorruptValue::Truncated { len: bytes.len() });
        }
        let mut total = [0u8; 8];
        total.copy_from_slice(&bytes[..8]);
        let mut count = [0u8; 4];
        count.copy_from_slice(&bytes[8..12]);
        let mut size = [0u8; 4];
        size.copy_from_slice(&bytes[12..16]);
        Ok(Self {
            total_len: u64::from_be_bytes(total),
            chunk_count: u32::from_be_bytes(count),
            chunk_size: u32::from_be_bytes(size),
        })
    }
}

///
/// EnvelopePayload
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EnvelopePayload {
    Inline(Vec<u8>),
    Split(SplitDescriptor),
}

///
/// Envelope
///
/// The 6-byte frame (`magic | version | flags`) plus payload written at
/// every item key. Split values carry only a descriptor here; the chunk
/// bytes live under the blob subspace.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub compressed: bool,
    pub payload: EnvelopePayload,
}

impl Envelope {
    #[must_use]
    pub const fn inline(bytes: Vec<u8>, compressed: bool) -> Self {
        Self {
            compressed,
            payload: EnvelopePayload::Inline(bytes),
        }
    }

    #[must_use]
    pub const fn split(descriptor: SplitDescriptor, compressed: bool) -> Self {
        Self {
            compressed,
            payload: EnvelopePayload::Split(descriptor),
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.compressed {
            flags |= FLAG_COMPRESSED;
        }
        let mut out = match &self.payload {
            EnvelopePayload::Inline(bytes) => {
                let mut out = Vec::with_capacity(HEADER_LEN + bytes.len());
                out.extend_from_slice(&MAGIC);
                out.push(VERSION);
                out.push(flags);
                out.extend_from_slice(bytes);
                return out;
            }
            EnvelopePayload::Split(descriptor) => {
                flags |= FLAG_SPLIT;
                let mut out = Vec::with_capacity(HEADER_LEN + DESCRIPTOR_LEN);
                out.extend_from_slice(&MAGIC);
                out.push(VERSION);
                out.push(flags);
                descriptor.encode(&mut out);
                out
            }
        };
        out.shrink_to_fit();
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CorruptValue> {
        if bytes.len() < HEADER_LEN {
            return Err(CorruptValue::Truncated { len: bytes.len() });
        }
        if bytes[..4] != MAGIC {
            return Err(CorruptValue::BadMagic);
        }
        let version = bytes[4];
        if version != VERSION {
            return Err(CorruptValue::UnknownVersion { version });
        }
        let flags = bytes[5];
        if flags & !KNOWN_FLAGS != 0 {
            return Err(CorruptValue::UnknownFlags { flags });
        }

        let compressed = flags & FLAG_COMPRESSED != 0;
        let payload = &bytes[HEADER_LEN..];
        if flags & FLAG_SPLIT == 0 {
            Ok(Self::inline(payload.to_vec(), compressed))
        } else {
            Ok(Self::split(SplitDescriptor::decode(payload)?, compressed))
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{CorruptValue, Envelope, SplitDescriptor};

    #[test]
    fn inline_round_trip() {
        let envelope = Envelope::inline(vec![1, 2, 3], false);
        let decoded = Envelope::decode(&envelope.encode()).expect("decode");
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn split_round_trip() {
        let envelope = Envelope::split(
            SplitDescriptor {
                total_len: 95_000,
                chunk_count: 2,
                chunk_size: 65_000,
            },
            true,
        );
        let decoded = Envelope::decode(&envelope.encode()).expect("decode");
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn rejects_bad_magic() {
        assert_eq!(
            Envelope::decode(b"NOPE\x01\x00"),
            Err(CorruptValue::BadMagic)
        );
    }

    #[test]
    fn rejects_unknown_version() {
        assert_eq!(
            Envelope::decode(b"FJRD\x09\x00"),
            Err(CorruptValue::UnknownVersion { version: 9 })
        );
    }

    #[test]
    fn rejects_short_frame() {
        assert_eq!(
            Envelope::decode(b"FJR"),
            Err(CorruptValue::Truncated { len: 3 })
        );
    }
}
