use crate::store::CorruptValue;
use flate2::{Compression as Level, read::DeflateDecoder, write::DeflateEncoder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

///
/// Compression
///
/// Transparent byte-transforming stage applied before chunking. `None`
/// passes bytes through; `Deflate` trades CPU for value size.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Deflate,
}

impl Compression {
    /// Compress when enabled and profitable; returns `None` when the raw
    /// bytes should be stored as-is.
    #[must_use]
    pub fn compress(self, bytes: &[u8]) -> Option<Vec<u8>> {
        match self {
            Self::None => None,
            Self::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Level::default());
                encoder.write_all(bytes).ok()?;
                let compressed = encoder.finish().ok()?;
                (compressed.len() < bytes.len()).then_some(compressed)
            }
        }
    }

    pub fn decompress(self, bytes: &[u8]) -> Result<Vec<u8>, CorruptValue> {
        match self {
            Self::None => Ok(bytes.to_vec()),
            Self::Deflate => {
                let mut out = Vec::new();
                DeflateDecoder::new(bytes)
                    .read_to_end(&mut out)
                    .map_err(|err| CorruptValue::Decompress(err.to_string()))?;
                Ok(out)
            }
        }
    }
}

///
/// TESTS
///
