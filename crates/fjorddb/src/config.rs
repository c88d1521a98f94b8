use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_THRESHOLD, store::Compression};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ConfigError {
    #[error("chunk_size must be non-zero")]
    ZeroChunkSize,

    #[error("chunk_threshold must be non-zero")]
    ZeroChunkThreshold,
}

///
/// DatabaseConfig
///
/// Process-level knobs for the storage layer. Loaded once at database
/// construction; transaction-scoped behavior lives in `TransactionConfig`.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Values whose payload exceeds this many bytes are chunked.
    pub chunk_threshold: usize,
    /// Size of one blob chunk.
    pub chunk_size: usize,
    pub compression: Compression,
    /// Default staleness bound for the read-version cache, in seconds.
    pub read_version_staleness_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: Compression::None,
            read_version_staleness_secs: 5,
        }
    }
}

impl DatabaseConfig {
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.chunk_threshold == 0 {
            return Err(ConfigError::ZeroChunkThreshold);
        }
        Ok(())
    }
}

///
/// TESTS
///
