//! Ordered-KV contract assumed from the host.
//!
//! The layer never touches storage directly; everything goes through
//! [`KvDatabase`] and [`KvTransaction`]. Transactions are single-owner
//! values: they may be handed down a pipeline but must not be shared
//! across concurrent suspension branches.

mod directory;
mod memory;
mod subspace;

pub use directory::DirectoryLayer;
pub use memory::MemoryDatabase;
pub use subspace::Subspace;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error as ThisError;

///
/// KvError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum KvError {
    #[error("transaction conflict; retryable")]
    Conflict,

    #[error("transaction not committed; retryable: {retryable}")]
    NotCommitted { retryable: bool },

    #[error("transaction already committed or aborted")]
    TransactionClosed,

    #[error("value exceeds the per-value size limit: {len} bytes")]
    ValueTooLarge { len: usize },

    #[error("host kv failure: {message}")]
    Backend { message: String },
}

impl KvError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict | Self::NotCommitted { retryable: true }
        )
    }
}

///
/// Versionstamp
///
/// Monotonic commit token: 8-byte commit version, 2-byte batch order,
/// 2 user bytes. Usable directly as a tuple element.
///

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Versionstamp([u8; 12]);

impl Versionstamp {
    #[must_use]
    pub const fn from_parts(version: u64, batch: u16) -> Self {
        let v = version.to_be_bytes();
        let b = batch.to_be_bytes();
        Self([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], b[0], b[1], 0, 0])
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(raw)
    }

    #[must_use]
    pub const fn to_bytes(self) -> [u8; 12] {
        self.0
    }
}

///
/// RangeOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct RangeOptions {
    pub limit: Option<usize>,
    pub reverse: bool,
    pub snapshot: bool,
}

impl RangeOptions {
    #[must_use]
    pub const fn limited(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            reverse: false,
            snapshot: false,
        }
    }

    #[must_use]
    pub const fn reversed() -> Self {
        Self {
            limit: None,
            reverse: true,
            snapshot: false,
        }
    }
}

/// One key/value pair yielded by a range read.
pub type KvPair = (Vec<u8>, Vec<u8>);

///
/// KvTransaction
///
/// The transactional surface the record layer writes through. All reads
/// observe the transaction's own uncommitted writes.
///

#[async_trait]
pub trait KvTransaction: Send + Sync {
    async fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>, KvError>;

    /// Lazy range read over `[begin, end)`. Implementations must page from
    /// the backend rather than materialize the whole range.
    fn get_range(
        &self,
        begin: &[u8],
        end: &[u8],
        options: RangeOptions,
    ) -> BoxStream<'_, Result<KvPair, KvError>>;

    fn set(&self, key: &[u8], value: &[u8]);

    fn clear(&self, key: &[u8]);

    fn clear_range(&self, begin: &[u8], end: &[u8]);

    /// Little-endian 8-byte atomic add; a missing key reads as zero.
    fn atomic_add(&self, key: &[u8], delta: i64);

    /// Set `prefix ++ pack(versionstamp)` at commit time, once the commit
    /// version is known.
    fn set_versionstamped(&self, prefix: &[u8], value: &[u8]);

    /// Current read version of this transaction, fetching one if needed.
    async fn read_version(&self) -> Result<u64, KvError>;

    /// Install a read version obtained elsewhere (weak-read path).
    fn set_read_version(&self, version: u64);

    /// Commit all buffered mutations. The transaction is closed afterwards
    /// regardless of outcome.
    async fn commit(&self) -> Result<Versionstamp, KvError>;

    /// Drop all buffered mutations and reopen the transaction for a retry.
    fn reset(&self);
}

///
/// KvDatabase
///

#[async_trait]
pub trait KvDatabase: Send + Sync {
    fn begin(&self) -> Box<dyn KvTransaction>;

    /// Latest committed version without opening a transaction.
    async fn current_version(&self) -> Result<u64, KvError>;
}
