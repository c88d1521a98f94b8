//! FjordDB: a typed record persistence and query layer over an ordered,
//! transactional key-value store.
//!
//! The engine stores strongly-typed records under per-entity directories,
//! maintains a polymorphic family of secondary indexes inside the same
//! transaction as every record write, backfills indexes online in resumable
//! batches, and evaluates predicates and sorts over typed field accessors.
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod index;
pub mod kv;
pub mod obs;
pub mod query;
pub mod record;
pub mod schema;
pub mod store;
pub mod tuple;
pub mod txn;

// Fixture entities for the crate's own unit and integration suites.
#[cfg(any(test, feature = "test-support"))]
#[doc(hidden)]
pub mod test_support;

///
/// CONSTANTS
///

/// Default split threshold for stored values, in bytes.
///
/// Chosen below the host KV's per-value cap with margin so an envelope plus
/// descriptor never crosses the cap even after framing.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 90_000;

/// Default size of one blob chunk, in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 65_000;

///
/// Prelude
///
/// Domain vocabulary only. No errors, stores, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        index::{IndexDescriptor, IndexKind, IndexState},
        kv::{KvDatabase, KvTransaction, Subspace},
        record::{AuthContext, FieldValue, RecordKind, RecordModel},
        txn::{RecordContext, TransactionConfig},
    };
}
