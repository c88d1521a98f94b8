use crate::{
    index::IndexStateError,
    kv::KvError,
    query::ContinuationError,
    record::{SecurityError, SerializeError},
    store::{CorruptValue, StoreError},
    tuple::TupleError,
    txn::CommitCheckError,
};
use thiserror::Error as ThisError;

///
/// Error
/// Top-level surface error for the record layer.
///
/// Every variant carries an equatable shape so callers and tests can match
/// on kind rather than parse messages.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Tuple(#[from] TupleError),

    #[error(transparent)]
    Corrupt(#[from] CorruptValue),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    IndexState(#[from] IndexStateError),

    #[error(transparent)]
    CommitCheck(#[from] CommitCheckError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Continuation(#[from] ContinuationError),

    #[error("transaction timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("concurrent save on the same context")]
    ConcurrentSave,

    #[error("unknown record type: {name}")]
    UnknownRecordType { name: String },

    #[error("index not found: {name}")]
    UnknownIndex { name: String },

    #[error("index '{name}' has {count} unresolved uniqueness violations")]
    UniquenessViolations { name: String, count: usize },

    #[error("retry limit exhausted after {attempts} attempts: {last}")]
    RetryLimitExceeded { attempts: u32, last: KvError },
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Kv(e) => Self::Kv(e),
            StoreError::Corrupt(e) => Self::Corrupt(e),
            StoreError::Tuple(e) => Self::Tuple(e),
        }
    }
}

impl Error {
    /// True when the underlying failure is a retryable KV conflict.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Kv(err) if err.is_retryable())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
