use crate::{
    kv::{KvError, KvTransaction, Subspace},
    tuple::{Tuple, TupleElement},
};
use thiserror::Error as ThisError;

const STATE_KEY: &str = "index-state";

///
/// IndexStateError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum IndexStateError {
    #[error("invalid index state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: IndexState, to: IndexState },

    #[error("unknown index state byte: {byte}")]
    UnknownState { byte: u8 },

    #[error(transparent)]
    Kv(#[from] KvError),
}

///
/// IndexState
///
/// Lifecycle gate for one index. `Disabled` indexes are invisible to both
/// maintenance and planning; `WriteOnly` is the backfill target; only
/// `Readable` indexes may serve queries.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum IndexState {
    Disabled,
    WriteOnly,
    #[default]
    Readable,
}

impl IndexState {
    const DISABLED_BYTE: u8 = 0;
    const WRITE_ONLY_BYTE: u8 = 1;
    const READABLE_BYTE: u8 = 2;

    #[must_use]
    pub const fn encode(self) -> u8 {
        match self {
            Self::Disabled => Self::DISABLED_BYTE,
            Self::WriteOnly => Self::WRITE_ONLY_BYTE,
            Self::Readable => Self::READABLE_BYTE,
        }
    }

    pub const fn decode(byte: u8) -> Result<Self, IndexStateError> {
        match byte {
            Self::DISABLED_BYTE => Ok(Self::Disabled),
            Self::WRITE_ONLY_BYTE => Ok(Self::WriteOnly),
            Self::READABLE_BYTE => Ok(Self::Readable),
            byte => Err(IndexStateError::UnknownState { byte }),
        }
    }

    /// Whether writes maintain the index in this state.
    #[must_use]
    pub const fn maintained(self) -> bool {
        matches!(self, Self::WriteOnly | Self::Readable)
    }

    /// Whether query planning may select the index.
    #[must_use]
    pub const fn queryable(self) -> bool {
        matches!(self, Self::Readable)
    }

    const fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Disabled, Self::WriteOnly)
                | (Self::WriteOnly, Self::Readable | Self::Disabled)
                | (Self::Readable, Self::WriteOnly | Self::Disabled)
        )
    }
}

///
/// IndexStateManager
///
/// Persists one state byte per index under the entity's metadata subspace.
/// A missing record reads as `Readable`: indexes declared before the store
/// held any data are trivially complete. State changes commit with the
/// transaction that makes them and gate all subsequent maintenance.
///

#[derive(Clone, Debug)]
pub struct IndexStateManager {
    metadata: Subspace,
}

impl IndexStateManager {
    #[must_use]
    pub const fn new(metadata: Subspace) -> Self {
        Self { metadata }
    }

    fn state_key(&self, name: &str) -> Vec<u8> {
        self.metadata.pack(&Tuple::new(vec![
            TupleElement::String(STATE_KEY.to_string()),
            TupleElement::String(name.to_string()),
        ]))
    }

    pub async fn state(
        &self,
        txn: &dyn KvTransaction,
        name: &str,
    ) -> Result<IndexState, IndexStateError> {
        match txn.get(&self.state_key(name), false).await? {
            None => Ok(IndexState::Readable),
            Some(raw) if raw.len() == 1 => IndexState::decode(raw[0]),
            Some(raw) => Err(IndexStateError::UnknownState {
                byte: raw.first().copied().unwrap_or_default(),
            }),
        }
    }

    async fn transition(
        &self,
        txn: &dyn KvTransaction,
        name: &str,
        to: IndexState,
    ) -> Result<(), IndexStateError> {
        let from = self.state(txn, name).await?;
        if !from.can_transition(to) {
            return Err(IndexStateError::InvalidTransition { from, to });
        }
        txn.set(&self.state_key(name), &[to.encode()]);
        tracing::debug!(index = name, ?from, ?to, "index state transition");
        Ok(())
    }

    /// `disabled -> writeOnly`: begin maintaining without serving reads.
    pub async fn enable(&self, txn: &dyn KvTransaction, name: &str) -> Result<(), IndexStateError> {
        self.transition(txn, name, IndexState::WriteOnly).await
    }

    /// `writeOnly -> readable`: the backfill finished; planning may use it.
    pub async fn make_readable(
        &self,
        txn: &dyn KvTransaction,
        name: &str,
    ) -> Result<(), IndexStateError> {
        self.transition(txn, name, IndexState::Readable).await
    }

    /// `readable -> writeOnly`: take the index out of planning for rebuild.
    pub async fn rebuild(
        &self,
        txn: &dyn KvTransaction,
        name: &str,
    ) -> Result<(), IndexStateError> {
        self.transition(txn, name, IndexState::WriteOnly).await
    }

    /// Turn the index off entirely.
    pub async fn disable(
        &self,
        txn: &dyn KvTransaction,
        name: &str,
    ) -> Result<(), IndexStateError> {
        self.transition(txn, name, IndexState::Disabled).await
    }
}

///
/// TESTS
///
