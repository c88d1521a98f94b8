use crate::record::{RecordCodec, SerializeError};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

///
/// RangeSet
///
/// The builder's persisted progress token: the set of byte-key ranges still
/// to be processed. The set only ever shrinks, and it shrinks in the same
/// transaction that commits the corresponding index writes, so progress is
/// monotone over committed work.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RangeSet {
    ranges: Vec<(ByteBuf, ByteBuf)>,
}

impl RangeSet {
    /// The full `[begin, end)` range, the initial progress value.
    #[must_use]
    pub fn full(begin: Vec<u8>, end: Vec<u8>) -> Self {
        Self {
            ranges: vec![(ByteBuf::from(begin), ByteBuf::from(end))],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Next range to process.
    #[must_use]
    pub fn first(&self) -> Option<(&[u8], &[u8])> {
        self.ranges
            .first()
            .map(|(begin, end)| (begin.as_slice(), end.as_slice()))
    }

    /// Advance the first range past `last_processed`: the remaining work in
    /// that range starts at the immediate successor key.
    pub fn advance_first(&mut self, last_processed: &[u8]) {
        if let Some((begin, _)) = self.ranges.first_mut() {
            let mut next = last_processed.to_vec();
            next.push(0x00);
            *begin = ByteBuf::from(next);
        }
    }

    /// Drop the first range entirely.
    pub fn complete_first(&mut self) {
        if !self.ranges.is_empty() {
            self.ranges.remove(0);
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SerializeError> {
        RecordCodec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SerializeError> {
        RecordCodec::decode(bytes)
    }
}

///
/// TESTS
///
