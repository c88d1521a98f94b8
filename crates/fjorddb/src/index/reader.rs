use crate::{
    error::Error,
    index::{
        IndexDescriptor, IndexKind, IndexState, IndexStateManager, VectorMetric, decode_vector,
    },
    kv::{KvTransaction, RangeOptions, Subspace},
    record::FieldValue,
    tuple::{Tuple, TupleElement},
};
use futures::TryStreamExt;

///
/// IndexReader
///
/// Read-side operations over one index subspace. Every call gates on the
/// index being `readable`; reading a write-only or disabled index is a
/// planning error, not a data error.
///

pub struct IndexReader {
    descriptor: &'static IndexDescriptor,
    space: Subspace,
    states: IndexStateManager,
}

impl IndexReader {
    #[must_use]
    pub const fn new(
        descriptor: &'static IndexDescriptor,
        space: Subspace,
        states: IndexStateManager,
    ) -> Self {
        Self {
            descriptor,
            space,
            states,
        }
    }

    async fn ensure_readable(&self, txn: &dyn KvTransaction) -> Result<(), Error> {
        let state = self.states.state(txn, self.descriptor.name).await?;
        if state.queryable() {
            Ok(())
        } else {
            Err(Error::IndexState(
                crate::index::IndexStateError::InvalidTransition {
                    from: state,
                    to: IndexState::Readable,
                },
            ))
        }
    }

    fn group_space(&self, group: &[FieldValue]) -> Subspace {
        let elements = group.iter().map(FieldValue::to_tuple_element).collect();
        self.space.subspace(&Tuple::new(elements))
    }

    /// Count for one group of a `Count` index.
    pub async fn count(
        &self,
        txn: &dyn KvTransaction,
        group: &[FieldValue],
    ) -> Result<i64, Error> {
        self.ensure_readable(txn).await?;
        let key = self.group_space(group).prefix().to_vec();
        Ok(txn.get(&key, false).await?.map_or(0, |raw| le_i64(&raw)))
    }

    /// Running sum for one group of a `Sum` index.
    pub async fn sum(&self, txn: &dyn KvTransaction, group: &[FieldValue]) -> Result<i64, Error> {
        self.count(txn, group).await
    }

    /// Smallest indexed value within a group of a `Min`/`Max` index: the
    /// first key under the group prefix.
    pub async fn min(
        &self,
        txn: &dyn KvTransaction,
        group: &[FieldValue],
    ) -> Result<Option<FieldValue>, Error> {
        self.extremum(txn, group, false).await
    }

    /// Largest indexed value within a group: the last key under the prefix.
    pub async fn max(
        &self,
        txn: &dyn KvTransaction,
        group: &[FieldValue],
    ) -> Result<Option<FieldValue>, Error> {
        self.extremum(txn, group, true).await
    }

    async fn extremum(
        &self,
        txn: &dyn KvTransaction,
        group: &[FieldValue],
        reverse: bool,
    ) -> Result<Option<FieldValue>, Error> {
        self.ensure_readable(txn).await?;
        let space = self.group_space(group);
        let (begin, end) = space.range();
        let options = RangeOptions {
            limit: Some(1),
            reverse,
            snapshot: true,
        };

        let mut range = txn.get_range(&begin, &end, options);
        let Some((key, _)) = range.try_next().await.map_err(Error::Kv)? else {
            return Ok(None);
        };
        let tuple = space.unpack(&key)?;
        Ok(tuple.0.first().map(FieldValue::from_tuple_element))
    }

    /// Top-K of a `Rank` index: a bounded scan from the high end.
    pub async fn top_k(
        &self,
        txn: &dyn KvTransaction,
        k: usize,
    ) -> Result<Vec<(FieldValue, Tuple)>, Error> {
        self.ensure_readable(txn).await?;
        let (begin, end) = self.space.range();
        let options = RangeOptions {
            limit: Some(k),
            reverse: true,
            snapshot: true,
        };

        let mut out = Vec::with_capacity(k);
        let mut range = txn.get_range(&begin, &end, options);
        while let Some((key, _)) = range.try_next().await.map_err(Error::Kv)? {
            let tuple = self.space.unpack(&key)?;
            let Some((score, id)) = tuple.0.split_first() else {
                continue;
            };
            out.push((FieldValue::from_tuple_element(score), Tuple::new(id.to_vec())));
        }
        Ok(out)
    }

    /// Brute-force nearest neighbors over a flat `Vector` index.
    pub async fn nearest(
        &self,
        txn: &dyn KvTransaction,
        query: &[f64],
        k: usize,
    ) -> Result<Vec<(Tuple, f64)>, Error> {
        self.ensure_readable(txn).await?;
        let metric = match self.descriptor.kind {
            IndexKind::Vector { metric } => metric,
            _ => VectorMetric::Cosine,
        };

        let (begin, end) = self.space.range();
        let mut scored: Vec<(Tuple, f64)> = Vec::new();
        let mut range = txn.get_range(&begin, &end, RangeOptions::default());
        while let Some((key, value)) = range.try_next().await.map_err(Error::Kv)? {
            let id = self.space.unpack(&key)?;
            let vector = decode_vector(&value);
            scored.push((id, metric.score(query, &vector)));
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }

    /// Adjacency traversal: ids of records for edges leaving (`out`) or
    /// entering (`in`) `node`, optionally bound to one edge label.
    pub async fn neighbors(
        &self,
        txn: &dyn KvTransaction,
        outgoing: bool,
        edge: &FieldValue,
        node: &FieldValue,
    ) -> Result<Vec<FieldValue>, Error> {
        self.ensure_readable(txn).await?;
        let orientation = if outgoing { "out" } else { "in" };
        let space = self.space.subspace(&Tuple::new(vec![
            TupleElement::String(orientation.to_string()),
            edge.to_tuple_element(),
            node.to_tuple_element(),
        ]));
        let (begin, end) = space.range();

        let mut out = Vec::new();
        let mut range = txn.get_range(&begin, &end, RangeOptions::default());
        while let Some((key, _)) = range.try_next().await.map_err(Error::Kv)? {
            let tuple = space.unpack(&key)?;
            if let Some(target) = tuple.0.first() {
                out.push(FieldValue::from_tuple_element(target));
            }
        }
        Ok(out)
    }
}

fn le_i64(raw: &[u8]) -> i64 {
    let mut out = [0u8; 8];
    let len = raw.len().min(8);
    out[..len].copy_from_slice(&raw[..len]);
    i64::from_le_bytes(out)
}

