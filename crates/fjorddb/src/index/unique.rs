use crate::{
    kv::{KvTransaction, RangeOptions, Subspace},
    store::StoreError,
    tuple::{Tuple, TupleElement},
};
use futures::TryStreamExt;

const VIOLATIONS_KEY: &str = "uniqueness-violations";

///
/// UniquenessViolation
///
/// One recorded conflict: the value tuple that collided and the id that
/// attempted to claim it. The value side of the KV entry holds the packed
/// id that already owns the value.
///

#[derive(Clone, Debug, PartialEq)]
pub struct UniquenessViolation {
    pub value_key: Tuple,
    pub new_id: Tuple,
    pub existing_id: Tuple,
}

/// Subspace holding the violation set for one index.
#[must_use]
pub fn violations_space(metadata: &Subspace, index_name: &str) -> Subspace {
    metadata.subspace(&Tuple::new(vec![
        TupleElement::String(VIOLATIONS_KEY.to_string()),
        TupleElement::String(index_name.to_string()),
    ]))
}

/// Record one conflict under
/// `metadata/uniqueness-violations/<index>/<valueKey>/<newId>`.
pub fn record_violation(
    txn: &dyn KvTransaction,
    metadata: &Subspace,
    index_name: &str,
    value_key: &Tuple,
    new_id: &Tuple,
    existing_id: &Tuple,
) {
    let space = violations_space(metadata, index_name);
    let mut elements = value_key.0.clone();
    elements.push(TupleElement::Nested(new_id.0.clone()));
    let key = space.pack(&Tuple::new(elements));
    txn.set(&key, &existing_id.pack());
    tracing::warn!(index = index_name, "uniqueness violation recorded");
}

/// All recorded violations for one index, for reporting and for gating
/// `make_readable`.
pub async fn scan_violations(
    txn: &dyn KvTransaction,
    metadata: &Subspace,
    index_name: &str,
) -> Result<Vec<UniquenessViolation>, StoreError> {
    let space = violations_space(metadata, index_name);
    let (begin, end) = space.range();

    let mut out = Vec::new();
    let mut range = txn.get_range(&begin, &end, RangeOptions::default());
    while let Some((key, value)) = range.try_next().await? {
        let mut elements = space.unpack(&key)?.0;
        let new_id = match elements.pop() {
            Some(TupleElement::Nested(id)) => Tuple::new(id),
            Some(other) => Tuple::new(vec![other]),
            None => Tuple::default(),
        };
        out.push(UniquenessViolation {
            value_key: Tuple::new(elements),
            new_id,
            existing_id: Tuple::unpack(&value)?,
        });
    }
    Ok(out)
}

/// Drop the whole violation set for one index.
pub fn clear_violations(txn: &dyn KvTransaction, metadata: &Subspace, index_name: &str) {
    let (begin, end) = violations_space(metadata, index_name).range();
    txn.clear_range(&begin, &end);
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{clear_violations, record_violation, scan_violations};
    use crate::{
        kv::{KvDatabase, MemoryDatabase, Subspace},
        tuple::{Tuple, TupleElement},
    };

    fn metadata() -> Subspace {
        Subspace::new(vec![0x0b])
    }

    fn tuple(text: &str) -> Tuple {
        Tuple::new(vec![TupleElement::String(text.to_string())])
    }

    #[tokio::test]
    async fn record_scan_clear_round_trip() {
        let db = MemoryDatabase::new();
        let txn = db.begin();

        record_violation(
            txn.as_ref(),
            &metadata(),
            "by_email",
            &tuple("a@x"),
            &tuple("new"),
            &tuple("old"),
        );

        let found = scan_violations(txn.as_ref(), &metadata(), "by_email")
            .await
            .expect("scan");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value_key, tuple("a@x"));
        assert_eq!(found[0].new_id, tuple("new"));
        assert_eq!(found[0].existing_id, tuple("old"));

        clear_violations(txn.as_ref(), &metadata(), "by_email");
        assert!(
            scan_violations(txn.as_ref(), &metadata(), "by_email")
                .await
                .expect("scan")
                .is_empty()
        );
    }
}
