use crate::{
    error::Error,
    index::{
        IndexDescriptor, IndexEntry, IndexKind, IndexState, IndexStateManager, entries,
        unique::record_violation,
    },
    kv::{KvTransaction, RangeOptions, Subspace},
    record::{RecordKind, RecordRead},
    tuple::{Tuple, TupleElement},
    txn::CommitCheckError,
};
use futures::TryStreamExt;
use std::collections::BTreeMap;

///
/// MaintenanceOp
///
/// One primitive mutation derived from a record delta. Ops are executed in
/// order inside the enclosing transaction; clears always precede sets for
/// the same descriptor.
///

#[derive(Clone, Debug, PartialEq)]
pub enum MaintenanceOp {
    Set { key: Vec<u8>, value: Vec<u8> },
    Clear { key: Vec<u8> },
    ClearPrefix { begin: Vec<u8>, end: Vec<u8> },
    Add { key: Vec<u8>, delta: i64 },
    SetVersionstamped { prefix: Vec<u8>, value: Vec<u8> },
    RetainVersions { begin: Vec<u8>, end: Vec<u8>, keep: u32 },
}

///
/// IndexMaintainer
///
/// For a given record delta, applies exactly the affected index entries of
/// every maintained index inside the current transaction. Dispatch always
/// goes through each kind's `entries`; multi-entry kinds are never
/// collapsed into a single-entry write.
///

#[derive(Clone, Debug)]
pub struct IndexMaintainer {
    indexes: Subspace,
    metadata: Subspace,
    entity: &'static str,
}

impl IndexMaintainer {
    #[must_use]
    pub const fn new(indexes: Subspace, metadata: Subspace) -> Self {
        Self {
            indexes,
            metadata,
            entity: "",
        }
    }

    /// Label violation counters with the owning entity.
    #[must_use]
    pub const fn with_entity(mut self, entity: &'static str) -> Self {
        self.entity = entity;
        self
    }

    /// Subspace of one index, derived once per dispatch.
    #[must_use]
    pub fn index_space(&self, name: &str) -> Subspace {
        self.indexes
            .child(TupleElement::String(name.to_string()))
    }

    #[must_use]
    pub const fn metadata(&self) -> &Subspace {
        &self.metadata
    }

    /// Apply the `(old, new)` delta for every maintained index of `R`.
    pub async fn apply<R: RecordKind>(
        &self,
        txn: &dyn KvTransaction,
        states: &IndexStateManager,
        old: Option<&R>,
        new: Option<&R>,
    ) -> Result<(), Error> {
        let Some(id) = new.or(old).map(RecordKind::primary_key) else {
            return Ok(());
        };

        for descriptor in R::INDEXES {
            let state = states.state(txn, descriptor.name).await?;
            if !state.maintained() {
                continue;
            }
            self.apply_one(
                txn,
                descriptor,
                state,
                old.map(|r| r as &dyn RecordRead),
                new.map(|r| r as &dyn RecordRead),
                &id,
            )
            .await?;
        }
        Ok(())
    }

    /// Apply one descriptor's delta; used by both live maintenance and the
    /// online builder (with `old = None`).
    pub async fn apply_one(
        &self,
        txn: &dyn KvTransaction,
        descriptor: &IndexDescriptor,
        state: IndexState,
        old: Option<&dyn RecordRead>,
        new: Option<&dyn RecordRead>,
        id: &Tuple,
    ) -> Result<(), Error> {
        let space = self.index_space(descriptor.name);
        let old_entries = sparse_filter(descriptor, old.map(|r| entries(descriptor, r, id)));
        let new_entries = sparse_filter(descriptor, new.map(|r| entries(descriptor, r, id)));

        if descriptor.unique {
            self.check_unique(txn, descriptor, state, &space, &old_entries, &new_entries, id)
                .await?;
        }

        let ops = delta_ops(
            descriptor,
            &space,
            &old_entries,
            &new_entries,
            id,
            RecordPresence {
                old: old.is_some(),
                new: new.is_some(),
            },
        );
        self.execute(txn, ops).await?;
        Ok(())
    }

    async fn execute(
        &self,
        txn: &dyn KvTransaction,
        ops: Vec<MaintenanceOp>,
    ) -> Result<(), Error> {
        for op in ops {
            match op {
                MaintenanceOp::Set { key, value } => txn.set(&key, &value),
                MaintenanceOp::Clear { key } => txn.clear(&key),
                MaintenanceOp::ClearPrefix { begin, end } => txn.clear_range(&begin, &end),
                MaintenanceOp::Add { key, delta } => txn.atomic_add(&key, delta),
                MaintenanceOp::SetVersionstamped { prefix, value } => {
                    txn.set_versionstamped(&prefix, &value);
                }
                MaintenanceOp::RetainVersions { begin, end, keep } => {
                    retain_versions(txn, &begin, &end, keep).await?;
                }
            }
        }
        Ok(())
    }

    /// Unique pre-check: any existing entry with the same value tuple but a
    /// different id is a conflict. During backfill (`writeOnly`) conflicts
    /// are recorded for later reconciliation; on a readable index they fail
    /// the save.
    #[expect(clippy::too_many_arguments)]
    async fn check_unique(
        &self,
        txn: &dyn KvTransaction,
        descriptor: &IndexDescriptor,
        state: IndexState,
        space: &Subspace,
        old_entries: &[IndexEntry],
        new_entries: &[IndexEntry],
        id: &Tuple,
    ) -> Result<(), Error> {
        let id_len = id.0.len();
        for entry in new_entries {
            if old_entries.iter().any(|e| e.subkey == entry.subkey) {
                continue;
            }
            let Some(value_len) = entry.subkey.0.len().checked_sub(id_len) else {
                continue;
            };
            let value_tuple = Tuple::new(entry.subkey.0[..value_len].to_vec());
            let (begin, end) = space.subspace(&value_tuple).range();

            let mut range = txn.get_range(&begin, &end, RangeOptions::limited(2));
            while let Some((key, _)) = range.try_next().await.map_err(Error::Kv)? {
                let existing = space.unpack(&key).map_err(Error::Tuple)?;
                let existing_id = Tuple::new(existing.0[value_len..].to_vec());
                if existing_id == *id {
                    continue;
                }
                if state == IndexState::Readable {
                    return Err(Error::CommitCheck(CommitCheckError::ValidationFailed {
                        name: format!("unique:{}", descriptor.name),
                        reason: format!(
                            "value already indexed for a different id under '{}'",
                            descriptor.name
                        ),
                    }));
                }
                record_violation(
                    txn,
                    &self.metadata,
                    descriptor.name,
                    &value_tuple,
                    id,
                    &existing_id,
                );
                crate::obs::record_unique_violation(self.entity);
            }
        }
        Ok(())
    }
}

fn sparse_filter(descriptor: &IndexDescriptor, entries: Option<Vec<IndexEntry>>) -> Vec<IndexEntry> {
    let entries = entries.unwrap_or_default();
    if !descriptor.sparse {
        return entries;
    }
    entries
        .into_iter()
        .filter(|entry| {
            !entry
                .subkey
                .0
                .iter()
                .any(|element| matches!(element, TupleElement::Null))
        })
        .collect()
}

#[derive(Clone, Copy, Debug)]
struct RecordPresence {
    old: bool,
    new: bool,
}

/// The uniform delta: `old \ new` clears, `new \ old` sets. The atomic-add
/// kinds express their delta as adds, and the version kind as a commit-time
/// append (or a history clear on delete).
fn delta_ops(
    descriptor: &IndexDescriptor,
    space: &Subspace,
    old_entries: &[IndexEntry],
    new_entries: &[IndexEntry],
    id: &Tuple,
    presence: RecordPresence,
) -> Vec<MaintenanceOp> {
    match descriptor.kind {
        IndexKind::Count | IndexKind::Sum => add_ops(space, old_entries, new_entries),
        IndexKind::Version { keep_last_n } => version_ops(space, id, keep_last_n, presence),
        _ => diff_ops(space, old_entries, new_entries),
    }
}

fn diff_ops(
    space: &Subspace,
    old_entries: &[IndexEntry],
    new_entries: &[IndexEntry],
) -> Vec<MaintenanceOp> {
    let old: BTreeMap<Vec<u8>, &[u8]> = old_entries
        .iter()
        .map(|e| (space.pack(&e.subkey), e.value.as_slice()))
        .collect();
    let new: BTreeMap<Vec<u8>, &[u8]> = new_entries
        .iter()
        .map(|e| (space.pack(&e.subkey), e.value.as_slice()))
        .collect();

    let mut ops = Vec::new();
    for key in old.keys() {
        if !new.contains_key(key) {
            ops.push(MaintenanceOp::Clear { key: key.clone() });
        }
    }
    for (key, value) in &new {
        if old.get(key) != Some(value) {
            ops.push(MaintenanceOp::Set {
                key: key.clone(),
                value: value.to_vec(),
            });
        }
    }
    ops
}

fn add_ops(
    space: &Subspace,
    old_entries: &[IndexEntry],
    new_entries: &[IndexEntry],
) -> Vec<MaintenanceOp> {
    let old = old_entries.first().map(|e| (space.pack(&e.subkey), le_delta(&e.value)));
    let new = new_entries.first().map(|e| (space.pack(&e.subkey), le_delta(&e.value)));

    // Same group and magnitude cancels to a no-op.
    if old == new {
        return Vec::new();
    }

    let mut ops = Vec::new();
    if let Some((key, delta)) = old {
        ops.push(MaintenanceOp::Add { key, delta: -delta });
    }
    if let Some((key, delta)) = new {
        ops.push(MaintenanceOp::Add { key, delta });
    }
    ops
}

fn version_ops(
    space: &Subspace,
    id: &Tuple,
    keep_last_n: Option<u32>,
    presence: RecordPresence,
) -> Vec<MaintenanceOp> {
    // Version entries have no at-rest derivation from the record: a write
    // appends one commit-stamped entry, a delete clears the history prefix.
    let history = space.subspace(id);
    let (begin, end) = history.range();

    if !presence.new {
        if presence.old {
            return vec![MaintenanceOp::ClearPrefix { begin, end }];
        }
        return Vec::new();
    }

    let mut ops = vec![MaintenanceOp::SetVersionstamped {
        prefix: history.prefix().to_vec(),
        value: Vec::new(),
    }];
    if let Some(keep) = keep_last_n {
        ops.push(MaintenanceOp::RetainVersions { begin, end, keep });
    }
    ops
}

fn le_delta(value: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    let len = value.len().min(8);
    raw[..len].copy_from_slice(&value[..len]);
    i64::from_le_bytes(raw)
}

async fn retain_versions(
    txn: &dyn KvTransaction,
    begin: &[u8],
    end: &[u8],
    keep: u32,
) -> Result<(), Error> {
    let keys: Vec<Vec<u8>> = txn
        .get_range(begin, end, RangeOptions::default())
        .map_ok(|(key, _)| key)
        .try_collect()
        .await
        .map_err(Error::Kv)?;

    // One entry is appended at commit; keep `keep - 1` existing entries.
    let keep_existing = keep.saturating_sub(1) as usize;
    if keys.len() > keep_existing {
        let doomed = keys.len() - keep_existing;
        for key in &keys[..doomed] {
            txn.clear(key);
        }
    }
    Ok(())
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::IndexMaintainer;
    use crate::{
        index::{IndexDescriptor, IndexKind, IndexState},
        kv::{KvDatabase, MemoryDatabase, Subspace},
        record::{FieldValue, RecordRead},
        tuple::{Tuple, TupleElement},
    };

    struct Edge {
        from: &'static str,
        to: &'static str,
    }

    impl RecordRead for Edge {
        fn field_value(&self, name: &str) -> FieldValue {
            match name {
                "from" => FieldValue::String(self.from.into()),
                "edge" => FieldValue::String("follows".into()),
                "to" => FieldValue::String(self.to.into()),
                _ => FieldValue::Null,
            }
        }
    }

    fn maintainer() -> IndexMaintainer {
        IndexMaintainer::new(Subspace::new(vec![0x03]), Subspace::new(vec![0x04]))
    }

    fn id() -> Tuple {
        Tuple::new(vec![TupleElement::Int(1)])
    }

    const GRAPH: IndexDescriptor = IndexDescriptor::new(
        "social",
        IndexKind::GraphAdjacency {
            bidirectional: false,
        },
        &["from", "edge", "to"],
    );

    #[tokio::test]
    async fn graph_insert_then_delete_is_coherent() {
        let db = MemoryDatabase::new();
        let maintainer = maintainer();
        let edge = Edge {
            from: "alice",
            to: "bob",
        };

        let txn = db.begin();
        maintainer
            .apply_one(
                txn.as_ref(),
                &GRAPH,
                IndexState::Readable,
                None,
                Some(&edge),
                &id(),
            )
            .await
            .expect("insert");
        txn.commit().await.expect("commit");

        let (begin, end) = maintainer.index_space("social").range();
        assert_eq!(db.committed_range(&begin, &end).len(), 2);

        let txn = db.begin();
        maintainer
            .apply_one(
                txn.as_ref(),
                &GRAPH,
                IndexState::Readable,
                Some(&edge),
                None,
                &id(),
            )
            .await
            .expect("delete");
        txn.commit().await.expect("commit");

        assert_eq!(db.committed_range(&begin, &end).len(), 0);
    }

    #[tokio::test]
    async fn update_touches_only_the_delta() {
        let db = MemoryDatabase::new();
        let maintainer = maintainer();
        let old = Edge {
            from: "alice",
            to: "bob",
        };
        let new = Edge {
            from: "alice",
            to: "carol",
        };

        let txn = db.begin();
        maintainer
            .apply_one(
                txn.as_ref(),
                &GRAPH,
                IndexState::Readable,
                None,
                Some(&old),
                &id(),
            )
            .await
            .expect("insert");
        maintainer
            .apply_one(
                txn.as_ref(),
                &GRAPH,
                IndexState::Readable,
                Some(&old),
                Some(&new),
                &id(),
            )
            .await
            .expect("update");
        txn.commit().await.expect("commit");

        let (begin, end) = maintainer.index_space("social").range();
        let entries = db.committed_range(&begin, &end);
        assert_eq!(entries.len(), 2);
        let space = maintainer.index_space("social");
        for (key, _) in entries {
            let tuple = space.unpack(&key).expect("unpack");
            assert!(tuple.0.contains(&TupleElement::String("carol".into())));
            assert!(!tuple.0.contains(&TupleElement::String("bob".into())));
        }
    }

    #[tokio::test]
    async fn count_updates_use_atomic_adds() {
        struct Row(&'static str);
        impl RecordRead for Row {
            fn field_value(&self, name: &str) -> FieldValue {
                match name {
                    "dept" => FieldValue::String(self.0.into()),
                    _ => FieldValue::Null,
                }
            }
        }

        const COUNT: IndexDescriptor =
            IndexDescriptor::new("dept_count", IndexKind::Count, &["dept"]);

        let db = MemoryDatabase::new();
        let maintainer = maintainer();

        let txn = db.begin();
        for _ in 0..3 {
            maintainer
                .apply_one(
                    txn.as_ref(),
                    &COUNT,
                    IndexState::Readable,
                    None,
                    Some(&Row("eng")),
                    &id(),
                )
                .await
                .expect("insert");
        }
        // Group change moves one unit from eng to ops.
        maintainer
            .apply_one(
                txn.as_ref(),
                &COUNT,
                IndexState::Readable,
                Some(&Row("eng")),
                Some(&Row("ops")),
                &id(),
            )
            .await
            .expect("update");
        txn.commit().await.expect("commit");

        let space = maintainer.index_space("dept_count");
        let key = space.pack(&Tuple::new(vec![TupleElement::String("eng".into())]));
        let (begin, end) = space.range();
        let groups = db.committed_range(&begin, &end);
        assert_eq!(groups.len(), 2);
        let eng = groups.iter().find(|(k, _)| *k == key).expect("eng group");
        assert_eq!(super::le_delta(&eng.1), 2);
    }

    #[tokio::test]
    async fn sparse_indexes_skip_null_keys() {
        struct Row(Option<&'static str>);
        impl RecordRead for Row {
            fn field_value(&self, name: &str) -> FieldValue {
                match name {
                    "nickname" => self
                        .0
                        .map_or(FieldValue::Null, |v| FieldValue::String(v.into())),
                    _ => FieldValue::Null,
                }
            }
        }

        const SPARSE: IndexDescriptor =
            IndexDescriptor::new("by_nickname", IndexKind::Scalar, &["nickname"]).sparse();

        let db = MemoryDatabase::new();
        let maintainer = maintainer();

        let txn = db.begin();
        maintainer
            .apply_one(
                txn.as_ref(),
                &SPARSE,
                IndexState::Readable,
                None,
                Some(&Row(None)),
                &id(),
            )
            .await
            .expect("null insert");
        maintainer
            .apply_one(
                txn.as_ref(),
                &SPARSE,
                IndexState::Readable,
                None,
                Some(&Row(Some("fj"))),
                &Tuple::new(vec![TupleElement::Int(2)]),
            )
            .await
            .expect("insert");
        txn.commit().await.expect("commit");

        let (begin, end) = maintainer.index_space("by_nickname").range();
        assert_eq!(db.committed_range(&begin, &end).len(), 1);
    }
}
