//! Index coherence through the save pipeline and online-builder behavior:
//! resumable progress, multi-target fan-out, and unique gating.

use fjorddb::{
    kv::{DirectoryLayer, MemoryDatabase, Subspace},
    test_support::{Edge, Employee},
    tuple::TupleElement,
    txn::RecordDatabase,
};
use std::sync::Arc;

fn index_space(directory: &[&str], index: &str) -> Subspace {
    DirectoryLayer::open(directory)
        .child(TupleElement::String("indexes".into()))
        .child(TupleElement::String(index.to_string()))
}

fn metadata_space(directory: &[&str]) -> Subspace {
    DirectoryLayer::open(directory).child(TupleElement::String("metadata".into()))
}

fn employee(id: u32, dept: &str) -> Employee {
    Employee {
        id: format!("e{id:03}"),
        name: format!("employee {id}"),
        dept: dept.into(),
        email: format!("e{id}@fjord.example"),
        salary: 0,
    }
}

#[tokio::test]
async fn graph_index_holds_exactly_the_record_postings() {
    let kv = MemoryDatabase::new();
    let database = RecordDatabase::new(Arc::new(kv.clone()));
    let context = database.context();

    let edge = Edge {
        id: 1,
        from: "alice".into(),
        edge: "follows".into(),
        to: "bob".into(),
    };
    context.insert(edge.clone()).await.expect("queue");
    context.save().await.expect("save");

    let (begin, end) = index_space(&["app", "social"], "social").range();
    assert_eq!(kv.committed_range(&begin, &end).len(), 2);

    context.delete(&edge).await.expect("queue delete");
    context.save().await.expect("save");
    assert_eq!(kv.committed_range(&begin, &end).len(), 0);
}

#[tokio::test]
async fn interrupted_backfill_resumes_without_duplicates() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let kv = MemoryDatabase::new();
    let database = RecordDatabase::new(Arc::new(kv.clone()));
    let context = database.context();

    for i in 0..100 {
        context
            .insert(employee(i, if i % 2 == 0 { "eng" } else { "ops" }))
            .await
            .expect("queue");
    }
    context.save().await.expect("seed");

    // First builder: one committed batch, then the process "crashes".
    let builder = database
        .index_builder::<Employee>(&["by_dept", "dept_count"])
        .expect("targets")
        .batch_size(15)
        .clear_first(true);
    let (processed, done) = builder.step().await.expect("first batch");
    assert_eq!(processed, 15);
    assert!(!done);
    drop(builder);

    // Restart: a fresh builder picks up the persisted progress.
    let builder = database
        .index_builder::<Employee>(&["by_dept", "dept_count"])
        .expect("targets")
        .batch_size(15)
        .clear_first(true);
    let report = builder.build().await.expect("resume");
    assert!(report.blocked.is_empty());

    // Every id appears exactly once; no duplicate work is observable.
    let space = index_space(&["app", "employees"], "by_dept");
    let (begin, end) = space.range();
    let entries = kv.committed_range(&begin, &end);
    assert_eq!(entries.len(), 100);

    let mut ids = std::collections::BTreeSet::new();
    for (key, _) in &entries {
        let tuple = space.unpack(key).expect("unpack");
        assert!(ids.insert(tuple.0.last().cloned().expect("id element")));
    }
    assert_eq!(ids.len(), 100);

    // The counter groups saw each record exactly once too.
    let count_space = index_space(&["app", "employees"], "dept_count");
    let (begin, end) = count_space.range();
    let groups = kv.committed_range(&begin, &end);
    assert_eq!(groups.len(), 2);
    let total: i64 = groups
        .iter()
        .map(|(_, value)| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&value[..8]);
            i64::from_le_bytes(raw)
        })
        .sum();
    assert_eq!(total, 100);

    // The progress key is cleared once the build completes.
    let progress = metadata_space(&["app", "employees"])
        .child(TupleElement::String("progress".into()));
    let (begin, end) = progress.range();
    assert!(kv.committed_range(&begin, &end).is_empty());
}

#[tokio::test]
async fn unique_backfill_with_conflicts_stays_write_only() {
    let kv = MemoryDatabase::new();
    let database = RecordDatabase::new(Arc::new(kv.clone()));
    let context = database.context();

    let mut duplicate = employee(1, "eng");
    duplicate.email = "shared@fjord.example".into();
    let mut other = employee(2, "ops");
    other.email = "shared@fjord.example".into();

    // Seed the conflicting pair with the unique index disabled so the
    // conflict exists in the record space before the backfill runs.
    {
        let kv_txn = database.kv().begin();
        let metadata = metadata_space(&["app", "employees"]);
        let states = fjorddb::index::IndexStateManager::new(metadata);
        states
            .disable(kv_txn.as_ref(), "by_email")
            .await
            .expect("disable");
        kv_txn.commit().await.expect("commit");
    }
    context.insert(duplicate).await.expect("queue");
    context.insert(other).await.expect("queue");
    context.save().await.expect("seed");

    let builder = database
        .index_builder::<Employee>(&["by_email"])
        .expect("targets")
        .batch_size(10)
        .clear_first(true);
    let report = builder.build().await.expect("build");

    assert_eq!(report.blocked.len(), 1);
    assert_eq!(report.blocked[0].0, "by_email");
    assert!(report.blocked[0].1 >= 1);
}
