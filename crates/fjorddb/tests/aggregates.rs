//! Read-side index operations: aggregate lookups, rank top-K, vector
//! search, and graph traversal.

use fjorddb::{
    kv::MemoryDatabase,
    record::{AuthContext, FieldValue},
    test_support::{Edge, Employee, Track},
    txn::RecordDatabase,
};
use std::sync::Arc;

#[tokio::test]
async fn count_sum_min_max_follow_the_records() {
    let database = RecordDatabase::new(Arc::new(MemoryDatabase::new()));
    let hr = database.context_with_auth(AuthContext::new("seed", &["hr"]));

    for (id, salary) in [("e1", 900i64), ("e2", 1_100), ("e3", 700)] {
        hr.insert(Employee {
            id: id.into(),
            name: id.into(),
            dept: "eng".into(),
            email: format!("{id}@fjord.example"),
            salary,
        })
        .await
        .expect("queue");
    }
    hr.save().await.expect("seed");

    let group = [FieldValue::String("eng".into())];
    let txn = database.kv().begin();

    let count = hr
        .index_reader::<Employee>("dept_count")
        .expect("reader")
        .count(txn.as_ref(), &group)
        .await
        .expect("count");
    assert_eq!(count, 3);

    let sum = hr
        .index_reader::<Employee>("dept_salary_sum")
        .expect("reader")
        .sum(txn.as_ref(), &group)
        .await
        .expect("sum");
    assert_eq!(sum, 2_700);

    let min_reader = hr
        .index_reader::<Employee>("dept_salary_min")
        .expect("reader");
    assert_eq!(
        min_reader.min(txn.as_ref(), &group).await.expect("min"),
        Some(FieldValue::Int(700))
    );
    assert_eq!(
        min_reader.max(txn.as_ref(), &group).await.expect("max"),
        Some(FieldValue::Int(1_100))
    );
    assert_eq!(
        min_reader
            .min(txn.as_ref(), &[FieldValue::String("ops".into())])
            .await
            .expect("empty group"),
        None
    );

    // Deleting a record moves every aggregate in the same commit.
    hr.delete_by_id::<Employee>(fjorddb::tuple::Tuple::new(vec![
        fjorddb::tuple::TupleElement::String("e2".into()),
    ]))
    .await
    .expect("queue delete");
    hr.save().await.expect("save");

    let txn = database.kv().begin();
    let reader = hr.index_reader::<Employee>("dept_count").expect("reader");
    assert_eq!(reader.count(txn.as_ref(), &group).await.expect("count"), 2);
    let min_reader = hr
        .index_reader::<Employee>("dept_salary_min")
        .expect("reader");
    assert_eq!(
        min_reader.max(txn.as_ref(), &group).await.expect("max"),
        Some(FieldValue::Int(900))
    );
}

#[tokio::test]
async fn rank_top_k_is_a_reverse_scan() {
    let database = RecordDatabase::new(Arc::new(MemoryDatabase::new()));
    let context = database.context();

    for (id, plays) in [("a", 10i64), ("b", 500), ("c", 250), ("d", 40)] {
        context
            .insert(Track {
                id: id.into(),
                title: id.into(),
                plays,
                embedding: vec![1.0, 0.0],
            })
            .await
            .expect("queue");
    }
    context.save().await.expect("seed");

    let txn = database.kv().begin();
    let top = context
        .index_reader::<Track>("by_plays")
        .expect("reader")
        .top_k(txn.as_ref(), 2)
        .await
        .expect("top-k");

    let scores: Vec<i64> = top
        .iter()
        .filter_map(|(score, _)| score.as_i64())
        .collect();
    assert_eq!(scores, vec![500, 250]);
}

#[tokio::test]
async fn vector_search_ranks_by_similarity() {
    let database = RecordDatabase::new(Arc::new(MemoryDatabase::new()));
    let context = database.context();

    let tracks = [
        ("aligned", vec![1.0, 0.0]),
        ("orthogonal", vec![0.0, 1.0]),
        ("close", vec![0.9, 0.1]),
    ];
    for (id, embedding) in tracks {
        context
            .insert(Track {
                id: id.into(),
                title: id.into(),
                plays: 0,
                embedding,
            })
            .await
            .expect("queue");
    }
    context.save().await.expect("seed");

    let txn = database.kv().begin();
    let nearest = context
        .index_reader::<Track>("similar")
        .expect("reader")
        .nearest(txn.as_ref(), &[1.0, 0.0], 2)
        .await
        .expect("nearest");

    assert_eq!(nearest.len(), 2);
    let first = &nearest[0].0;
    assert_eq!(
        first.0.first(),
        Some(&fjorddb::tuple::TupleElement::String("aligned".into()))
    );
    assert!(nearest[0].1 >= nearest[1].1);
}

#[tokio::test]
async fn adjacency_traversal_walks_both_directions() {
    let database = RecordDatabase::new(Arc::new(MemoryDatabase::new()));
    let context = database.context();

    let edges = [
        (1, "alice", "bob"),
        (2, "alice", "carol"),
        (3, "dave", "alice"),
    ];
    for (id, from, to) in edges {
        context
            .insert(Edge {
                id,
                from: from.into(),
                edge: "follows".into(),
                to: to.into(),
            })
            .await
            .expect("queue");
    }
    context.save().await.expect("seed");

    let reader = context.index_reader::<Edge>("social").expect("reader");
    let follows = FieldValue::String("follows".into());
    let alice = FieldValue::String("alice".into());

    let txn = database.kv().begin();
    let outgoing = reader
        .neighbors(txn.as_ref(), true, &follows, &alice)
        .await
        .expect("outgoing");
    assert_eq!(
        outgoing,
        vec![
            FieldValue::String("bob".into()),
            FieldValue::String("carol".into())
        ]
    );

    let incoming = reader
        .neighbors(txn.as_ref(), false, &follows, &alice)
        .await
        .expect("incoming");
    assert_eq!(incoming, vec![FieldValue::String("dave".into())]);
}
