//! Large-value round-trips through the full save pipeline.

use fjorddb::{
    kv::{DirectoryLayer, MemoryDatabase, Subspace},
    record::RecordKind,
    test_support::Attachment,
    tuple::{Tuple, TupleElement},
    txn::RecordDatabase,
};
use serde_bytes::ByteBuf;
use std::sync::Arc;

fn blob_space() -> Subspace {
    DirectoryLayer::open(Attachment::DIRECTORY)
        .child(TupleElement::String("blobs".into()))
        .child(TupleElement::String("Attachment".into()))
}

fn id(raw: &str) -> Tuple {
    Tuple::new(vec![TupleElement::String(raw.to_string())])
}

#[tokio::test]
async fn chunked_write_reads_back_identical_bytes() {
    let kv = MemoryDatabase::new();
    let database = RecordDatabase::new(Arc::new(kv.clone()));
    let context = database.context();

    let attachment = Attachment {
        id: "big".into(),
        name: "scan.bin".into(),
        data: ByteBuf::from(vec![0xabu8; 95_000]),
    };
    context.insert(attachment.clone()).await.expect("queue");
    context.save().await.expect("save");

    // The record payload crossed the threshold, so chunks exist.
    let (begin, end) = blob_space().subspace(&id("big")).range();
    assert!(!kv.committed_range(&begin, &end).is_empty());

    let fetched: Attachment = context
        .fetch(&attachment.primary_key())
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(fetched.data, attachment.data);
    assert_eq!(fetched, attachment);
}

#[tokio::test]
async fn shrinking_overwrite_clears_the_chunk_range() {
    let kv = MemoryDatabase::new();
    let database = RecordDatabase::new(Arc::new(kv.clone()));
    let context = database.context();

    let big = Attachment {
        id: "doc".into(),
        name: "v1".into(),
        data: ByteBuf::from(vec![1u8; 95_000]),
    };
    context.insert(big).await.expect("queue");
    context.save().await.expect("save");

    let small = Attachment {
        id: "doc".into(),
        name: "v2".into(),
        data: ByteBuf::from(vec![2u8; 5_000]),
    };
    context.insert(small.clone()).await.expect("queue");
    context.save().await.expect("save");

    // The blob chunk range for that key is empty again.
    let (begin, end) = blob_space().subspace(&id("doc")).range();
    assert!(kv.committed_range(&begin, &end).is_empty());

    let fetched: Attachment = context
        .fetch(&small.primary_key())
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(fetched.data.len(), 5_000);
    assert_eq!(fetched, small);
}

#[tokio::test]
async fn delete_removes_item_and_chunks() {
    let kv = MemoryDatabase::new();
    let database = RecordDatabase::new(Arc::new(kv.clone()));
    let context = database.context();

    let attachment = Attachment {
        id: "gone".into(),
        name: "temp".into(),
        data: ByteBuf::from(vec![9u8; 120_000]),
    };
    context.insert(attachment.clone()).await.expect("queue");
    context.save().await.expect("save");

    context.delete(&attachment).await.expect("queue delete");
    context.save().await.expect("save");

    let (begin, end) = blob_space().subspace(&id("gone")).range();
    assert!(kv.committed_range(&begin, &end).is_empty());
    assert_eq!(
        context
            .fetch::<Attachment>(&attachment.primary_key())
            .await
            .expect("fetch"),
        None
    );
}
