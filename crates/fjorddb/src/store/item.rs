use crate::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_THRESHOLD,
    kv::{KvError, KvTransaction, RangeOptions, Subspace},
    store::{Compression, CorruptValue, Envelope, EnvelopePayload, SplitDescriptor},
    tuple::{Tuple, TupleElement, TupleError},
};
use async_stream::try_stream;
use futures::{TryStreamExt, stream::BoxStream};
use thiserror::Error as ThisError;

///
/// StoreError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum StoreError {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Corrupt(#[from] CorruptValue),

    #[error(transparent)]
    Tuple(#[from] TupleError),
}

///
/// ItemStore
///
/// Reads and writes single serialized records inside a KV transaction.
/// Values above the chunk threshold are split into blob chunks under a
/// sibling subspace; readers reassemble transparently. A record is readable
/// iff its inline envelope is present or all of its chunks exist; partial
/// chunk sets are never observable.
///

#[derive(Clone, Debug)]
pub struct ItemStore {
    items: Subspace,
    blobs: Subspace,
    compression: Compression,
    chunk_threshold: usize,
    chunk_size: usize,
}

impl ItemStore {
    #[must_use]
    pub fn new(items: Subspace, blobs: Subspace) -> Self {
        Self {
            items,
            blobs,
            compression: Compression::None,
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    #[must_use]
    pub const fn with_policy(
        mut self,
        compression: Compression,
        chunk_threshold: usize,
        chunk_size: usize,
    ) -> Self {
        self.compression = compression;
        self.chunk_threshold = chunk_threshold;
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub const fn items(&self) -> &Subspace {
        &self.items
    }

    fn item_key(&self, key: &Tuple) -> Vec<u8> {
        self.items.pack(key)
    }

    fn blob_space(&self, key: &Tuple) -> Subspace {
        self.blobs.subspace(key)
    }

    /// Write `bytes` at `key`, splitting into chunks past the threshold.
    /// Returns whether the value was split.
    ///
    /// The old chunk range under the key is cleared unconditionally, even
    /// when the previous value at the key is not a recognized envelope.
    pub fn write(
        &self,
        txn: &dyn KvTransaction,
        key: &Tuple,
        bytes: &[u8],
    ) -> Result<bool, StoreError> {
        let item_key = self.item_key(key);
        let (blob_begin, blob_end) = self.blob_space(key).range();
        txn.clear_range(&blob_begin, &blob_end);

        let (payload, compressed) = match self.compression.compress(bytes) {
            Some(compressed) => (compressed, true),
            None => (bytes.to_vec(), false),
        };

        if payload.len() <= self.chunk_threshold {
            let envelope = Envelope::inline(payload, compressed);
            txn.set(&item_key, &envelope.encode());
            tracing::trace!(key = %hex::encode(&item_key), "inline write");
            return Ok(false);
        }

        let chunk_count = payload.len().div_ceil(self.chunk_size);
        let descriptor = SplitDescriptor {
            total_len: payload.len() as u64,
            chunk_count: u32::try_from(chunk_count)
                .map_err(|_| KvError::ValueTooLarge { len: payload.len() })?,
            chunk_size: u32::try_from(self.chunk_size)
                .map_err(|_| KvError::ValueTooLarge { len: self.chunk_size })?,
        };
        txn.set(&item_key, &Envelope::split(descriptor, compressed).encode());

        let blob_space = self.blob_space(key);
        for (index, chunk) in payload.chunks(self.chunk_size).enumerate() {
            let index = i64::try_from(index)
                .map_err(|_| KvError::ValueTooLarge { len: payload.len() })?;
            let chunk_key = blob_space.pack(&Tuple::new(vec![TupleElement::Int(index)]));
            txn.set(&chunk_key, chunk);
        }
        tracing::trace!(
            key = %hex::encode(&item_key),
            chunks = chunk_count,
            total = payload.len(),
            "split write"
        );
        Ok(true)
    }

    pub async fn read(
        &self,
        txn: &dyn KvTransaction,
        key: &Tuple,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(raw) = txn.get(&self.item_key(key), false).await? else {
            return Ok(None);
        };
        self.materialize(txn, key, &raw, false).await.map(Some)
    }

    /// Reassemble one envelope into value bytes.
    async fn materialize(
        &self,
        txn: &dyn KvTransaction,
        key: &Tuple,
        raw: &[u8],
        snapshot: bool,
    ) -> Result<Vec<u8>, StoreError> {
        let envelope = Envelope::decode(raw)?;
        let payload = match envelope.payload {
            EnvelopePayload::Inline(bytes) => bytes,
            EnvelopePayload::Split(descriptor) => {
                self.read_chunks(txn, key, descriptor, snapshot).await?
            }
        };
        if envelope.compressed {
            Ok(self.compression.decompress(&payload)?)
        } else {
            Ok(payload)
        }
    }

    async fn read_chunks(
        &self,
        txn: &dyn KvTransaction,
        key: &Tuple,
        descriptor: SplitDescriptor,
        snapshot: bool,
    ) -> Result<Vec<u8>, StoreError> {
        let blob_space = self.blob_space(key);
        let (begin, end) = blob_space.range();
        let options = RangeOptions {
            limit: None,
            reverse: false,
            snapshot,
        };

        let mut payload = Vec::with_capacity(usize::try_from(descriptor.total_len).unwrap_or(0));
        let mut found: u32 = 0;
        let mut range = txn.get_range(&begin, &end, options);
        while let Some((chunk_key, chunk)) = range.try_next().await? {
            let tuple = blob_space.unpack(&chunk_key)?;
            let index = match tuple.0.as_slice() {
                [TupleElement::Int(index)] => *index,
                _ => return Err(CorruptValue::ChunkOutOfOrder { index: -1 }.into()),
            };
            if index != i64::from(found) {
                return Err(CorruptValue::ChunkOutOfOrder { index }.into());
            }
            payload.extend_from_slice(&chunk);
            found += 1;
        }

        if found != descriptor.chunk_count {
            return Err(CorruptValue::IncompleteChunks {
                expected: descriptor.chunk_count,
                found,
            }
            .into());
        }
        if payload.len() as u64 != descriptor.total_len {
            return Err(CorruptValue::LengthMismatch {
                expected: descriptor.total_len,
                found: payload.len() as u64,
            }
            .into());
        }
        Ok(payload)
    }

    /// Clear the item key and its whole chunk range.
    pub fn delete(&self, txn: &dyn KvTransaction, key: &Tuple) {
        txn.clear(&self.item_key(key));
        let (begin, end) = self.blob_space(key).range();
        txn.clear_range(&begin, &end);
    }

    pub async fn exists(&self, txn: &dyn KvTransaction, key: &Tuple) -> Result<bool, StoreError> {
        Ok(txn.get(&self.item_key(key), false).await?.is_some())
    }

    /// Physical payload size (post-compression, pre-chunking), without
    /// fetching chunk bytes.
    pub async fn size(
        &self,
        txn: &dyn KvTransaction,
        key: &Tuple,
    ) -> Result<Option<u64>, StoreError> {
        let Some(raw) = txn.get(&self.item_key(key), false).await? else {
            return Ok(None);
        };
        match Envelope::decode(&raw)?.payload {
            EnvelopePayload::Inline(bytes) => Ok(Some(bytes.len() as u64)),
            EnvelopePayload::Split(descriptor) => Ok(Some(descriptor.total_len)),
        }
    }

    /// Lazy scan yielding `(key, value)` per record. Split records are
    /// reassembled per-element during iteration; the full range is never
    /// buffered.
    pub fn scan<'a>(
        &'a self,
        txn: &'a dyn KvTransaction,
        begin: Option<&Tuple>,
        end: Option<&Tuple>,
        options: RangeOptions,
    ) -> BoxStream<'a, Result<(Tuple, Vec<u8>), StoreError>> {
        let (space_begin, space_end) = self.items.range();
        let begin = begin.map_or(space_begin, |t| self.items.pack(t));
        let end = end.map_or(space_end, |t| self.items.pack(t));
        self.scan_raw(txn, begin, end, options)
    }

    /// Scan with raw byte bounds inside the item subspace; the builder's
    /// progress ranges live in this space.
    pub fn scan_raw<'a>(
        &'a self,
        txn: &'a dyn KvTransaction,
        begin: Vec<u8>,
        end: Vec<u8>,
        options: RangeOptions,
    ) -> BoxStream<'a, Result<(Tuple, Vec<u8>), StoreError>> {
        let snapshot = options.snapshot;
        Box::pin(try_stream! {
            let mut range = txn.get_range(&begin, &end, options);
            while let Some((key_bytes, raw)) = range.try_next().await? {
                let key = self.items.unpack(&key_bytes)?;
                let bytes = self.materialize(txn, &key, &raw, snapshot).await?;
                yield (key, bytes);
            }
        })
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::ItemStore;
    use crate::{
        kv::{KvDatabase, MemoryDatabase, RangeOptions, Subspace},
        store::{Compression, CorruptValue, StoreError},
        tuple::{Tuple, TupleElement},
    };
    use futures::TryStreamExt;

    fn store() -> ItemStore {
        ItemStore::new(
            Subspace::new(vec![0x01]),
            Subspace::new(vec![0x02]),
        )
        .with_policy(Compression::None, 1_000, 400)
    }

    fn key(id: i64) -> Tuple {
        Tuple::new(vec![TupleElement::Int(id)])
    }

    #[tokio::test]
    async fn inline_round_trip() {
        let db = MemoryDatabase::new();
        let store = store();
        let txn = db.begin();

        store.write(txn.as_ref(), &key(1), b"hello").expect("write");
        let out = store.read(txn.as_ref(), &key(1)).await.expect("read");
        assert_eq!(out, Some(b"hello".to_vec()));
        txn.commit().await.expect("commit");
    }

    #[tokio::test]
    async fn threshold_boundary_is_exact() {
        let db = MemoryDatabase::new();
        let store = store();
        let txn = db.begin();

        // At the threshold: inline, no chunks.
        store
            .write(txn.as_ref(), &key(1), &vec![7u8; 1_000])
            .expect("write");
        // One past the threshold: split.
        store
            .write(txn.as_ref(), &key(2), &vec![7u8; 1_001])
            .expect("write");
        txn.commit().await.expect("commit");

        let blob_space = Subspace::new(vec![0x02]);
        let (b1, e1) = blob_space.subspace(&key(1)).range();
        let (b2, e2) = blob_space.subspace(&key(2)).range();
        assert!(db.committed_range(&b1, &e1).is_empty());
        // 1001 bytes at chunk_size 400 → 3 chunks.
        assert_eq!(db.committed_range(&b2, &e2).len(), 3);

        let txn = db.begin();
        let out = store.read(txn.as_ref(), &key(2)).await.expect("read");
        assert_eq!(out, Some(vec![7u8; 1_001]));
    }

    #[tokio::test]
    async fn overwrite_clears_stale_chunks() {
        let db = MemoryDatabase::new();
        let store = store();

        let txn = db.begin();
        store
            .write(txn.as_ref(), &key(1), &vec![1u8; 5_000])
            .expect("big write");
        txn.commit().await.expect("commit");

        let txn = db.begin();
        store.write(txn.as_ref(), &key(1), b"tiny").expect("small write");
        txn.commit().await.expect("commit");

        let blob_space = Subspace::new(vec![0x02]);
        let (begin, end) = blob_space.subspace(&key(1)).range();
        assert!(db.committed_range(&begin, &end).is_empty());

        let txn = db.begin();
        let out = store.read(txn.as_ref(), &key(1)).await.expect("read");
        assert_eq!(out, Some(b"tiny".to_vec()));
    }

    #[tokio::test]
    async fn overwrite_clears_chunks_under_unrecognized_values() {
        let db = MemoryDatabase::new();
        let store = store();
        let blob_space = Subspace::new(vec![0x02]);

        // Legacy layout: garbage at the item key plus orphan chunk bytes.
        let txn = db.begin();
        let item_key = Subspace::new(vec![0x01]).pack(&key(1));
        txn.set(&item_key, b"not an envelope");
        let orphan = blob_space
            .subspace(&key(1))
            .pack(&Tuple::new(vec![TupleElement::Int(0)]));
        txn.set(&orphan, b"orphan");
        txn.commit().await.expect("commit");

        let txn = db.begin();
        store.write(txn.as_ref(), &key(1), b"fresh").expect("write");
        txn.commit().await.expect("commit");

        let (begin, end) = blob_space.subspace(&key(1)).range();
        assert!(db.committed_range(&begin, &end).is_empty());
    }

    #[tokio::test]
    async fn partial_chunk_set_is_corrupt() {
        let db = MemoryDatabase::new();
        let store = store();

        let txn = db.begin();
        store
            .write(txn.as_ref(), &key(1), &vec![9u8; 2_000])
            .expect("write");
        txn.commit().await.expect("commit");

        // Drop one chunk behind the store's back.
        let blob_space = Subspace::new(vec![0x02]);
        let chunk0 = blob_space
            .subspace(&key(1))
            .pack(&Tuple::new(vec![TupleElement::Int(0)]));
        let txn = db.begin();
        txn.clear(&chunk0);
        txn.commit().await.expect("commit");

        let txn = db.begin();
        let err = store
            .read(txn.as_ref(), &key(1))
            .await
            .expect_err("partial chunks");
        assert!(matches!(
            err,
            StoreError::Corrupt(CorruptValue::ChunkOutOfOrder { .. })
                | StoreError::Corrupt(CorruptValue::IncompleteChunks { .. })
        ));
    }

    #[tokio::test]
    async fn scan_streams_records_in_key_order() {
        let db = MemoryDatabase::new();
        let store = store();

        let txn = db.begin();
        for id in 0..10 {
            store
                .write(txn.as_ref(), &key(id), format!("value-{id}").as_bytes())
                .expect("write");
        }
        // One split record in the middle of the range.
        store
            .write(txn.as_ref(), &key(5), &vec![5u8; 3_000])
            .expect("write");
        txn.commit().await.expect("commit");

        let txn = db.begin();
        let rows: Vec<_> = store
            .scan(txn.as_ref(), None, None, RangeOptions::default())
            .try_collect()
            .await
            .expect("scan");

        assert_eq!(rows.len(), 10);
        assert_eq!(rows[5].1, vec![5u8; 3_000]);
        for (i, (k, _)) in rows.iter().enumerate() {
            assert_eq!(k, &key(i64::try_from(i).expect("small")));
        }
    }

    #[tokio::test]
    async fn compressed_round_trip() {
        let db = MemoryDatabase::new();
        let store = ItemStore::new(Subspace::new(vec![0x01]), Subspace::new(vec![0x02]))
            .with_policy(Compression::Deflate, 1_000, 400);

        let txn = db.begin();
        let bytes = vec![3u8; 50_000];
        store.write(txn.as_ref(), &key(1), &bytes).expect("write");
        let out = store.read(txn.as_ref(), &key(1)).await.expect("read");
        assert_eq!(out, Some(bytes));
    }
}
