//! Embedded ordered-KV backend.
//!
//! `MemoryDatabase` implements the full host contract in-process: atomic
//! commits with monotonic versionstamps, little-endian atomic adds, range
//! clears, and paged range streams. It backs the hermetic test suites and
//! small single-process deployments.

use crate::kv::{KvDatabase, KvError, KvPair, KvTransaction, RangeOptions, Versionstamp};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering as AtomicOrdering},
    },
};

const PAGE_SIZE: usize = 128;

///
/// Overlay
/// Pending per-key mutation inside an open transaction.
///

#[derive(Clone, Debug)]
enum Overlay {
    Put(Vec<u8>),
    Delete,
    Add(i64),
}

#[derive(Debug, Default)]
struct StoreState {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    version: u64,
}

#[derive(Debug, Default)]
struct TxnState {
    writes: BTreeMap<Vec<u8>, Overlay>,
    cleared: Vec<(Vec<u8>, Vec<u8>)>,
    versionstamped: Vec<(Vec<u8>, Vec<u8>)>,
    read_version: Option<u64>,
    closed: bool,
}

///
/// MemoryDatabase
///

#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<StoreState>>,
    fail_commits: Arc<AtomicU32>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with a retryable error. Used to
    /// exercise retry loops and builder resumption.
    pub fn fail_next_commits(&self, count: u32) {
        self.fail_commits.store(count, AtomicOrdering::SeqCst);
    }

    /// Committed key count, for storage-shape assertions in tests.
    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.state.lock().data.len()
    }

    /// Committed pairs inside `[begin, end)`, bypassing any transaction.
    #[must_use]
    pub fn committed_range(&self, begin: &[u8], end: &[u8]) -> Vec<KvPair> {
        let state = self.state.lock();
        state
            .data
            .range::<[u8], _>((Bound::Included(begin), Bound::Excluded(end)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl KvDatabase for MemoryDatabase {
    fn begin(&self) -> Box<dyn KvTransaction> {
        Box::new(MemoryTransaction {
            store: Arc::clone(&self.state),
            fail_commits: Arc::clone(&self.fail_commits),
            txn: Mutex::new(TxnState::default()),
        })
    }

    async fn current_version(&self) -> Result<u64, KvError> {
        Ok(self.state.lock().version)
    }
}

///
/// MemoryTransaction
///

#[derive(Debug)]
pub struct MemoryTransaction {
    store: Arc<Mutex<StoreState>>,
    fail_commits: Arc<AtomicU32>,
    txn: Mutex<TxnState>,
}

impl MemoryTransaction {
    fn effective_get(store: &StoreState, txn: &TxnState, key: &[u8]) -> Option<Vec<u8>> {
        match txn.writes.get(key) {
            Some(Overlay::Put(value)) => Some(value.clone()),
            Some(Overlay::Delete) => None,
            Some(Overlay::Add(delta)) => {
                let base = Self::committed_unless_cleared(store, txn, key);
                Some(add_le(base.as_deref(), *delta))
            }
            None => Self::committed_unless_cleared(store, txn, key),
        }
    }

    fn committed_unless_cleared(store: &StoreState, txn: &TxnState, key: &[u8]) -> Option<Vec<u8>> {
        if txn
            .cleared
            .iter()
            .any(|(b, e)| key >= b.as_slice() && key < e.as_slice())
        {
            return None;
        }
        store.data.get(key).cloned()
    }

    /// One merged page of the effective (committed + overlay) view.
    fn collect_page(
        &self,
        cursor: &PageCursor,
        end_key: &[u8],
        begin_key: &[u8],
        reverse: bool,
        limit: usize,
    ) -> Vec<KvPair> {
        let store = self.store.lock();
        let txn = self.txn.lock();

        // Candidate keys come from both the committed map and the overlay;
        // merge in key order and resolve each through the overlay rules.
        let bounds: (Bound<&[u8]>, Bound<&[u8]>) = if reverse {
            (
                Bound::Included(begin_key),
                match cursor {
                    PageCursor::Start => Bound::Excluded(end_key),
                    PageCursor::After(key) => Bound::Excluded(key.as_slice()),
                },
            )
        } else {
            (
                match cursor {
                    PageCursor::Start => Bound::Included(begin_key),
                    PageCursor::After(key) => Bound::Excluded(key.as_slice()),
                },
                Bound::Excluded(end_key),
            )
        };

        let mut keys: Vec<&Vec<u8>> = store
            .data
            .range::<[u8], _>(bounds)
            .map(|(k, _)| k)
            .chain(txn.writes.range::<[u8], _>(bounds).map(|(k, _)| k))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        if reverse {
            keys.reverse();
        }

        let mut out = Vec::with_capacity(limit.min(PAGE_SIZE));
        for key in keys {
            if out.len() >= limit {
                break;
            }
            if let Some(value) = Self::effective_get(&store, &txn, key) {
                out.push((key.clone(), value));
            }
        }
        out
    }
}

enum PageCursor {
    Start,
    After(Vec<u8>),
}

#[async_trait]
impl KvTransaction for MemoryTransaction {
    async fn get(&self, key: &[u8], _snapshot: bool) -> Result<Option<Vec<u8>>, KvError> {
        let store = self.store.lock();
        let txn = self.txn.lock();
        if txn.closed {
            return Err(KvError::TransactionClosed);
        }
        Ok(Self::effective_get(&store, &txn, key))
    }

    fn get_range(
        &self,
        begin: &[u8],
        end: &[u8],
        options: RangeOptions,
    ) -> BoxStream<'_, Result<KvPair, KvError>> {
        let begin = begin.to_vec();
        let end = end.to_vec();
        Box::pin(try_stream! {
            let mut remaining = options.limit.unwrap_or(usize::MAX);
            let mut cursor = PageCursor::Start;

            loop {
                if remaining == 0 {
                    break;
                }
                let page = self.collect_page(
                    &cursor,
                    &end,
                    &begin,
                    options.reverse,
                    remaining.min(PAGE_SIZE),
                );
                let exhausted = page.len() < remaining.min(PAGE_SIZE);
                for pair in page {
                    cursor = PageCursor::After(pair.0.clone());
                    remaining -= 1;
                    yield pair;
                }
                if exhausted {
                    break;
                }
            }
        })
    }

    fn set(&self, key: &[u8], value: &[u8]) {
        let mut txn = self.txn.lock();
        txn.writes.insert(key.to_vec(), Overlay::Put(value.to_vec()));
    }

    fn clear(&self, key: &[u8]) {
        let mut txn = self.txn.lock();
        txn.writes.insert(key.to_vec(), Overlay::Delete);
    }

    fn clear_range(&self, begin: &[u8], end: &[u8]) {
        let mut txn = self.txn.lock();
        // Later writes re-add keys; everything buffered so far is superseded.
        let doomed: Vec<Vec<u8>> = txn
            .writes
            .range::<[u8], _>((Bound::Included(begin), Bound::Excluded(end)))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            txn.writes.remove(&key);
        }
        txn.cleared.push((begin.to_vec(), end.to_vec()));
    }

    fn atomic_add(&self, key: &[u8], delta: i64) {
        let mut txn = self.txn.lock();
        let next = match txn.writes.get(key) {
            Some(Overlay::Put(value)) => Overlay::Put(add_le(Some(value), delta)),
            Some(Overlay::Delete) => Overlay::Put(add_le(None, delta)),
            Some(Overlay::Add(prior)) => Overlay::Add(prior.wrapping_add(delta)),
            None => Overlay::Add(delta),
        };
        txn.writes.insert(key.to_vec(), next);
    }

    fn set_versionstamped(&self, prefix: &[u8], value: &[u8]) {
        let mut txn = self.txn.lock();
        txn.versionstamped.push((prefix.to_vec(), value.to_vec()));
    }

    async fn read_version(&self) -> Result<u64, KvError> {
        let version = self.store.lock().version;
        let mut txn = self.txn.lock();
        if txn.closed {
            return Err(KvError::TransactionClosed);
        }
        Ok(*txn.read_version.get_or_insert(version))
    }

    fn set_read_version(&self, version: u64) {
        self.txn.lock().read_version = Some(version);
    }

    async fn commit(&self) -> Result<Versionstamp, KvError> {
        if self.fail_commits.load(AtomicOrdering::SeqCst) > 0 {
            self.fail_commits.fetch_sub(1, AtomicOrdering::SeqCst);
            return Err(KvError::NotCommitted { retryable: true });
        }

        let mut store = self.store.lock();
        let mut txn = self.txn.lock();
        if txn.closed {
            return Err(KvError::TransactionClosed);
        }

        for (begin, end) in &txn.cleared {
            let doomed: Vec<Vec<u8>> = store
                .data
                .range::<[u8], _>((Bound::Included(begin.as_slice()), Bound::Excluded(end.as_slice())))
                .map(|(k, _)| k.clone())
                .collect();
            for key in doomed {
                store.data.remove(&key);
            }
        }
        let writes = std::mem::take(&mut txn.writes);
        for (key, overlay) in writes {
            match overlay {
                Overlay::Put(value) => {
                    store.data.insert(key, value);
                }
                Overlay::Delete => {
                    store.data.remove(&key);
                }
                Overlay::Add(delta) => {
                    let next = add_le(store.data.get(&key).map(Vec::as_slice), delta);
                    store.data.insert(key, next);
                }
            }
        }

        store.version += 1;
        let stamp = Versionstamp::from_parts(store.version, 0);
        let stamped = std::mem::take(&mut txn.versionstamped);
        for (prefix, value) in stamped {
            let mut key = prefix;
            key.extend_from_slice(
                &crate::tuple::Tuple::new(vec![crate::tuple::TupleElement::Versionstamp(
                    stamp.to_bytes(),
                )])
                .pack(),
            );
            store.data.insert(key, value);
        }
        txn.closed = true;
        Ok(stamp)
    }

    fn reset(&self) {
        *self.txn.lock() = TxnState::default();
    }
}

/// Little-endian 8-byte add with missing values treated as zero, matching
/// the host KV's atomic-add semantics.
fn add_le(base: Option<&[u8]>, delta: i64) -> Vec<u8> {
    let mut raw = [0u8; 8];
    if let Some(bytes) = base {
        let len = bytes.len().min(8);
        raw[..len].copy_from_slice(&bytes[..len]);
    }
    let current = i64::from_le_bytes(raw);
    current.wrapping_add(delta).to_le_bytes().to_vec()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{MemoryDatabase, add_le};
    use crate::kv::{KvDatabase, KvError, RangeOptions};
    use futures::TryStreamExt;

    #[tokio::test]
    async fn commit_applies_writes_atomically() {
        let db = MemoryDatabase::new();
        let txn = db.begin();
        txn.set(b"a", b"1");
        txn.set(b"b", b"2");
        assert_eq!(db.committed_len(), 0);

        let stamp = txn.commit().await.expect("commit");
        assert_eq!(stamp.version(), 1);
        assert_eq!(db.committed_len(), 2);
    }

    #[tokio::test]
    async fn reads_observe_own_writes_and_clears() {
        let db = MemoryDatabase::new();
        let txn = db.begin();
        txn.set(b"k", b"v");
        assert_eq!(txn.get(b"k", false).await.expect("get"), Some(b"v".to_vec()));

        txn.clear_range(b"a", b"z");
        assert_eq!(txn.get(b"k", false).await.expect("get"), None);

        txn.set(b"k", b"v2");
        assert_eq!(
            txn.get(b"k", false).await.expect("get"),
            Some(b"v2".to_vec())
        );
    }

    #[tokio::test]
    async fn atomic_add_treats_missing_as_zero() {
        let db = MemoryDatabase::new();
        let txn = db.begin();
        txn.atomic_add(b"n", 5);
        txn.atomic_add(b"n", -2);
        txn.commit().await.expect("commit");

        let txn = db.begin();
        let raw = txn.get(b"n", false).await.expect("get").expect("value");
        assert_eq!(i64::from_le_bytes(raw.try_into().expect("8 bytes")), 3);
    }

    #[tokio::test]
    async fn range_stream_pages_in_order() {
        let db = MemoryDatabase::new();
        let txn = db.begin();
        for i in 0u16..300 {
            txn.set(&i.to_be_bytes(), b"x");
        }
        txn.commit().await.expect("commit");

        let txn = db.begin();
        let pairs: Vec<_> = txn
            .get_range(&[], &[0xff], RangeOptions::default())
            .try_collect()
            .await
            .expect("stream");
        assert_eq!(pairs.len(), 300);
        assert!(pairs.windows(2).all(|w| w[0].0 < w[1].0));

        let reversed: Vec<_> = txn
            .get_range(&[], &[0xff], RangeOptions::reversed())
            .try_collect()
            .await
            .expect("stream");
        assert_eq!(reversed.len(), 300);
        assert!(reversed.windows(2).all(|w| w[0].0 > w[1].0));
    }

    #[tokio::test]
    async fn range_limit_is_respected() {
        let db = MemoryDatabase::new();
        let txn = db.begin();
        for i in 0u16..50 {
            txn.set(&i.to_be_bytes(), b"x");
        }
        txn.commit().await.expect("commit");

        let txn = db.begin();
        let pairs: Vec<_> = txn
            .get_range(&[], &[0xff], RangeOptions::limited(7))
            .try_collect()
            .await
            .expect("stream");
        assert_eq!(pairs.len(), 7);
    }

    #[tokio::test]
    async fn injected_commit_failure_is_retryable() {
        let db = MemoryDatabase::new();
        db.fail_next_commits(1);

        let txn = db.begin();
        txn.set(b"k", b"v");
        let err = txn.commit().await.expect_err("injected failure");
        assert_eq!(err, KvError::NotCommitted { retryable: true });
        assert!(err.is_retryable());

        // The retry succeeds with the buffered writes intact.
        let stamp = txn.commit().await.expect("second attempt");
        assert_eq!(stamp.version(), 1);
        assert_eq!(db.committed_len(), 1);
    }

    #[test]
    fn add_le_wraps_like_the_host() {
        assert_eq!(add_le(None, 7), 7i64.to_le_bytes().to_vec());
        let max = i64::MAX.to_le_bytes();
        assert_eq!(add_le(Some(&max), 1), i64::MIN.to_le_bytes().to_vec());
    }
}
