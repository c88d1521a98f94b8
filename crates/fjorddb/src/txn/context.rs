use crate::{
    config::DatabaseConfig,
    error::Error,
    index::{IndexMaintainer, IndexStateManager, builder::OnlineIndexBuilder},
    kv::{DirectoryLayer, KvDatabase, KvTransaction, RangeOptions},
    obs,
    record::{
        AuthContext, RecordCodec, RecordKind, StoredRecord, security, type_code,
    },
    store::ItemStore,
    tuple::{Tuple, TupleElement},
    txn::{
        CommitCheckRegistry, PostCommitRegistry, ReadVersionCache, TransactionConfig,
        TransactionEvent, TransactionListenerRegistry,
        post_commit::HookResult,
    },
};
use async_trait::async_trait;
use futures::TryStreamExt;
use parking_lot::Mutex;
use rand::Rng;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use ulid::Ulid;

///
/// TypeStores
///
/// Physical layout of one entity type under its directory:
/// `items/<typeTag>/…`, `blobs/<typeTag>/…`, `indexes/…`, `metadata/…`.
///

pub(crate) struct TypeStores {
    pub(crate) items: ItemStore,
    pub(crate) maintainer: IndexMaintainer,
    pub(crate) states: IndexStateManager,
}

impl TypeStores {
    pub(crate) fn of<R: RecordKind>(config: &DatabaseConfig) -> Self {
        let dir = DirectoryLayer::open(R::DIRECTORY);
        // A type whose own directory IS the shared polymorphic directory
        // writes once, under its type code, so polymorphic fetches can
        // discriminate it alongside mirrored types.
        let tag = if R::POLY_DIRECTORY == Some(R::DIRECTORY) {
            TupleElement::Int(type_code::<R>())
        } else {
            TupleElement::String(R::RECORD_NAME.to_string())
        };
        let items = dir
            .child(TupleElement::String("items".into()))
            .child(tag.clone());
        let blobs = dir.child(TupleElement::String("blobs".into())).child(tag);
        let indexes = dir.child(TupleElement::String("indexes".into()));
        let metadata = dir.child(TupleElement::String("metadata".into()));

        Self {
            items: ItemStore::new(items, blobs).with_policy(
                config.compression,
                config.chunk_threshold,
                config.chunk_size,
            ),
            maintainer: IndexMaintainer::new(indexes, metadata.clone())
                .with_entity(R::RECORD_NAME),
            states: IndexStateManager::new(metadata),
        }
    }

    /// Mirror store under the shared polymorphic directory, or `None` when
    /// the type declares no distinct polymorphic path (equal paths collapse
    /// to a single write).
    pub(crate) fn poly_of<R: RecordKind>(config: &DatabaseConfig) -> Option<ItemStore> {
        let poly = R::POLY_DIRECTORY?;
        if poly == R::DIRECTORY {
            return None;
        }
        let dir = DirectoryLayer::open(poly);
        let code = TupleElement::Int(type_code::<R>());
        let items = dir
            .child(TupleElement::String("items".into()))
            .child(code.clone());
        let blobs = dir.child(TupleElement::String("blobs".into())).child(code);
        Some(ItemStore::new(items, blobs).with_policy(
            config.compression,
            config.chunk_threshold,
            config.chunk_size,
        ))
    }
}

///
/// PendingOp
///
/// One queued mutation. The op captures the typed record and replays the
/// whole per-record pipeline (security, storage, maintenance, mirror)
/// against whatever transaction the save loop hands it, so retries re-run
/// cleanly.
///

#[async_trait]
trait PendingOp: Send + Sync {
    async fn apply(
        &self,
        txn: &dyn KvTransaction,
        auth: Option<&AuthContext>,
        config: &DatabaseConfig,
    ) -> Result<(), Error>;

    fn is_insert(&self) -> bool;
}

struct InsertOp<R: RecordKind> {
    record: R,
}

#[async_trait]
impl<R: RecordKind> PendingOp for InsertOp<R> {
    async fn apply(
        &self,
        txn: &dyn KvTransaction,
        auth: Option<&AuthContext>,
        config: &DatabaseConfig,
    ) -> Result<(), Error> {
        let stores = TypeStores::of::<R>(config);
        let id = self.record.primary_key();

        let old: Option<R> = match stores.items.read(txn, &id).await? {
            Some(bytes) => Some(RecordCodec::decode(&bytes)?),
            None => None,
        };

        if !R::SECURITY.is_empty() {
            security::validate_write(old.as_ref(), &self.record, auth)?;
        }

        let bytes = RecordCodec::encode(&self.record)?;
        let chunked = stores.items.write(txn, &id, &bytes)?;
        obs::record_write(R::RECORD_NAME, chunked);

        stores
            .maintainer
            .apply(txn, &stores.states, old.as_ref(), Some(&self.record))
            .await?;

        if let Some(poly) = TypeStores::poly_of::<R>(config) {
            poly.write(txn, &id, &bytes)?;
        }
        Ok(())
    }

    fn is_insert(&self) -> bool {
        true
    }
}

struct DeleteOp<R: RecordKind> {
    id: Tuple,
    _marker: std::marker::PhantomData<fn() -> R>,
}

#[async_trait]
impl<R: RecordKind> PendingOp for DeleteOp<R> {
    async fn apply(
        &self,
        txn: &dyn KvTransaction,
        _auth: Option<&AuthContext>,
        config: &DatabaseConfig,
    ) -> Result<(), Error> {
        let stores = TypeStores::of::<R>(config);

        let old: Option<R> = match stores.items.read(txn, &self.id).await? {
            Some(bytes) => Some(RecordCodec::decode(&bytes)?),
            None => None,
        };

        stores.items.delete(txn, &self.id);
        obs::record_delete(R::RECORD_NAME);

        stores
            .maintainer
            .apply(txn, &stores.states, old.as_ref(), None)
            .await?;

        if let Some(poly) = TypeStores::poly_of::<R>(config) {
            poly.delete(txn, &self.id);
        }
        Ok(())
    }

    fn is_insert(&self) -> bool {
        false
    }
}

///
/// SaveResult
///

#[derive(Clone, Debug)]
pub struct SaveResult {
    pub version: u64,
    pub duration: Duration,
    pub hooks: Vec<HookResult>,
}

///
/// RecordDatabase
///
/// Entry point: owns the KV handle, configuration, and the process-wide
/// registries shared by every context it produces.
///

pub struct RecordDatabase {
    kv: Arc<dyn KvDatabase>,
    config: DatabaseConfig,
    commit_checks: Arc<CommitCheckRegistry>,
    post_commits: Arc<PostCommitRegistry>,
    listeners: Arc<TransactionListenerRegistry>,
}

impl RecordDatabase {
    pub fn new(kv: Arc<dyn KvDatabase>) -> Self {
        Self::with_config(kv, DatabaseConfig::default())
    }

    #[must_use]
    pub fn with_config(kv: Arc<dyn KvDatabase>, config: DatabaseConfig) -> Self {
        Self {
            kv,
            config,
            commit_checks: Arc::new(CommitCheckRegistry::default()),
            post_commits: Arc::new(PostCommitRegistry::new()),
            listeners: Arc::new(TransactionListenerRegistry::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    #[must_use]
    pub fn kv(&self) -> Arc<dyn KvDatabase> {
        Arc::clone(&self.kv)
    }

    #[must_use]
    pub fn commit_checks(&self) -> &CommitCheckRegistry {
        &self.commit_checks
    }

    #[must_use]
    pub fn post_commits(&self) -> &PostCommitRegistry {
        &self.post_commits
    }

    #[must_use]
    pub fn listeners(&self) -> &TransactionListenerRegistry {
        &self.listeners
    }

    /// Context without caller identity; field security sees no auth.
    #[must_use]
    pub fn context(&self) -> RecordContext {
        self.context_inner(None)
    }

    #[must_use]
    pub fn context_with_auth(&self, auth: AuthContext) -> RecordContext {
        self.context_inner(Some(auth))
    }

    fn context_inner(&self, auth: Option<AuthContext>) -> RecordContext {
        RecordContext {
            kv: Arc::clone(&self.kv),
            config: self.config,
            txn_config: TransactionConfig::default(),
            auth,
            commit_checks: Arc::clone(&self.commit_checks),
            post_commits: Arc::clone(&self.post_commits),
            listeners: Arc::clone(&self.listeners),
            pending: Mutex::new(BTreeMap::new()),
            autosave: AtomicBool::new(false),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Online builder for one or more of `R`'s indexes; multi-target builds
    /// scan the record space once.
    pub fn index_builder<R: RecordKind>(
        &self,
        targets: &[&str],
    ) -> Result<OnlineIndexBuilder<R>, Error> {
        let stores = TypeStores::of::<R>(&self.config);
        OnlineIndexBuilder::new(
            Arc::clone(&self.kv),
            stores.items,
            stores.maintainer,
            stores.states,
            targets,
        )
    }

    /// Fetch every record mirrored into a shared polymorphic directory,
    /// across all type codes. Callers discriminate with the code.
    pub async fn fetch_poly(&self, path: &[&str]) -> Result<Vec<StoredRecord>, Error> {
        let dir = DirectoryLayer::open(path);
        let items_root = dir.child(TupleElement::String("items".into()));
        let blobs_root = dir.child(TupleElement::String("blobs".into()));
        let (begin, end) = items_root.range();

        let txn = self.kv.begin();
        let keys: Vec<Vec<u8>> = txn
            .get_range(&begin, &end, RangeOptions::default())
            .map_ok(|(key, _)| key)
            .try_collect()
            .await
            .map_err(Error::Kv)?;

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let tuple = items_root.unpack(&key)?;
            let Some((TupleElement::Int(code), id)) = tuple.0.split_first() else {
                continue;
            };
            let code = *code;
            let id = Tuple::new(id.to_vec());
            let store = ItemStore::new(
                items_root.child(TupleElement::Int(code)),
                blobs_root.child(TupleElement::Int(code)),
            )
            .with_policy(
                self.config.compression,
                self.config.chunk_threshold,
                self.config.chunk_size,
            );
            if let Some(bytes) = store.read(txn.as_ref(), &id).await? {
                out.push(StoredRecord {
                    type_code: code,
                    bytes,
                });
            }
        }
        Ok(out)
    }
}

///
/// AdminCapability
///
/// Separate capability for producing security-bypassing contexts. Admin
/// contexts are ordinary contexts with a privileged auth: same save lock,
/// same pipeline, no re-entry into maintenance.
///

pub trait AdminCapability {
    fn admin_context(&self) -> RecordContext;
}

impl AdminCapability for RecordDatabase {
    fn admin_context(&self) -> RecordContext {
        self.context_inner(Some(AuthContext::admin()))
    }
}

type ChangeKey = (&'static str, Vec<u8>);

///
/// RecordContext
///
/// Tracks a pending change set and owns the save pipeline. A context is a
/// single logical actor: overlapping `save` calls fail fast with
/// `ConcurrentSave`; read-only helpers may be shared freely.
///

pub struct RecordContext {
    kv: Arc<dyn KvDatabase>,
    config: DatabaseConfig,
    txn_config: TransactionConfig,
    auth: Option<AuthContext>,
    commit_checks: Arc<CommitCheckRegistry>,
    post_commits: Arc<PostCommitRegistry>,
    listeners: Arc<TransactionListenerRegistry>,
    pending: Mutex<BTreeMap<ChangeKey, Arc<dyn PendingOp>>>,
    autosave: AtomicBool,
    save_lock: tokio::sync::Mutex<()>,
}

impl RecordContext {
    #[must_use]
    pub fn with_transaction_config(mut self, txn_config: TransactionConfig) -> Self {
        self.txn_config = txn_config;
        self
    }

    #[must_use]
    pub const fn auth(&self) -> Option<&AuthContext> {
        self.auth.as_ref()
    }

    #[must_use]
    pub(crate) const fn database_config(&self) -> &DatabaseConfig {
        &self.config
    }

    #[must_use]
    pub(crate) fn kv(&self) -> Arc<dyn KvDatabase> {
        Arc::clone(&self.kv)
    }

    pub fn set_autosave(&self, autosave: bool) {
        self.autosave.store(autosave, Ordering::SeqCst);
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Drop every pending change.
    pub fn rollback(&self) {
        self.pending.lock().clear();
    }

    /// Queue an insert (create or overwrite). An insert over a pending
    /// delete of the same id replaces it.
    pub async fn insert<R: RecordKind>(&self, record: R) -> Result<(), Error> {
        let key: ChangeKey = (R::RECORD_NAME, record.primary_key().pack());
        self.pending
            .lock()
            .insert(key, Arc::new(InsertOp { record }));
        self.autosave_if_enabled().await
    }

    /// Queue a delete. A delete of a record with a pending, unsaved insert
    /// cancels that insert instead of queueing work.
    pub async fn delete<R: RecordKind>(&self, record: &R) -> Result<(), Error> {
        self.delete_by_id::<R>(record.primary_key()).await
    }

    pub async fn delete_by_id<R: RecordKind>(&self, id: Tuple) -> Result<(), Error> {
        let key: ChangeKey = (R::RECORD_NAME, id.pack());
        {
            let mut pending = self.pending.lock();
            match pending.get(&key) {
                Some(op) if op.is_insert() => {
                    pending.remove(&key);
                }
                _ => {
                    pending.insert(
                        key,
                        Arc::new(DeleteOp::<R> {
                            id,
                            _marker: std::marker::PhantomData,
                        }),
                    );
                }
            }
        }
        self.autosave_if_enabled().await
    }

    async fn autosave_if_enabled(&self) -> Result<(), Error> {
        if self.autosave.load(Ordering::SeqCst) && self.has_changes() {
            self.save().await?;
        }
        Ok(())
    }

    /// The save pipeline: change set → security → writes → index
    /// maintenance → mirror → commit checks → commit → read-version cache →
    /// post-commit hooks → lifecycle events.
    pub async fn save(&self) -> Result<SaveResult, Error> {
        let guard = self
            .save_lock
            .try_lock()
            .map_err(|_| Error::ConcurrentSave)?;

        let ops: Vec<Arc<dyn PendingOp>> = self.pending.lock().values().cloned().collect();
        let txn_id = self
            .txn_config
            .tracing
            .transaction_id
            .clone()
            .unwrap_or_else(|| Ulid::new().to_string());
        let mut lifecycle = Lifecycle::begin(Arc::clone(&self.listeners), txn_id.clone());

        if self.txn_config.tracing.log_transaction {
            tracing::info!(
                txn = %txn_id,
                ops = ops.len(),
                tags = ?self.txn_config.tracing.tags,
                "save begin"
            );
        }

        let mut attempt: u32 = 0;
        let stamp = loop {
            let txn = self.kv.begin();
            self.install_read_version(txn.as_ref());

            let result = tokio::time::timeout(
                self.txn_config.timeout,
                self.attempt_once(txn.as_ref(), &ops, &mut lifecycle),
            )
            .await;

            match result {
                Err(_elapsed) => {
                    let err = Error::Timeout {
                        millis: u64::try_from(self.txn_config.timeout.as_millis())
                            .unwrap_or(u64::MAX),
                    };
                    lifecycle.failed(&err);
                    return Err(err);
                }
                Ok(Ok(stamp)) => break stamp,
                Ok(Err(err)) if err.is_retryable() && attempt < self.txn_config.retry_limit => {
                    attempt += 1;
                    txn.reset();
                    ReadVersionCache::global().invalidate();
                    tokio::time::sleep(retry_delay(attempt, self.txn_config.max_retry_delay))
                        .await;
                }
                Ok(Err(err)) => {
                    let err = match err {
                        Error::Kv(kv) if kv.is_retryable() => Error::RetryLimitExceeded {
                            attempts: attempt + 1,
                            last: kv,
                        },
                        other => other,
                    };
                    lifecycle.failed(&err);
                    return Err(err);
                }
            }
        };

        ReadVersionCache::global().update_from_commit(stamp.version());
        self.pending.lock().clear();
        drop(guard);

        let hooks = self.post_commits.execute_all().await;
        let duration = lifecycle.committed(stamp.version());
        Ok(SaveResult {
            version: stamp.version(),
            duration,
            hooks,
        })
    }

    async fn attempt_once(
        &self,
        txn: &dyn KvTransaction,
        ops: &[Arc<dyn PendingOp>],
        lifecycle: &mut Lifecycle,
    ) -> Result<crate::kv::Versionstamp, Error> {
        for op in ops {
            op.apply(txn, self.auth.as_ref(), &self.config).await?;
        }
        self.commit_checks.execute_all(txn).await?;
        lifecycle.committing();
        Ok(txn.commit().await?)
    }

    /// Install a cached read version when the configuration allows weak
    /// reads through the GRV cache.
    fn install_read_version(&self, txn: &dyn KvTransaction) {
        if self.txn_config.disable_read_cache || !self.txn_config.use_grv_cache {
            return;
        }
        let Some(semantics) = &self.txn_config.weak_read_semantics else {
            return;
        };
        if let Some(version) = ReadVersionCache::global().cached_version(semantics) {
            txn.set_read_version(version);
        }
    }

    /// The read version this context's configuration resolves to right now:
    /// a cache hit under weak semantics, otherwise a fresh version from the
    /// KV (which also feeds the cache).
    pub async fn resolve_read_version(&self) -> Result<u64, Error> {
        if !self.txn_config.disable_read_cache && self.txn_config.use_grv_cache {
            if let Some(semantics) = &self.txn_config.weak_read_semantics {
                if let Some(version) = ReadVersionCache::global().cached_version(semantics) {
                    return Ok(version);
                }
            }
        }
        let txn = self.kv.begin();
        let version = txn.read_version().await?;
        ReadVersionCache::global().update_from_read(version);
        Ok(version)
    }

    /// Point read, masked through this context's auth.
    pub async fn fetch<R: RecordKind>(&self, id: &Tuple) -> Result<Option<R>, Error> {
        let stores = TypeStores::of::<R>(&self.config);
        let txn = self.kv.begin();
        self.install_read_version(txn.as_ref());

        let Some(bytes) = stores.items.read(txn.as_ref(), id).await? else {
            return Ok(None);
        };
        obs::record_read(R::RECORD_NAME);
        let record: R = RecordCodec::decode(&bytes)?;
        Ok(Some(security::mask(&record, self.auth.as_ref())))
    }

    /// Read-side access to one of `R`'s indexes (aggregates, top-K, vector
    /// search, graph traversal). Calls fail unless the index is readable.
    pub fn index_reader<R: RecordKind>(
        &self,
        name: &str,
    ) -> Result<crate::index::IndexReader, Error> {
        let descriptor = R::INDEXES
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Error::UnknownIndex {
                name: name.to_string(),
            })?;
        let stores = TypeStores::of::<R>(&self.config);
        Ok(crate::index::IndexReader::new(
            descriptor,
            stores.maintainer.index_space(name),
            stores.states,
        ))
    }

    /// Explicitly cancel: drop pending work and emit the cancelled terminal
    /// for observers. Aborting a save mid-flight is expressed by dropping
    /// its future; the lifecycle guard emits `cancelled` on that path.
    pub fn cancel(&self) {
        self.rollback();
        let id = Ulid::new().to_string();
        let mut lifecycle = Lifecycle::begin(Arc::clone(&self.listeners), id);
        lifecycle.cancelled();
    }
}

/// Capped exponential backoff with jitter.
fn retry_delay(attempt: u32, max_delay: Duration) -> Duration {
    let base = Duration::from_millis(10).saturating_mul(2u32.saturating_pow(attempt.min(16)));
    let capped = base.min(max_delay);
    let jitter = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) / 4);
    capped + Duration::from_millis(u64::try_from(jitter).unwrap_or(0))
}

///
/// Lifecycle
///
/// Emits the fixed event order and enforces one-shot terminals. Dropping
/// the guard without a terminal (task cancellation, early return) emits
/// `cancelled`; `closed` always follows the terminal exactly once.
///

struct Lifecycle {
    listeners: Arc<TransactionListenerRegistry>,
    id: String,
    started: Instant,
    terminal: bool,
}

impl Lifecycle {
    fn begin(listeners: Arc<TransactionListenerRegistry>, id: String) -> Self {
        listeners.emit(&TransactionEvent::Created { id: id.clone() });
        Self {
            listeners,
            id,
            started: Instant::now(),
            terminal: false,
        }
    }

    fn committing(&self) {
        self.listeners.emit(&TransactionEvent::Committing {
            id: self.id.clone(),
        });
    }

    fn committed(&mut self, version: u64) -> Duration {
        let duration = self.started.elapsed();
        if !self.terminal {
            self.terminal = true;
            self.listeners.emit(&TransactionEvent::Committed {
                id: self.id.clone(),
                duration,
                version,
            });
        }
        duration
    }

    fn failed(&mut self, error: &Error) {
        if !self.terminal {
            self.terminal = true;
            self.listeners.emit(&TransactionEvent::Failed {
                id: self.id.clone(),
                duration: self.started.elapsed(),
                error: error.to_string(),
            });
        }
    }

    fn cancelled(&mut self) {
        if !self.terminal {
            self.terminal = true;
            self.listeners.emit(&TransactionEvent::Cancelled {
                id: self.id.clone(),
                duration: self.started.elapsed(),
            });
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.cancelled();
        self.listeners.emit(&TransactionEvent::Closed {
            id: self.id.clone(),
            total_duration: self.started.elapsed(),
        });
    }
}
