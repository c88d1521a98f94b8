//! Online index builder.
//!
//! Brings indexes from `writeOnly` to `readable` by scanning the record
//! space in bounded batches. Progress is a persisted [`RangeSet`] keyed by
//! the sorted target-name set; range advancement commits in the same
//! transaction as the batch's index writes, so an interrupted run resumes
//! without duplicating observable work. Multi-target builds scan the record
//! space once and fan each record out to every target.

mod metrics;
mod range_set;

pub use metrics::IndexerMetrics;
pub use range_set::RangeSet;

use crate::{
    error::Error,
    index::{
        IndexDescriptor, IndexMaintainer, IndexState, IndexStateManager, clear_violations,
        scan_violations,
    },
    kv::{KvDatabase, KvTransaction, RangeOptions},
    record::{RecordCodec, RecordKind},
    store::ItemStore,
    tuple::{Tuple, TupleElement},
};
use futures::TryStreamExt;
use std::{marker::PhantomData, sync::Arc, time::Duration};

const PROGRESS_KEY: &str = "progress";
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(10);

///
/// BuildReport
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BuildReport {
    pub items_indexed: u64,
    pub batches: u64,
    /// Unique targets left in `writeOnly` because violations were recorded.
    pub blocked: Vec<(String, usize)>,
}

///
/// OnlineIndexBuilder
///

pub struct OnlineIndexBuilder<R: RecordKind> {
    db: Arc<dyn KvDatabase>,
    store: ItemStore,
    maintainer: IndexMaintainer,
    states: IndexStateManager,
    targets: Vec<&'static IndexDescriptor>,
    batch_size: usize,
    clear_first: bool,
    max_attempts: u32,
    _marker: PhantomData<R>,
}

impl<R: RecordKind> OnlineIndexBuilder<R> {
    pub fn new(
        db: Arc<dyn KvDatabase>,
        store: ItemStore,
        maintainer: IndexMaintainer,
        states: IndexStateManager,
        target_names: &[&str],
    ) -> Result<Self, Error> {
        let mut targets = Vec::with_capacity(target_names.len());
        for name in target_names {
            let descriptor = R::INDEXES
                .iter()
                .find(|d| d.name == *name)
                .ok_or_else(|| Error::UnknownIndex {
                    name: (*name).to_string(),
                })?;
            targets.push(descriptor);
        }
        Ok(Self {
            db,
            store,
            maintainer,
            states,
            targets,
            batch_size: DEFAULT_BATCH_SIZE,
            clear_first: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            _marker: PhantomData,
        })
    }

    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Clear the target index subspaces and their uniqueness-violation sets
    /// before the first batch. Required for rebuilds.
    #[must_use]
    pub const fn clear_first(mut self, clear_first: bool) -> Self {
        self.clear_first = clear_first;
        self
    }

    fn progress_key(&self) -> Vec<u8> {
        let mut names: Vec<&str> = self.targets.iter().map(|d| d.name).collect();
        names.sort_unstable();
        self.maintainer.metadata().pack(&Tuple::new(vec![
            TupleElement::String(PROGRESS_KEY.to_string()),
            TupleElement::String(names.join("+")),
        ]))
    }

    fn metric_labels(&self) -> [String; 2] {
        [R::RECORD_NAME.to_string(), self.targets.len().to_string()]
    }

    /// Run the whole backfill: initialize (or resume) progress, process
    /// batches until the range set drains, then promote clean targets.
    pub async fn build(&self) -> Result<BuildReport, Error> {
        self.initialize().await?;

        let metrics = IndexerMetrics::global();
        let labels = self.metric_labels();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();

        let mut report = BuildReport::default();
        loop {
            let started = std::time::Instant::now();
            let (processed, done) = self.run_batch_with_retry().await?;
            metrics
                .batch_duration
                .with_label_values(&labels)
                .observe(started.elapsed().as_secs_f64());
            metrics
                .items_indexed
                .with_label_values(&labels)
                .inc_by(processed);
            metrics.batches_processed.with_label_values(&labels).inc();

            report.items_indexed += processed;
            report.batches += 1;
            if done {
                break;
            }
        }

        report.blocked = self.finalize().await?;
        tracing::info!(
            item_type = R::RECORD_NAME,
            items = report.items_indexed,
            batches = report.batches,
            blocked = report.blocked.len(),
            "index build complete"
        );
        Ok(report)
    }

    /// Run exactly one batch (initializing or resuming first). Returns the
    /// processed count and whether the range set is drained. Callers that
    /// pace their own batches finish with [`Self::build`], which is a no-op
    /// over completed progress beyond promoting the targets.
    pub async fn step(&self) -> Result<(u64, bool), Error> {
        self.initialize().await?;
        self.run_batch_with_retry().await
    }

    /// Move targets into `writeOnly`, optionally clear them, and persist the
    /// initial range set. Skipped entirely when a progress record already
    /// exists (resume path).
    async fn initialize(&self) -> Result<(), Error> {
        let txn = self.db.begin();
        if txn.get(&self.progress_key(), false).await?.is_some() {
            tracing::debug!(item_type = R::RECORD_NAME, "resuming persisted progress");
            return Ok(());
        }

        for descriptor in &self.targets {
            match self.states.state(txn.as_ref(), descriptor.name).await? {
                IndexState::WriteOnly => {}
                IndexState::Disabled => {
                    self.states.enable(txn.as_ref(), descriptor.name).await?;
                }
                IndexState::Readable => {
                    self.states.rebuild(txn.as_ref(), descriptor.name).await?;
                }
            }
            if self.clear_first {
                let (begin, end) = self.maintainer.index_space(descriptor.name).range();
                txn.clear_range(&begin, &end);
                clear_violations(txn.as_ref(), self.maintainer.metadata(), descriptor.name);
            }
        }

        let (begin, end) = self.store.items().range();
        let progress = RangeSet::full(begin, end);
        txn.set(&self.progress_key(), &progress.encode()?);
        txn.commit().await?;
        Ok(())
    }

    async fn run_batch_with_retry(&self) -> Result<(u64, bool), Error> {
        let labels = self.metric_labels();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();

        let mut attempt = 0;
        loop {
            match self.run_batch().await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    attempt += 1;
                    IndexerMetrics::global()
                        .errors
                        .with_label_values(&labels)
                        .inc();
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt);
                    tracing::warn!(attempt, "builder batch failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    IndexerMetrics::global()
                        .errors
                        .with_label_values(&labels)
                        .inc();
                    return Err(err);
                }
            }
        }
    }

    /// One batch: pop the next range, index up to `batch_size` records for
    /// every target, and advance the persisted range set — all in a single
    /// transaction.
    async fn run_batch(&self) -> Result<(u64, bool), Error> {
        let txn = self.db.begin();
        let Some(raw) = txn.get(&self.progress_key(), false).await? else {
            return Ok((0, true));
        };
        let mut progress = RangeSet::decode(&raw)?;
        let Some((begin, end)) = progress.first() else {
            return Ok((0, true));
        };
        let (begin, end) = (begin.to_vec(), end.to_vec());

        let batch: Vec<(Tuple, Vec<u8>)> = self
            .store
            .scan_raw(
                txn.as_ref(),
                begin,
                end,
                RangeOptions::limited(self.batch_size),
            )
            .try_collect()
            .await?;

        for (id, bytes) in &batch {
            let record: R = RecordCodec::decode(bytes)?;
            for descriptor in &self.targets {
                let state = self.states.state(txn.as_ref(), descriptor.name).await?;
                if !state.maintained() {
                    continue;
                }
                self.maintainer
                    .apply_one(txn.as_ref(), descriptor, state, None, Some(&record), id)
                    .await?;
            }
        }

        let exhausted = batch.len() < self.batch_size;
        if exhausted {
            progress.complete_first();
        } else if let Some((last, _)) = batch.last() {
            progress.advance_first(&self.store.items().pack(last));
        }
        txn.set(&self.progress_key(), &progress.encode()?);
        txn.commit().await?;

        let done = progress.is_empty();
        Ok((batch.len() as u64, done))
    }

    /// Promote clean targets to `readable` and clear the progress key.
    /// Unique targets with recorded violations stay `writeOnly`.
    async fn finalize(&self) -> Result<Vec<(String, usize)>, Error> {
        let txn = self.db.begin();
        let mut blocked = Vec::new();

        for descriptor in &self.targets {
            if self.states.state(txn.as_ref(), descriptor.name).await? != IndexState::WriteOnly {
                continue;
            }
            if descriptor.unique {
                let violations = scan_violations(
                    txn.as_ref(),
                    self.maintainer.metadata(),
                    descriptor.name,
                )
                .await?;
                if !violations.is_empty() {
                    blocked.push((descriptor.name.to_string(), violations.len()));
                    continue;
                }
            }
            self.states
                .make_readable(txn.as_ref(), descriptor.name)
                .await?;
        }

        txn.clear(&self.progress_key());
        txn.commit().await?;
        Ok(blocked)
    }

    /// Current persisted progress, if a build is underway.
    pub async fn progress(&self, txn: &dyn KvTransaction) -> Result<Option<RangeSet>, Error> {
        match txn.get(&self.progress_key(), false).await? {
            None => Ok(None),
            Some(raw) => Ok(Some(RangeSet::decode(&raw)?)),
        }
    }
}
