use crate::{
    config::DatabaseConfig,
    error::Error,
    kv::{KvDatabase, KvTransaction, RangeOptions},
    query::{
        continuation::Continuation,
        eval::evaluate,
        plan::QueryPlan,
        predicate::Predicate,
        sort::{SortDescriptor, sort_records},
    },
    record::{AuthContext, FieldValue, RecordCodec, RecordKind, security},
    store::ItemStore,
    tuple::Tuple,
    txn::TypeStores,
};
use futures::TryStreamExt;
use std::{
    collections::BTreeSet,
    marker::PhantomData,
    sync::Arc,
    time::{Duration, Instant},
};

///
/// DoneReason
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DoneReason {
    SourceExhausted,
    ReturnLimitReached,
    TimeLimitReached,
    TransactionLimitReached,
    ScanLimitReached,
}

///
/// CursorResult
///

#[derive(Clone, Debug)]
pub enum CursorResult<R> {
    /// A full batch plus the token to resume after it.
    More {
        items: Vec<R>,
        continuation: Continuation,
    },
    /// The cursor stopped; `reason` says why.
    Done { items: Vec<R>, reason: DoneReason },
    /// The cursor already terminated.
    Empty,
}

///
/// Cursor
///
/// Batched execution of one plan. `next` yields batches; `stream` adapts
/// them into a lazy item stream; `collect` drains. A continuation token
/// binds to the plan fingerprint, so resumption against a changed plan
/// fails with `FingerprintMismatch` instead of returning wrong results.
///

pub struct Cursor<R: RecordKind> {
    kv: Arc<dyn KvDatabase>,
    config: DatabaseConfig,
    auth: Option<AuthContext>,
    plan: QueryPlan,
    predicate: Predicate,
    reverse: bool,
    batch_size: usize,
    remaining_limit: Option<u32>,
    original_limit: Option<u32>,
    time_limit: Option<Duration>,
    scan_limit: Option<u64>,
    position: Option<Vec<u8>>,
    scanned: u64,
    started: Instant,
    finished: bool,
    fingerprint: [u8; 32],
    _marker: PhantomData<fn() -> R>,
}

impl<R: RecordKind> std::fmt::Debug for Cursor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("config", &self.config)
            .field("auth", &self.auth)
            .field("plan", &self.plan)
            .field("predicate", &self.predicate)
            .field("reverse", &self.reverse)
            .field("batch_size", &self.batch_size)
            .field("remaining_limit", &self.remaining_limit)
            .field("original_limit", &self.original_limit)
            .field("time_limit", &self.time_limit)
            .field("scan_limit", &self.scan_limit)
            .field("position", &self.position)
            .field("scanned", &self.scanned)
            .field("started", &self.started)
            .field("finished", &self.finished)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl<R: RecordKind> Cursor<R> {
    #[expect(clippy::too_many_arguments)]
    pub(crate) fn new(
        kv: Arc<dyn KvDatabase>,
        config: DatabaseConfig,
        auth: Option<AuthContext>,
        plan: QueryPlan,
        predicate: Predicate,
        reverse: bool,
        batch_size: usize,
        limit: Option<u32>,
        time_limit: Option<Duration>,
        scan_limit: Option<u64>,
        sort_fields: &[&str],
    ) -> Self {
        let fingerprint = plan.fingerprint(R::RECORD_NAME, sort_fields);
        Self {
            kv,
            config,
            auth,
            plan,
            predicate,
            reverse,
            batch_size: batch_size.max(1),
            remaining_limit: limit,
            original_limit: limit,
            time_limit,
            scan_limit,
            position: None,
            scanned: 0,
            started: Instant::now(),
            finished: false,
            fingerprint,
            _marker: PhantomData,
        }
    }

    /// Resume from a previously issued token. Fails when the token was
    /// produced by a different plan shape.
    pub fn resume(mut self, continuation: &Continuation) -> Result<Self, Error> {
        continuation.verify(&self.fingerprint)?;
        self.reverse = continuation.reverse;
        self.position = Some(continuation.last_key.clone());
        self.remaining_limit = continuation.remaining_limit;
        self.original_limit = continuation.original_limit;
        Ok(self)
    }

    fn continuation(&self) -> Continuation {
        Continuation {
            scan_type: self.plan.scan_type(),
            reverse: self.reverse,
            last_key: self.position.clone().unwrap_or_default(),
            remaining_limit: self.remaining_limit,
            original_limit: self.original_limit,
            fingerprint: self.fingerprint,
        }
    }

    /// The token for the current position, usable after a limit-bounded
    /// `Done` to pick the scan back up.
    #[must_use]
    pub fn current_continuation(&self) -> Continuation {
        self.continuation()
    }

    /// Produce the next batch.
    pub async fn next(&mut self) -> Result<CursorResult<R>, Error> {
        if self.finished {
            return Ok(CursorResult::Empty);
        }

        // I7: planning may only use a readable index. A non-readable
        // index demotes the plan to a full scan for the cursor's lifetime.
        if let Some(index_name) = self.plan.index_names().first().copied() {
            let index_name = index_name.to_string();
            let stores = TypeStores::of::<R>(&self.config);
            let txn = self.kv.begin();
            if !stores
                .states
                .state(txn.as_ref(), &index_name)
                .await?
                .queryable()
            {
                self.plan = QueryPlan::FullScan;
            }
        }

        // Union and join operators are bounded by their value set and
        // execute in one shot; only full scans page.
        match std::mem::replace(&mut self.plan, QueryPlan::FullScan) {
            QueryPlan::FullScan => {
                self.plan = QueryPlan::FullScan;
                self.next_scan_batch().await
            }
            plan @ (QueryPlan::InUnion { .. } | QueryPlan::InJoin { .. }) => {
                let result = self.run_bounded(&plan).await;
                self.plan = plan;
                self.finished = true;
                result
            }
        }
    }

    async fn next_scan_batch(&mut self) -> Result<CursorResult<R>, Error> {
        if self.remaining_limit == Some(0) {
            self.finished = true;
            return Ok(CursorResult::Done {
                items: Vec::new(),
                reason: DoneReason::ReturnLimitReached,
            });
        }
        let stores = TypeStores::of::<R>(&self.config);
        let (range_begin, range_end) = stores.items.items().range();
        let (begin, end) = match (&self.position, self.reverse) {
            (None, _) => (range_begin, range_end),
            (Some(position), false) => {
                let mut after = position.clone();
                after.push(0x00);
                (after, range_end)
            }
            (Some(position), true) => (range_begin, position.clone()),
        };

        let txn = self.kv.begin();
        let options = RangeOptions {
            limit: None,
            reverse: self.reverse,
            snapshot: true,
        };

        let mut items = Vec::with_capacity(self.batch_size);
        let mut stream = stores.items.scan_raw(txn.as_ref(), begin, end, options);
        let outcome = loop {
            if let Some(limit) = self.time_limit {
                if self.started.elapsed() > limit {
                    break Some(DoneReason::TimeLimitReached);
                }
            }
            if let Some(limit) = self.scan_limit {
                if self.scanned >= limit {
                    break Some(DoneReason::ScanLimitReached);
                }
            }

            let Some((key, bytes)) = stream.try_next().await? else {
                break Some(DoneReason::SourceExhausted);
            };
            self.scanned += 1;
            self.position = Some(stores.items.items().pack(&key));

            let record: R = RecordCodec::decode(&bytes)?;
            if !evaluate(&self.predicate, &record) {
                continue;
            }
            items.push(security::mask(&record, self.auth.as_ref()));

            if let Some(remaining) = self.remaining_limit.as_mut() {
                *remaining -= 1;
                if *remaining == 0 {
                    break Some(DoneReason::ReturnLimitReached);
                }
            }
            if items.len() >= self.batch_size {
                break None;
            }
        };

        match outcome {
            Some(reason) => {
                self.finished = true;
                if items.is_empty() && reason == DoneReason::SourceExhausted {
                    Ok(CursorResult::Empty)
                } else {
                    Ok(CursorResult::Done { items, reason })
                }
            }
            None => Ok(CursorResult::More {
                items,
                continuation: self.continuation(),
            }),
        }
    }

    /// Execute a union or join operator against its index, bounded by the
    /// value set.
    async fn run_bounded(&mut self, plan: &QueryPlan) -> Result<CursorResult<R>, Error> {
        let stores = TypeStores::of::<R>(&self.config);
        let txn = self.kv.begin();

        let index_name = match plan {
            QueryPlan::InUnion { index, .. } | QueryPlan::InJoin { index, .. } => *index,
            QueryPlan::FullScan => unreachable!("bounded operators only"),
        };
        let space = stores.maintainer.index_space(index_name);
        let mut ids: BTreeSet<Vec<u8>> = BTreeSet::new();

        match plan {
            QueryPlan::InUnion { values, .. } => {
                for value in values {
                    let prefix = space.subspace(&Tuple::new(vec![value.to_tuple_element()]));
                    let (begin, end) = prefix.range();
                    let mut range = txn.get_range(&begin, &end, RangeOptions::default());
                    while let Some((key, _)) = range.try_next().await.map_err(Error::Kv)? {
                        let entry = space.unpack(&key)?;
                        ids.insert(Tuple::new(entry.0[1..].to_vec()).pack());
                    }
                }
            }
            QueryPlan::InJoin { values, bloom, .. } => {
                let mut sorted = values.clone();
                sorted.sort_by(|a, b| a.canonical_cmp(b));
                let (Some(low), Some(high)) = (sorted.first(), sorted.last()) else {
                    self.finished = true;
                    return Ok(CursorResult::Empty);
                };

                let begin = space.pack(&Tuple::new(vec![low.to_tuple_element()]));
                let (_, high_end) = space
                    .subspace(&Tuple::new(vec![high.to_tuple_element()]))
                    .range();

                let mut range = txn.get_range(&begin, &high_end, RangeOptions::default());
                while let Some((key, _)) = range.try_next().await.map_err(Error::Kv)? {
                    self.scanned += 1;
                    let entry = space.unpack(&key)?;
                    let Some(first) = entry.0.first() else {
                        continue;
                    };
                    let candidate = FieldValue::from_tuple_element(first);
                    if let Some(bloom) = bloom {
                        if !bloom.maybe_contains(&candidate) {
                            continue;
                        }
                    }
                    if sorted
                        .binary_search_by(|probe| probe.canonical_cmp(&candidate))
                        .is_err()
                    {
                        continue;
                    }
                    ids.insert(Tuple::new(entry.0[1..].to_vec()).pack());
                }
            }
            QueryPlan::FullScan => unreachable!("bounded operators only"),
        }

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = fetch_record::<R>(&stores.items, txn.as_ref(), &id).await? {
                if evaluate(&self.predicate, &record) {
                    items.push(security::mask(&record, self.auth.as_ref()));
                }
            }
        }

        if let Some(limit) = self.remaining_limit {
            items.truncate(limit as usize);
        }
        if items.is_empty() {
            Ok(CursorResult::Empty)
        } else {
            Ok(CursorResult::Done {
                items,
                reason: DoneReason::SourceExhausted,
            })
        }
    }

    /// Drain the cursor, applying the sort chain at the end.
    pub async fn collect(mut self, sorts: &[SortDescriptor]) -> Result<Vec<R>, Error> {
        let mut out = Vec::new();
        loop {
            match self.next().await? {
                CursorResult::More { items, .. } => out.extend(items),
                CursorResult::Done { items, .. } => {
                    out.extend(items);
                    break;
                }
                CursorResult::Empty => break,
            }
        }
        sort_records(&mut out, sorts);
        Ok(out)
    }
}

async fn fetch_record<R: RecordKind>(
    items: &ItemStore,
    txn: &dyn KvTransaction,
    packed_id: &[u8],
) -> Result<Option<R>, Error> {
    let id = Tuple::unpack(packed_id)?;
    match items.read(txn, &id).await? {
        Some(bytes) => Ok(Some(RecordCodec::decode(&bytes)?)),
        None => Ok(None),
    }
}


