//! Query surface: predicate AST and evaluation, sort descriptors, the
//! `IN`-predicate optimizer, continuation tokens, and batched cursors.

mod continuation;
mod cursor;
mod eval;
mod plan;
mod predicate;
mod sort;

pub use continuation::{Continuation, ContinuationError, ScanType, plan_fingerprint};
pub use cursor::{Cursor, CursorResult, DoneReason};
pub use eval::evaluate;
pub use plan::{BloomFilter, InStrategy, QueryPlan, StrategySelector, plan_query};
pub use predicate::{CompareOp, FieldAccessor, FieldComparison, FieldReaderFn, Predicate, field};
pub use sort::{SortDescriptor, SortOrder, compare_all, sort_records};

use crate::{
    config::DatabaseConfig,
    error::Error,
    kv::KvDatabase,
    record::{AuthContext, RecordKind},
    txn::RecordContext,
};
use futures::stream::BoxStream;
use std::{sync::Arc, time::Duration};

const DEFAULT_BATCH_SIZE: usize = 100;

///
/// RecordQuery
///
/// Fluent query over one record type. `cursor()` hands execution to a
/// batched cursor; `collect()` drains and applies the sort chain.
///

pub struct RecordQuery<R: RecordKind> {
    kv: Arc<dyn KvDatabase>,
    config: DatabaseConfig,
    auth: Option<AuthContext>,
    predicate: Predicate,
    sorts: Vec<SortDescriptor>,
    limit: Option<u32>,
    reverse: bool,
    batch_size: usize,
    time_limit: Option<Duration>,
    scan_limit: Option<u64>,
    selector: StrategySelector,
    _marker: std::marker::PhantomData<fn() -> R>,
}

impl<R: RecordKind> RecordQuery<R> {
    pub(crate) fn new(
        kv: Arc<dyn KvDatabase>,
        config: DatabaseConfig,
        auth: Option<AuthContext>,
    ) -> Self {
        Self {
            kv,
            config,
            auth,
            predicate: Predicate::True,
            sorts: Vec::new(),
            limit: None,
            reverse: false,
            batch_size: DEFAULT_BATCH_SIZE,
            time_limit: None,
            scan_limit: None,
            selector: StrategySelector::default(),
            _marker: std::marker::PhantomData,
        }
    }

    /// AND the predicate into the query.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = match self.predicate {
            Predicate::True => predicate,
            existing => Predicate::And(vec![existing, predicate]),
        };
        self
    }

    #[must_use]
    pub fn sort_by(mut self, descriptor: SortDescriptor) -> Self {
        self.sorts.push(descriptor);
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn scan_limit(mut self, limit: u64) -> Self {
        self.scan_limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn strategy(mut self, selector: StrategySelector) -> Self {
        self.selector = selector;
        self
    }

    /// The plan this query resolves to right now.
    #[must_use]
    pub fn plan(&self) -> QueryPlan {
        plan_query::<R>(&self.predicate, &self.selector)
    }

    /// Build the executing cursor.
    #[must_use]
    pub fn cursor(self) -> Cursor<R> {
        let plan = self.plan();
        let sort_fields: Vec<&str> = self
            .sorts
            .iter()
            .map(|descriptor| descriptor.field.name())
            .collect();
        Cursor::new(
            self.kv,
            self.config,
            self.auth,
            plan,
            self.predicate,
            self.reverse,
            self.batch_size,
            self.limit,
            self.time_limit,
            self.scan_limit,
            &sort_fields,
        )
    }

    /// Drain to a sorted vector.
    pub async fn collect(self) -> Result<Vec<R>, Error> {
        let sorts = self.sorts.clone();
        self.cursor().collect(&sorts).await
    }

    /// Lazy item stream over the cursor's batches.
    #[must_use]
    pub fn stream(self) -> BoxStream<'static, Result<R, Error>> {
        let mut cursor = self.cursor();
        Box::pin(async_stream::try_stream! {
            loop {
                match cursor.next().await? {
                    CursorResult::More { items, .. } => {
                        for item in items {
                            yield item;
                        }
                    }
                    CursorResult::Done { items, .. } => {
                        for item in items {
                            yield item;
                        }
                        break;
                    }
                    CursorResult::Empty => break,
                }
            }
        })
    }
}

impl RecordContext {
    /// Start a query for `R` under this context's auth.
    #[must_use]
    pub fn query<R: RecordKind>(&self) -> RecordQuery<R> {
        RecordQuery::new(self.kv(), *self.database_config(), self.auth().cloned())
    }
}
