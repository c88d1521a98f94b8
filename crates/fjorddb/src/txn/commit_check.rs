use crate::kv::KvTransaction;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error as ThisError;

///
/// CommitCheckError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CommitCheckError {
    #[error("commit check '{name}' failed: {reason}")]
    ValidationFailed { name: String, reason: String },

    #[error("{} commit checks failed", .0.len())]
    MultipleFailures(Vec<(String, String)>),
}

///
/// CommitCheck
///
/// Registered validation executed inside the transaction, after the write
/// set and before commit. Checks run in ascending priority order.
///

#[async_trait]
pub trait CommitCheck: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    async fn check(&self, txn: &dyn KvTransaction) -> Result<(), CommitCheckError>;
}

///
/// FnCommitCheck
/// Adapter for closure-backed checks that do not read the transaction.
///

pub struct FnCommitCheck<F> {
    name: String,
    priority: i32,
    check: F,
}

impl<F> FnCommitCheck<F>
where
    F: Fn() -> Result<(), String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, priority: i32, check: F) -> Self {
        Self {
            name: name.into(),
            priority,
            check,
        }
    }
}

#[async_trait]
impl<F> CommitCheck for FnCommitCheck<F>
where
    F: Fn() -> Result<(), String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn check(&self, _txn: &dyn KvTransaction) -> Result<(), CommitCheckError> {
        (self.check)().map_err(|reason| CommitCheckError::ValidationFailed {
            name: self.name.clone(),
            reason,
        })
    }
}

///
/// CommitCheckRegistry
///
/// Locked collection safe under concurrent add/execute. `fail_fast`
/// composites abort on the first failure; otherwise every failure is
/// collected into `MultipleFailures`.
///

pub struct CommitCheckRegistry {
    checks: RwLock<Vec<Arc<dyn CommitCheck>>>,
    fail_fast: bool,
}

impl Default for CommitCheckRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CommitCheckRegistry {
    #[must_use]
    pub fn new(fail_fast: bool) -> Self {
        Self {
            checks: RwLock::new(Vec::new()),
            fail_fast,
        }
    }

    pub fn register(&self, check: Arc<dyn CommitCheck>) {
        self.checks.write().push(check);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.read().is_empty()
    }

    pub async fn execute_all(&self, txn: &dyn KvTransaction) -> Result<(), CommitCheckError> {
        let mut checks: Vec<Arc<dyn CommitCheck>> = self.checks.read().clone();
        checks.sort_by_key(|check| check.priority());

        let mut failures = Vec::new();
        for check in checks {
            match check.check(txn).await {
                Ok(()) => {}
                Err(err) if self.fail_fast => return Err(err),
                Err(CommitCheckError::ValidationFailed { name, reason }) => {
                    failures.push((name, reason));
                }
                Err(CommitCheckError::MultipleFailures(inner)) => failures.extend(inner),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CommitCheckError::MultipleFailures(failures))
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{CommitCheckError, CommitCheckRegistry, FnCommitCheck};
    use crate::kv::{KvDatabase, MemoryDatabase};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[tokio::test]
    async fn checks_run_in_priority_order() {
        let db = MemoryDatabase::new();
        let registry = CommitCheckRegistry::new(true);
        let order = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&order);
        registry.register(Arc::new(FnCommitCheck::new("low", -5, move || {
            assert_eq!(first.fetch_add(1, Ordering::SeqCst), 0);
            Ok(())
        })));
        let second = Arc::clone(&order);
        registry.register(Arc::new(FnCommitCheck::new("high", 5, move || {
            assert_eq!(second.fetch_add(1, Ordering::SeqCst), 1);
            Ok(())
        })));

        let txn = db.begin();
        registry.execute_all(txn.as_ref()).await.expect("checks pass");
        assert_eq!(order.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fail_fast_aborts_on_first_failure() {
        let db = MemoryDatabase::new();
        let registry = CommitCheckRegistry::new(true);
        let ran_second = Arc::new(AtomicUsize::new(0));

        registry.register(Arc::new(FnCommitCheck::new("first", 0, || {
            Err("boom".to_string())
        })));
        let witness = Arc::clone(&ran_second);
        registry.register(Arc::new(FnCommitCheck::new("second", 1, move || {
            witness.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })));

        let txn = db.begin();
        let err = registry
            .execute_all(txn.as_ref())
            .await
            .expect_err("first failure aborts");
        assert_eq!(
            err,
            CommitCheckError::ValidationFailed {
                name: "first".into(),
                reason: "boom".into()
            }
        );
        assert_eq!(ran_second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn collecting_registry_enumerates_every_failure() {
        let db = MemoryDatabase::new();
        let registry = CommitCheckRegistry::new(false);
        registry.register(Arc::new(FnCommitCheck::new("a", 0, || {
            Err("first".to_string())
        })));
        registry.register(Arc::new(FnCommitCheck::new("b", 1, || {
            Err("second".to_string())
        })));

        let txn = db.begin();
        let err = registry
            .execute_all(txn.as_ref())
            .await
            .expect_err("collected failures");
        assert_eq!(
            err,
            CommitCheckError::MultipleFailures(vec![
                ("a".into(), "first".into()),
                ("b".into(), "second".into()),
            ])
        );
    }
}
