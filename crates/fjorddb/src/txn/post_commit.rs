use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

///
/// PostCommitHook
///
/// Work that runs strictly after a successful commit, off-transaction.
/// Sequential hooks run in ascending priority order; hooks flagged
/// `run_concurrently` are spawned as sibling tasks and joined. Hook
/// failures never undo the commit.
///

#[async_trait]
pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    fn run_concurrently(&self) -> bool {
        false
    }

    async fn run(&self) -> Result<(), String>;
}

///
/// HookResult
///

#[derive(Clone, Debug, PartialEq)]
pub struct HookResult {
    pub name: String,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

///
/// RetryingPostCommit
/// Re-runs the inner hook up to `max_attempts` with a fixed backoff.
///

pub struct RetryingPostCommit {
    inner: Arc<dyn PostCommitHook>,
    max_attempts: u32,
    backoff: Duration,
}

impl RetryingPostCommit {
    #[must_use]
    pub fn new(inner: Arc<dyn PostCommitHook>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

#[async_trait]
impl PostCommitHook for RetryingPostCommit {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn priority(&self) -> i32 {
        self.inner.priority()
    }

    fn run_concurrently(&self) -> bool {
        self.inner.run_concurrently()
    }

    async fn run(&self) -> Result<(), String> {
        let mut last = String::new();
        for attempt in 0..self.max_attempts {
            match self.inner.run().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    last = err;
                    if attempt + 1 < self.max_attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }
        Err(last)
    }
}

///
/// DelayedPostCommit
/// Sleeps before executing the inner hook.
///

pub struct DelayedPostCommit {
    inner: Arc<dyn PostCommitHook>,
    delay: Duration,
}

impl DelayedPostCommit {
    #[must_use]
    pub fn new(inner: Arc<dyn PostCommitHook>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl PostCommitHook for DelayedPostCommit {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn priority(&self) -> i32 {
        self.inner.priority()
    }

    fn run_concurrently(&self) -> bool {
        self.inner.run_concurrently()
    }

    async fn run(&self) -> Result<(), String> {
        tokio::time::sleep(self.delay).await;
        self.inner.run().await
    }
}

///
/// FireAndForgetPostCommit
/// Swallows the inner hook's failure; the result always reads success.
///

pub struct FireAndForgetPostCommit {
    inner: Arc<dyn PostCommitHook>,
}

impl FireAndForgetPostCommit {
    #[must_use]
    pub fn new(inner: Arc<dyn PostCommitHook>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl PostCommitHook for FireAndForgetPostCommit {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn priority(&self) -> i32 {
        self.inner.priority()
    }

    fn run_concurrently(&self) -> bool {
        self.inner.run_concurrently()
    }

    async fn run(&self) -> Result<(), String> {
        if let Err(error) = self.inner.run().await {
            tracing::debug!(hook = self.inner.name(), error, "post-commit error suppressed");
        }
        Ok(())
    }
}

///
/// PostCommitRegistry
///

#[derive(Default)]
pub struct PostCommitRegistry {
    hooks: RwLock<Vec<Arc<dyn PostCommitHook>>>,
}

impl PostCommitRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hook: Arc<dyn PostCommitHook>) {
        self.hooks.write().push(hook);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Run every hook: sequential ones in priority order first, then the
    /// concurrent ones racing on their own tasks.
    pub async fn execute_all(&self) -> Vec<HookResult> {
        let mut hooks: Vec<Arc<dyn PostCommitHook>> = self.hooks.read().clone();
        hooks.sort_by_key(|hook| hook.priority());

        let (concurrent, sequential): (Vec<_>, Vec<_>) =
            hooks.into_iter().partition(|hook| hook.run_concurrently());

        let mut results = Vec::with_capacity(sequential.len() + concurrent.len());
        for hook in sequential {
            results.push(run_one(hook).await);
        }

        let tasks: Vec<_> = concurrent
            .into_iter()
            .map(|hook| tokio::spawn(run_one(hook)))
            .collect();
        for task in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(join_error) => results.push(HookResult {
                    name: "<panicked>".into(),
                    success: false,
                    duration: Duration::ZERO,
                    error: Some(join_error.to_string()),
                }),
            }
        }
        results
    }
}

async fn run_one(hook: Arc<dyn PostCommitHook>) -> HookResult {
    let started = Instant::now();
    let outcome = hook.run().await;
    let duration = started.elapsed();
    match outcome {
        Ok(()) => HookResult {
            name: hook.name().to_string(),
            success: true,
            duration,
            error: None,
        },
        Err(error) => {
            tracing::warn!(hook = hook.name(), error, "post-commit hook failed");
            HookResult {
                name: hook.name().to_string(),
                success: false,
                duration,
                error: Some(error),
            }
        }
    }
}

///
/// TESTS
///
