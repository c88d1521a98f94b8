use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

///
/// WeakReadSemantics
///
/// How stale a cached read version may be for one transaction. `strict`
/// disables caching entirely; the other presets trade freshness for a
/// saved round-trip to the KV.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WeakReadSemantics {
    caching_allowed: bool,
    max_staleness: Duration,
    min_version: u64,
}

impl WeakReadSemantics {
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            caching_allowed: false,
            max_staleness: Duration::ZERO,
            min_version: 0,
        }
    }

    #[must_use]
    pub const fn default_weak() -> Self {
        Self::max_staleness(Duration::from_secs(5))
    }

    #[must_use]
    pub const fn relaxed() -> Self {
        Self::max_staleness(Duration::from_secs(30))
    }

    #[must_use]
    pub const fn very_relaxed() -> Self {
        Self::max_staleness(Duration::from_secs(60))
    }

    #[must_use]
    pub const fn max_staleness(bound: Duration) -> Self {
        Self {
            caching_allowed: true,
            max_staleness: bound,
            min_version: 0,
        }
    }

    /// Force any cached version to be at least `version`.
    #[must_use]
    pub const fn at_least(version: u64) -> Self {
        Self {
            caching_allowed: true,
            max_staleness: Duration::from_secs(60),
            min_version: version,
        }
    }

    #[must_use]
    pub const fn caching_allowed(&self) -> bool {
        self.caching_allowed
    }
}

///
/// CacheStatistics
///

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub last_commit_version: u64,
}

///
/// ReadVersionCache
///
/// Process-wide cache of the latest observed commit version. The version
/// record is a single locked cell whose critical section is one load or
/// store; statistics are plain atomics.
///

#[derive(Debug, Default)]
pub struct ReadVersionCache {
    cell: Mutex<Option<(u64, Instant)>>,
    hits: AtomicU64,
    misses: AtomicU64,
    last_commit: AtomicU64,
}

static GLOBAL: Lazy<ReadVersionCache> = Lazy::new(ReadVersionCache::default);

impl ReadVersionCache {
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Cached version iff `semantics` permits caching, the entry is within
    /// the staleness bound, and it satisfies the minimum version.
    #[must_use]
    pub fn cached_version(&self, semantics: &WeakReadSemantics) -> Option<u64> {
        if !semantics.caching_allowed {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let cell = *self.cell.lock();
        match cell {
            Some((version, at))
                if at.elapsed() <= semantics.max_staleness && version >= semantics.min_version =>
            {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(version)
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Install a version observed by a read; only strictly newer wins.
    pub fn update_from_read(&self, version: u64) {
        let mut cell = self.cell.lock();
        if cell.is_none_or(|(current, _)| version > current) {
            *cell = Some((version, Instant::now()));
        }
    }

    /// Install a commit version unconditionally; commits are monotonic.
    pub fn update_from_commit(&self, version: u64) {
        *self.cell.lock() = Some((version, Instant::now()));
        self.last_commit.store(version, Ordering::Relaxed);
    }

    pub fn invalidate(&self) {
        *self.cell.lock() = None;
    }

    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn statistics(&self) -> CacheStatistics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatistics {
            hits,
            misses,
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            last_commit_version: self.last_commit.load(Ordering::Relaxed),
        }
    }

    /// Test hook: drop the cell and zero the counters.
    pub fn reset(&self) {
        self.invalidate();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.last_commit.store(0, Ordering::Relaxed);
    }
}

///
/// TESTS
///
