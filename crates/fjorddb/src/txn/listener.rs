use parking_lot::RwLock;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

///
/// TransactionEvent
///
/// Lifecycle stream for one save. Emission order is fixed:
/// `created → committing → committed | failed | cancelled → closed`.
/// Terminal events are one-shot; the emitter ignores duplicate marks.
///

#[derive(Clone, Debug, PartialEq)]
pub enum TransactionEvent {
    Created {
        id: String,
    },
    Committing {
        id: String,
    },
    Committed {
        id: String,
        duration: Duration,
        version: u64,
    },
    Failed {
        id: String,
        duration: Duration,
        error: String,
    },
    Cancelled {
        id: String,
        duration: Duration,
    },
    Closed {
        id: String,
        total_duration: Duration,
    },
}

impl TransactionEvent {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Committed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

///
/// TransactionListener
///

pub trait TransactionListener: Send + Sync {
    fn on_event(&self, event: &TransactionEvent);
}

///
/// TransactionListenerRegistry
///

#[derive(Default)]
pub struct TransactionListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn TransactionListener>>>,
}

impl TransactionListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn TransactionListener>) {
        self.listeners.write().push(listener);
    }

    pub fn emit(&self, event: &TransactionEvent) {
        for listener in self.listeners.read().iter() {
            listener.on_event(event);
        }
    }
}

///
/// TransactionMetricsCollector
///
/// Update-only counters over the event stream: totals per terminal kind,
/// success rate, and mean duration.
///

#[derive(Debug, Default)]
pub struct TransactionMetricsCollector {
    total: AtomicU64,
    committed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    duration_micros: AtomicU64,
}

impl TransactionMetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.committed() as f64 / total as f64
    }

    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn avg_duration_ms(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let micros = self.duration_micros.load(Ordering::Relaxed);
        micros as f64 / 1_000.0 / total as f64
    }

    fn record(&self, duration: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.duration_micros.fetch_add(micros, Ordering::Relaxed);
    }
}

impl TransactionListener for TransactionMetricsCollector {
    fn on_event(&self, event: &TransactionEvent) {
        match event {
            TransactionEvent::Committed { duration, .. } => {
                self.record(*duration);
                self.committed.fetch_add(1, Ordering::Relaxed);
            }
            TransactionEvent::Failed { duration, .. } => {
                self.record(*duration);
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            TransactionEvent::Cancelled { duration, .. } => {
                self.record(*duration);
                self.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

///
/// FilteringListener
/// Forwards only events matching the predicate.
///

pub struct FilteringListener {
    inner: Arc<dyn TransactionListener>,
    predicate: fn(&TransactionEvent) -> bool,
}

impl FilteringListener {
    #[must_use]
    pub fn new(inner: Arc<dyn TransactionListener>, predicate: fn(&TransactionEvent) -> bool) -> Self {
        Self { inner, predicate }
    }
}

impl TransactionListener for FilteringListener {
    fn on_event(&self, event: &TransactionEvent) {
        if (self.predicate)(event) {
            self.inner.on_event(event);
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{
        FilteringListener, TransactionEvent, TransactionListener, TransactionListenerRegistry,
        TransactionMetricsCollector,
    };
    use parking_lot::Mutex;
    use std::{sync::Arc, time::Duration};

    #[derive(Default)]
    struct Recording(Mutex<Vec<TransactionEvent>>);

    impl TransactionListener for Recording {
        fn on_event(&self, event: &TransactionEvent) {
            self.0.lock().push(event.clone());
        }
    }

    #[test]
    fn metrics_collector_tracks_terminals() {
        let collector = TransactionMetricsCollector::new();
        collector.on_event(&TransactionEvent::Committed {
            id: "a".into(),
            duration: Duration::from_millis(10),
            version: 1,
        });
        collector.on_event(&TransactionEvent::Failed {
            id: "b".into(),
            duration: Duration::from_millis(30),
            error: "boom".into(),
        });

        assert_eq!(collector.total(), 2);
        assert_eq!(collector.committed(), 1);
        assert_eq!(collector.failed(), 1);
        assert!((collector.success_rate() - 0.5).abs() < f64::EPSILON);
        assert!((collector.avg_duration_ms() - 20.0).abs() < 0.5);
    }

    #[test]
    fn filtering_listener_forwards_matching_events_only() {
        let inner = Arc::new(Recording::default());
        let filter = FilteringListener::new(inner.clone(), TransactionEvent::is_terminal);

        let registry = TransactionListenerRegistry::new();
        registry.register(Arc::new(filter));

        registry.emit(&TransactionEvent::Created { id: "t".into() });
        registry.emit(&TransactionEvent::Committed {
            id: "t".into(),
            duration: Duration::ZERO,
            version: 3,
        });

        let seen = inner.0.lock();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], TransactionEvent::Committed { .. }));
    }
}
