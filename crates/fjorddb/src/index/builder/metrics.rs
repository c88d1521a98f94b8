use once_cell::sync::Lazy;
use prometheus::{HistogramVec, IntCounterVec, histogram_opts, opts};

const LABELS: &[&str] = &["item_type", "target_count"];

///
/// IndexerMetrics
///
/// Builder counters, dimensioned by `(item_type, target_count)` and
/// registered once against the default registry.
///

pub struct IndexerMetrics {
    pub items_indexed: IntCounterVec,
    pub batches_processed: IntCounterVec,
    pub batch_duration: HistogramVec,
    pub errors: IntCounterVec,
}

static METRICS: Lazy<IndexerMetrics> = Lazy::new(|| {
    let items_indexed = IntCounterVec::new(
        opts!(
            "fdb_multi_indexer_items_indexed_total",
            "Records indexed by the online builder"
        ),
        LABELS,
    )
    .expect("valid counter opts");
    let batches_processed = IntCounterVec::new(
        opts!(
            "fdb_multi_indexer_batches_processed_total",
            "Committed builder batches"
        ),
        LABELS,
    )
    .expect("valid counter opts");
    let batch_duration = HistogramVec::new(
        histogram_opts!(
            "fdb_multi_indexer_batch_duration_seconds",
            "Wall time per committed builder batch"
        ),
        LABELS,
    )
    .expect("valid histogram opts");
    let errors = IntCounterVec::new(
        opts!(
            "fdb_multi_indexer_errors_total",
            "Builder batch failures, including retried ones"
        ),
        LABELS,
    )
    .expect("valid counter opts");

    let registry = prometheus::default_registry();
    for collector in [&items_indexed, &batches_processed, &errors] {
        let _ = registry.register(Box::new(collector.clone()));
    }
    let _ = registry.register(Box::new(batch_duration.clone()));

    IndexerMetrics {
        items_indexed,
        batches_processed,
        batch_duration,
        errors,
    }
});

impl IndexerMetrics {
    #[must_use]
    pub fn global() -> &'static Self {
        &METRICS
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::IndexerMetrics;

    #[test]
    fn counters_accumulate_per_dimension() {
        let metrics = IndexerMetrics::global();
        let labels = &["TestType", "3"];

        let before = metrics.items_indexed.with_label_values(labels).get();
        metrics.items_indexed.with_label_values(labels).inc_by(15);
        assert_eq!(
            metrics.items_indexed.with_label_values(labels).get(),
            before + 15
        );
    }
}
