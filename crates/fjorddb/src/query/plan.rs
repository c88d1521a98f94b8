use crate::{
    query::{
        continuation::{ScanType, plan_fingerprint},
        predicate::{CompareOp, Predicate},
    },
    record::{FieldValue, RecordKind},
    index::IndexKind,
};
use std::hash::{DefaultHasher, Hash, Hasher};

///
/// InStrategy
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InStrategy {
    /// Very small value set: one point lookup per value.
    ConvertToUnion,
    /// Large-but-bounded set: one index scan over the value envelope with
    /// probe rejection.
    BoundedRangeScan,
    /// Very large or unbounded: scan the records and post-filter.
    FullScan,
}

///
/// StrategySelector
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StrategySelector {
    /// At or below this count, union point lookups win.
    pub union_max: usize,
    /// Above this count, the join side carries a bloom filter.
    pub bloom_min: usize,
    /// Above this count the value set no longer bounds a useful scan.
    pub bounded_max: usize,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self {
            union_max: 5,
            bloom_min: 50,
            bounded_max: 1_000,
        }
    }
}

impl StrategySelector {
    #[must_use]
    pub const fn select(&self, value_count: usize, bounded_range: bool) -> InStrategy {
        if value_count <= self.union_max {
            InStrategy::ConvertToUnion
        } else if bounded_range && value_count <= self.bounded_max {
            InStrategy::BoundedRangeScan
        } else {
            InStrategy::FullScan
        }
    }
}

///
/// BloomFilter
///
/// Probe-rejection filter for the join operator. False positives fall
/// through to the exact membership check; false negatives cannot occur.
///

#[derive(Clone, Debug)]
pub struct BloomFilter {
    bits: Vec<u64>,
    hashes: u32,
}

impl BloomFilter {
    const BITS_PER_VALUE: usize = 10;
    const HASHES: u32 = 4;

    #[must_use]
    pub fn from_values(values: &[FieldValue]) -> Self {
        let bit_count = (values.len() * Self::BITS_PER_VALUE).max(64);
        let mut filter = Self {
            bits: vec![0u64; bit_count.div_ceil(64)],
            hashes: Self::HASHES,
        };
        for value in values {
            filter.insert(value);
        }
        filter
    }

    fn positions(&self, value: &FieldValue) -> impl Iterator<Item = usize> + '_ {
        let bytes = crate::tuple::Tuple::new(vec![value.to_tuple_element()]).pack();
        let mut h1 = DefaultHasher::new();
        bytes.hash(&mut h1);
        let h1 = h1.finish();
        let h2 = h1.rotate_left(31) | 1;
        let bit_len = self.bits.len() * 64;

        (0..self.hashes).map(move |i| {
            let combined = h1.wrapping_add(u64::from(i).wrapping_mul(h2));
            (combined % bit_len as u64) as usize
        })
    }

    fn insert(&mut self, value: &FieldValue) {
        let positions: Vec<usize> = self.positions(value).collect();
        for position in positions {
            self.bits[position / 64] |= 1 << (position % 64);
        }
    }

    #[must_use]
    pub fn maybe_contains(&self, value: &FieldValue) -> bool {
        self.positions(value)
            .all(|position| self.bits[position / 64] & (1 << (position % 64)) != 0)
    }
}

///
/// QueryPlan
///
/// The executable shape of one query. The fingerprint over this shape is
/// what continuation tokens bind to.
///

#[derive(Clone, Debug)]
pub enum QueryPlan {
    FullScan,
    InUnion {
        index: &'static str,
        values: Vec<FieldValue>,
    },
    InJoin {
        index: &'static str,
        values: Vec<FieldValue>,
        bloom: Option<BloomFilter>,
    },
}

impl QueryPlan {
    #[must_use]
    pub const fn scan_type(&self) -> ScanType {
        match self {
            Self::FullScan => ScanType::FullScan,
            Self::InUnion { .. } => ScanType::InUnion,
            Self::InJoin { .. } => ScanType::InJoin,
        }
    }

    #[must_use]
    pub fn index_names(&self) -> Vec<&str> {
        match self {
            Self::FullScan => Vec::new(),
            Self::InUnion { index, .. } | Self::InJoin { index, .. } => vec![index],
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::FullScan => "full-scan".to_string(),
            Self::InUnion { index, values } => {
                format!("in-union({index},{})", values.len())
            }
            Self::InJoin { index, values, bloom } => format!(
                "in-join({index},{},bloom={})",
                values.len(),
                bloom.is_some()
            ),
        }
    }

    /// Fingerprint binding: record type, operator shape, index set, sorts.
    #[must_use]
    pub fn fingerprint(&self, record_type: &str, sort_fields: &[&str]) -> [u8; 32] {
        let description = format!("{record_type}:{}", self.describe());
        plan_fingerprint(&description, &self.index_names(), sort_fields)
    }
}

/// Plan an `IN` predicate against `R`'s scalar indexes. Anything that is
/// not a single top-level `IN` over an indexed field falls back to a full
/// scan with post-filtering.
#[must_use]
pub fn plan_query<R: RecordKind>(predicate: &Predicate, selector: &StrategySelector) -> QueryPlan {
    let Predicate::Compare(comparison) = predicate else {
        return QueryPlan::FullScan;
    };
    if comparison.op != CompareOp::In {
        return QueryPlan::FullScan;
    }
    let FieldValue::Array(values) = &comparison.value else {
        return QueryPlan::FullScan;
    };

    let indexed = R::INDEXES.iter().find(|descriptor| {
        matches!(descriptor.kind, IndexKind::Scalar)
            && descriptor.fields == [comparison.field.name()]
    });
    let Some(descriptor) = indexed else {
        return QueryPlan::FullScan;
    };

    let selector = *selector;
    match selector.select(values.len(), true) {
        InStrategy::ConvertToUnion => QueryPlan::InUnion {
            index: descriptor.name,
            values: values.clone(),
        },
        InStrategy::BoundedRangeScan => {
            let bloom = (values.len() > selector.bloom_min)
                .then(|| BloomFilter::from_values(values));
            QueryPlan::InJoin {
                index: descriptor.name,
                values: values.clone(),
                bloom,
            }
        }
        InStrategy::FullScan => QueryPlan::FullScan,
    }
}

///
/// TESTS
///
