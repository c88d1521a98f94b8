//! Secondary indexes: a polymorphic family of kinds with one maintenance
//! contract. Every kind reduces a record to a set of `(subkey, value)`
//! entries; maintenance applies the delta between the old and new record's
//! entry sets inside the enclosing transaction.

pub mod builder;
mod kinds;
mod maintainer;
mod reader;
mod state;
mod unique;

pub use kinds::{Tokenizer, VectorMetric, decode_vector, entries};
pub use maintainer::{IndexMaintainer, MaintenanceOp};
pub use reader::IndexReader;
pub use state::{IndexState, IndexStateError, IndexStateManager};
pub use unique::{
    UniquenessViolation, clear_violations, record_violation, scan_violations, violations_space,
};

use crate::tuple::Tuple;

///
/// IndexKind
///
/// The closed family of index kinds. Kind-specific parameters ride on the
/// variant; dispatch is a match, not a subtype lookup.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexKind {
    /// One entry `values ++ id`, byte-lexicographic.
    Scalar,
    /// One counter per distinct group key, maintained by atomic add.
    Count,
    /// Atomic signed sum of the last declared field, grouped by the rest.
    Sum,
    /// Sorted set `group ++ value ++ id`; min is the first key in a group.
    Min,
    /// Same layout as `Min`; max is the last key in a group.
    Max,
    /// Adjacency over `(from, edge, to)`: an outgoing and an incoming
    /// posting per record; `bidirectional` mirrors both orientations.
    GraphAdjacency { bidirectional: bool },
    /// Triple store over `(subject, predicate, object)`: SPO, POS, and OSP
    /// orderings so any bound pattern is a prefix scan.
    GraphTriple,
    /// One posting per token with its frequency.
    FullText { tokenizer: Tokenizer },
    /// Appends one entry per write keyed by the commit versionstamp.
    Version { keep_last_n: Option<u32> },
    /// Sorted set `score ++ id`; top-K is a bounded scan.
    Rank,
    /// Morton-interleaved `(lat, lon)` cell ++ id.
    Spatial { precision: u8 },
    /// One entry per declared permutation of the field list.
    Permuted { permutations: &'static [&'static [usize]] },
    /// Flat vector storage at `id`; queries brute-force the subspace.
    Vector { metric: VectorMetric },
}

///
/// IndexDescriptor
///
/// Static per-index metadata declared on the record type. Field order is
/// significant; names are unique within a type.
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexDescriptor {
    pub name: &'static str,
    pub kind: IndexKind,
    pub fields: &'static [&'static str],
    pub unique: bool,
    pub sparse: bool,
    /// Covering fields stored in the entry value (scalar kinds only).
    pub stored_fields: &'static [&'static str],
}

impl IndexDescriptor {
    #[must_use]
    pub const fn new(name: &'static str, kind: IndexKind, fields: &'static [&'static str]) -> Self {
        Self {
            name,
            kind,
            fields,
            unique: false,
            sparse: false,
            stored_fields: &[],
        }
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub const fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    #[must_use]
    pub const fn covering(mut self, stored_fields: &'static [&'static str]) -> Self {
        self.stored_fields = stored_fields;
        self
    }
}

///
/// IndexEntry
///
/// One `(subkey, value)` pair produced by a kind's `entries`. The subkey is
/// relative to the index's own subspace.
///

#[derive(Clone, Debug, PartialEq)]
pub struct IndexEntry {
    pub subkey: Tuple,
    pub value: Vec<u8>,
}

impl IndexEntry {
    #[must_use]
    pub const fn new(subkey: Tuple, value: Vec<u8>) -> Self {
        Self { subkey, value }
    }

    #[must_use]
    pub const fn bare(subkey: Tuple) -> Self {
        Self {
            subkey,
            value: Vec::new(),
        }
    }
}
