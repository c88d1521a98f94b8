//! Per-kind entry derivation.
//!
//! `entries` is the single source of truth for what a record looks like
//! under an index. Maintenance, backfill, and the coherence tests all go
//! through it; no kind may be special-cased into a one-entry write.

mod graph;
mod spatial;
mod text;
mod vector;

pub use text::Tokenizer;
pub use vector::{VectorMetric, decode_vector};

use crate::{
    index::{IndexDescriptor, IndexEntry, IndexKind},
    record::{FieldValue, RecordRead},
    tuple::{Tuple, TupleElement},
};

/// Field values for the descriptor's declared fields, in order.
pub(crate) fn field_values(descriptor: &IndexDescriptor, record: &dyn RecordRead) -> Vec<FieldValue> {
    descriptor
        .fields
        .iter()
        .map(|field| record.read_path(field))
        .collect()
}

pub(crate) fn elements(values: &[FieldValue]) -> Vec<TupleElement> {
    values.iter().map(FieldValue::to_tuple_element).collect()
}

fn with_id(mut elements: Vec<TupleElement>, id: &Tuple) -> Tuple {
    elements.extend(id.0.iter().cloned());
    Tuple::new(elements)
}

/// Covering payload: the stored fields packed as a tuple.
fn stored_value(descriptor: &IndexDescriptor, record: &dyn RecordRead) -> Vec<u8> {
    if descriptor.stored_fields.is_empty() {
        return Vec::new();
    }
    let elements = descriptor
        .stored_fields
        .iter()
        .map(|field| record.read_path(field).to_tuple_element())
        .collect();
    Tuple::new(elements).pack()
}

/// The exact set of index entries representing `record` under `descriptor`.
///
/// For `Count` and `Sum` the entry value carries the signed delta an insert
/// contributes; maintenance turns it into atomic adds rather than sets.
#[must_use]
pub fn entries(descriptor: &IndexDescriptor, record: &dyn RecordRead, id: &Tuple) -> Vec<IndexEntry> {
    let values = field_values(descriptor, record);

    match descriptor.kind {
        IndexKind::Scalar | IndexKind::Rank => {
            vec![IndexEntry::new(
                with_id(elements(&values), id),
                stored_value(descriptor, record),
            )]
        }

        IndexKind::Count => {
            vec![IndexEntry::new(Tuple::new(elements(&values)), 1i64.to_le_bytes().to_vec())]
        }

        IndexKind::Sum => {
            // Last declared field is the summand; the rest group.
            let (group, summand) = split_summand(&values);
            vec![IndexEntry::new(
                Tuple::new(elements(group)),
                summand.to_le_bytes().to_vec(),
            )]
        }

        IndexKind::Min | IndexKind::Max => {
            // Sorted set over group ++ value ++ id; min and max differ only
            // in scan direction at query time.
            vec![IndexEntry::bare(with_id(elements(&values), id))]
        }

        IndexKind::GraphAdjacency { bidirectional } => {
            graph::adjacency_entries(&values, id, bidirectional)
        }

        IndexKind::GraphTriple => graph::triple_entries(&values, id),

        IndexKind::FullText { tokenizer } => text::posting_entries(tokenizer, &values, id),

        IndexKind::Version { .. } => {
            // The versionstamped key is minted at commit time; at rest a
            // record is represented by its per-record history prefix, which
            // maintenance manages directly.
            Vec::new()
        }

        IndexKind::Spatial { precision } => spatial::cell_entries(&values, id, precision),

        IndexKind::Permuted { permutations } => permuted_entries(&values, id, permutations),

        IndexKind::Vector { .. } => vec![IndexEntry::new(
            id.clone(),
            vector::encode_vector(values.first()),
        )],
    }
}

fn split_summand(values: &[FieldValue]) -> (&[FieldValue], i64) {
    match values.split_last() {
        Some((last, group)) => (group, numeric(last)),
        None => (values, 0),
    }
}

fn numeric(value: &FieldValue) -> i64 {
    match value {
        FieldValue::Int(v) => *v,
        FieldValue::Double(v) => num_traits::cast(v.trunc()).unwrap_or(0),
        FieldValue::Bool(true) => 1,
        _ => 0,
    }
}

fn permuted_entries(
    values: &[FieldValue],
    id: &Tuple,
    permutations: &[&[usize]],
) -> Vec<IndexEntry> {
    let mut out = Vec::with_capacity(permutations.len());
    for (tag, permutation) in permutations.iter().enumerate() {
        let mut elements: Vec<TupleElement> =
            Vec::with_capacity(permutation.len() + 1 + id.0.len());
        elements.push(TupleElement::Int(i64::try_from(tag).unwrap_or(i64::MAX)));
        for &slot in *permutation {
            let value = values.get(slot).unwrap_or(&FieldValue::Null);
            elements.push(value.to_tuple_element());
        }
        out.push(IndexEntry::bare(with_id(elements, id)));
    }
    out
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::entries;
    use crate::{
        index::{IndexDescriptor, IndexKind},
        record::{FieldValue, RecordRead},
        tuple::{Tuple, TupleElement},
    };

    struct Row;

    impl RecordRead for Row {
        fn field_value(&self, name: &str) -> FieldValue {
            match name {
                "dept" => FieldValue::String("eng".into()),
                "salary" => FieldValue::Int(90),
                "score" => FieldValue::Double(1.5),
                _ => FieldValue::Null,
            }
        }
    }

    fn id() -> Tuple {
        Tuple::new(vec![TupleElement::String("e1".into())])
    }

    #[test]
    fn scalar_is_one_entry_with_id_suffix() {
        let descriptor = IndexDescriptor::new("by_dept", IndexKind::Scalar, &["dept"]);
        let out = entries(&descriptor, &Row, &id());
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].subkey,
            Tuple::new(vec![
                TupleElement::String("eng".into()),
                TupleElement::String("e1".into()),
            ])
        );
    }

    #[test]
    fn count_groups_without_id() {
        let descriptor = IndexDescriptor::new("dept_count", IndexKind::Count, &["dept"]);
        let out = entries(&descriptor, &Row, &id());
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].subkey,
            Tuple::new(vec![TupleElement::String("eng".into())])
        );
        assert_eq!(out[0].value, 1i64.to_le_bytes().to_vec());
    }

    #[test]
    fn sum_carries_the_summand_delta() {
        let descriptor =
            IndexDescriptor::new("salary_sum", IndexKind::Sum, &["dept", "salary"]);
        let out = entries(&descriptor, &Row, &id());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, 90i64.to_le_bytes().to_vec());
    }

    #[test]
    fn permuted_emits_one_entry_per_permutation() {
        let descriptor = IndexDescriptor::new(
            "perms",
            IndexKind::Permuted {
                permutations: &[&[0, 1], &[1, 0]],
            },
            &["dept", "salary"],
        );
        let out = entries(&descriptor, &Row, &id());
        assert_eq!(out.len(), 2);
        assert_ne!(out[0].subkey, out[1].subkey);
    }

    #[test]
    fn min_max_sort_by_group_value_id() {
        let descriptor =
            IndexDescriptor::new("salary_min", IndexKind::Min, &["dept", "salary"]);
        let out = entries(&descriptor, &Row, &id());
        assert_eq!(
            out[0].subkey,
            Tuple::new(vec![
                TupleElement::String("eng".into()),
                TupleElement::Int(90),
                TupleElement::String("e1".into()),
            ])
        );
    }
}
