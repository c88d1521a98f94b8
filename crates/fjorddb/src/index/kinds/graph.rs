use crate::{
    index::IndexEntry,
    record::FieldValue,
    tuple::{Tuple, TupleElement},
};

const OUT: &str = "out";
const IN: &str = "in";

const SPO: &str = "spo";
const POS: &str = "pos";
const OSP: &str = "osp";

fn posting(orientation: &str, parts: [&FieldValue; 3], id: &Tuple) -> IndexEntry {
    let mut elements = Vec::with_capacity(4 + id.0.len());
    elements.push(TupleElement::String(orientation.to_string()));
    for part in parts {
        elements.push(part.to_tuple_element());
    }
    elements.extend(id.0.iter().cloned());
    IndexEntry::bare(Tuple::new(elements))
}

/// Adjacency postings for a `(from, edge, to)` record: one outgoing under
/// `out/<edge>/<from>/<to>` and one incoming under `in/<edge>/<to>/<from>`.
/// Bidirectional edges mirror both orientations.
pub(super) fn adjacency_entries(
    values: &[FieldValue],
    id: &Tuple,
    bidirectional: bool,
) -> Vec<IndexEntry> {
    let [from, edge, to] = three(values);

    let mut out = vec![
        posting(OUT, [edge, from, to], id),
        posting(IN, [edge, to, from], id),
    ];
    if bidirectional {
        out.push(posting(OUT, [edge, to, from], id));
        out.push(posting(IN, [edge, from, to], id));
    }
    out
}

/// Triple-store postings: one entry per canonical ordering so any bound
/// pattern resolves to a prefix scan.
pub(super) fn triple_entries(values: &[FieldValue], id: &Tuple) -> Vec<IndexEntry> {
    let [s, p, o] = three(values);
    vec![
        posting(SPO, [s, p, o], id),
        posting(POS, [p, o, s], id),
        posting(OSP, [o, s, p], id),
    ]
}

fn three(values: &[FieldValue]) -> [&FieldValue; 3] {
    [
        values.first().unwrap_or(&FieldValue::Null),
        values.get(1).unwrap_or(&FieldValue::Null),
        values.get(2).unwrap_or(&FieldValue::Null),
    ]
}

///
/// TESTS
///
