use crate::{
    index::IndexEntry,
    record::FieldValue,
    tuple::{Tuple, TupleElement},
};
use std::collections::BTreeMap;

///
/// Tokenizer
///
/// Token derivation for full-text postings. Declared on the index so the
/// same rules apply at write and query time.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Tokenizer {
    /// Lowercased alphanumeric runs; everything else separates.
    #[default]
    Simple,
    /// Whitespace-separated, case preserved.
    Whitespace,
}

impl Tokenizer {
    #[must_use]
    pub fn tokenize(self, text: &str) -> Vec<String> {
        match self {
            Self::Simple => text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .map(str::to_lowercase)
                .collect(),
            Self::Whitespace => text
                .split_whitespace()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// One posting per distinct token across the configured text fields,
/// keyed `token ++ id` with the term frequency as the value. Updates diff
/// the posting multiset: a frequency change rewrites the posting in place.
pub(super) fn posting_entries(
    tokenizer: Tokenizer,
    values: &[FieldValue],
    id: &Tuple,
) -> Vec<IndexEntry> {
    let mut frequencies: BTreeMap<String, i64> = BTreeMap::new();
    for value in values {
        if let FieldValue::String(text) = value {
            for token in tokenizer.tokenize(text) {
                *frequencies.entry(token).or_insert(0) += 1;
            }
        }
    }

    frequencies
        .into_iter()
        .map(|(token, frequency)| {
            let mut elements = Vec::with_capacity(1 + id.0.len());
            elements.push(TupleElement::String(token));
            elements.extend(id.0.iter().cloned());
            IndexEntry::new(Tuple::new(elements), frequency.to_le_bytes().to_vec())
        })
        .collect()
}

///
/// TESTS
///
