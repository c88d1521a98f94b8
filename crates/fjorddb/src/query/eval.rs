use crate::{
    query::predicate::{CompareOp, FieldComparison, Predicate},
    record::{FieldValue, RecordRead},
};
use std::cmp::Ordering;

/// Evaluate a predicate against one record.
#[must_use]
pub fn evaluate(predicate: &Predicate, record: &dyn RecordRead) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::False => false,
        Predicate::And(children) => children.iter().all(|child| evaluate(child, record)),
        Predicate::Or(children) => children.iter().any(|child| evaluate(child, record)),
        Predicate::Not(child) => !evaluate(child, record),
        Predicate::Compare(comparison) => evaluate_comparison(comparison, record),
    }
}

fn evaluate_comparison(comparison: &FieldComparison, record: &dyn RecordRead) -> bool {
    let value = comparison.field.read(record);

    // Null-ness checks see the raw value; everything else is false on null.
    match comparison.op {
        CompareOp::IsNil => return value.is_null(),
        CompareOp::IsNotNil => return !value.is_null(),
        _ if value.is_null() => return false,
        _ => {}
    }

    let literal = &comparison.value;
    match comparison.op {
        CompareOp::Eq => value.canonical_cmp(literal) == Ordering::Equal,
        CompareOp::Ne => value.canonical_cmp(literal) != Ordering::Equal,
        CompareOp::Lt => value.canonical_cmp(literal) == Ordering::Less,
        CompareOp::Le => value.canonical_cmp(literal) != Ordering::Greater,
        CompareOp::Gt => value.canonical_cmp(literal) == Ordering::Greater,
        CompareOp::Ge => value.canonical_cmp(literal) != Ordering::Less,
        CompareOp::Contains => contains(&value, literal),
        CompareOp::HasPrefix => affix(&value, literal, true),
        CompareOp::HasSuffix => affix(&value, literal, false),
        CompareOp::In => match literal {
            FieldValue::Array(members) => members
                .iter()
                .any(|member| value.canonical_cmp(member) == Ordering::Equal),
            _ => false,
        },
        CompareOp::IsNil | CompareOp::IsNotNil => unreachable!("handled above"),
    }
}

fn contains(value: &FieldValue, literal: &FieldValue) -> bool {
    match (value, literal) {
        (FieldValue::String(haystack), FieldValue::String(needle)) => haystack.contains(needle),
        (FieldValue::Array(items), needle) => items
            .iter()
            .any(|item| item.canonical_cmp(needle) == Ordering::Equal),
        (FieldValue::Bytes(haystack), FieldValue::Bytes(needle)) => {
            needle.is_empty() || haystack.windows(needle.len().max(1)).any(|w| w == needle)
        }
        _ => false,
    }
}

fn affix(value: &FieldValue, literal: &FieldValue, prefix: bool) -> bool {
    match (value, literal) {
        (FieldValue::String(text), FieldValue::String(probe)) => {
            if prefix {
                text.starts_with(probe)
            } else {
                text.ends_with(probe)
            }
        }
        (FieldValue::Bytes(bytes), FieldValue::Bytes(probe)) => {
            if prefix {
                bytes.starts_with(probe)
            } else {
                bytes.ends_with(probe)
            }
        }
        _ => false,
    }
}

///
/// TESTS
///
