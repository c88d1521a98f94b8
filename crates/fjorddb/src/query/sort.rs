use crate::{query::predicate::FieldAccessor, record::RecordRead};
use std::cmp::Ordering;

///
/// SortOrder
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

///
/// SortDescriptor
///
/// Total ordering over one field accessor; a descending descriptor flips
/// the ascending result, so flipping twice is the identity.
///

#[derive(Clone, Debug, PartialEq)]
pub struct SortDescriptor {
    pub field: FieldAccessor,
    pub order: SortOrder,
}

impl SortDescriptor {
    #[must_use]
    pub fn ascending(field: FieldAccessor) -> Self {
        Self {
            field,
            order: SortOrder::Ascending,
        }
    }

    #[must_use]
    pub fn descending(field: FieldAccessor) -> Self {
        Self {
            field,
            order: SortOrder::Descending,
        }
    }

    #[must_use]
    pub fn compare(&self, a: &dyn RecordRead, b: &dyn RecordRead) -> Ordering {
        let ordering = self.field.read(a).canonical_cmp(&self.field.read(b));
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// Lexicographic comparison across multiple descriptors.
#[must_use]
pub fn compare_all(descriptors: &[SortDescriptor], a: &dyn RecordRead, b: &dyn RecordRead) -> Ordering {
    for descriptor in descriptors {
        let ordering = descriptor.compare(a, b);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable in-place sort by the descriptor chain.
pub fn sort_records<R: RecordRead>(records: &mut [R], descriptors: &[SortDescriptor]) {
    if descriptors.is_empty() {
        return;
    }
    records.sort_by(|a, b| compare_all(descriptors, a, b));
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{SortDescriptor, sort_records};
    use crate::{
        query::predicate::field,
        record::{FieldValue, RecordRead},
    };
    use std::cmp::Ordering;

    struct Row(i64, &'static str);

    impl RecordRead for Row {
        fn field_value(&self, name: &str) -> FieldValue {
            match name {
                "rank" => FieldValue::Int(self.0),
                "name" => FieldValue::String(self.1.into()),
                _ => FieldValue::Null,
            }
        }
    }

    #[test]
    fn descending_is_an_involution() {
        let asc = SortDescriptor::ascending(field("rank"));
        let desc = SortDescriptor::descending(field("rank"));
        let (a, b) = (Row(1, "a"), Row(2, "b"));

        assert_eq!(asc.compare(&a, &b), Ordering::Less);
        assert_eq!(desc.compare(&a, &b), Ordering::Greater);
        assert_eq!(desc.compare(&a, &b), asc.compare(&a, &b).reverse());
    }

    #[test]
    fn multi_descriptor_sort_is_lexicographic() {
        let mut rows = vec![Row(2, "b"), Row(1, "z"), Row(1, "a"), Row(2, "a")];
        sort_records(
            &mut rows,
            &[
                SortDescriptor::ascending(field("rank")),
                SortDescriptor::descending(field("name")),
            ],
        );

        let shape: Vec<(i64, &str)> = rows.iter().map(|r| (r.0, r.1)).collect();
        assert_eq!(shape, vec![(1, "z"), (1, "a"), (2, "b"), (2, "a")]);
    }
}
