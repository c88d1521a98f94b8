use crate::tuple::TupleElement;
use std::cmp::Ordering;

///
/// FieldValue
///
/// The value a record field presents to predicates, sorts, and index key
/// expressions. The variant order below is the canonical cross-variant
/// rank and must not be reordered:
///
/// `Null < Bool < Int < Double < String < Bytes < Array`
///

#[derive(Clone, Debug)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Double(_) => 3,
            Self::String(_) => 4,
            Self::Bytes(_) => 5,
            Self::Array(_) => 6,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Total canonical comparator used by predicate evaluation, sorting,
    /// and min/max index semantics. Mixed-variant comparisons are rank-only.
    #[must_use]
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        let rank = self.rank().cmp(&other.rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    let cmp = left.canonical_cmp(right);
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => Ordering::Equal,
        }
    }

    /// Recover a field value from its tuple-key representation. Key-only
    /// element kinds fold into the nearest value variant.
    #[must_use]
    pub fn from_tuple_element(element: &TupleElement) -> Self {
        match element {
            TupleElement::Null => Self::Null,
            TupleElement::Bool(v) => Self::Bool(*v),
            TupleElement::Int(v) => Self::Int(*v),
            TupleElement::Double(v) => Self::Double(*v),
            TupleElement::String(v) => Self::String(v.clone()),
            TupleElement::Bytes(v) => Self::Bytes(v.clone()),
            TupleElement::Nested(items) => {
                Self::Array(items.iter().map(Self::from_tuple_element).collect())
            }
            TupleElement::Uuid(v) => Self::Bytes(v.to_vec()),
            TupleElement::Timestamp(v) => Self::Int(*v),
            TupleElement::Versionstamp(v) => Self::Bytes(v.to_vec()),
        }
    }

    /// Tuple-key representation, used by index key expressions.
    #[must_use]
    pub fn to_tuple_element(&self) -> TupleElement {
        match self {
            Self::Null => TupleElement::Null,
            Self::Bool(v) => TupleElement::Bool(*v),
            Self::Int(v) => TupleElement::Int(*v),
            Self::Double(v) => TupleElement::Double(*v),
            Self::String(v) => TupleElement::String(v.clone()),
            Self::Bytes(v) => TupleElement::Bytes(v.clone()),
            Self::Array(items) => {
                TupleElement::Nested(items.iter().map(Self::to_tuple_element).collect())
            }
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            #[expect(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldValue {}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical_cmp(other)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::FieldValue;
    use proptest::prelude::*;
    use std::cmp::Ordering;

    fn arb_value() -> impl Strategy<Value = FieldValue> {
        let leaf = prop_oneof![
            Just(FieldValue::Null),
            any::<bool>().prop_map(FieldValue::Bool),
            any::<i64>().prop_map(FieldValue::Int),
            any::<f64>().prop_map(FieldValue::Double),
            ".{0,12}".prop_map(FieldValue::String),
            proptest::collection::vec(any::<u8>(), 0..12).prop_map(FieldValue::Bytes),
        ];
        leaf.prop_recursive(2, 16, 4, |inner| {
            proptest::collection::vec(inner, 0..4).prop_map(FieldValue::Array)
        })
    }

    #[test]
    fn cross_variant_rank_is_fixed() {
        let ordered = [
            FieldValue::Null,
            FieldValue::Bool(true),
            FieldValue::Int(i64::MIN),
            FieldValue::Double(f64::NEG_INFINITY),
            FieldValue::String(String::new()),
            FieldValue::Bytes(vec![]),
            FieldValue::Array(vec![]),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(pair[0].canonical_cmp(&pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn nan_is_ordered_not_poisonous() {
        let nan = FieldValue::Double(f64::NAN);
        assert_eq!(nan.canonical_cmp(&nan), Ordering::Equal);
        assert_eq!(
            FieldValue::Double(1.0).canonical_cmp(&nan),
            Ordering::Less
        );
    }

    proptest! {
        #[test]
        fn prop_total_order(a in arb_value(), b in arb_value(), c in arb_value()) {
            // Antisymmetry
            prop_assert_eq!(a.canonical_cmp(&b), b.canonical_cmp(&a).reverse());
            // Transitivity over a sorted triple
            let mut sorted = vec![a, b, c];
            sorted.sort();
            prop_assert!(sorted[0].canonical_cmp(&sorted[2]) != Ordering::Greater);
        }

        #[test]
        fn prop_eq_agrees_with_cmp(a in arb_value(), b in arb_value()) {
            prop_assert_eq!(a == b, a.canonical_cmp(&b) == Ordering::Equal);
        }
    }
}
