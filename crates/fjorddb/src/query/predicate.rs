//! Predicate AST.
//!
//! Pure representation of query predicates; no schema validation, index
//! logic, or execution semantics here. Interpretation happens in later
//! passes (planning, evaluation).

use crate::record::{FieldValue, RecordRead};
use std::{fmt, sync::Arc};

/// Fast-path reader attached to a typed accessor.
pub type FieldReaderFn = Arc<dyn Fn(&dyn RecordRead) -> FieldValue + Send + Sync>;

///
/// FieldAccessor
///
/// Either a typed accessor with an attached closure (fast path) or a bare
/// field name resolved through the record's `FieldReader` (fallback path).
/// Both paths must agree on every input.
///

#[derive(Clone)]
pub struct FieldAccessor {
    name: String,
    reader: Option<FieldReaderFn>,
}

impl FieldAccessor {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reader: None,
        }
    }

    #[must_use]
    pub fn typed(name: impl Into<String>, reader: FieldReaderFn) -> Self {
        Self {
            name: name.into(),
            reader: Some(reader),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_fast_path(&self) -> bool {
        self.reader.is_some()
    }

    /// Read the field: closure when attached, name walk otherwise. Dotted
    /// names descend nested records; unknown fields yield `Null`.
    #[must_use]
    pub fn read(&self, record: &dyn RecordRead) -> FieldValue {
        match &self.reader {
            Some(reader) => reader(record),
            None => record.read_path(&self.name),
        }
    }

    // ── Comparison builders ──────────────────────────────────────────

    #[must_use]
    pub fn eq(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Eq, value.into())
    }

    #[must_use]
    pub fn ne(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Ne, value.into())
    }

    #[must_use]
    pub fn lt(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Lt, value.into())
    }

    #[must_use]
    pub fn le(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Le, value.into())
    }

    #[must_use]
    pub fn gt(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Gt, value.into())
    }

    #[must_use]
    pub fn ge(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Ge, value.into())
    }

    #[must_use]
    pub fn contains(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Contains, value.into())
    }

    #[must_use]
    pub fn has_prefix(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::HasPrefix, value.into())
    }

    #[must_use]
    pub fn has_suffix(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::HasSuffix, value.into())
    }

    #[must_use]
    pub fn is_in(self, values: Vec<FieldValue>) -> Predicate {
        self.compare(CompareOp::In, FieldValue::Array(values))
    }

    #[must_use]
    pub fn is_nil(self) -> Predicate {
        self.compare(CompareOp::IsNil, FieldValue::Null)
    }

    #[must_use]
    pub fn is_not_nil(self) -> Predicate {
        self.compare(CompareOp::IsNotNil, FieldValue::Null)
    }

    fn compare(self, op: CompareOp, value: FieldValue) -> Predicate {
        Predicate::Compare(FieldComparison {
            field: self,
            op,
            value,
        })
    }
}

impl fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("name", &self.name)
            .field("fast_path", &self.reader.is_some())
            .finish()
    }
}

impl PartialEq for FieldAccessor {
    fn eq(&self, other: &Self) -> bool {
        // Accessor identity is the field name; the closure is an
        // implementation detail of the same logical accessor.
        self.name == other.name
    }
}

/// Shorthand for a fallback-path accessor.
#[must_use]
pub fn field(name: impl Into<String>) -> FieldAccessor {
    FieldAccessor::named(name)
}

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    HasPrefix,
    HasSuffix,
    In,
    IsNil,
    IsNotNil,
}

///
/// FieldComparison
///

#[derive(Clone, Debug, PartialEq)]
pub struct FieldComparison {
    pub field: FieldAccessor,
    pub op: CompareOp,
    pub value: FieldValue,
}

///
/// Predicate
///

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare(FieldComparison),
}

impl Predicate {
    #[must_use]
    pub fn and(predicates: Vec<Self>) -> Self {
        Self::And(predicates)
    }

    #[must_use]
    pub fn or(predicates: Vec<Self>) -> Self {
        Self::Or(predicates)
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}
