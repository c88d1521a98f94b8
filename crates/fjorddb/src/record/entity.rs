use crate::{
    index::IndexDescriptor,
    record::{FieldAccessModel, FieldValue},
    tuple::Tuple,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt::Debug;

///
/// RecordRead
///
/// Reflection-free field access. Implementations are generated by hand per
/// entity: a match from field name to value. Dotted names walk nested
/// records through `nested_record`.
///

pub trait RecordRead: Send + Sync {
    /// Resolve one field value by name; unknown fields yield `Null`.
    fn field_value(&self, name: &str) -> FieldValue;

    /// Nested record for dotted-path traversal; default is flat.
    fn nested_record(&self, _name: &str) -> Option<&dyn RecordRead> {
        None
    }

    /// Resolve a possibly-dotted path (`"address.city"`).
    fn read_path(&self, path: &str) -> FieldValue {
        match path.split_once('.') {
            None => self.field_value(path),
            Some((head, tail)) => self
                .nested_record(head)
                .map_or(FieldValue::Null, |nested| nested.read_path(tail)),
        }
    }
}

///
/// RecordKind
///
/// The full static contract of a registered entity type: identity, layout,
/// indexes, and security metadata, plus the hand-generated accessors the
/// engine consumes instead of runtime reflection.
///

pub trait RecordKind:
    Clone
    + Debug
    + Default
    + PartialEq
    + Serialize
    + DeserializeOwned
    + RecordRead
    + Send
    + Sync
    + 'static
{
    /// Stable external name used in keys, routing, and diagnostics.
    const RECORD_NAME: &'static str;

    /// Directory path under which all physical keys of this type live.
    const DIRECTORY: &'static [&'static str];

    /// Optional shared polymorphic directory for supertype-style dual-write.
    const POLY_DIRECTORY: Option<&'static [&'static str]> = None;

    /// Ordered field list; authoritative for planning and security.
    const FIELDS: &'static [FieldModel];

    /// Index definitions; names are unique within the type.
    const INDEXES: &'static [IndexDescriptor];

    /// Per-field access rules; empty means unrestricted.
    const SECURITY: &'static [FieldAccessModel] = &[];

    /// Primary identifier as an ordered tuple.
    fn primary_key(&self) -> Tuple;

    /// Reset one field to its default value; used by read masking.
    fn reset_field(&mut self, name: &str);
}

///
/// FieldModel
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldModel {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldModel {
    #[must_use]
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

///
/// FieldKind
///
/// Minimal runtime type surface needed by planning and validation; aligned
/// with `FieldValue` variants and intentionally lossy.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FieldKind {
    Bool,
    Int,
    Double,
    Text,
    Bytes,
    Array,
    Nested,
}

///
/// RecordModel
///
/// Owned runtime descriptor captured at registration time. This is what the
/// schema registry holds and what the ontology blob persists; it survives
/// round-trips independently of the compiled-in statics.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RecordModel {
    pub name: String,
    pub directory: Vec<String>,
    pub poly_directory: Option<Vec<String>>,
    pub fields: Vec<(String, FieldKind)>,
    pub index_names: Vec<String>,
}

impl RecordModel {
    #[must_use]
    pub fn of<R: RecordKind>() -> Self {
        Self {
            name: R::RECORD_NAME.to_string(),
            directory: R::DIRECTORY.iter().map(ToString::to_string).collect(),
            poly_directory: R::POLY_DIRECTORY
                .map(|path| path.iter().map(ToString::to_string).collect()),
            fields: R::FIELDS
                .iter()
                .map(|f| (f.name.to_string(), f.kind))
                .collect(),
            index_names: R::INDEXES.iter().map(|i| i.name.to_string()).collect(),
        }
    }

    /// Whether the declared polymorphic directory requires a mirror write.
    /// Equal paths collapse to a single write.
    #[must_use]
    pub fn needs_dual_write(&self) -> bool {
        self.poly_directory
            .as_ref()
            .is_some_and(|poly| *poly != self.directory)
    }
}

///
/// TESTS
///
