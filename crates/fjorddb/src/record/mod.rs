//! Record model: typed entities, field values, the record codec, field-level
//! security, and polymorphic type codes.

mod codec;
mod entity;
mod poly;
pub mod security;
mod value;

pub use codec::{RecordCodec, SerializeError};
pub use entity::{FieldKind, FieldModel, RecordKind, RecordModel, RecordRead};
pub use poly::{StoredRecord, type_code, type_code_for_name};
pub use security::{AccessLevel, AuthContext, FieldAccessModel, SecurityError};
pub use value::FieldValue;
