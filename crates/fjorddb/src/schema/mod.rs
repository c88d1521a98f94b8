//! Schema registry: process-level catalogue of registered record types and
//! persistence of the ontology blob for drift diagnostics.

use crate::{
    kv::{KvError, KvTransaction, Subspace},
    record::{RecordCodec, RecordKind, RecordModel, SerializeError, type_code},
    tuple::{Tuple, TupleElement},
};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

const ONTOLOGY_KEY: &str = "ontology";

///
/// SchemaError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SchemaError {
    #[error("record type '{name}' already registered with a different shape")]
    Conflict { name: String },

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    Kv(#[from] KvError),
}

///
/// RegisteredType
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegisteredType {
    pub model: RecordModel,
    pub type_code: i64,
}

///
/// SchemaRegistry
///
/// Global, registration-time catalogue. Registration is idempotent for an
/// identical shape and fails on a conflicting re-registration. Cyclic
/// entity references resolve through this registry by name; values never
/// embed a type graph.
///

#[derive(Default)]
pub struct SchemaRegistry {
    types: RwLock<BTreeMap<String, RegisteredType>>,
}

static GLOBAL: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::default);

impl SchemaRegistry {
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    pub fn register<R: RecordKind>(&self) -> Result<(), SchemaError> {
        let model = RecordModel::of::<R>();
        let mut types = self.types.write();
        if let Some(existing) = types.get(R::RECORD_NAME) {
            if existing.model == model {
                return Ok(());
            }
            return Err(SchemaError::Conflict {
                name: R::RECORD_NAME.to_string(),
            });
        }
        types.insert(
            R::RECORD_NAME.to_string(),
            RegisteredType {
                model,
                type_code: type_code::<R>(),
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn model(&self, name: &str) -> Option<RecordModel> {
        self.types.read().get(name).map(|t| t.model.clone())
    }

    #[must_use]
    pub fn by_type_code(&self, code: i64) -> Option<RegisteredType> {
        self.types
            .read()
            .values()
            .find(|t| t.type_code == code)
            .cloned()
    }

    /// Registered types mirroring into the given polymorphic directory.
    #[must_use]
    pub fn conformers_of(&self, poly_path: &[&str]) -> Vec<RegisteredType> {
        let path: Vec<String> = poly_path.iter().map(ToString::to_string).collect();
        self.types
            .read()
            .values()
            .filter(|t| t.model.poly_directory.as_ref() == Some(&path))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<RecordModel> {
        self.types.read().values().map(|t| t.model.clone()).collect()
    }

    /// Persist the registered ontology as one CBOR blob under
    /// `metadata/ontology` of the given subspace.
    pub fn persist_ontology(
        &self,
        txn: &dyn KvTransaction,
        metadata: &Subspace,
    ) -> Result<(), SchemaError> {
        let blob = RecordCodec::encode(&self.snapshot())?;
        txn.set(&ontology_key(metadata), &blob);
        Ok(())
    }

    /// Load a previously persisted ontology blob, if any.
    pub async fn load_ontology(
        txn: &dyn KvTransaction,
        metadata: &Subspace,
    ) -> Result<Option<Vec<RecordModel>>, SchemaError> {
        match txn.get(&ontology_key(metadata), false).await? {
            None => Ok(None),
            Some(bytes) => Ok(Some(RecordCodec::decode(&bytes)?)),
        }
    }
}

fn ontology_key(metadata: &Subspace) -> Vec<u8> {
    metadata.pack(&Tuple::new(vec![TupleElement::String(
        ONTOLOGY_KEY.to_string(),
    )]))
}

///
/// TESTS
///
