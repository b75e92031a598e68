//! # redb-backed Model Store
//!
//! A catalogue of component models using the redb embedded database.
//!
//! Every stored model is one record:
//! - key: the model URI (`drock://component_model/{DOMAIN}/{name}/{version}`)
//! - value: postcard-encoded [`ModelRecord`] holding the identity and the
//!   single-version basic-model document
//!
//! Storing a document rather than the entity graph keeps the store
//! independent of registry handles: loading a model re-imports it, and
//! the parts it references are loaded from the same store on demand.

use crate::formats::{export_basic_model, import_basic_model};
use crate::{Domain, EntityId, ModelSource, PartsmithError, Registry};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Table for models: uri -> serialized ModelRecord bytes
const MODELS: TableDefinition<&str, &[u8]> = TableDefinition::new("models");

/// One stored model version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub name: String,
    pub domain: Domain,
    pub version: String,
    /// Basic-model JSON document.
    pub document: String,
}

/// Identity of a stored model, as listed by [`ModelStore::find`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub uri: String,
    pub name: String,
    pub domain: Domain,
    pub version: String,
}

/// A disk-backed model catalogue.
pub struct ModelStore {
    db: Database,
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore").finish_non_exhaustive()
    }
}

impl ModelStore {
    /// Open or create a model store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PartsmithError> {
        let db = Database::create(path.as_ref()).map_err(|e| PartsmithError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| PartsmithError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(MODELS)
                .map_err(|e| PartsmithError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        }
        info!(path = %path.as_ref().display(), "model store opened");
        Ok(Self { db })
    }

    /// Export `model` from `registry` and store it under its URI,
    /// replacing an earlier record.
    pub fn put(&mut self, registry: &Registry, model: EntityId) -> Result<String, PartsmithError> {
        let uri = registry.uri(model)?;
        let props = &registry.component_model(model)?.props;
        let record = ModelRecord {
            name: props.name.clone(),
            domain: props.domain,
            version: props.version.clone(),
            document: export_basic_model(registry, model)?.to_json()?,
        };
        let bytes = postcard::to_allocvec(&record)
            .map_err(|e| PartsmithError::SerializationError(e.to_string()))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(MODELS)
                .map_err(|e| PartsmithError::IoError(e.to_string()))?;
            table
                .insert(uri.as_str(), bytes.as_slice())
                .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        info!(uri = %uri, "model stored");
        Ok(uri)
    }

    pub fn get(&self, uri: &str) -> Result<Option<ModelRecord>, PartsmithError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(MODELS)
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        let Some(data) = table
            .get(uri)
            .map_err(|e| PartsmithError::IoError(e.to_string()))?
        else {
            return Ok(None);
        };
        let record = postcard::from_bytes(data.value())
            .map_err(|e| PartsmithError::DeserializationError(e.to_string()))?;
        Ok(Some(record))
    }

    /// The stored basic-model document of `uri`.
    pub fn get_document(&self, uri: &str) -> Result<Option<String>, PartsmithError> {
        Ok(self.get(uri)?.map(|record| record.document))
    }

    /// Stored models matching the given name and domain, in URI order.
    pub fn find(&self, name: Option<&str>, domain: Option<Domain>) -> Result<Vec<ModelSummary>, PartsmithError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(MODELS)
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;

        let mut found = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| PartsmithError::IoError(e.to_string()))?
        {
            let (key, value) = entry.map_err(|e| PartsmithError::IoError(e.to_string()))?;
            let record: ModelRecord = postcard::from_bytes(value.value())
                .map_err(|e| PartsmithError::DeserializationError(e.to_string()))?;
            if name.is_some_and(|n| n != record.name) || domain.is_some_and(|d| d != record.domain) {
                continue;
            }
            found.push(ModelSummary {
                uri: key.value().to_string(),
                name: record.name,
                domain: record.domain,
                version: record.version,
            });
        }
        Ok(found)
    }

    /// Delete the record of `uri`. Returns `false` if there was none.
    pub fn remove(&mut self, uri: &str) -> Result<bool, PartsmithError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        let removed = {
            let mut table = write_txn
                .open_table(MODELS)
                .map_err(|e| PartsmithError::IoError(e.to_string()))?;
            table
                .remove(uri)
                .map_err(|e| PartsmithError::IoError(e.to_string()))?
                .is_some()
        };
        write_txn
            .commit()
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        if removed {
            info!(uri = %uri, "model removed");
        }
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize, PartsmithError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(MODELS)
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        let count = table
            .len()
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, PartsmithError> {
        Ok(self.len()? == 0)
    }
}

impl ModelSource for ModelStore {
    fn fetch(&self, uri: &str, into: &mut Registry) -> Result<Option<EntityId>, PartsmithError> {
        let Some(document) = self.get_document(uri)? else {
            return Ok(None);
        };
        debug!(uri = %uri, "loading model from store");
        import_basic_model(into, &document, Some(self))?;
        Ok(into.get_by_uri(uri))
    }
}

// =============================================================================
// TESTS
// =============================================================================
