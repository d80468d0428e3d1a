//! Collection registry: the declarative description of every collection the API serves.
//!
//! The registry is read once at startup from a YAML file and validated as a whole, so
//! handlers can rely on unique keys, existing search fields and resolvable join targets.

pub mod field;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use field::{FieldDescriptor, FieldKind, ForeignRef};

use field::RawField;

/// Route segments owned by the API itself
const RESERVED_NAMES: &[&str] = &["auth", "health", "meta"];

static COLLECTION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("collection name pattern"));

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read registry file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse registry: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Registry defines no collections")]
    Empty,

    #[error("Invalid collection name '{0}' (expected lowercase letters, digits and underscores)")]
    InvalidName(String),

    #[error("Collection name '{0}' is reserved")]
    ReservedName(String),

    #[error("Duplicate collection '{0}'")]
    DuplicateCollection(String),

    #[error("Collection '{0}' has no fields")]
    NoFields(String),

    #[error("Duplicate field '{key}' in collection '{collection}'")]
    DuplicateField { collection: String, key: String },

    #[error("Invalid field '{key}' in collection '{collection}': {reason}")]
    InvalidField {
        collection: String,
        key: String,
        reason: String,
    },

    #[error("Search field '{key}' is not a field of collection '{collection}'")]
    UnknownSearchField { collection: String, key: String },

    #[error("Join field '{key}' in collection '{collection}' points to {target}: {reason}")]
    DanglingJoin {
        collection: String,
        key: String,
        target: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub search_fields: Vec<String>,
}

impl CollectionDescriptor {
    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn join_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_join())
    }
}

#[derive(Debug, Deserialize)]
struct RawRegistry {
    collections: Vec<RawCollection>,
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    name: String,
    fields: Vec<RawField>,
    #[serde(default)]
    search_fields: Vec<String>,
}

/// Immutable, validated set of collections in declaration order
#[derive(Debug, Clone)]
pub struct Registry {
    collections: Vec<Arc<CollectionDescriptor>>,
}

impl Registry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, RegistryError> {
        let raw: RawRegistry = serde_yaml::from_str(text)?;
        let collections = raw
            .collections
            .into_iter()
            .map(|c| {
                let fields = c
                    .fields
                    .into_iter()
                    .map(|f| f.into_descriptor(&c.name))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CollectionDescriptor {
                    name: c.name,
                    fields,
                    search_fields: c.search_fields,
                })
            })
            .collect::<Result<Vec<_>, RegistryError>>()?;
        Self::new(collections)
    }

    pub fn new(collections: Vec<CollectionDescriptor>) -> Result<Self, RegistryError> {
        if collections.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut names = HashSet::new();
        for collection in &collections {
            if !COLLECTION_NAME.is_match(&collection.name) {
                return Err(RegistryError::InvalidName(collection.name.clone()));
            }
            if RESERVED_NAMES.contains(&collection.name.as_str()) {
                return Err(RegistryError::ReservedName(collection.name.clone()));
            }
            if !names.insert(collection.name.as_str()) {
                return Err(RegistryError::DuplicateCollection(collection.name.clone()));
            }
            Self::check_fields(collection)?;
        }

        // Joins are checked once every collection is known
        for collection in &collections {
            for field in collection.join_fields() {
                let Some(target) = field.kind.foreign_ref() else {
                    continue;
                };
                let dangling = |reason: &str| RegistryError::DanglingJoin {
                    collection: collection.name.clone(),
                    key: field.key.clone(),
                    target: format!("{};{}", target.collection, target.display_key),
                    reason: reason.to_string(),
                };
                let foreign = collections
                    .iter()
                    .find(|c| c.name == target.collection)
                    .ok_or_else(|| dangling("unknown collection"))?;
                if foreign.field(&target.display_key).is_none() {
                    return Err(dangling("display key is not a field of that collection"));
                }
            }
        }

        Ok(Self {
            collections: collections.into_iter().map(Arc::new).collect(),
        })
    }

    fn check_fields(collection: &CollectionDescriptor) -> Result<(), RegistryError> {
        if collection.fields.is_empty() {
            return Err(RegistryError::NoFields(collection.name.clone()));
        }

        let mut keys = HashSet::new();
        for field in &collection.fields {
            if !keys.insert(field.key.as_str()) {
                return Err(RegistryError::DuplicateField {
                    collection: collection.name.clone(),
                    key: field.key.clone(),
                });
            }
        }

        // Reads add `_id` and `<key>Details`; a declared field must not shadow either
        let invalid = |key: &str, reason: String| RegistryError::InvalidField {
            collection: collection.name.clone(),
            key: key.to_string(),
            reason,
        };
        if keys.contains(crate::store::ID_KEY) {
            return Err(invalid(crate::store::ID_KEY, "the record id key is reserved".to_string()));
        }
        for field in collection.join_fields() {
            let details = field.details_key();
            if keys.contains(details.as_str()) {
                return Err(invalid(&details, format!("reserved for the resolved '{}' join", field.key)));
            }
        }

        for key in &collection.search_fields {
            if !keys.contains(key.as_str()) {
                return Err(RegistryError::UnknownSearchField {
                    collection: collection.name.clone(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CollectionDescriptor>> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CollectionDescriptor>> {
        self.collections.iter()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
