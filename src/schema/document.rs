use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::registry::CollectionDescriptor;
use crate::types::RecordId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("Expected a JSON object")]
    NotAnObject,

    #[error("Invalid reference for '{field}': {value}")]
    InvalidReference { field: String, value: String },
}

/// A persisted value: either passed through as given or a typed foreign reference
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Reference(Option<RecordId>),
    Plain(Value),
}

/// Persistence-ready document restricted to the collection's declared keys
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, FieldValue>,
}

impl Document {
    /// Shape a request body. Used for both creates and partial updates.
    pub fn shape(body: &Value, collection: &CollectionDescriptor) -> Result<Self, ShapeError> {
        let input = body.as_object().ok_or(ShapeError::NotAnObject)?;
        Self::shape_map(input, collection)
    }

    pub fn shape_map(input: &Map<String, Value>, collection: &CollectionDescriptor) -> Result<Self, ShapeError> {
        let mut fields = BTreeMap::new();

        for field in &collection.fields {
            let Some(value) = input.get(&field.key) else {
                continue;
            };

            let shaped = if field.is_join() {
                FieldValue::Reference(to_reference(&field.key, value)?)
            } else {
                FieldValue::Plain(value.clone())
            };
            fields.insert(field.key.clone(), shaped);
        }

        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Stored JSON form; references become their canonical id string
    pub fn to_json(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(key, value)| {
                let json = match value {
                    FieldValue::Reference(Some(id)) => Value::String(id.to_string()),
                    FieldValue::Reference(None) => Value::Null,
                    FieldValue::Plain(v) => v.clone(),
                };
                (key.clone(), json)
            })
            .collect()
    }
}

fn to_reference(field: &str, value: &Value) -> Result<Option<RecordId>, ShapeError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => RecordId::parse(s).map(Some).ok_or_else(|| ShapeError::InvalidReference {
            field: field.to_string(),
            value: s.clone(),
        }),
        other => Err(ShapeError::InvalidReference {
            field: field.to_string(),
            value: other.to_string(),
        }),
    }
}
