use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{DeleteResult, DocumentStore, InsertResult, StoreError, UpdateResult, ID_KEY};
use crate::registry::Registry;
use crate::schema::{Document, ReadPlan};
use crate::types::RecordId;

type Collection = Vec<(RecordId, Map<String, Value>)>;

/// Process-local store; collections keep insertion order
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a raw document in place, bypassing validation and shaping
    pub async fn seed(&self, collection: &str, id: RecordId, doc: Map<String, Value>) {
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default().push((id, doc));
    }
}

fn with_id(id: RecordId, doc: &Map<String, Value>) -> Map<String, Value> {
    let mut out = doc.clone();
    out.insert(ID_KEY.to_string(), Value::String(id.to_string()));
    out
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn prepare(&self, registry: &Registry) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        for collection in registry.iter() {
            collections.entry(collection.name.clone()).or_default();
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, document: &Document) -> Result<InsertResult, StoreError> {
        let mut collections = self.collections.write().await;
        let records = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let id = RecordId::new();
        records.push((id, document.to_json()));
        Ok(InsertResult { acknowledged: true, inserted_id: id })
    }

    async fn update(&self, collection: &str, id: RecordId, document: &Document) -> Result<UpdateResult, StoreError> {
        let mut collections = self.collections.write().await;
        let records = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let Some((_, stored)) = records.iter_mut().find(|(rid, _)| *rid == id) else {
            return Ok(UpdateResult { acknowledged: true, matched_count: 0, modified_count: 0 });
        };

        let mut modified = false;
        for (key, value) in document.to_json() {
            if stored.get(&key) != Some(&value) {
                stored.insert(key, value);
                modified = true;
            }
        }
        Ok(UpdateResult {
            acknowledged: true,
            matched_count: 1,
            modified_count: u64::from(modified),
        })
    }

    async fn delete(&self, collection: &str, id: RecordId) -> Result<DeleteResult, StoreError> {
        let mut collections = self.collections.write().await;
        let records = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let before = records.len();
        records.retain(|(rid, _)| *rid != id);
        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: (before - records.len()) as u64,
        })
    }

    async fn aggregate(&self, collection: &str, plan: ReadPlan<'_>) -> Result<Vec<Map<String, Value>>, StoreError> {
        let collections = self.collections.read().await;
        let records = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let mut out = Vec::new();
        for (id, doc) in records.iter().filter(|(rid, _)| plan.id.map_or(true, |want| *rid == want)) {
            let mut record = with_id(*id, doc);

            for lookup in plan.lookups() {
                let Some(foreign_id) = lookup.local_id(doc) else {
                    continue;
                };
                let found = collections
                    .get(&lookup.from)
                    .and_then(|foreign| foreign.iter().find(|(rid, _)| *rid == foreign_id));
                if let Some((fid, fdoc)) = found {
                    record.insert(lookup.as_field.clone(), Value::Object(with_id(*fid, fdoc)));
                }
            }
            out.push(record);
        }
        Ok(out)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
