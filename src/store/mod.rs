//! Document persistence behind a trait so the record handlers never see the backend.
//!
//! Records are free-form JSON objects keyed by a store-assigned [`RecordId`]. Reads go
//! through a [`ReadPlan`] so each backend resolves join lookups the way it does best.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::registry::Registry;
use crate::schema::{Document, ReadPlan};
use crate::types::{Operation, RecordId};

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

/// Key under which a record's identifier is exposed
pub const ID_KEY: &str = "_id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("{op} on '{collection}' failed: {message}")]
    Query {
        op: Operation,
        collection: String,
        message: String,
    },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertResult {
    pub acknowledged: bool,
    pub inserted_id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub acknowledged: bool,
    pub deleted_count: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Make sure every registry collection can be read and written
    async fn prepare(&self, registry: &Registry) -> Result<(), StoreError>;

    async fn insert(&self, collection: &str, document: &Document) -> Result<InsertResult, StoreError>;

    /// Merge `document` into the stored record (keys not in `document` are kept)
    async fn update(&self, collection: &str, id: RecordId, document: &Document) -> Result<UpdateResult, StoreError>;

    async fn delete(&self, collection: &str, id: RecordId) -> Result<DeleteResult, StoreError>;

    /// Execute a read plan; records come back with `_id` and any resolved `<field>Details`
    async fn aggregate(&self, collection: &str, plan: ReadPlan<'_>) -> Result<Vec<Map<String, Value>>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
