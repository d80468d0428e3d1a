use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Row};
use std::time::Duration;
use tracing::info;

use super::{DeleteResult, DocumentStore, InsertResult, StoreError, UpdateResult, ID_KEY};
use crate::config::DatabaseConfig;
use crate::registry::Registry;
use crate::schema::{Document, ReadPlan};
use crate::types::{Operation, RecordId};

/// One table per collection: `id UUID`, the document as `doc JSONB`, and an insertion timestamp
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config.url.as_deref().ok_or(StoreError::ConfigMissing("DATABASE_URL"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await?;

        info!("Connected to document database at {}", redact(url));
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Connection string with the password removed, for logs
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}

/// Quote SQL identifier to prevent injection
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote SQL string literal
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn create_table_sql(collection: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
            id UUID PRIMARY KEY, \
            doc JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()\
        )",
        quote_identifier(collection)
    )
}

/// Compile a read plan into one SELECT producing a `record` JSONB column.
/// Each lookup is a LEFT JOIN on the id's text form, so malformed or dangling
/// references simply leave the details key out.
fn aggregate_sql(collection: &str, plan: &ReadPlan<'_>) -> String {
    let mut record = format!("t.doc || jsonb_build_object({}, t.id)", quote_literal(ID_KEY));
    let mut joins = String::new();

    for (i, lookup) in plan.lookups().iter().enumerate() {
        let alias = format!("j{}", i);
        record.push_str(&format!(
            " || CASE WHEN {a}.id IS NULL THEN '{{}}'::jsonb ELSE jsonb_build_object({as_field}, {a}.doc || jsonb_build_object({id}, {a}.id)) END",
            a = alias,
            as_field = quote_literal(&lookup.as_field),
            id = quote_literal(ID_KEY),
        ));
        joins.push_str(&format!(
            " LEFT JOIN {table} {a} ON {a}.id::text = t.doc ->> {local}",
            table = quote_identifier(&lookup.from),
            a = alias,
            local = quote_literal(&lookup.local_field),
        ));
    }

    let filter = if plan.id.is_some() { " WHERE t.id = $1" } else { "" };

    format!(
        "SELECT {} AS record FROM {} t{}{} ORDER BY t.created_at, t.id",
        record,
        quote_identifier(collection),
        joins,
        filter
    )
}

fn query_error(op: Operation, collection: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("42P01") => {
            StoreError::UnknownCollection(collection.to_string())
        }
        sqlx::Error::Database(db) => StoreError::Query {
            op,
            collection: collection.to_string(),
            message: db.message().to_string(),
        },
        other => StoreError::Sqlx(other),
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn prepare(&self, registry: &Registry) -> Result<(), StoreError> {
        for collection in registry.iter() {
            sqlx::query(&create_table_sql(&collection.name))
                .execute(&self.pool)
                .await?;
            info!("Collection table ready: {}", collection.name);
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, document: &Document) -> Result<InsertResult, StoreError> {
        let id = RecordId::new();
        let sql = format!("INSERT INTO {} (id, doc) VALUES ($1, $2)", quote_identifier(collection));

        sqlx::query(&sql)
            .bind(id.0)
            .bind(Json(document.to_json()))
            .execute(&self.pool)
            .await
            .map_err(|e| query_error(Operation::Create, collection, e))?;

        Ok(InsertResult { acknowledged: true, inserted_id: id })
    }

    async fn update(&self, collection: &str, id: RecordId, document: &Document) -> Result<UpdateResult, StoreError> {
        let table = quote_identifier(collection);
        let sql = format!(
            "WITH old AS (SELECT id, doc FROM {table} WHERE id = $1 FOR UPDATE) \
             UPDATE {table} AS t SET doc = old.doc || $2::jsonb FROM old WHERE t.id = old.id \
             RETURNING (old.doc IS DISTINCT FROM t.doc) AS modified",
            table = table
        );

        let row = sqlx::query(&sql)
            .bind(id.0)
            .bind(Json(document.to_json()))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error(Operation::Update, collection, e))?;

        let (matched, modified) = match row {
            Some(row) => (1, u64::from(row.try_get::<bool, _>("modified")?)),
            None => (0, 0),
        };
        Ok(UpdateResult {
            acknowledged: true,
            matched_count: matched,
            modified_count: modified,
        })
    }

    async fn delete(&self, collection: &str, id: RecordId) -> Result<DeleteResult, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", quote_identifier(collection));
        let result = sqlx::query(&sql)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error(Operation::Delete, collection, e))?;

        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: result.rows_affected(),
        })
    }

    async fn aggregate(&self, collection: &str, plan: ReadPlan<'_>) -> Result<Vec<Map<String, Value>>, StoreError> {
        let sql = aggregate_sql(collection, &plan);
        let mut query = sqlx::query(&sql);
        if let Some(id) = plan.id {
            query = query.bind(id.0);
        }

        let rows: Vec<sqlx::postgres::PgRow> = query
            .fetch(&self.pool)
            .try_collect()
            .await
            .map_err(|e| query_error(Operation::Select, collection, e))?;

        rows.iter()
            .map(|row| {
                let Json(record) = row.try_get::<Json<Map<String, Value>>, _>("record")?;
                Ok(record)
            })
            .collect()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
