// handlers/records.rs - generic record handlers shared by every collection
//
// Each collection gets its own copy of these routes at startup, bound to a
// CollectionContext holding the descriptor, its validation schema and its join
// pipeline, so nothing is re-derived per request.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::registry::CollectionDescriptor;
use crate::schema::{Document, JoinPipeline, ShapeError, ValidationSchema};
use crate::search::RecordFilter;
use crate::store::{DeleteResult, DocumentStore, InsertResult, UpdateResult};
use crate::types::{Operation, RecordId};

#[derive(Clone)]
pub struct CollectionContext {
    pub descriptor: Arc<CollectionDescriptor>,
    pub schema: Arc<ValidationSchema>,
    pub pipeline: Arc<JoinPipeline>,
    pub store: Arc<dyn DocumentStore>,
}

impl CollectionContext {
    pub fn new(descriptor: Arc<CollectionDescriptor>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            schema: Arc::new(ValidationSchema::for_collection(&descriptor)),
            pipeline: Arc::new(JoinPipeline::for_collection(&descriptor)),
            descriptor,
            store,
        }
    }

    fn name(&self) -> &str {
        &self.descriptor.name
    }
}

fn parse_id(raw: &str) -> Result<RecordId, ApiError> {
    RecordId::parse(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid record id: {}", raw)))
}

fn body_object(body: &Value) -> Result<&Map<String, Value>, ApiError> {
    body.as_object().ok_or_else(|| ShapeError::NotAnObject.into())
}

/// GET /<collection> - all records with joins resolved, optionally filtered by search fields
pub async fn list(
    State(ctx): State<CollectionContext>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<Map<String, Value>>> {
    let records = ctx.store.aggregate(ctx.name(), ctx.pipeline.list()).await?;

    let filter = RecordFilter::from_params(&ctx.descriptor, &ctx.pipeline, &params);
    Ok(ApiResponse::success(filter.apply(records)))
}

/// GET /<collection>/:id - one record with joins resolved
pub async fn fetch(
    State(ctx): State<CollectionContext>,
    Path(id): Path<String>,
) -> ApiResult<Map<String, Value>> {
    let id = parse_id(&id)?;
    let record = ctx
        .store
        .aggregate(ctx.name(), ctx.pipeline.single(id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("Not found"))?;

    Ok(ApiResponse::success(record))
}

/// POST /<collection> - validate, shape and insert a new record
pub async fn create(
    State(ctx): State<CollectionContext>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<InsertResult> {
    let Json(body) = body?;
    let input = body_object(&body)?;
    ctx.schema.validate(input, Operation::Create)?;
    let document = Document::shape_map(input, &ctx.descriptor)?;

    let result = ctx.store.insert(ctx.name(), &document).await?;
    tracing::info!("{} created {} in {}", user.email, result.inserted_id, ctx.name());
    Ok(ApiResponse::created(result))
}

/// PATCH /<collection>/:id - validate the present keys and merge them into the record
pub async fn update(
    State(ctx): State<CollectionContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<UpdateResult> {
    let id = parse_id(&id)?;
    let Json(body) = body?;
    let input = body_object(&body)?;
    ctx.schema.validate(input, Operation::Update)?;
    let document = Document::shape_map(input, &ctx.descriptor)?;

    let result = ctx.store.update(ctx.name(), id, &document).await?;
    tracing::info!(
        "{} updated {} in {} (matched {}, modified {})",
        user.email,
        id,
        ctx.name(),
        result.matched_count,
        result.modified_count
    );
    Ok(ApiResponse::success(result))
}

/// DELETE /<collection>/:id - remove the record permanently
pub async fn remove(
    State(ctx): State<CollectionContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<DeleteResult> {
    let id = parse_id(&id)?;
    let result = ctx.store.delete(ctx.name(), id).await?;
    tracing::info!("{} deleted {} from {} ({} removed)", user.email, id, ctx.name(), result.deleted_count);
    Ok(ApiResponse::success(result))
}
