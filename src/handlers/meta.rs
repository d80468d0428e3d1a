// handlers/meta.rs - service description, health, and the registry as JSON

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::middleware::{ApiResponse, ApiResult};
use crate::registry::Registry;
use crate::store::DocumentStore;

/// GET / - service description
pub async fn root(State(registry): State<Arc<Registry>>) -> Json<Value> {
    let collections: Vec<&str> = registry.iter().map(|c| c.name.as_str()).collect();

    Json(json!({
        "name": "formbase-api",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "home": "/ (public)",
            "health": "/health (public)",
            "auth": "/auth/request-otp, /auth/verify-otp (public), /auth/whoami (protected)",
            "meta": "/meta/collections (protected)",
            "records": "/:collection[/:id] (protected)",
        },
        "collections": collections,
    }))
}

/// GET /health - store connectivity
pub async fn health(State(store): State<Arc<dyn DocumentStore>>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "timestamp": now, "database": "ok" })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "timestamp": now, "database": "unavailable" })),
            )
        }
    }
}

/// GET /meta/collections - field descriptors and search fields for every collection
pub async fn collections(State(registry): State<Arc<Registry>>) -> ApiResult<Value> {
    let collections: Vec<Value> = registry
        .iter()
        .map(|c| serde_json::to_value(c.as_ref()))
        .collect::<Result<_, _>>()
        .map_err(|e| {
            tracing::error!("Failed to serialize registry: {}", e);
            crate::error::ApiError::internal_server_error("Failed to describe collections")
        })?;

    Ok(ApiResponse::success(Value::Array(collections)))
}
