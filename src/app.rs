// app.rs - application assembly: shared state, per-collection routes, and global layers

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{LogMailer, Mailer, OtpService, SystemClock, TokenIssuer, UserDirectory, WebhookMailer};
use crate::config::{AppConfig, Environment, StoreKind};
use crate::handlers::{auth, meta, records, CollectionContext};
use crate::middleware::jwt_auth_middleware;
use crate::registry::Registry;
use crate::store::{DocumentStore, MemoryDocumentStore, PgDocumentStore};

/// Everything the router needs, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub store: Arc<dyn DocumentStore>,
    pub otp: Arc<OtpService>,
}

impl AppState {
    pub fn new(registry: Registry, store: Arc<dyn DocumentStore>, otp: OtpService) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            otp: Arc::new(otp),
        }
    }

    /// Connect the configured store, create its collections, and wire the OTP gate
    pub async fn from_config(config: &AppConfig, registry: Registry) -> anyhow::Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.server.store {
            StoreKind::Memory => {
                tracing::warn!("Using the in-memory store; records are lost on restart");
                Arc::new(MemoryDocumentStore::new())
            }
            StoreKind::Postgres => Arc::new(
                PgDocumentStore::connect(&config.database)
                    .await
                    .context("failed to connect to the document store")?,
            ),
        };
        store
            .prepare(&registry)
            .await
            .context("failed to prepare collections")?;

        let mailer: Arc<dyn Mailer> = match &config.mail.webhook_url {
            Some(url) => Arc::new(WebhookMailer::new(url).context("invalid MAIL_WEBHOOK_URL")?),
            None => {
                tracing::warn!("No mail relay configured; OTP codes are written to the log");
                Arc::new(LogMailer)
            }
        };

        let directory = UserDirectory::new(&config.security.allowed_users);
        if directory.is_empty() {
            tracing::warn!("AUTH_USERS is empty; nobody can log in");
        }

        let tokens = TokenIssuer::new(&config.security.jwt_secret, config.security.token_ttl_secs)?;
        let otp = OtpService::new(
            directory,
            mailer,
            tokens,
            Arc::new(SystemClock),
            config.security.otp_ttl_secs,
            &config.mail,
        )?;

        Ok(Self::new(registry, store, otp))
    }
}

/// Full router: public auth and health routes, bearer-protected records and metadata
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    let tokens = Arc::new(state.otp.tokens().clone());

    let public = Router::new()
        .merge(
            Router::new()
                .route("/", get(meta::root))
                .with_state(state.registry.clone()),
        )
        .merge(
            Router::new()
                .route("/health", get(meta::health))
                .with_state(state.store.clone()),
        )
        .merge(
            Router::new()
                .route("/auth/request-otp", post(auth::request_otp))
                .route("/auth/verify-otp", post(auth::verify_otp))
                .with_state(state.otp.clone()),
        );

    let mut protected = Router::new()
        .route("/auth/whoami", get(auth::whoami))
        .merge(
            Router::new()
                .route("/meta/collections", get(meta::collections))
                .with_state(state.registry.clone()),
        );

    for descriptor in state.registry.iter() {
        protected = protected.merge(collection_routes(CollectionContext::new(
            descriptor.clone(),
            state.store.clone(),
        )));
    }

    // route_layer keeps unmatched paths at 404 instead of 401
    let protected = protected.route_layer(from_fn_with_state(tokens, jwt_auth_middleware));

    public.merge(protected).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}

/// CRUD routes for one collection, bound to its prebuilt context
fn collection_routes(ctx: CollectionContext) -> Router {
    let base = format!("/{}", ctx.descriptor.name);
    tracing::debug!("Mounting collection routes at {}", base);

    Router::new()
        .route(&base, get(records::list).post(records::create))
        .route(&format!("{}/", base), get(records::list).post(records::create))
        .route(
            &format!("{}/:id", base),
            get(records::fetch).patch(records::update).delete(records::remove),
        )
        .with_state(ctx)
}

/// CORS policy: anything goes in development, the configured origins elsewhere
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    if !config.security.enable_cors {
        return CorsLayer::new();
    }
    if config.environment == Environment::Development {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    /// `access-control-allow-origin` returned for a simple GET from `origin`
    async fn allowed_origin(config: &AppConfig, origin: &str) -> Option<String> {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(config));
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn development_cors_allows_any_origin() {
        let config = AppConfig::development();
        assert_eq!(allowed_origin(&config, "https://anywhere.test").await.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn production_cors_allows_only_listed_origins() {
        let mut config = AppConfig::development();
        config.environment = Environment::Production;
        config.security.cors_origins = vec!["https://app.example.com".to_string(), "bad\norigin".to_string()];

        assert_eq!(
            allowed_origin(&config, "https://app.example.com").await.as_deref(),
            Some("https://app.example.com")
        );
        assert_eq!(allowed_origin(&config, "https://evil.example.com").await, None);
    }

    #[tokio::test]
    async fn disabled_cors_sends_no_allow_origin() {
        let mut config = AppConfig::development();
        config.security.enable_cors = false;
        assert_eq!(allowed_origin(&config, "https://app.example.com").await, None);
    }

    #[tokio::test]
    async fn from_config_builds_memory_state() {
        let mut config = AppConfig::development();
        config.security.allowed_users = vec!["Admin@Example.com".to_string()];
        let registry = Registry::from_yaml_str(
            "collections:\n  - name: notes\n    fields:\n      - { label: Title, key: title, type: text, required: true }\n",
        )
        .unwrap();

        let state = AppState::from_config(&config, registry).await.unwrap();
        assert_eq!(state.registry.len(), 1);
        assert!(state.store.health_check().await.is_ok());
        assert_eq!(state.otp.pending(), 0);
    }

    #[tokio::test]
    async fn from_config_refuses_out_of_range_otp_ttl() {
        let mut config = AppConfig::development();
        config.security.otp_ttl_secs = u64::MAX;
        let registry = Registry::from_yaml_str(
            "collections:\n  - name: notes\n    fields:\n      - { label: Title, key: title, type: text }\n",
        )
        .unwrap();

        assert!(AppState::from_config(&config, registry).await.is_err());
    }
}
