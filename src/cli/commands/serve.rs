use anyhow::{anyhow, Context};
use clap::Args;
use std::path::PathBuf;

use crate::app::{cors_layer, router, AppState};
use crate::config::{config, AppConfig, StoreKind};
use crate::registry::Registry;

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, help = "Port to listen on (overrides FORMBASE_PORT)")]
    pub port: Option<u16>,

    #[arg(long, help = "Collection registry file (overrides REGISTRY_PATH)")]
    pub registry: Option<PathBuf>,

    #[arg(long, help = "Document store: postgres or memory (overrides STORE_KIND)")]
    pub store: Option<String>,
}

impl ServeArgs {
    fn apply(self, mut config: AppConfig) -> anyhow::Result<AppConfig> {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = self.registry {
            config.server.registry_path = path;
        }
        if let Some(store) = self.store {
            config.server.store = store.parse::<StoreKind>().map_err(|e| anyhow!(e))?;
        }
        Ok(config)
    }
}

pub async fn handle(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.apply(config().clone())?;
    config.check().map_err(|e| anyhow!("invalid configuration: {}", e))?;
    tracing::info!("Starting formbase in {:?} mode", config.environment);

    let registry = Registry::load(&config.server.registry_path)?;
    tracing::info!(
        "Loaded {} collections from {}",
        registry.len(),
        config.server.registry_path.display()
    );

    let state = AppState::from_config(&config, registry).await?;
    let app = router(state, cors_layer(&config));

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
