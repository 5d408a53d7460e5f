use std::sync::Arc;

use anyhow::Context;

use replenish_api::app::{AppServices, build_app};
use replenish_infra::ReplenishmentConfig;

const ENV_LISTEN: &str = "REPLENISH_LISTEN";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    replenish_observability::init();

    let config = ReplenishmentConfig::from_env().context("invalid replenishment configuration")?;
    let services = AppServices::from_config(config).context("failed to load warehouse snapshot")?;
    let app = build_app(Arc::new(services));

    let addr = std::env::var(ENV_LISTEN).unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
