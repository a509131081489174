//! SQL bastion service.
//!
//! Executes read-only SQL on behalf of the gateway:
//! - checks the second-hop signature
//! - classifies the statement and resolves database credentials
//! - runs it on a fresh Postgres connection

mod executor;
mod state;

use anyhow::Result;
use common::config::AppConfig;
use common::server::{http_router, serve};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "query-service";
const DEFAULT_PORT: u16 = 8082;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::load_with_service(SERVICE_NAME, DEFAULT_PORT)?;

    let state = state::build_state(&config).await?;
    serve(&config, http_router(state)).await
}
