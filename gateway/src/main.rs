//! Public SQL gateway.
//!
//! Entry point for clients:
//! - `/auth` is relayed to the identity provider
//! - `/sql` is signed and forwarded to the bastion
//! - CORS on every response, preflight on any path

mod proxy;
mod state;

use anyhow::Result;
use common::config::AppConfig;
use common::server::{http_router, serve};
use tower_http::compression::CompressionLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "gateway";
const DEFAULT_PORT: u16 = 8080;

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
    let app = http_router(state).layer(CompressionLayer::new());

    serve(&config, app).await
}
