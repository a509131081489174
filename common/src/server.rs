//! axum adapter around [`GatewayRouter`].
//!
//! Everything except `GET /api/health` falls through to the router, which
//! owns route matching, preflight handling and CORS. The health response is
//! passed through the router's CORS policy as well.

use axum::{
    body::Body,
    extract::State,
    http::{header::ORIGIN, HeaderMap, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Limited};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::middleware::request_id_middleware;
use crate::models::ForwardedRequest;
use crate::response::GatewayResponse;
use crate::router::GatewayRouter;

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// State shared by the HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub service_name: String,
    pub router: GatewayRouter,
}

/// Builds the axum application.
pub fn http_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .method_not_allowed_fallback(dispatch)
        .fallback(dispatch)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `host:port` from the configuration and serves `app`.
pub async fn serve(config: &AppConfig, app: Router) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(service = %config.service_name, address = %addr, "starting service");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn dispatch(State(state): State<HttpState>, req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let mut request = ForwardedRequest::new(parts.method, path);
    for (name, value) in parts.headers.iter() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let merged = match request.header(name.as_str()) {
            Some(existing) => format!("{},{}", existing, value),
            None => value.to_string(),
        };
        request.insert_header(name.as_str(), merged);
    }

    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => {
            let request = request.with_body(collected.to_bytes().to_vec());
            state.router.handle(request).await.into_response()
        }
        Err(e) => state
            .router
            .reject(
                AppError::Validation(format!("Unreadable request body: {}", e)),
                request.origin.as_deref(),
            )
            .into_response(),
    }
}

/// Liveness check.
async fn health_check(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let health = HealthResponse {
        status: "healthy".to_string(),
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    };
    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    state
        .router
        .apply_cors(GatewayResponse::json(StatusCode::OK, &health), origin)
        .into_response()
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}
