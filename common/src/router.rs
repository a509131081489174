//! The single entry point for every request.
//!
//! `Received -> {Preflight | Dispatched} -> Responded`. Every outcome,
//! including failures, passes through [`CorsPolicy::apply`] before it is
//! returned.

use std::sync::Arc;

use axum::http::Method;
use chrono::Utc;

use crate::auth::AuthForwarder;
use crate::errors::{AppError, AppResult};
use crate::models::{AuthRequest, ForwardedRequest, RequestContext, SqlRequest};
use crate::query::SqlBackend;
use crate::response::{CorsPolicy, GatewayResponse};
use crate::signing::SignatureVerifier;

/// The closed set of routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Preflight,
    Auth,
    Sql,
    NotFound,
}

impl Route {
    /// Any OPTIONS is a preflight; otherwise the exact path decides.
    pub fn resolve(method: &Method, path: &str) -> Self {
        if *method == Method::OPTIONS {
            return Route::Preflight;
        }
        let path = path.split('?').next().unwrap_or_default();
        match path.strip_prefix('/').unwrap_or(path) {
            "auth" => Route::Auth,
            "sql" => Route::Sql,
            _ => Route::NotFound,
        }
    }
}

#[derive(Clone)]
pub struct GatewayRouter {
    auth: AuthForwarder,
    sql: Arc<dyn SqlBackend>,
    cors: CorsPolicy,
    verifier: Option<SignatureVerifier>,
}

impl GatewayRouter {
    pub fn new(auth: AuthForwarder, sql: Arc<dyn SqlBackend>) -> Self {
        Self {
            auth,
            sql,
            cors: CorsPolicy::default(),
            verifier: None,
        }
    }

    /// Requires a valid SigV4 signature on every non-preflight request.
    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Handles one request end to end.
    pub async fn handle(&self, request: ForwardedRequest) -> GatewayResponse {
        let ctx = RequestContext::for_request(&request);
        let route = Route::resolve(&request.method, request.route_path());
        tracing::info!(
            request_id = %ctx.request_id,
            method = %request.method,
            path = %request.path,
            route = ?route,
            origin = ctx.origin.as_deref().unwrap_or(""),
            "request received"
        );

        let response = match self.dispatch(route, request, &ctx).await {
            Ok(response) => response,
            Err(err) => {
                let status = err.status_code();
                if status.is_server_error() {
                    tracing::error!(
                        request_id = %ctx.request_id,
                        code = err.code(),
                        error = %err,
                        "request failed"
                    );
                } else {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        code = err.code(),
                        error = %err,
                        "request rejected"
                    );
                }
                err.into_gateway_response()
            }
        };

        tracing::info!(
            request_id = %ctx.request_id,
            status = response.status.as_u16(),
            "request completed"
        );
        self.apply_cors(response, ctx.origin.as_deref())
    }

    async fn dispatch(
        &self,
        route: Route,
        request: ForwardedRequest,
        ctx: &RequestContext,
    ) -> AppResult<GatewayResponse> {
        match route {
            Route::Preflight => Ok(GatewayResponse::empty()),
            Route::Auth => {
                self.check_signature(&request).await?;
                let credentials = AuthRequest::from_body(&request.body)?;
                self.auth.forward(&credentials).await
            }
            Route::Sql => {
                self.check_signature(&request).await?;
                let sql = SqlRequest::from_body(&request.body)?;
                self.sql.run(sql, ctx).await
            }
            Route::NotFound => Err(AppError::NotFound),
        }
    }

    /// Adds the CORS headers. Responses produced outside [`Self::handle`]
    /// go through here too.
    pub fn apply_cors(&self, response: GatewayResponse, origin: Option<&str>) -> GatewayResponse {
        self.cors.apply(response, origin)
    }

    /// Error response for failures that happen before a request could be
    /// built, e.g. an unreadable body.
    pub fn reject(&self, err: AppError, origin: Option<&str>) -> GatewayResponse {
        tracing::warn!(code = err.code(), error = %err, "request rejected before dispatch");
        self.apply_cors(err.into_gateway_response(), origin)
    }

    async fn check_signature(&self, request: &ForwardedRequest) -> AppResult<()> {
        match &self.verifier {
            Some(verifier) => Ok(verifier.verify(request, Utc::now()).await?),
            None => Ok(()),
        }
    }
}
