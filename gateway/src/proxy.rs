//! Signed second hop to the bastion service.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::errors::{AppError, AppResult};
use common::models::{ForwardedRequest, RequestContext, SqlRequest};
use common::query::SqlBackend;
use common::response::GatewayResponse;
use common::signing::{CredentialSource, RequestSigner, ServiceScope};
use reqwest::Url;
use tracing::{debug, info, warn};

/// Forwards `/sql` to `{bastion}/sql`, signed with SigV4.
pub struct BastionForwarder {
    sql_url: Url,
    host: String,
    scope: ServiceScope,
    credentials: Arc<dyn CredentialSource>,
    http_client: reqwest::Client,
}

impl BastionForwarder {
    /// Credentials are fetched from `credentials` for every request; when the
    /// source has none the request fails with `CredentialsUnavailable`.
    pub fn new(
        bastion_url: &str,
        scope: ServiceScope,
        credentials: Arc<dyn CredentialSource>,
        http_client: reqwest::Client,
    ) -> AppResult<Self> {
        let sql_url = Url::parse(&format!("{}/sql", bastion_url.trim_end_matches('/')))
            .map_err(|e| AppError::Internal(format!("invalid bastion URL: {}", e)))?;
        let host = match (sql_url.host_str(), sql_url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(AppError::Internal("bastion URL has no host".into())),
        };

        Ok(Self {
            sql_url,
            host,
            scope,
            credentials,
            http_client,
        })
    }

    /// Builds and signs the outgoing request.
    async fn signed_request(
        &self,
        request: &SqlRequest,
        ctx: &RequestContext,
    ) -> AppResult<ForwardedRequest> {
        let signer = RequestSigner::new(self.credentials.credentials().await?);

        let body = serde_json::to_vec(request)
            .map_err(|e| AppError::Internal(format!("failed to encode request: {}", e)))?;
        let mut outgoing = ForwardedRequest::new(Method::POST, self.sql_url.path())
            .with_header("host", self.host.clone())
            .with_header("content-type", "application/json")
            .with_header("x-request-id", ctx.request_id.clone())
            .with_body(body);

        let signed = signer.sign(&outgoing, &self.scope, Utc::now())?;
        signed.apply_to(&mut outgoing);
        Ok(outgoing)
    }
}

#[async_trait]
impl SqlBackend for BastionForwarder {
    async fn run(&self, request: SqlRequest, ctx: &RequestContext) -> AppResult<GatewayResponse> {
        let outgoing = self.signed_request(&request, ctx).await?;
        debug!(request_id = %ctx.request_id, url = %self.sql_url, "forwarding to bastion");

        let mut builder = self.http_client.post(self.sql_url.clone());
        for (name, value) in &outgoing.headers {
            // reqwest derives host from the URL.
            if name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        let response = builder.body(outgoing.body).send().await.map_err(|e| {
            warn!(request_id = %ctx.request_id, error = %e, "bastion unreachable");
            AppError::Upstream(format!("Error invoking bastion: {}", e))
        })?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| AppError::Upstream(format!("invalid bastion status: {}", e)))?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Upstream(format!("failed to read bastion response: {}", e)))?;

        info!(request_id = %ctx.request_id, status = status.as_u16(), "bastion responded");
        Ok(GatewayResponse::new(status, body).with_header("content-type", content_type))
    }
}
