//! Forwarding of login requests to the upstream identity provider.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::errors::{AppError, AppResult};
use crate::models::AuthRequest;
use crate::response::GatewayResponse;

const GENERIC_AUTH_FAILURE: &str = "Authentication failed";

/// Sends password-grant requests to `{base_url}/oauth/token`.
#[derive(Clone)]
pub struct AuthForwarder {
    token_url: String,
    http_client: reqwest::Client,
}

impl AuthForwarder {
    pub fn new(base_url: &str, http_client: reqwest::Client) -> Self {
        Self {
            token_url: format!("{}/oauth/token", base_url.trim_end_matches('/')),
            http_client,
        }
    }

    /// Builds a forwarder with its own client and timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::new(base_url, http_client))
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchanges credentials for a token.
    ///
    /// Success responses are relayed verbatim. Error statuses become
    /// [`AppError::UpstreamAuth`] carrying the upstream `error` field, or a
    /// generic message when there is none.
    pub async fn forward(&self, credentials: &AuthRequest) -> AppResult<GatewayResponse> {
        tracing::debug!(
            url = %self.token_url,
            username = %credentials.username,
            "forwarding login"
        );

        let response = self
            .http_client
            .post(&self.token_url)
            .json(&json!({
                "grant_type": "password",
                "username": credentials.username,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("identity provider unreachable: {}", e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.text().await.map_err(|e| {
            AppError::Upstream(format!(
                "failed to read identity provider response: {}",
                e
            ))
        })?;

        if status.as_u16() >= 400 {
            tracing::warn!(status = status.as_u16(), "identity provider rejected login");
            return Err(AppError::UpstreamAuth {
                status: status.as_u16(),
                message: upstream_error_message(&body),
            });
        }

        tracing::info!(status = status.as_u16(), "login forwarded");
        let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK);
        let reply = GatewayResponse::new(status, body);
        Ok(match content_type {
            Some(ct) => reply.with_header("Content-Type", ct),
            None => reply,
        })
    }
}

/// Extracts the `error` field of an upstream error body.
fn upstream_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error").map(|e| match e {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        })
        .unwrap_or_else(|| GENERIC_AUTH_FAILURE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn forwarder(server: &MockServer) -> AuthForwarder {
        AuthForwarder::with_timeout(&server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_success_is_relayed_verbatim() {
        let server = MockServer::start().await;
        let token = r#"{"access_token":"t","token_type":"Bearer","expires_in":7200}"#;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_json(json!({
                "grant_type": "password",
                "username": "ana",
                "password": "pw"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(token))
            .expect(1)
            .mount(&server)
            .await;

        let reply = forwarder(&server)
            .forward(&AuthRequest::new("ana", "pw"))
            .await
            .unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, token);
    }

    #[tokio::test]
    async fn test_error_field_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"error": "invalid_grant", "detail": "x"})),
            )
            .mount(&server)
            .await;

        let err = forwarder(&server)
            .forward(&AuthRequest::new("ana", "bad"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::UpstreamAuth { status: 401, ref message } if message == "invalid_grant"
        ));
    }

    #[tokio::test]
    async fn test_generic_message_without_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>down</html>"))
            .mount(&server)
            .await;

        let response = forwarder(&server)
            .forward(&AuthRequest::new("ana", "pw"))
            .await
            .unwrap_err()
            .into_gateway_response();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body, r#"{"error":"Authentication failed"}"#);
    }

    #[test]
    fn test_token_url() {
        let forwarder = AuthForwarder::new("https://idp.example.com/", reqwest::Client::new());
        assert_eq!(forwarder.token_url(), "https://idp.example.com/oauth/token");
    }
}
