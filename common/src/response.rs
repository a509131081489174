//! Response shape shared by every route.
//!
//! Every handler outcome, success or failure, funnels through
//! [`GatewayResponse`]; the router attaches CORS headers via [`CorsPolicy`]
//! as the last step before returning.

use std::collections::BTreeMap;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
pub const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
pub const ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";

/// Transport-independent response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl GatewayResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    /// 200 with an empty body.
    pub fn empty() -> Self {
        Self::new(StatusCode::OK, String::new())
    }

    /// Serializes `value` as the JSON body.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
        Self::new(status, body).with_header("Content-Type", "application/json")
    }

    /// `{"error": message}` body.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::json(status, &serde_json::json!({ "error": message.into() }))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parses the body as JSON.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        response
    }
}

/// CORS headers attached to every response.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    pub allow_methods: String,
    pub allow_headers: String,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allow_methods: "OPTIONS,POST,GET".to_string(),
            allow_headers:
                "authorization,content-type,x-amz-date,x-amz-security-token,x-request-id"
                    .to_string(),
        }
    }
}

impl CorsPolicy {
    /// Echoes `origin` back, or allows `*` when the request had none.
    pub fn apply(&self, mut response: GatewayResponse, origin: Option<&str>) -> GatewayResponse {
        let origin = origin.map(str::trim).filter(|o| !o.is_empty());
        response
            .headers
            .insert(ALLOW_ORIGIN.to_string(), origin.unwrap_or("*").to_string());
        response
            .headers
            .insert(ALLOW_METHODS.to_string(), self.allow_methods.clone());
        response
            .headers
            .insert(ALLOW_HEADERS.to_string(), self.allow_headers.clone());
        response
            .headers
            .insert(ALLOW_CREDENTIALS.to_string(), "true".to_string());
        if origin.is_some() {
            response.headers.insert("Vary".to_string(), "Origin".to_string());
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_echoes_origin() {
        let response = CorsPolicy::default().apply(
            GatewayResponse::empty(),
            Some("https://app.example.com"),
        );
        assert_eq!(response.header(ALLOW_ORIGIN), Some("https://app.example.com"));
        assert_eq!(response.header(ALLOW_CREDENTIALS), Some("true"));
        assert_eq!(response.header("vary"), Some("Origin"));
    }

    #[test]
    fn test_cors_wildcard_without_origin() {
        let response = CorsPolicy::default().apply(GatewayResponse::empty(), Some("  "));
        assert_eq!(response.header(ALLOW_ORIGIN), Some("*"));
        assert!(response.header(ALLOW_METHODS).is_some());
        assert!(response.header(ALLOW_HEADERS).is_some());
        assert!(response.header("Vary").is_none());
    }

    #[test]
    fn test_error_body_shape() {
        let response = GatewayResponse::error(StatusCode::NOT_FOUND, "Not found");
        assert_eq!(response.body, r#"{"error":"Not found"}"#);
        assert_eq!(response.header("content-type"), Some("application/json"));
    }
}
