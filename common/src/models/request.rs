//! Inbound request representation, independent of the HTTP server.

use std::collections::BTreeMap;

use axum::http::Method;
use uuid::Uuid;

/// A request as seen by the router and the signer.
///
/// Header names are stored lower-cased, which is also the form SigV4
/// canonicalizes them to.
#[derive(Debug, Clone)]
pub struct ForwardedRequest {
    pub method: Method,
    /// Path, optionally followed by `?query`.
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// Value of the `Origin` header, if any.
    pub origin: Option<String>,
}

impl ForwardedRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            body: Vec::new(),
            origin: None,
        }
    }

    /// Adds a header. Setting `origin` also records the request origin.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if name == "origin" {
            self.origin = Some(value.clone());
        }
        self.headers.insert(name, value);
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Path without the query string.
    pub fn route_path(&self) -> &str {
        self.path.split('?').next().unwrap_or_default()
    }

    /// Query string without the leading `?`, empty when absent.
    pub fn query(&self) -> &str {
        self.path.split_once('?').map(|(_, q)| q).unwrap_or_default()
    }
}

/// Request-scoped context carried through a single invocation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub origin: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, origin: Option<String>) -> Self {
        Self {
            request_id: request_id.into(),
            origin,
        }
    }

    /// Context for a request, reusing its `x-request-id` header when present.
    pub fn for_request(request: &ForwardedRequest) -> Self {
        let request_id = request
            .header("x-request-id")
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self::new(request_id, request.origin.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_lowercased_and_origin_recorded() {
        let req = ForwardedRequest::new(Method::POST, "/sql?x=1")
            .with_header("Origin", "https://app.example.com")
            .with_header("Content-Type", "application/json");
        assert_eq!(req.origin.as_deref(), Some("https://app.example.com"));
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.route_path(), "/sql");
        assert_eq!(req.query(), "x=1");
    }

    #[test]
    fn test_context_reuses_request_id() {
        let req = ForwardedRequest::new(Method::GET, "/").with_header("X-Request-Id", "abc");
        assert_eq!(RequestContext::for_request(&req).request_id, "abc");
        let fresh = RequestContext::for_request(&ForwardedRequest::new(Method::GET, "/"));
        assert_eq!(fresh.request_id.len(), 36);
    }
}
