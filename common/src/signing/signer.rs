use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::ForwardedRequest;

use super::error::SigningError;
use super::{
    AwsCredentials, CredentialScope, ServiceScope, ALGORITHM, AMZ_DATE_FORMAT, AMZ_DATE_HEADER,
    SECURITY_TOKEN_HEADER,
};

type HmacSha256 = Hmac<Sha256>;

/// Headers that transports add or rewrite in transit and are never signed.
const UNSIGNED_HEADERS: [&str; 6] = [
    "authorization",
    "connection",
    "content-length",
    "expect",
    "user-agent",
    "x-amzn-trace-id",
];

/// Headers produced by signing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub security_token: Option<String>,
    pub signature: String,
}

impl SignedHeaders {
    /// `(name, value)` pairs to put on the outgoing request.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("authorization", self.authorization.clone()),
            (AMZ_DATE_HEADER, self.amz_date.clone()),
        ];
        if let Some(token) = &self.security_token {
            pairs.push((SECURITY_TOKEN_HEADER, token.clone()));
        }
        pairs
    }

    pub fn apply_to(&self, request: &mut ForwardedRequest) {
        for (name, value) in self.pairs() {
            request.insert_header(name, value);
        }
    }
}

/// Stateless SigV4 signer.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: AwsCredentials,
}

impl RequestSigner {
    pub fn new(credentials: AwsCredentials) -> Self {
        Self { credentials }
    }

    /// Signs `request` for `scope` at time `at`.
    ///
    /// The request must already carry a `host` header. Output depends only on
    /// the inputs, so the receiver can recompute it.
    pub fn sign(
        &self,
        request: &ForwardedRequest,
        scope: &ServiceScope,
        at: DateTime<Utc>,
    ) -> Result<SignedHeaders, SigningError> {
        if request.header("host").is_none() {
            return Err(SigningError::MissingHeader("host".into()));
        }

        let amz_date = at.format(AMZ_DATE_FORMAT).to_string();
        let credential_scope = CredentialScope::new(at.format("%Y%m%d").to_string(), scope);

        let mut headers: BTreeMap<String, String> = request
            .headers
            .iter()
            .filter(|(name, _)| !UNSIGNED_HEADERS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        headers.insert(AMZ_DATE_HEADER.to_string(), amz_date.clone());
        if let Some(token) = &self.credentials.session_token {
            headers.insert(SECURITY_TOKEN_HEADER.to_string(), token.clone());
        }

        let (canonical, signed_headers) = canonical_request(request, &headers);
        let signature = compute_signature(
            self.credentials.secret(),
            &credential_scope,
            &amz_date,
            &canonical,
        )?;

        debug!(
            method = %request.method,
            path = %request.route_path(),
            scope = %credential_scope,
            signed_headers = %signed_headers,
            "signed request"
        );

        Ok(SignedHeaders {
            authorization: format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM,
                self.credentials.access_key_id,
                credential_scope,
                signed_headers,
                signature
            ),
            amz_date,
            security_token: self.credentials.session_token.clone(),
            signature,
        })
    }
}

/// Builds the canonical request over `headers` and returns it together with
/// the `SignedHeaders` list.
pub(crate) fn canonical_request(
    request: &ForwardedRequest,
    headers: &BTreeMap<String, String>,
) -> (String, String) {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, normalize_header_value(value)))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical = [
        request.method.as_str().to_string(),
        canonical_uri(request.route_path()),
        canonical_query(request.query()),
        canonical_headers,
        signed_headers.clone(),
        hex::encode(Sha256::digest(&request.body)),
    ]
    .join("\n");

    (canonical, signed_headers)
}

/// Derives the signing key and signs the string-to-sign.
pub(crate) fn compute_signature(
    secret: &str,
    scope: &CredentialScope,
    amz_date: &str,
    canonical_request: &str,
) -> Result<String, SigningError> {
    let key = signing_key(secret, scope)?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
    mac.update(string_to_sign(scope, amz_date, canonical_request).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub(crate) fn string_to_sign(
    scope: &CredentialScope,
    amz_date: &str,
    canonical_request: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    )
}

/// `kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`.
pub fn signing_key(secret: &str, scope: &CredentialScope) -> Result<Vec<u8>, SigningError> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), scope.date.as_bytes())?;
    let k_region = hmac(&k_date, scope.region.as_bytes())?;
    let k_service = hmac(&k_region, scope.service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|err| SigningError::InvalidKey(err.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let encoded = path
        .split('/')
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/");
    if encoded.starts_with('/') {
        encoded
    } else {
        format!("/{}", encoded)
    }
}

fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (uri_encode(key), uri_encode(value))
        })
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// RFC 3986 encoding; only unreserved characters pass through. Existing
/// `%XX` escapes are kept as-is.
fn uri_encode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let is_escape = b == b'%'
            && bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
            && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else if is_escape {
            out.push('%');
            out.push(bytes[i + 1].to_ascii_uppercase() as char);
            out.push(bytes[i + 2].to_ascii_uppercase() as char);
            i += 3;
            continue;
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use chrono::TimeZone;

    const EXAMPLE_SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn example_signer() -> RequestSigner {
        RequestSigner::new(AwsCredentials::new("AKIDEXAMPLE", EXAMPLE_SECRET, None))
    }

    fn example_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    #[test]
    fn test_signing_key_derivation() {
        let scope = CredentialScope::new("20120215", &ServiceScope::new("us-east-1", "iam"));
        let key = signing_key(EXAMPLE_SECRET, &scope).unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_get_vanilla_vector() {
        let request =
            ForwardedRequest::new(Method::GET, "/").with_header("Host", "example.amazonaws.com");
        let signed = example_signer()
            .sign(&request, &ServiceScope::new("us-east-1", "service"), example_time())
            .unwrap();
        assert_eq!(signed.amz_date, "20150830T123600Z");
        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn test_signature_is_deterministic() {
        let request = ForwardedRequest::new(Method::POST, "/sql")
            .with_header("host", "bastion.internal")
            .with_header("content-type", "application/json")
            .with_body(br#"{"sql":"SELECT 1"}"#.to_vec());
        let scope = ServiceScope::new("us-east-1", "lambda");
        let a = example_signer().sign(&request, &scope, example_time()).unwrap();
        let b = example_signer().sign(&request, &scope, example_time()).unwrap();
        assert_eq!(a, b);
        assert!(a.authorization.contains("SignedHeaders=content-type;host;x-amz-date"));
    }

    #[test]
    fn test_scopes_produce_different_signatures() {
        let request = ForwardedRequest::new(Method::POST, "/sql").with_header("host", "h");
        let lambda = example_signer()
            .sign(&request, &ServiceScope::new("us-east-1", "lambda"), example_time())
            .unwrap();
        let api = example_signer()
            .sign(&request, &ServiceScope::new("us-east-1", "execute-api"), example_time())
            .unwrap();
        assert_ne!(lambda.signature, api.signature);
    }

    #[test]
    fn test_body_changes_signature() {
        let scope = ServiceScope::new("us-east-1", "lambda");
        let base = ForwardedRequest::new(Method::POST, "/sql").with_header("host", "h");
        let a = example_signer()
            .sign(&base.clone().with_body(b"a".to_vec()), &scope, example_time())
            .unwrap();
        let b = example_signer()
            .sign(&base.with_body(b"b".to_vec()), &scope, example_time())
            .unwrap();
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn test_session_token_is_signed() {
        let signer = RequestSigner::new(AwsCredentials::new(
            "AKID",
            EXAMPLE_SECRET,
            Some("token".into()),
        ));
        let request = ForwardedRequest::new(Method::POST, "/sql").with_header("host", "h");
        let signed = signer
            .sign(&request, &ServiceScope::new("us-east-1", "lambda"), example_time())
            .unwrap();
        assert_eq!(signed.security_token.as_deref(), Some("token"));
        assert!(signed
            .authorization
            .contains("SignedHeaders=host;x-amz-date;x-amz-security-token"));
    }

    #[test]
    fn test_missing_host_is_error() {
        let request = ForwardedRequest::new(Method::POST, "/sql");
        let err = example_signer()
            .sign(&request, &ServiceScope::new("us-east-1", "lambda"), example_time())
            .unwrap_err();
        assert!(matches!(err, SigningError::MissingHeader(_)));
    }

    #[test]
    fn test_canonical_uri_and_query() {
        assert_eq!(canonical_uri(""), "/");
        assert_eq!(canonical_uri("/sql"), "/sql");
        assert_eq!(canonical_uri("/a b/c"), "/a%20b/c");
        assert_eq!(canonical_query("b=2&a=1&a=0"), "a=0&a=1&b=2");
        assert_eq!(uri_encode("a%2fb"), "a%2Fb");
    }
}
