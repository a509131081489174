use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::models::ForwardedRequest;

use super::credentials::CredentialSource;
use super::error::SigningError;
use super::signer::{canonical_request, signing_key, string_to_sign};
use super::{
    AwsCredentials, CredentialScope, ServiceScope, ALGORITHM, AMZ_DATE_FORMAT, AMZ_DATE_HEADER,
};

type HmacSha256 = Hmac<Sha256>;

/// Default tolerated clock skew between signer and verifier.
pub const DEFAULT_MAX_SKEW_SECS: i64 = 300;

/// Parsed `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub access_key_id: String,
    pub scope: CredentialScope,
    pub signed_headers: Vec<String>,
    pub signature: String,
}

impl Authorization {
    pub fn parse(value: &str) -> Result<Self, SigningError> {
        let malformed = |msg: &str| SigningError::MalformedAuthorization(msg.to_string());

        let rest = value
            .trim()
            .strip_prefix(ALGORITHM)
            .ok_or_else(|| malformed("unsupported algorithm"))?;

        let mut credential = None;
        let mut signed_headers = None;
        let mut signature = None;
        for part in rest.split(',') {
            match part.trim().split_once('=') {
                Some(("Credential", v)) => credential = Some(v),
                Some(("SignedHeaders", v)) => signed_headers = Some(v),
                Some(("Signature", v)) => signature = Some(v),
                _ => return Err(malformed("unexpected component")),
            }
        }

        let credential = credential.ok_or_else(|| malformed("missing Credential"))?;
        let (access_key_id, scope) = credential
            .split_once('/')
            .ok_or_else(|| malformed("invalid Credential"))?;
        let scope = CredentialScope::parse(scope).ok_or_else(|| malformed("invalid scope"))?;

        Ok(Self {
            access_key_id: access_key_id.to_string(),
            scope,
            signed_headers: signed_headers
                .ok_or_else(|| malformed("missing SignedHeaders"))?
                .split(';')
                .map(str::to_string)
                .collect(),
            signature: signature
                .ok_or_else(|| malformed("missing Signature"))?
                .to_string(),
        })
    }
}

/// Recomputes and checks SigV4 signatures for one [`ServiceScope`].
#[derive(Clone)]
pub struct SignatureVerifier {
    credentials: Arc<dyn CredentialSource>,
    scope: ServiceScope,
    max_skew: Duration,
}

impl SignatureVerifier {
    pub fn new(credentials: Arc<dyn CredentialSource>, scope: ServiceScope) -> Self {
        Self {
            credentials,
            scope,
            max_skew: Duration::seconds(DEFAULT_MAX_SKEW_SECS),
        }
    }

    /// Checks `request` against its `Authorization` header at time `now`.
    ///
    /// The expected key pair is fetched from the credential source on every
    /// call.
    pub async fn verify(
        &self,
        request: &ForwardedRequest,
        now: DateTime<Utc>,
    ) -> Result<(), SigningError> {
        let header = request
            .header("authorization")
            .ok_or_else(|| SigningError::MissingHeader("authorization".into()))?;
        let auth = Authorization::parse(header)?;
        let credentials = self.credentials.credentials().await?;
        self.check(request, &auth, &credentials, now)
    }

    fn check(
        &self,
        request: &ForwardedRequest,
        auth: &Authorization,
        credentials: &AwsCredentials,
        now: DateTime<Utc>,
    ) -> Result<(), SigningError> {
        if auth.access_key_id != credentials.access_key_id {
            return Err(SigningError::ScopeMismatch("unknown access key".into()));
        }
        if auth.scope.region != self.scope.region || auth.scope.service != self.scope.service {
            return Err(SigningError::ScopeMismatch(format!(
                "expected {}/{}, got {}/{}",
                self.scope.region, self.scope.service, auth.scope.region, auth.scope.service
            )));
        }

        let amz_date = request
            .header(AMZ_DATE_HEADER)
            .ok_or_else(|| SigningError::MissingHeader(AMZ_DATE_HEADER.into()))?;
        let signed_at = NaiveDateTime::parse_from_str(amz_date, AMZ_DATE_FORMAT)
            .map_err(|_| SigningError::MalformedAuthorization("invalid x-amz-date".into()))?
            .and_utc();
        if !amz_date.starts_with(&auth.scope.date) {
            return Err(SigningError::ScopeMismatch(
                "scope date differs from x-amz-date".into(),
            ));
        }
        if (now - signed_at).abs() > self.max_skew {
            return Err(SigningError::Expired);
        }

        if !auth.signed_headers.iter().any(|h| h == "host")
            || !auth.signed_headers.iter().any(|h| h == AMZ_DATE_HEADER)
        {
            return Err(SigningError::MalformedAuthorization(
                "host and x-amz-date must be signed".into(),
            ));
        }
        let mut headers = BTreeMap::new();
        for name in &auth.signed_headers {
            let value = request
                .header(name)
                .ok_or_else(|| SigningError::MissingHeader(name.clone()))?;
            headers.insert(name.clone(), value.to_string());
        }

        let (canonical, _) = canonical_request(request, &headers);
        let expected = hex::decode(&auth.signature)
            .map_err(|_| SigningError::MalformedAuthorization("signature is not hex".into()))?;

        let key = signing_key(credentials.secret(), &auth.scope)?;
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
        mac.update(string_to_sign(&auth.scope, amz_date, &canonical).as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| SigningError::SignatureMismatch)?;

        debug!(scope = %auth.scope, "request signature verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::{RequestSigner, StaticCredentials};
    use axum::http::Method;
    use chrono::TimeZone;

    fn credentials() -> AwsCredentials {
        AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", None)
    }

    fn lambda_verifier() -> SignatureVerifier {
        SignatureVerifier::new(
            Arc::new(StaticCredentials::new(credentials())),
            lambda_scope(),
        )
    }

    fn lambda_scope() -> ServiceScope {
        ServiceScope::new("us-east-1", "lambda")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn signed_request(scope: &ServiceScope) -> ForwardedRequest {
        let mut request = ForwardedRequest::new(Method::POST, "/sql")
            .with_header("host", "bastion.internal")
            .with_header("content-type", "application/json")
            .with_body(br#"{"sql":"SELECT 1"}"#.to_vec());
        RequestSigner::new(credentials())
            .sign(&request, scope, now())
            .unwrap()
            .apply_to(&mut request);
        request
    }

    #[tokio::test]
    async fn test_round_trip() {
        let verifier = lambda_verifier();
        assert!(verifier.verify(&signed_request(&lambda_scope()), now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unsigned_headers_added_in_transit_are_ignored() {
        let verifier = lambda_verifier();
        let request = signed_request(&lambda_scope())
            .with_header("user-agent", "reqwest")
            .with_header("x-forwarded-for", "10.0.0.1");
        assert!(verifier.verify(&request, now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_tampered_body_is_rejected() {
        let verifier = lambda_verifier();
        let request = signed_request(&lambda_scope())
            .with_body(br#"{"sql":"SELECT * FROM users"}"#.to_vec());
        assert!(matches!(
            verifier.verify(&request, now()).await,
            Err(SigningError::SignatureMismatch)
        ));
    }

    #[tokio::test]
    async fn test_other_hop_scope_is_rejected() {
        let verifier = lambda_verifier();
        let request = signed_request(&ServiceScope::new("us-east-1", "execute-api"));
        assert!(matches!(
            verifier.verify(&request, now()).await,
            Err(SigningError::ScopeMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_stale_signature_is_rejected() {
        let verifier = lambda_verifier();
        let later = now() + Duration::minutes(10);
        assert!(matches!(
            verifier.verify(&signed_request(&lambda_scope()), later).await,
            Err(SigningError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_missing_authorization() {
        let verifier = lambda_verifier();
        let request = ForwardedRequest::new(Method::POST, "/sql").with_header("host", "h");
        assert!(matches!(
            verifier.verify(&request, now()).await,
            Err(SigningError::MissingHeader(_))
        ));
    }

    #[test]
    fn test_parse_authorization() {
        let auth = Authorization::parse(
            "AWS4-HMAC-SHA256 Credential=AKID/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, Signature=abcd",
        )
        .unwrap();
        assert_eq!(auth.access_key_id, "AKID");
        assert_eq!(auth.scope.service, "service");
        assert_eq!(auth.signed_headers, vec!["host", "x-amz-date"]);
        assert!(Authorization::parse("Bearer token").is_err());
    }
}
