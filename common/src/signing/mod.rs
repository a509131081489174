//! AWS SigV4 request signing.
//!
//! The same code signs two unrelated hops: external callers into the gateway
//! (scope `INBOUND_SIGNING_SERVICE`) and the gateway's own call into the
//! bastion (scope `BASTION_SIGNING_SERVICE`). Each hop gets its own
//! [`ServiceScope`]; a signature made for one never verifies for the other.

pub mod credentials;
pub mod error;
pub mod signer;
pub mod verifier;

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

pub use credentials::{CredentialSource, SdkCredentialSource, StaticCredentials};
pub use error::SigningError;
pub use signer::{RequestSigner, SignedHeaders};
pub use verifier::SignatureVerifier;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const AMZ_DATE_HEADER: &str = "x-amz-date";
pub const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Access key pair used to sign or verify.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    secret_access_key: SecretString,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::new(secret_access_key.into()),
            session_token,
        }
    }

    pub(crate) fn secret(&self) -> &str {
        self.secret_access_key.expose_secret()
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

/// The backend a signature is meant for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceScope {
    pub region: String,
    pub service: String,
}

impl ServiceScope {
    pub fn new(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
        }
    }
}

/// `(date, region, service)` binding of a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    /// `YYYYMMDD`.
    pub date: String,
    pub region: String,
    pub service: String,
}

impl CredentialScope {
    pub fn new(date: impl Into<String>, scope: &ServiceScope) -> Self {
        Self {
            date: date.into(),
            region: scope.region.clone(),
            service: scope.service.clone(),
        }
    }

    /// Parses `date/region/service/aws4_request`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split('/');
        let date = parts.next()?;
        let region = parts.next()?;
        let service = parts.next()?;
        if parts.next()? != "aws4_request" || parts.next().is_some() {
            return None;
        }
        Some(Self {
            date: date.to_string(),
            region: region.to_string(),
            service: service.to_string(),
        })
    }
}

impl fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/aws4_request",
            self.date, self.region, self.service
        )
    }
}
