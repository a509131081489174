//! Where signing keys come from.
//!
//! Credentials are fetched per signing or verification call so that rotated
//! role credentials (ECS task role, instance profile, SSO) are picked up.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};

use super::error::SigningError;
use super::AwsCredentials;

/// Supplies the key pair for one signing or verification.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credentials(&self) -> Result<AwsCredentials, SigningError>;
}

/// A fixed key pair.
#[derive(Debug, Clone)]
pub struct StaticCredentials(AwsCredentials);

impl StaticCredentials {
    pub fn new(credentials: AwsCredentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn credentials(&self) -> Result<AwsCredentials, SigningError> {
        Ok(self.0.clone())
    }
}

/// The AWS SDK default provider chain: environment, profile, SSO, web
/// identity, ECS and EC2 instance metadata.
#[derive(Debug, Clone)]
pub struct SdkCredentialSource {
    provider: Option<SharedCredentialsProvider>,
}

impl SdkCredentialSource {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            provider: config.credentials_provider(),
        }
    }
}

#[async_trait]
impl CredentialSource for SdkCredentialSource {
    async fn credentials(&self) -> Result<AwsCredentials, SigningError> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            SigningError::CredentialsUnavailable("no AWS credentials provider configured".into())
        })?;
        let credentials = provider
            .provide_credentials()
            .await
            .map_err(|e| SigningError::CredentialsUnavailable(e.to_string()))?;

        Ok(AwsCredentials::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            credentials.session_token().map(String::from),
        ))
    }
}
