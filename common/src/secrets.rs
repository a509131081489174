//! Database credential resolution.
//!
//! A secret payload is a JSON object holding one password per environment.
//! [`SecretResolver`] picks a key with an ordered list of [`KeyStrategy`]s and
//! falls back once to [`DEFAULT_SECRET_NAME`] when the configured location
//! cannot be used. Only key names and locations are ever logged.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::SdkConfig;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::config::{AppConfig, Environment, SecretStoreKind, DEFAULT_SECRET_NAME};
use crate::errors::{AppError, AppResult};

/// Key read when nothing environment-specific is present.
pub const STAGING_PASSWORD_KEY: &str = "staging_password";

/// Read access to a secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the payload stored at `location`.
    async fn get_secret(&self, location: &str) -> AppResult<Value>;
}

/// AWS Secrets Manager backed store.
pub struct AwsSecretStore {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretStore {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_secretsmanager::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn get_secret(&self, location: &str) -> AppResult<Value> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(location)
            .send()
            .await
            .map_err(|e| {
                AppError::SecretUnavailable(format!("failed to read secret {}: {}", location, e))
            })?;

        let secret_string = response.secret_string().ok_or_else(|| {
            AppError::SecretUnavailable(format!("secret {} has no string value", location))
        })?;

        serde_json::from_str(secret_string).map_err(|_| {
            AppError::SecretUnavailable(format!("secret {} is not valid JSON", location))
        })
    }
}

/// In-memory store, keyed by location.
#[derive(Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, Value>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, location: impl Into<String>, payload: Value) -> Self {
        self.secrets.insert(location.into(), payload);
        self
    }

    /// Parses a `{"location": {payload}, ...}` document.
    pub fn from_json(json: &str) -> AppResult<Self> {
        let secrets: HashMap<String, Value> = serde_json::from_str(json).map_err(|e| {
            AppError::Internal(format!("STATIC_SECRETS_JSON is not a JSON object: {}", e))
        })?;
        Ok(Self { secrets })
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_secret(&self, location: &str) -> AppResult<Value> {
        self.secrets
            .get(location)
            .cloned()
            .ok_or_else(|| AppError::SecretUnavailable(format!("secret {} not found", location)))
    }
}

/// Builds the store selected by configuration.
pub fn build_secret_store(
    config: &AppConfig,
    sdk_config: &SdkConfig,
) -> AppResult<Arc<dyn SecretStore>> {
    match config.secret_store {
        SecretStoreKind::Aws => Ok(Arc::new(AwsSecretStore::new(sdk_config))),
        SecretStoreKind::Static => {
            let json = config.static_secrets.as_deref().unwrap_or("{}");
            Ok(Arc::new(StaticSecretStore::from_json(json)?))
        }
    }
}

/// A resolved database credential. Lives for one connection attempt.
pub struct Credential {
    pub environment: Environment,
    pub secret_location: String,
    pub resolved_password: SecretString,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("environment", &self.environment)
            .field("secret_location", &self.secret_location)
            .field("resolved_password", &"***")
            .finish()
    }
}

/// One way of picking a password key from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// `<environment>_password`.
    EnvironmentKey(Environment),
    /// `staging_password`.
    StagingKey,
    /// Whatever key comes first in the payload.
    FirstKey,
}

impl KeyStrategy {
    /// Returns the key and its value when this strategy applies.
    pub fn pick<'a>(&self, payload: &'a Map<String, Value>) -> Option<(&'a str, &'a Value)> {
        match self {
            KeyStrategy::EnvironmentKey(env) => {
                payload.get_key_value(password_key(*env)).map(|(k, v)| (k.as_str(), v))
            }
            KeyStrategy::StagingKey => payload
                .get_key_value(STAGING_PASSWORD_KEY)
                .map(|(k, v)| (k.as_str(), v)),
            KeyStrategy::FirstKey => payload.iter().next().map(|(k, v)| (k.as_str(), v)),
        }
    }
}

/// The password key for an environment.
pub fn password_key(environment: Environment) -> &'static str {
    match environment {
        Environment::Poc => "poc_password",
        Environment::Prod => "prod_password",
        Environment::Staging => STAGING_PASSWORD_KEY,
    }
}

/// Resolves database passwords from a [`SecretStore`].
#[derive(Clone)]
pub struct SecretResolver {
    store: Arc<dyn SecretStore>,
    default_location: String,
}

impl SecretResolver {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            default_location: DEFAULT_SECRET_NAME.to_string(),
        }
    }

    /// Resolution order at the requested location.
    pub fn strategies(environment: Environment) -> [KeyStrategy; 3] {
        [
            KeyStrategy::EnvironmentKey(environment),
            KeyStrategy::StagingKey,
            KeyStrategy::FirstKey,
        ]
    }

    /// Resolution order at the default location after the requested one
    /// failed. The environment key is not consulted there.
    pub fn fallback_strategies() -> [KeyStrategy; 2] {
        [KeyStrategy::StagingKey, KeyStrategy::FirstKey]
    }

    /// Resolves the password for `environment` stored at `location`.
    pub async fn resolve(&self, location: &str, environment: Environment) -> AppResult<Credential> {
        let primary = self
            .resolve_at(location, environment, &Self::strategies(environment))
            .await;
        let error = match primary {
            Ok(credential) => return Ok(credential),
            Err(e) => e,
        };

        if location == self.default_location {
            tracing::error!(location = %location, error = %error, "secret resolution failed");
            return Err(error);
        }

        tracing::warn!(
            location = %location,
            fallback = %self.default_location,
            error = %error,
            "secret resolution failed, trying default location"
        );
        self.resolve_at(
            &self.default_location,
            environment,
            &Self::fallback_strategies(),
        )
        .await
            .map_err(|fallback_error| {
                tracing::error!(
                    location = %self.default_location,
                    error = %fallback_error,
                    "fallback secret resolution failed"
                );
                fallback_error
            })
    }

    async fn resolve_at(
        &self,
        location: &str,
        environment: Environment,
        strategies: &[KeyStrategy],
    ) -> AppResult<Credential> {
        let payload = self.store.get_secret(location).await?;
        let payload = payload.as_object().ok_or_else(|| {
            AppError::SecretUnavailable(format!("secret {} is not a JSON object", location))
        })?;

        tracing::debug!(
            location = %location,
            keys = ?payload.keys().collect::<Vec<_>>(),
            "secret keys available"
        );

        let (key, value) = strategies
            .iter()
            .find_map(|strategy| strategy.pick(payload))
            .ok_or_else(|| {
                AppError::SecretUnavailable(format!("secret {} holds no password key", location))
            })?;

        tracing::debug!(
            location = %location,
            key = %key,
            environment = %environment,
            "using password key"
        );

        let password = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        Ok(Credential {
            environment,
            secret_location: location.to_string(),
            resolved_password: SecretString::new(password),
        })
    }
}

impl Credential {
    pub fn password(&self) -> &str {
        self.resolved_password.expose_secret()
    }
}
