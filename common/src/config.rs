//! Service configuration.
//!
//! All settings are read from the environment once at startup into an
//! explicit [`AppConfig`], which is then handed to each component.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use serde::{Deserialize, Serialize};

/// Secret location used when `SECRET_NAME` is unset, and as the fallback
/// location when the configured one cannot be read.
pub const DEFAULT_SECRET_NAME: &str = "contently/database/credentials";

const DEFAULT_CONTENTLY_URL: &str = "https://qa3.contently.xyz";

/// Deployment environment, selects which password key is read from the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Poc,
    Prod,
    Staging,
}

impl Environment {
    /// Parses an environment name. Unrecognized values map to `Staging`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "poc" => Environment::Poc,
            "prod" => Environment::Prod,
            _ => Environment::Staging,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Staging
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Poc => write!(f, "poc"),
            Environment::Prod => write!(f, "prod"),
            Environment::Staging => write!(f, "staging"),
        }
    }
}

/// Which secret store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretStoreKind {
    /// AWS Secrets Manager.
    Aws,
    /// In-process JSON map taken from `STATIC_SECRETS_JSON`.
    Static,
}

impl FromStr for SecretStoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "aws" => Ok(SecretStoreKind::Aws),
            "static" => Ok(SecretStoreKind::Static),
            other => anyhow::bail!("Unsupported secret store: {}", other),
        }
    }
}

/// Database connection settings. The password is never part of this struct;
/// it is resolved from the secret store per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub connect_timeout_secs: u64,
}

/// SigV4 settings for both hops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningSettings {
    /// Region bound into every credential scope.
    pub region: String,
    /// Service name for signatures on calls into this service.
    pub inbound_service: String,
    /// Service name for the gateway's second hop into the bastion.
    pub bastion_service: String,
    /// Reject inbound requests that do not carry a valid signature.
    pub verify_signatures: bool,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    /// Safety gate. When false, non-select statements reach the executor.
    pub read_only: bool,
    pub database: DatabaseSettings,
    pub secret_name: String,
    pub secret_store: SecretStoreKind,
    /// JSON object of `location -> payload`, only read by the static store.
    #[serde(skip_serializing)]
    pub static_secrets: Option<String>,
    /// Base URL of the upstream identity provider.
    pub contently_url: String,
    pub http_timeout_secs: u64,
    pub signing: SigningSettings,
    pub services: ServiceUrls,
}

impl AppConfig {
    /// Loads configuration for the named service from process environment.
    /// `default_port` applies when `SERVER_PORT` is unset.
    pub fn load_with_service(service_name: &str, default_port: u16) -> Result<Self> {
        Self::from_source(service_name, default_port, |key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_source<F>(service_name: &str, default_port: u16, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = match lookup("SERVER_PORT") {
            Some(port) => port.parse().context("Invalid SERVER_PORT")?,
            None => default_port,
        };

        let read_only = var("READ_ONLY", "true").trim().eq_ignore_ascii_case("true");

        let database = DatabaseSettings {
            host: var("DB_HOST", "localhost"),
            port: var("DB_PORT", "5432").parse().context("Invalid DB_PORT")?,
            name: var("DB_NAME", "postgres"),
            user: var("DB_USER", "postgres"),
            connect_timeout_secs: var("DB_CONNECT_TIMEOUT_SECS", "10")
                .parse()
                .context("Invalid DB_CONNECT_TIMEOUT_SECS")?,
        };

        let signing = SigningSettings {
            region: lookup("AWS_REGION")
                .or_else(|| lookup("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|| "us-east-1".to_string()),
            inbound_service: var("INBOUND_SIGNING_SERVICE", "execute-api"),
            bastion_service: var("BASTION_SIGNING_SERVICE", "lambda"),
            verify_signatures: var("VERIFY_SIGNATURES", "false")
                .parse()
                .context("Invalid VERIFY_SIGNATURES")?,
        };

        Ok(Self {
            service_name: service_name.to_string(),
            host: var("SERVER_HOST", "0.0.0.0"),
            port,
            environment: Environment::parse_lenient(&var("ENVIRONMENT", "staging")),
            read_only,
            database,
            secret_name: var("SECRET_NAME", DEFAULT_SECRET_NAME),
            secret_store: var("SECRET_STORE", "aws").parse()?,
            static_secrets: lookup("STATIC_SECRETS_JSON"),
            contently_url: var("CONTENTLY_URL", DEFAULT_CONTENTLY_URL)
                .trim_end_matches('/')
                .to_string(),
            http_timeout_secs: var("HTTP_TIMEOUT_SECS", "30")
                .parse()
                .context("Invalid HTTP_TIMEOUT_SECS")?,
            signing,
            services: ServiceUrls::from_source(&lookup),
        })
    }

    /// Shared AWS SDK configuration: default credential provider chain, with
    /// the configured signing region.
    pub async fn aws_sdk_config(&self) -> SdkConfig {
        aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.signing.region.clone()))
            .load()
            .await
    }
}

/// URLs of the other services this one talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUrls {
    /// Base URL of the bastion service, target of the second hop.
    pub bastion: Option<String>,
}

impl ServiceUrls {
    pub fn from_source<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            bastion: lookup("BASTION_FUNCTION_URL")
                .filter(|v| !v.trim().is_empty())
                .map(|v| normalize_base_url(&v)),
        }
    }
}

/// Strips trailing slashes and adds `https://` when no scheme is present.
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("https://") || url.starts_with("http://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_source("gateway", 8080, source(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.services.bastion.is_none());
        assert!(config.read_only);
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.secret_name, DEFAULT_SECRET_NAME);
        assert_eq!(config.secret_store, SecretStoreKind::Aws);
        assert_eq!(config.database.connect_timeout_secs, 10);
        assert_eq!(config.signing.bastion_service, "lambda");
        assert!(!config.signing.verify_signatures);
    }

    #[test]
    fn test_read_only_toggle_and_environment() {
        let config = AppConfig::from_source(
            "query-service",
            8082,
            source(&[("READ_ONLY", "FALSE"), ("ENVIRONMENT", "Prod")]),
        )
        .unwrap();
        assert!(!config.read_only);
        assert_eq!(config.environment, Environment::Prod);
    }

    #[test]
    fn test_unknown_environment_is_staging() {
        assert_eq!(Environment::parse_lenient("qa"), Environment::Staging);
        assert_eq!(Environment::parse_lenient(" POC "), Environment::Poc);
    }

    #[test]
    fn test_invalid_port_is_error() {
        assert!(
            AppConfig::from_source("gateway", 8080, source(&[("SERVER_PORT", "http")])).is_err()
        );
    }

    #[test]
    fn test_port_default_is_per_service() {
        let bastion = AppConfig::from_source("query-service", 8082, source(&[])).unwrap();
        assert_eq!(bastion.port, 8082);
        let explicit =
            AppConfig::from_source("query-service", 8082, source(&[("SERVER_PORT", "9000")]))
                .unwrap();
        assert_eq!(explicit.port, 9000);
    }

    #[test]
    fn test_bastion_url_gets_scheme() {
        let config = AppConfig::from_source(
            "gateway",
            8080,
            source(&[("BASTION_FUNCTION_URL", "abc.lambda-url.us-east-1.on.aws/")]),
        )
        .unwrap();
        let urls = config.services;
        assert_eq!(
            urls.bastion.as_deref(),
            Some("https://abc.lambda-url.us-east-1.on.aws")
        );
        assert_eq!(normalize_base_url("http://127.0.0.1:9000/"), "http://127.0.0.1:9000");
    }
}
