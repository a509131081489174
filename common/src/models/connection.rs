//! Database connection parameters.

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::DatabaseSettings;

/// Everything needed to open one database connection.
///
/// Built per request from [`DatabaseSettings`] plus the freshly resolved
/// password, dropped once the connection attempt is over.
#[derive(Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: SecretString,
    pub connect_timeout: Duration,
}

impl ConnectionParams {
    pub fn new(settings: &DatabaseSettings, password: SecretString) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            database: settings.name.clone(),
            user: settings.user.clone(),
            password,
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
        }
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_password() {
        let settings = DatabaseSettings {
            host: "db.internal".into(),
            port: 5432,
            name: "contently".into(),
            user: "reader".into(),
            connect_timeout_secs: 10,
        };
        let params = ConnectionParams::new(&settings, SecretString::new("s3cr3t".into()));
        let debug = format!("{:?}", params);
        assert!(debug.contains("db.internal"));
        assert!(!debug.contains("s3cr3t"));
        assert_eq!(params.password(), "s3cr3t");
        assert_eq!(params.connect_timeout, Duration::from_secs(10));
    }
}
