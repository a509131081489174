//! SQL execution seams.
//!
//! [`SqlBackend`] is what the router calls for `/sql`. The bastion plugs in
//! [`DirectSqlBackend`] (classify, resolve credentials, execute); the gateway
//! plugs in a forwarder that performs the signed second hop.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;

use crate::config::{AppConfig, DatabaseSettings, Environment};
use crate::errors::{AppError, AppResult};
use crate::models::{ConnectionParams, RequestContext, SqlRequest, SqlResults};
use crate::response::GatewayResponse;
use crate::secrets::SecretResolver;
use crate::utils::{Classification, ClassifiedStatement};

/// Runs one statement on one freshly opened connection.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes `statement`.
    ///
    /// Implementations must close the connection on every exit path. A
    /// statement that is not read-only runs in a transaction that is
    /// committed on success and rolled back on failure.
    async fn execute(
        &self,
        statement: &ClassifiedStatement,
        params: &ConnectionParams,
    ) -> AppResult<SqlResults>;
}

/// Handles a validated `/sql` request.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    async fn run(&self, request: SqlRequest, ctx: &RequestContext) -> AppResult<GatewayResponse>;
}

/// Executes statements against the configured database.
pub struct DirectSqlBackend {
    read_only: bool,
    environment: Environment,
    secret_location: String,
    database: DatabaseSettings,
    resolver: SecretResolver,
    executor: Arc<dyn QueryExecutor>,
}

impl DirectSqlBackend {
    pub fn new(
        config: &AppConfig,
        resolver: SecretResolver,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            read_only: config.read_only,
            environment: config.environment,
            secret_location: config.secret_name.clone(),
            database: config.database.clone(),
            resolver,
            executor,
        }
    }

    /// Classifies and gates a statement. Nothing touches the database when
    /// this fails.
    pub fn admit(&self, sql: String) -> AppResult<ClassifiedStatement> {
        let statement = ClassifiedStatement::new(sql);
        match statement.classification() {
            Classification::ReadOnly => Ok(statement),
            Classification::Rejected(reason) if self.read_only => {
                tracing::warn!(reason = %reason, "write operation rejected in read-only mode");
                Err(AppError::SafetyRejected {
                    reason: reason.to_string(),
                })
            }
            Classification::Rejected(reason) => {
                tracing::warn!(reason = %reason, "safety gate disabled, admitting write statement");
                Ok(statement)
            }
        }
    }
}

#[async_trait]
impl SqlBackend for DirectSqlBackend {
    async fn run(&self, request: SqlRequest, ctx: &RequestContext) -> AppResult<GatewayResponse> {
        let statement = self.admit(request.sql)?;

        let credential = self
            .resolver
            .resolve(&self.secret_location, self.environment)
            .await?;
        let params = ConnectionParams::new(&self.database, credential.resolved_password);

        tracing::debug!(
            request_id = %ctx.request_id,
            host = %params.host,
            database = %params.database,
            user = %params.user,
            "executing statement"
        );
        let results = self.executor.execute(&statement, &params).await?;
        tracing::info!(
            request_id = %ctx.request_id,
            rows = results.row_count(),
            "statement executed"
        );

        Ok(GatewayResponse::json(StatusCode::OK, &results))
    }
}
