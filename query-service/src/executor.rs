//! PostgreSQL statement execution.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use common::errors::{AppError, AppResult};
use common::models::{ConnectionParams, SqlResults};
use common::query::QueryExecutor;
use common::utils::ClassifiedStatement;
use serde_json::{json, Value};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use tracing::{debug, warn};
use uuid::Uuid;

/// How a Postgres column is turned into JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Other,
}

impl ColumnKind {
    fn from_type_name(name: &str) -> Self {
        match name {
            "BOOL" => ColumnKind::Bool,
            "INT2" => ColumnKind::Int2,
            "INT4" => ColumnKind::Int4,
            "INT8" => ColumnKind::Int8,
            "FLOAT4" => ColumnKind::Float4,
            "FLOAT8" => ColumnKind::Float8,
            "NUMERIC" => ColumnKind::Numeric,
            "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" => ColumnKind::Text,
            "JSON" | "JSONB" => ColumnKind::Json,
            "UUID" => ColumnKind::Uuid,
            "TIMESTAMP" => ColumnKind::Timestamp,
            "TIMESTAMPTZ" => ColumnKind::TimestampTz,
            "DATE" => ColumnKind::Date,
            "TIME" => ColumnKind::Time,
            _ => ColumnKind::Other,
        }
    }
}

const APPLICATION_NAME: &str = "query-service";

/// Opens one connection per statement and closes it afterwards.
#[derive(Debug, Clone)]
pub struct PgQueryExecutor {
    application_name: String,
}

impl PgQueryExecutor {
    pub fn new() -> Self {
        Self {
            application_name: APPLICATION_NAME.to_string(),
        }
    }

    async fn connect(&self, params: &ConnectionParams) -> AppResult<PgConnection> {
        let options = PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .database(&params.database)
            .username(&params.user)
            .password(params.password())
            .application_name(&self.application_name);

        let connect = PgConnection::connect_with(&options);
        match tokio::time::timeout(params.connect_timeout, connect).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(AppError::DbConnect(e.to_string())),
            Err(_) => Err(AppError::DbConnect(format!(
                "timed out after {}s",
                params.connect_timeout.as_secs()
            ))),
        }
    }

    async fn run(
        conn: &mut PgConnection,
        statement: &ClassifiedStatement,
    ) -> AppResult<Vec<PgRow>> {
        if statement.is_read_only() {
            return sqlx::query(statement.sql())
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| AppError::DbExec(e.to_string()));
        }

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| AppError::DbExec(e.to_string()))?;
        match sqlx::query(statement.sql()).fetch_all(&mut *tx).await {
            Ok(rows) => {
                tx.commit()
                    .await
                    .map_err(|e| AppError::DbExec(e.to_string()))?;
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(AppError::DbExec(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn execute(
        &self,
        statement: &ClassifiedStatement,
        params: &ConnectionParams,
    ) -> AppResult<SqlResults> {
        let mut conn = self.connect(params).await?;
        debug!(host = %params.host, database = %params.database, "connected");

        let outcome = Self::run(&mut conn, statement).await;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "failed to close database connection");
        }

        let rows = outcome?;
        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let values = rows.iter().map(row_values).collect();
        Ok(SqlResults::from_columns(&columns, values))
    }
}

fn row_values(row: &PgRow) -> Vec<Value> {
    (0..row.columns().len())
        .map(|idx| column_value(row, idx))
        .collect()
}

fn column_value(row: &PgRow, idx: usize) -> Value {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    let type_name = row.columns()[idx].type_info().name();
    let decoded = match ColumnKind::from_type_name(type_name) {
        ColumnKind::Bool => row.try_get::<bool, _>(idx).map(Value::from),
        ColumnKind::Int2 => row.try_get::<i16, _>(idx).map(Value::from),
        ColumnKind::Int4 => row.try_get::<i32, _>(idx).map(Value::from),
        ColumnKind::Int8 => row.try_get::<i64, _>(idx).map(Value::from),
        ColumnKind::Float4 => row.try_get::<f32, _>(idx).map(|v| json!(v)),
        ColumnKind::Float8 => row.try_get::<f64, _>(idx).map(|v| json!(v)),
        ColumnKind::Numeric => row
            .try_get::<BigDecimal, _>(idx)
            .map(|v| Value::String(v.to_string())),
        ColumnKind::Text => row.try_get::<String, _>(idx).map(Value::String),
        ColumnKind::Json => row.try_get::<Value, _>(idx),
        ColumnKind::Uuid => row
            .try_get::<Uuid, _>(idx)
            .map(|v| Value::String(v.to_string())),
        ColumnKind::Timestamp => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(|v| Value::String(v.to_string())),
        ColumnKind::TimestampTz => row
            .try_get::<DateTime<Utc>, _>(idx)
            .map(|v| Value::String(format_timestamptz(&v))),
        ColumnKind::Date => row
            .try_get::<NaiveDate, _>(idx)
            .map(|v| Value::String(v.to_string())),
        ColumnKind::Time => row
            .try_get::<NaiveTime, _>(idx)
            .map(|v| Value::String(v.to_string())),
        ColumnKind::Other => row.try_get::<String, _>(idx).map(Value::String),
    };

    decoded.unwrap_or_else(|e| {
        debug!(column = idx, type_name, error = %e, "column not representable as JSON");
        Value::Null
    })
}

fn format_timestamptz(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string()
}
