//! Error taxonomy shared by every component.
//!
//! Component failures travel as [`AppError`] up to the router, which turns
//! them into a JSON `{"error": ...}` body with the matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::response::GatewayResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing request fields.
    #[error("{0}")]
    Validation(String),

    /// Statement was not classified read-only while the gate is on.
    #[error("Write operation not allowed in read-only mode")]
    SafetyRejected { reason: String },

    /// Missing, malformed, expired or mismatching request signature.
    #[error("Invalid request signature: {0}")]
    SignatureRejected(String),

    /// Signing credentials are absent from the environment.
    #[error("Signing credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    /// No usable password could be resolved. Never carries the secret value.
    #[error("Database secret unavailable: {0}")]
    SecretUnavailable(String),

    #[error("Error connecting to database: {0}")]
    DbConnect(String),

    #[error("Error executing query: {0}")]
    DbExec(String),

    /// Identity provider answered with an error status.
    #[error("{message}")]
    UpstreamAuth { status: u16, message: String },

    /// An upstream service could not be reached or answered garbage.
    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::SafetyRejected { .. } | AppError::SignatureRejected(_) => {
                StatusCode::FORBIDDEN
            }
            AppError::UpstreamAuth { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::CredentialsUnavailable(_)
            | AppError::SecretUnavailable(_)
            | AppError::DbConnect(_)
            | AppError::DbExec(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code, used as a log field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::SafetyRejected { .. } => "SAFETY_REJECTED",
            AppError::SignatureRejected(_) => "SIGNATURE_REJECTED",
            AppError::CredentialsUnavailable(_) => "CREDENTIALS_UNAVAILABLE",
            AppError::SecretUnavailable(_) => "SECRET_UNAVAILABLE",
            AppError::DbConnect(_) => "DB_CONNECT_ERROR",
            AppError::DbExec(_) => "DB_EXEC_ERROR",
            AppError::UpstreamAuth { .. } => "UPSTREAM_AUTH_ERROR",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::NotFound => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Converts the error into the `{"error": message}` response shape.
    pub fn into_gateway_response(self) -> GatewayResponse {
        let status = self.status_code();
        GatewayResponse::error(status, self.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_gateway_response().into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .next()
            .unwrap_or_else(|| errors.to_string());
        AppError::Validation(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::SafetyRejected { reason: "drop".into() }.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::DbConnect("refused".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_auth_keeps_status() {
        let err = AppError::UpstreamAuth {
            status: 401,
            message: "invalid_grant".into(),
        };
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        let response = err.into_gateway_response();
        assert_eq!(response.body, r#"{"error":"invalid_grant"}"#);
    }

    #[test]
    fn test_db_errors_carry_driver_message() {
        let response = AppError::DbExec("syntax error at or near \"selec\"".into())
            .into_gateway_response();
        assert!(response.body.contains("Error executing query: syntax error"));
    }
}
