use thiserror::Error;

use crate::errors::AppError;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("missing header: {0}")]
    MissingHeader(String),

    #[error("malformed authorization header: {0}")]
    MalformedAuthorization(String),

    #[error("credential scope mismatch: {0}")]
    ScopeMismatch(String),

    #[error("request timestamp outside the allowed window")]
    Expired,

    #[error("signature does not match")]
    SignatureMismatch,
}

impl From<SigningError> for AppError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::CredentialsUnavailable(msg) => AppError::CredentialsUnavailable(msg),
            SigningError::InvalidKey(msg) => AppError::Internal(msg),
            other => AppError::SignatureRejected(other.to_string()),
        }
    }
}
