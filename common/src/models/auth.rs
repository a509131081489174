//! Login models for `POST /auth`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::errors::{AppError, AppResult};

const MISSING_CREDENTIALS: &str = "Missing username or password";

/// Validated login credentials.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct AuthRequest {
    #[validate(length(min = 1, message = "Missing username or password"))]
    pub username: String,
    #[validate(length(min = 1, message = "Missing username or password"))]
    pub password: String,
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Every body shape seen in deployments:
/// `{username, password}`, `{email, password}` and `{user: {email, password}}`.
#[derive(Debug, Default, Deserialize)]
struct LoginBody {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    user: Option<Box<LoginBody>>,
}

impl LoginBody {
    fn identifier(&self) -> Option<&str> {
        self.username
            .as_deref()
            .or(self.email.as_deref())
            .filter(|s| !s.is_empty())
    }
}

impl AuthRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parses and validates a raw request body.
    pub fn from_body(body: &[u8]) -> AppResult<Self> {
        let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(body)
                .map_err(|_| AppError::Validation("Invalid JSON in request body".into()))?
        };
        let login: LoginBody = serde_json::from_value(value)
            .map_err(|_| AppError::Validation(MISSING_CREDENTIALS.into()))?;

        let nested = login.user.as_deref();
        let username = login
            .identifier()
            .or_else(|| nested.and_then(LoginBody::identifier))
            .unwrap_or_default();
        let password = login
            .password
            .as_deref()
            .or_else(|| nested.and_then(|u| u.password.as_deref()))
            .unwrap_or_default();

        let request = AuthRequest::new(username, password);
        request.validate()?;
        Ok(request)
    }
}
