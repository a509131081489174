//! SQL route models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::errors::{AppError, AppResult};

/// Request body for `POST /sql`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SqlRequest {
    /// SQL statement to execute.
    #[validate(length(min = 1, message = "No SQL query in request body"))]
    pub sql: String,
}

impl SqlRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    /// Parses and validates a raw request body.
    pub fn from_body(body: &[u8]) -> AppResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::Validation("No body in request".into()));
        }
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| AppError::Validation("Invalid JSON in request body".into()))?;
        if value.get("sql").is_none() {
            return Err(AppError::Validation("No SQL query in request body".into()));
        }
        let request: SqlRequest = serde_json::from_value(value)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))?;
        request.validate()?;
        Ok(request)
    }
}

/// One result row: column name to value, in column order.
pub type ResultRow = Map<String, Value>;

/// Response body of a successful `POST /sql`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlResults {
    pub results: Vec<ResultRow>,
}

impl SqlResults {
    /// Zips column names with each row's values.
    ///
    /// Rows shorter than the column list are padded with nulls; extra values
    /// beyond the last column are dropped.
    pub fn from_columns(columns: &[String], rows: Vec<Vec<Value>>) -> Self {
        let results = rows
            .into_iter()
            .map(|row| {
                let mut values = row.into_iter();
                columns
                    .iter()
                    .map(|name| (name.clone(), values.next().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();
        Self { results }
    }

    pub fn row_count(&self) -> usize {
        self.results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sql_request() {
        let req = SqlRequest::from_body(br#"{"sql": "SELECT 1"}"#).unwrap();
        assert_eq!(req.sql, "SELECT 1");
    }

    #[test]
    fn test_missing_sql_is_validation_error() {
        let err = SqlRequest::from_body(br#"{"query": "SELECT 1"}"#).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "No SQL query in request body"));
    }

    #[test]
    fn test_unparsable_and_empty_bodies() {
        assert!(matches!(
            SqlRequest::from_body(b"{not json").unwrap_err(),
            AppError::Validation(ref m) if m == "Invalid JSON in request body"
        ));
        assert!(matches!(
            SqlRequest::from_body(b"").unwrap_err(),
            AppError::Validation(ref m) if m == "No body in request"
        ));
        assert!(SqlRequest::from_body(br#"{"sql": ""}"#).is_err());
        assert!(SqlRequest::from_body(br#"{"sql": 42}"#).is_err());
    }

    #[test]
    fn test_results_keep_column_order() {
        let columns = vec!["id".to_string(), "created_at".to_string(), "name".to_string()];
        let results = SqlResults::from_columns(
            &columns,
            vec![vec![json!(1), json!("2024-01-01"), json!("a")]],
        );
        let body = serde_json::to_string(&results).unwrap();
        assert_eq!(
            body,
            r#"{"results":[{"id":1,"created_at":"2024-01-01","name":"a"}]}"#
        );
    }

    #[test]
    fn test_short_rows_padded_with_null() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let results = SqlResults::from_columns(&columns, vec![vec![json!(1)]]);
        assert_eq!(results.results[0]["b"], Value::Null);
    }
}
