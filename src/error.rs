//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

/// Per-field and form-level validation messages.
///
/// Serialized as `{"fields": {"start_date": ["..."]}, "form": ["..."]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldErrors {
    pub fields: BTreeMap<String, Vec<String>>,
    pub form: Vec<String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.form.is_empty()
    }

    pub fn add_field(&mut self, key: &str, message: impl Into<String>) {
        self.fields
            .entry(key.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_form(&mut self, message: impl Into<String>) {
        self.form.push(message.into());
    }

    /// Shorthand for a single field failure.
    pub fn single(key: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add_field(key, message);
        errors
    }

    /// `Ok(())` when empty, otherwise the errors wrapped in `AppError::Validation`.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error code.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Unique violations surface as 409 and foreign key violations as 400;
    /// everything else is a 500 without details.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Authenticated, but the role does not grant the permission.
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Requested record does not exist or belongs to another tenant.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Request body or parameters are invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// Field-level validation failed.
    #[error("Validation failed")]
    Validation(FieldErrors),

    /// Approval action not allowed from the record's current status.
    #[error("{0}")]
    InvalidTransition(String),

    /// Write conflicts with existing data.
    #[error("{0}")]
    Conflict(String),

    /// CSV upload could not be processed.
    #[error("CSV error on line {line}: {message}")]
    Csv {
        line: usize,
        message: String,
        errors: Option<FieldErrors>,
    },

    /// Unexpected failure outside the database layer.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::InvalidRequest(message.into())
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message",
///     "details": { "fields": {}, "form": [] }
///   }
/// }
/// ```
///
/// `details` is only present for validation and CSV errors.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
                None,
            ),
            AppError::Forbidden(ref msg) => (
                StatusCode::FORBIDDEN,
                "forbidden",
                format!("Permission denied: {msg}"),
                None,
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string(), None),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone(), None)
            }
            AppError::Validation(ref errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_failed",
                self.to_string(),
                Some(json!(errors)),
            ),
            AppError::InvalidTransition(ref msg) => {
                (StatusCode::CONFLICT, "invalid_transition", msg.clone(), None)
            }
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            AppError::Csv {
                line,
                ref message,
                ref errors,
            } => (
                StatusCode::BAD_REQUEST,
                "csv_error",
                message.clone(),
                Some(json!({ "line": line, "errors": errors })),
            ),
            AppError::Internal(ref msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            AppError::Database(ref err) => match err {
                sqlx::Error::Database(db) if db.is_unique_violation() => (
                    StatusCode::CONFLICT,
                    "conflict",
                    "A record with the same identifier already exists".to_string(),
                    None,
                ),
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => (
                    StatusCode::BAD_REQUEST,
                    "invalid_reference",
                    "A referenced record does not exist".to_string(),
                    None,
                ),
                _ => {
                    tracing::error!(error = %err, "database error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        "An internal error occurred".to_string(),
                        None,
                    )
                }
            },
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collect_per_key() {
        let mut errors = FieldErrors::new();
        assert!(errors.is_empty());

        errors.add_field("start_date", "Field is required.");
        errors.add_field("start_date", "Invalid date");
        errors.add_form("Record not found");

        assert_eq!(errors.fields["start_date"].len(), 2);
        assert_eq!(errors.form, vec!["Record not found".to_string()]);
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn status_codes_follow_variants() {
        let cases = [
            (AppError::InvalidApiKey, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("EditData".into()), StatusCode::FORBIDDEN),
            (AppError::NotFound("Hazardous event"), StatusCode::NOT_FOUND),
            (AppError::invalid("bad"), StatusCode::BAD_REQUEST),
            (
                AppError::Validation(FieldErrors::single("id", "Invalid UUID")),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AppError::InvalidTransition("no".into()), StatusCode::CONFLICT),
            (
                AppError::Csv {
                    line: 3,
                    message: "bad row".into(),
                    errors: None,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Database(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
