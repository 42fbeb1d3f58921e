use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::SqlErr;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(sea_orm::DbErr),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Wrong State: {0}")]
    WrongState(String),

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Conversion not needed: {0}")]
    ConversionNotNeeded(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Source file missing: {0}")]
    SourceMissing(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AppError {
    /// Unique-constraint violations are surfaced as `Duplicate` so callers
    /// can react ("already imported") instead of seeing a generic 500.
    fn from(err: sea_orm::DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => AppError::Duplicate(msg),
            _ => AppError::Database(err),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::WrongState(msg) => (StatusCode::CONFLICT, msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conversion(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ConversionNotNeeded(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Duplicate(msg) => (StatusCode::CONFLICT, msg),
            AppError::SourceMissing(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
