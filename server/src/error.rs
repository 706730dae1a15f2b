use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use num_derive::{FromPrimitive, ToPrimitive};
use sea_orm::sqlx;
use sea_orm::sqlx::error::DatabaseError;
use serde_json::json;

use crate::{mail::MailApiError, provider::ProviderError};

pub type AppResult<T> = Result<T, AppError>;
pub type AppJsonResult<T> = AppResult<Json<T>>;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
    RequestTimeout,
    TooManyRequests,
    DbError(sea_orm::error::DbErr),
    Conflict(String),
    /// A computed score or state escaped its documented range. Fatal to the
    /// current operation.
    InvariantViolation(String),
    /// Mail-provider auth/permission/transport failure.
    External(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        tracing::error!("Reqwest error: {:?}", error);
        match error.status() {
            Some(StatusCode::BAD_REQUEST) => AppError::BadRequest(error.to_string()),
            Some(StatusCode::REQUEST_TIMEOUT) => AppError::RequestTimeout,
            Some(StatusCode::TOO_MANY_REQUESTS) => AppError::TooManyRequests,
            _ => AppError::Internal(error.into()),
        }
    }
}

impl From<sea_orm::error::DbErr> for AppError {
    fn from(error: sea_orm::error::DbErr) -> Self {
        AppError::DbError(error)
    }
}

impl From<ProviderError> for AppError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Timeout => AppError::RequestTimeout,
            ProviderError::RateLimited => AppError::TooManyRequests,
            other => AppError::Internal(anyhow::anyhow!("{other}")),
        }
    }
}

impl From<MailApiError> for AppError {
    fn from(error: MailApiError) -> Self {
        match error {
            MailApiError::NotFound(msg) => AppError::NotFound(msg),
            other => AppError::External(other.to_string()),
        }
    }
}

// This centralizes all different errors from our app in one place
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = match self {
            AppError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": {
                    "code": StatusCode::BAD_REQUEST.as_u16(),
                    "message": error
                }})),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {
                    "code": StatusCode::NOT_FOUND.as_u16(),
                    "message": msg
                }})),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": {
                        "code": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                        "message": "Internal server error"
                    }})),
                )
            }
            AppError::RequestTimeout => (
                StatusCode::REQUEST_TIMEOUT,
                Json(json!({"error": {
                    "code": StatusCode::REQUEST_TIMEOUT.as_u16(),
                    "message": "Request took too long"
                }})),
            ),
            AppError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {
                    "code": StatusCode::TOO_MANY_REQUESTS.as_u16(),
                    "message": "Too many requests"
                }})),
            ),
            AppError::DbError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": {
                        "code": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                        "message": "Database error"
                    }})),
                )
            }
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                Json(json!({"error": {
                    "code": StatusCode::CONFLICT.as_u16(),
                    "message": msg
                }})),
            ),
            AppError::InvariantViolation(msg) => {
                tracing::error!("Invariant violation: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": {
                        "code": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                        "message": msg
                    }})),
                )
            }
            AppError::External(msg) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": {
                    "code": StatusCode::BAD_GATEWAY.as_u16(),
                    "message": msg
                }})),
            ),
        };
        tracing::error!("Error: {:?}", err.1);

        err.into_response()
    }
}

#[allow(clippy::borrowed_box)]
fn get_code(error: &Box<dyn DatabaseError>) -> Option<u32> {
    error.code().and_then(|c| c.parse::<u32>().ok())
}

pub fn extract_database_error_code(err: &sea_orm::error::DbErr) -> Option<u32> {
    match err {
        sea_orm::error::DbErr::Query(sea_orm::error::RuntimeErr::SqlxError(
            sqlx::Error::Database(error),
        )) => get_code(error),
        _ => None,
    }
}

#[derive(FromPrimitive, ToPrimitive, Debug, PartialEq, Eq)]
pub enum DatabaseErrorCode {
    UniqueViolation = 23505,
}

pub fn is_unique_violation(err: &sea_orm::error::DbErr) -> bool {
    use num_traits::FromPrimitive;

    extract_database_error_code(err)
        .and_then(DatabaseErrorCode::from_u32)
        .map_or(false, |c| c == DatabaseErrorCode::UniqueViolation)
}
