use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::users::repo::RepoError;

/// JSON body of every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors: None,
            error: None,
            stack: None,
        }
    }
}

/// Body field that carries the underlying failure outside production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailField {
    /// Failures an operation reports itself, as `error: <message chain>`.
    Error,
    /// Failures left to the top-level mapping, as `stack: <debug chain>`.
    Stack,
}

/// Underlying failure of a 500 response. Carried as a response extension so
/// the app layer can decide whether the client gets to see it.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub message: &'static str,
    pub field: DetailField,
    pub detail: String,
}

impl ErrorDetail {
    pub fn into_body(self) -> ErrorBody {
        let mut body = ErrorBody::new(self.message);
        match self.field {
            DetailField::Error => body.error = Some(self.detail),
            DetailField::Stack => body.stack = Some(self.detail),
        }
        body
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    DuplicateEmail(&'static str),
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("invalid or missing token")]
    Unauthorized,
    #[error("{message}: {cause:#}")]
    Internal {
        message: &'static str,
        field: DetailField,
        cause: anyhow::Error,
    },
}

impl AppError {
    /// A failure the operation names itself, e.g. "Failed to delete user".
    pub fn internal(message: &'static str, cause: impl Into<anyhow::Error>) -> Self {
        AppError::Internal {
            message,
            field: DetailField::Error,
            cause: cause.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(cause: anyhow::Error) -> Self {
        AppError::Internal {
            message: "Internal Server Error",
            field: DetailField::Stack,
            cause,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        anyhow::Error::new(e).into()
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::DuplicateEmail => AppError::DuplicateEmail("Email already in use"),
            RepoError::Database(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(vec![rejection.body_text()])
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorBody::new(message))).into_response()
            }
            AppError::DuplicateEmail(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody::new(message))).into_response()
            }
            AppError::Validation(errors) => {
                let body = ErrorBody {
                    errors: Some(errors),
                    ..ErrorBody::new("Validation error")
                };
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::new("Invalid or missing token")),
            )
                .into_response(),
            AppError::Internal {
                message,
                field,
                cause,
            } => {
                let chain = format!("{cause:#}");
                error!(error = %chain, "{message}");
                let detail = match field {
                    DetailField::Error => chain,
                    DetailField::Stack => format!("{cause:?}"),
                };
                let mut res =
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(message))).into_response();
                res.extensions_mut().insert(ErrorDetail {
                    message,
                    field,
                    detail,
                });
                res
            }
        }
    }
}
