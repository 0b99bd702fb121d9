use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Coarse classification every failure is reduced to before it reaches a user.
/// Validation and conflict are resolved where they happen; network and
/// authorization bubble up to the nearest error surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    Network,
    Authorization,
    NotFound,
}

/// Failure reported by a persistence collaborator (appointments, payments, catalog).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreError {
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unauthorized(_) => ErrorKind::Authorization,
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Network(_) => ErrorKind::Network,
            StoreError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Message safe to show to an end user; raw backend text stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Authorization => "You are not allowed to perform this action",
            ErrorKind::Validation => "Some of the submitted data was rejected",
            ErrorKind::Conflict => "The record was changed by someone else",
            ErrorKind::Network => "The service could not be reached, please try again",
            ErrorKind::NotFound => "The requested record does not exist",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        tracing::warn!("Collaborator failure: {}", err);
        let message = err.user_message().to_string();
        match err.kind() {
            ErrorKind::Authorization => AppError::Auth(message),
            ErrorKind::Validation => AppError::ValidationError(message),
            ErrorKind::Conflict => AppError::Conflict(message),
            ErrorKind::Network => AppError::ExternalService(message),
            ErrorKind::NotFound => AppError::NotFound(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Auth(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::ValidationError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ExternalService(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        tracing::error!("Error: {}: {}", status, message);

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
