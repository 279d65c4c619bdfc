use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Application error, recovered at the request boundary. Authorization
/// failures always map to a denial; storage and internal failures keep
/// their detail in the log and return a generic body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Authentication(&'static str),
    #[error("{0}")]
    Authorization(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("storage failure")]
    Storage(anyhow::Error),
    #[error("internal error")]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Storage(e) | AppError::Internal(e) => {
                error!(error = %e, "request failed");
            }
            _ => {}
        }
        (self.status_code(), self.to_string()).into_response()
    }
}
