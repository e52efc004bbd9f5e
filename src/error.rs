use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::{
    auth::{password::HashError, repo::StoreError},
    envelope::{error_json, EnvelopeError},
};

/// Handler-level failure, rendered as an error envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Body(#[from] EnvelopeError),
    #[error("{0}")]
    Validation(String),
    /// Unknown email and wrong password both end up here.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Body(_) | ApiError::Validation(_) | ApiError::InvalidCredentials => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Hash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, %status, "request failed");
        }
        error_json(self.to_string(), Some(status)).into_response()
    }
}
