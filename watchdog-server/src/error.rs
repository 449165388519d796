//! HTTP error type for the API handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::alerts::AlertError;
use crate::relay::RelayError;

/// Errors surfaced by API handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error(transparent)]
    Common(#[from] watchdog_common::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Relay(_) => StatusCode::BAD_GATEWAY,
            ApiError::Alert(AlertError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Alert(_) => StatusCode::BAD_REQUEST,
            ApiError::Common(watchdog_common::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Common(watchdog_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::NotFound("stream x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AlertError::SessionNotFound(Uuid::nil())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AlertError::UnknownMode("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(watchdog_common::Error::InvalidInput("url is required".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(watchdog_common::Error::Internal("bad row".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::from(RelayError::NoOutput).status(), StatusCode::BAD_GATEWAY);
    }
}
