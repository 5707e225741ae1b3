use axum::{ http::StatusCode, response::{ IntoResponse, Response }, Json };
use log::{ error, warn };
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::history::StoreError;
use crate::llm::UpstreamError;

/// Every failure a handler can return, dispatched to a status by kind.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("session '{0}' not found")]
    SessionNotFound(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(AuthError::MissingCredential | AuthError::InvalidCredential) =>
                StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthError::ProviderUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(UpstreamError::Status { status, .. }) =>
                StatusCode::from_u16(*status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(StoreError::InvalidSessionId(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }

        let body = match &self {
            ApiError::Upstream(UpstreamError::Status { status: upstream_status, .. }) =>
                json!({ "error": self.to_string(), "upstreamStatus": upstream_status }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
