//! API Errors
//!
//! Every failure leaves the server as JSON `{error, code}` with the status
//! class of the underlying [`AgentError`].

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use swarm_core::AgentError;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Invalid JSON body: {0}")]
    Body(#[from] JsonRejection),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Agent(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Body(rejection) => rejection.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Agent(err) => {
                if status.is_server_error() {
                    tracing::error!(error = %err, code = err.code(), "Request failed");
                } else {
                    tracing::debug!(error = %err, code = err.code(), "Request rejected");
                }
                ErrorResponse {
                    error: err.user_message(),
                    code: err.code().into(),
                }
            }
            Self::Body(rejection) => ErrorResponse {
                error: rejection.body_text(),
                code: "BAD_REQUEST".into(),
            },
        };
        (status, Json(body)).into_response()
    }
}
