// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types and handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bim_table_core::Error as PipelineError;
use serde::Serialize;
use thiserror::Error;

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Snapshot service is not running")]
    ServiceStopped,

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::Pipeline(err) => pipeline_status(err),
            ApiError::ServiceStopped => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_STOPPED"),
            ApiError::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CACHE_ERROR"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

/// Status and machine-readable code of a pipeline failure.
pub fn pipeline_status(err: &PipelineError) -> (StatusCode, &'static str) {
    match err {
        PipelineError::SourceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "SOURCE_UNAVAILABLE"),
        PipelineError::InvalidRoot(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ROOT"),
        PipelineError::MalformedNode { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "MALFORMED_NODE"),
        PipelineError::EmptyResult { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_RESULT"),
        PipelineError::DiscoveryFailure { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "DISCOVERY_FAILURE"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<cacache::Error> for ApiError {
    fn from(err: cacache::Error) -> Self {
        ApiError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("JSON error: {}", err))
    }
}
