// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Health check and API information endpoints.

use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    /// Status of the published table.
    pub pipeline: &'static str,
    /// Generation of the published table, if any run has started.
    pub generation: Option<u64>,
    pub source_loaded: bool,
}

/// API information response.
#[derive(Debug, Serialize)]
pub struct ApiInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub endpoints: Vec<EndpointInfo>,
}

/// Endpoint information.
#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/api/v1/health", "Health check endpoint"),
    ("GET", "/api/v1/categories", "Configured category table"),
    ("PUT", "/api/v1/source", "Replace the source scene graph"),
    ("DELETE", "/api/v1/source", "Clear the source scene graph"),
    ("PUT", "/api/v1/selection", "Set parent/child categories and active parameters"),
    ("POST", "/api/v1/refresh", "Re-run the pipeline on the current inputs"),
    ("GET", "/api/v1/table", "Current table snapshot"),
    ("POST", "/api/v1/extract", "One-shot extraction of a posted tree"),
    ("GET", "/api/v1/cache/:key", "Retrieve cached extraction result"),
];

/// GET /api/v1/health - Health check endpoint.
pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.snapshot.state();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "bim-table-server",
        pipeline: snapshot.status(),
        generation: snapshot.generation(),
        source_loaded: state.snapshot.has_source(),
    })
}

/// GET / - API information endpoint.
pub async fn info() -> Json<ApiInfoResponse> {
    Json(ApiInfoResponse {
        service: "bim-table-server",
        version: env!("CARGO_PKG_VERSION"),
        description: "BIM element extraction and parent/child table assembly",
        endpoints: ENDPOINTS
            .iter()
            .map(|&(method, path, description)| EndpointInfo {
                method,
                path,
                description,
            })
            .collect(),
    })
}
