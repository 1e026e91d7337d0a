// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Endpoints that feed the snapshot service.

use crate::error::ApiError;
use crate::types::{AcceptedResponse, SelectionRequest};
use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;

type Accepted = (StatusCode, Json<AcceptedResponse>);

fn accepted(state: &AppState) -> Accepted {
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            accepted: true,
            status: state.snapshot.state().status(),
        }),
    )
}

/// PUT /api/v1/source - Replace the source tree.
pub async fn replace(State(state): State<AppState>, Json(tree): Json<Value>) -> Result<Accepted, ApiError> {
    if !tree.is_object() {
        return Err(ApiError::InvalidRequest("source tree must be a JSON object".into()));
    }
    tracing::info!(
        top_level_keys = tree.as_object().map_or(0, |o| o.len()),
        "Source tree replaced"
    );
    state.snapshot.replace_source(Some(tree));
    Ok(accepted(&state))
}

/// DELETE /api/v1/source - Clear the source tree.
pub async fn clear(State(state): State<AppState>) -> Accepted {
    state.snapshot.replace_source(None);
    accepted(&state)
}

/// PUT /api/v1/selection - Change the category selection.
pub async fn select(
    State(state): State<AppState>,
    Json(request): Json<SelectionRequest>,
) -> Result<Accepted, ApiError> {
    tracing::debug!(
        parent = ?request.selection.parent,
        child = ?request.selection.child,
        "Selection changed"
    );
    state
        .snapshot
        .set_selection(request.selection, request.active_parameters)
        .await?;
    Ok(accepted(&state))
}

/// POST /api/v1/refresh - Re-run the pipeline.
pub async fn refresh(State(state): State<AppState>) -> Result<Accepted, ApiError> {
    state.snapshot.refresh().await?;
    Ok(accepted(&state))
}
