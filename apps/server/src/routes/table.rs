// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only views of the published table and its configuration.

use crate::error::ApiError;
use crate::services::PipelineState;
use crate::types::TableQuery;
use crate::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use bim_table_core::CategoryTable;
use std::time::Duration;

/// Upper bound on how long `?wait=true` holds a request open.
const MAX_WAIT: Duration = Duration::from_secs(30);

/// GET /api/v1/table - Current snapshot.
///
/// With `wait=true` the response is held until a run settles, optionally one
/// at or after generation `after`.
pub async fn current(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> Result<Json<PipelineState>, ApiError> {
    if !query.wait {
        return Ok(Json(state.snapshot.state()));
    }

    // Leave room below the request timeout so the wait ends with a state
    let timeout = Duration::from_secs(state.config.request_timeout_secs.saturating_sub(1)).min(MAX_WAIT);
    let snapshot = state.snapshot.wait_settled(query.after, timeout).await?;
    Ok(Json(snapshot))
}

/// GET /api/v1/categories - The category table in use.
pub async fn categories(State(state): State<AppState>) -> Json<CategoryTable> {
    Json(state.pipeline.categories().clone())
}
