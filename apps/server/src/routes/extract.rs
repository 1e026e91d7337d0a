// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-shot extraction and lookup of earlier extraction results.

use crate::error::ApiError;
use crate::services::DiskCache;
use crate::types::{ExtractRequest, ExtractResponse, ExtractStats};
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use std::time::Instant;

/// POST /api/v1/extract - Run the pipeline over a posted tree.
///
/// Results are cached by the hash of the tree, selection and active
/// parameters; `skipCache` forces a fresh run.
pub async fn extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let cache_key = DiskCache::key_for(&request.key())?;

    if !request.skip_cache {
        if let Some(mut cached) = state.cache.get::<ExtractResponse>(&cache_key).await? {
            tracing::info!(cache_key = %cache_key, "Cache HIT");
            cached.stats.from_cache = true;
            return Ok(Json(cached));
        }
    }

    tracing::info!(cache_key = %cache_key, "Cache MISS - extracting");

    let start = Instant::now();
    let result = state
        .pipeline
        .run(&request.tree, &request.selection, request.active_parameters.as_deref())
        .await?;

    let response = ExtractResponse {
        cache_key: cache_key.clone(),
        result,
        stats: ExtractStats {
            total_time_ms: start.elapsed().as_millis() as u64,
            from_cache: false,
        },
    };

    // Cache result (background)
    let cache = state.cache.clone();
    let response_clone = response.clone();
    tokio::spawn(async move {
        if let Err(e) = cache.set(&cache_key, &response_clone).await {
            tracing::error!(error = %e, "Failed to cache result");
        }
    });

    Ok(Json(response))
}

/// GET /api/v1/cache/:key - A stored extraction result by its cache key.
pub async fn cached(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ExtractResponse>, ApiError> {
    if !is_cache_key(&key) {
        return Err(ApiError::InvalidRequest(format!(
            "cache key must be 64 lowercase hex characters, got {:?}",
            key
        )));
    }

    let Some(mut response) = state.cache.get::<ExtractResponse>(&key).await? else {
        tracing::debug!(cache_key = %key, "No stored extraction");
        return Err(ApiError::NotFound(format!("No extraction stored under {}", key)));
    };

    tracing::info!(
        cache_key = %key,
        rows = response.result.table_rows.len(),
        elements = response.result.processed_elements.len(),
        "Serving stored extraction"
    );
    response.stats.from_cache = true;
    Ok(Json(response))
}

/// SHA-256 hex digest as produced by `DiskCache::generate_key`.
fn is_cache_key(key: &str) -> bool {
    key.len() == 64 && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
