// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BIM-Table Server - keeps a parent/child element table in sync with a BIM
//! scene graph.
//!
//! The host pushes the scene graph and the category selection; every change
//! re-runs the extraction pipeline and publishes a new snapshot. A one-shot
//! endpoint runs the pipeline over a posted tree without touching the
//! published table.
//!
//! # Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/categories` - Category table in use
//! - `PUT /api/v1/source` / `DELETE /api/v1/source` - Replace or clear the scene graph
//! - `PUT /api/v1/selection` - Parent/child categories and active parameters
//! - `POST /api/v1/refresh` - Re-run on unchanged inputs
//! - `GET /api/v1/table` - Current snapshot (`noData`, `loading`, `ready` or `failed`);
//!   `?wait=true&after=N` holds the request until a run settles
//! - `POST /api/v1/extract` - One-shot extraction (cached)
//! - `GET /api/v1/cache/:key` - Stored extraction result by cache key

use bim_table_core::{CategorySelection, Pipeline};
use std::net::SocketAddr;
use std::sync::Arc;

mod config;
mod error;
mod routes;
mod services;
mod types;

use config::{Config, LogFormat};
use services::{DiskCache, SnapshotHandle};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<DiskCache>,
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub snapshot: SnapshotHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // Initialize logging
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,tower_http=debug,bim_table_server=debug".into());
    match config.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).pretty().init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }

    tracing::info!(
        port = config.port,
        cache_dir = %config.cache_dir,
        max_body_mb = config.max_body_mb,
        max_depth = config.max_depth,
        walk_batch_size = config.walk_batch_size,
        discovery_batch_size = config.discovery_batch_size,
        "Starting BIM-Table Server"
    );

    let categories = config.load_categories()?;
    let pipeline = Arc::new(Pipeline::new(config.extraction_config(), categories));
    let snapshot = services::snapshot::spawn(
        pipeline.clone(),
        config.retry_policy(),
        CategorySelection::default(),
    );

    let cache = Arc::new(DiskCache::new(&config.cache_dir).await);

    let state = AppState {
        cache,
        config: Arc::new(config.clone()),
        pipeline,
        snapshot,
    };

    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
