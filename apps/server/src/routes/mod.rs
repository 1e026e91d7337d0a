// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP routes.

pub mod extract;
pub mod health;
pub mod source;
pub mod table;

use crate::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Build the application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        // Root endpoint - API information
        .route("/", get(health::info))
        .route("/api/v1/health", get(health::check))
        .route("/api/v1/categories", get(table::categories))
        // Reactive table
        .route("/api/v1/source", put(source::replace).delete(source::clear))
        .route("/api/v1/selection", put(source::select))
        .route("/api/v1/refresh", post(source::refresh))
        .route("/api/v1/table", get(table::current))
        // One-shot extraction
        .route("/api/v1/extract", post(extract::extract))
        .route("/api/v1/cache/:key", get(extract::cached))
        // Middleware
        .layer(DefaultBodyLimit::max(config.max_body_mb * 1024 * 1024))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins, config.cors_allow_any()))
        .with_state(state)
}

fn cors_layer(origins: &[String], allow_any: bool) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    if allow_any {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::{snapshot, DiskCache, PipelineState};
    use crate::types::ExtractResponse;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use bim_table_core::{CategorySelection, Pipeline, RetryPolicy};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_state(name: &str) -> AppState {
        let dir = std::env::temp_dir().join(format!("bim-table-routes-{}-{}", name, std::process::id()));
        let vars: HashMap<String, String> =
            [("CACHE_DIR".to_string(), dir.to_string_lossy().into_owned())].into();
        let config = Config::from_lookup(|key| vars.get(key).cloned());

        let pipeline = Arc::new(Pipeline::default());
        let snapshot = snapshot::spawn(
            pipeline.clone(),
            RetryPolicy::no_retry(),
            CategorySelection::default(),
        );
        AppState {
            cache: Arc::new(DiskCache::new(&config.cache_dir).await),
            config: Arc::new(config),
            pipeline,
            snapshot,
        }
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn tree() -> Value {
        json!({
            "id": "root",
            "elements": [
                { "id": "1", "type": "Wall", "Mark": "W1" },
                { "id": "2", "type": "Beam", "Host": "W1" }
            ]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(test_state("health").await);
        let response = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["pipeline"], "noData");
    }

    #[tokio::test]
    async fn test_extract() {
        let state = test_state("extract").await;
        let dir = state.config.cache_dir.clone();
        let app = router(state);

        let request = json!({
            "tree": tree(),
            "parentCategories": ["Walls"],
            "childCategories": ["Structural Framing"],
            "skipCache": true
        });
        let response = app
            .oneshot(json_request(Method::POST, "/api/v1/extract", request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["cacheKey"].as_str().map(str::len), Some(64));
        assert_eq!(body["stats"]["fromCache"], false);
        let rows = body["result"]["tableRows"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["mark"], "W1");
        assert_eq!(rows[0]["details"][0]["id"], "2");

        tokio::fs::remove_dir_all(dir).await.ok();
    }

    #[tokio::test]
    async fn test_repeated_extract_is_served_from_cache() {
        let state = test_state("cache-hit").await;
        let dir = state.config.cache_dir.clone();
        let cache = state.cache.clone();
        let app = router(state);

        let request = json!({
            "tree": {
                "id": "root",
                "elements": [
                    { "id": "1", "type": "Wall", "Mark": "W1", "Dimensions": { "Length": { "value": 3.5 } } },
                    { "id": "2", "type": "Beam", "Host": "W1", "Comments": null },
                    { "id": "3", "type": "Beam", "Host": "W9" }
                ]
            },
            "parentCategories": ["Walls"],
            "childCategories": ["Structural Framing"]
        });

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/api/v1/extract", request.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first = body_json(response).await;
        assert_eq!(first["stats"]["fromCache"], false);
        let key = first["cacheKey"].as_str().unwrap().to_string();

        // The write happens in the background
        let mut stored = false;
        for _ in 0..100 {
            if cache.get::<ExtractResponse>(&key).await.unwrap().is_some() {
                stored = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(stored, "extraction result was never stored");

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/api/v1/extract", request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let second = body_json(response).await;
        assert_eq!(second["stats"]["fromCache"], true);
        assert_eq!(second["cacheKey"], first["cacheKey"]);
        assert_eq!(second["result"], first["result"]);

        let response = app
            .oneshot(Request::get(format!("/api/v1/cache/{key}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stored = body_json(response).await;
        assert_eq!(stored["stats"]["fromCache"], true);
        assert_eq!(stored["result"], first["result"]);

        tokio::fs::remove_dir_all(dir).await.ok();
    }

    #[tokio::test]
    async fn test_cache_lookup_rejects_malformed_key() {
        let app = router(test_state("bad-key").await);
        let response = app
            .oneshot(Request::get("/api/v1/cache/not-a-key").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_cache_lookup_unknown_key() {
        let app = router(test_state("unknown-key").await);
        let key = DiskCache::generate_key(b"never stored");
        let response = app
            .oneshot(Request::get(format!("/api/v1/cache/{key}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_extract_empty_result_is_unprocessable() {
        let app = router(test_state("empty").await);
        let request = json!({ "tree": { "id": "root", "children": [{ "id": "x" }] } });
        let response = app
            .oneshot(json_request(Method::POST, "/api/v1/extract", request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["code"], "EMPTY_RESULT");
    }

    #[tokio::test]
    async fn test_source_rejects_non_object() {
        let app = router(test_state("source").await);
        let response = app
            .oneshot(json_request(Method::PUT, "/api/v1/source", json!([1, 2, 3])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_source_and_selection_drive_table() {
        let state = test_state("table").await;
        let mut updates = state.snapshot.subscribe();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(json_request(
                Method::PUT,
                "/api/v1/selection",
                json!({ "parentCategories": ["Walls"], "childCategories": ["Structural Framing"] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .clone()
            .oneshot(json_request(Method::PUT, "/api/v1/source", tree()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        // The two changes may be applied in either order
        updates
            .wait_for(|s| {
                matches!(s, PipelineState::Ready { result, .. } if !result.table_rows.is_empty())
            })
            .await
            .unwrap();

        let response = app
            .oneshot(Request::get("/api/v1/table").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["result"]["tableRows"][0]["details"][0]["host"], "W1");
    }

    #[tokio::test]
    async fn test_table_wait_returns_settled_generation() {
        let app = router(test_state("table-wait").await);

        let response = app
            .clone()
            .oneshot(json_request(Method::PUT, "/api/v1/source", tree()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .oneshot(
                Request::get("/api/v1/table?wait=true&after=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["generation"], 1);
    }
}
