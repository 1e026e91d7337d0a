// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server configuration loaded from environment variables.

use anyhow::Context;
use bim_table_core::{CategoryTable, ExtractionConfig, RetryPolicy};
use std::str::FromStr;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on.
    pub port: u16,
    /// Directory for cache storage.
    pub cache_dir: String,
    /// Maximum request body size in MB (scene graphs are posted as JSON).
    pub max_body_mb: usize,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Maximum child depth the walker descends to.
    pub max_depth: usize,
    /// Nodes visited between walker yields.
    pub walk_batch_size: usize,
    /// Nodes per parameter discovery batch.
    pub discovery_batch_size: usize,
    /// Optional JSON file with a custom category table.
    pub categories_file: Option<String>,
    /// Delay between checks for a source tree.
    pub source_retry_interval_ms: u64,
    /// Checks before a run gives up on the source tree.
    pub source_retry_max_attempts: u32,
    /// Log output format.
    pub log_format: LogFormat,
    /// Allowed CORS origins (comma-separated, or "*" for all).
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Unset or unparsable
    /// values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let extraction = ExtractionConfig::default();
        let retry = RetryPolicy::default();

        Self {
            port: parsed(&lookup, "PORT", 8080),
            cache_dir: lookup("CACHE_DIR").unwrap_or_else(|| {
                if std::path::Path::new("/.dockerenv").exists() {
                    "/app/cache".into()
                } else {
                    std::env::current_dir()
                        .ok()
                        .and_then(|dir| dir.join(".cache").to_str().map(|s| s.to_string()))
                        .unwrap_or_else(|| "./.cache".into())
                }
            }),
            max_body_mb: parsed(&lookup, "MAX_BODY_MB", 200),
            request_timeout_secs: parsed(&lookup, "REQUEST_TIMEOUT_SECS", 300),
            max_depth: parsed(&lookup, "MAX_DEPTH", extraction.max_depth),
            walk_batch_size: parsed(&lookup, "WALK_BATCH_SIZE", extraction.walk_batch_size),
            discovery_batch_size: parsed(&lookup, "DISCOVERY_BATCH_SIZE", extraction.discovery_batch_size),
            categories_file: lookup("CATEGORIES_FILE").filter(|s| !s.trim().is_empty()),
            source_retry_interval_ms: parsed(
                &lookup,
                "SOURCE_RETRY_INTERVAL_MS",
                retry.interval.as_millis() as u64,
            ),
            source_retry_max_attempts: parsed(&lookup, "SOURCE_RETRY_MAX_ATTEMPTS", retry.max_attempts),
            log_format: parsed(&lookup, "LOG_FORMAT", LogFormat::Pretty),
            cors_origins: lookup("CORS_ORIGINS")
                .unwrap_or_else(|| {
                    "http://localhost:3000,http://localhost:5173,http://127.0.0.1:3000,http://127.0.0.1:5173".into()
                })
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Extraction settings for the pipeline.
    pub fn extraction_config(&self) -> ExtractionConfig {
        ExtractionConfig {
            max_depth: self.max_depth,
            walk_batch_size: self.walk_batch_size.max(1),
            discovery_batch_size: self.discovery_batch_size.max(1),
            ..ExtractionConfig::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.source_retry_interval_ms),
            self.source_retry_max_attempts,
        )
    }

    /// The category table: the built-in one, or the contents of
    /// `CATEGORIES_FILE`.
    pub fn load_categories(&self) -> anyhow::Result<CategoryTable> {
        let Some(path) = &self.categories_file else {
            return Ok(CategoryTable::default());
        };
        let data = std::fs::read(path).with_context(|| format!("reading category table {path}"))?;
        let table: CategoryTable =
            serde_json::from_slice(&data).with_context(|| format!("parsing category table {path}"))?;
        tracing::info!(path = %path, categories = table.categories().len(), "Loaded category table");
        Ok(table)
    }

    /// Whether every origin is allowed.
    pub fn cors_allow_any(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("CACHE_DIR", "/tmp/cache")]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.cache_dir, "/tmp/cache");
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.walk_batch_size, 200);
        assert_eq!(config.discovery_batch_size, 50);
        assert_eq!(config.source_retry_interval_ms, 500);
        assert_eq!(config.source_retry_max_attempts, 10);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.categories_file.is_none());
        assert_eq!(config.cors_origins.len(), 4);
        assert!(!config.cors_allow_any());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("MAX_DEPTH", "4"),
            ("WALK_BATCH_SIZE", "0"),
            ("SOURCE_RETRY_INTERVAL_MS", "50"),
            ("SOURCE_RETRY_MAX_ATTEMPTS", "3"),
            ("LOG_FORMAT", "JSON"),
            ("CORS_ORIGINS", "*"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.cors_allow_any());

        let extraction = config.extraction_config();
        assert_eq!(extraction.max_depth, 4);
        assert_eq!(extraction.walk_batch_size, 1);

        let policy = config.retry_policy();
        assert_eq!(policy.interval, Duration::from_millis(50));
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[("PORT", "not-a-port"), ("LOG_FORMAT", "xml")]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_default_category_table_without_file() {
        let config = config_from(&[]);
        let table = config.load_categories().unwrap();
        assert_eq!(table.classify("Basic Wall"), "Walls");
    }

    #[test]
    fn test_category_table_from_file() {
        let path = std::env::temp_dir().join(format!("bim-table-categories-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "categories": [{ "name": "Pipes", "role": "parent", "patterns": ["pipe"] }] }"#,
        )
        .unwrap();

        let config = config_from(&[("CATEGORIES_FILE", path.to_str().unwrap())]);
        let table = config.load_categories().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(table.classify("PipeSegment"), "Pipes");
        assert_eq!(table.classify("Basic Wall"), bim_table_core::UNCATEGORIZED);
    }

    #[test]
    fn test_missing_category_file_is_an_error() {
        let config = config_from(&[("CATEGORIES_FILE", "/nonexistent/categories.json")]);
        assert!(config.load_categories().is_err());
    }
}
