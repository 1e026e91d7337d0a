// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Source acquisition - waiting for the host to publish a scene graph.
//!
//! The host environment may load the model asynchronously, so the first
//! request for a tree can arrive before one exists. [`acquire_source`] polls a
//! [`SourceProvider`] at a fixed interval until a tree shows up or the
//! attempt budget runs out.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Anything that can hand out the current scene graph.
pub trait SourceProvider: Send + Sync {
    /// The tree as of now, or `None` if nothing is loaded yet.
    fn current(&self) -> Option<Arc<Value>>;
}

/// A provider with a fixed tree (or none).
#[derive(Debug, Clone, Default)]
pub struct StaticSource(Option<Arc<Value>>);

impl StaticSource {
    pub fn new(tree: Value) -> Self {
        Self(Some(Arc::new(tree)))
    }

    pub fn empty() -> Self {
        Self(None)
    }
}

impl SourceProvider for StaticSource {
    fn current(&self) -> Option<Arc<Value>> {
        self.0.clone()
    }
}

/// The receiving side of a channel the host publishes trees on.
impl SourceProvider for watch::Receiver<Option<Arc<Value>>> {
    fn current(&self) -> Option<Arc<Value>> {
        self.borrow().clone()
    }
}

/// How long to wait for a source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    #[serde(rename = "intervalMs", with = "millis")]
    pub interval: Duration,
    /// Total number of checks, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Check once and give up.
    pub fn no_retry() -> Self {
        Self::new(Duration::ZERO, 1)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Poll `provider` until it yields a tree.
///
/// Fails with [`Error::SourceUnavailable`] once `policy.max_attempts` checks
/// (at least one) have come back empty.
pub async fn acquire_source(provider: &dyn SourceProvider, policy: &RetryPolicy) -> Result<Arc<Value>> {
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        if let Some(tree) = provider.current() {
            if attempt > 1 {
                tracing::debug!(attempt, "Source tree became available");
            }
            return Ok(tree);
        }

        if attempt < attempts {
            tracing::debug!(
                attempt,
                max_attempts = attempts,
                interval_ms = policy.interval.as_millis() as u64,
                "Source tree not ready, retrying"
            );
            tokio::time::sleep(policy.interval).await;
        }
    }

    tracing::warn!(attempts, "Source tree unavailable");
    Err(Error::SourceUnavailable { attempts })
}
