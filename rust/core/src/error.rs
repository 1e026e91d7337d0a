// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the extraction pipeline.

use crate::category::CategoryRole;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning a scene graph into table rows.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source tree was not available after the retry budget was spent.
    #[error("source tree unavailable after {attempts} attempt(s)")]
    SourceUnavailable { attempts: u32 },

    /// The root of the scene graph is not something the walker can traverse.
    #[error("invalid root node: {0}")]
    InvalidRoot(String),

    /// A single node failed normalization. Absorbed by the walker and
    /// recorded in the extraction statistics.
    #[error("malformed node {node}: {reason}")]
    MalformedNode { node: String, reason: String },

    /// Nodes were visited but none of them produced a usable element.
    #[error("no usable elements extracted ({total_nodes} nodes visited, {skipped_nodes} skipped)")]
    EmptyResult {
        total_nodes: usize,
        skipped_nodes: usize,
    },

    /// Parameter discovery hit a record it could not walk.
    #[error("{role} parameter discovery failed in batch {batch} at node {node}: {reason}")]
    DiscoveryFailure {
        role: CategoryRole,
        batch: usize,
        node: String,
        reason: String,
    },
}

impl Error {
    /// Whether running the pipeline again may succeed without any change to
    /// the inputs.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::SourceUnavailable { .. })
    }
}
