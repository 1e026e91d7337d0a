// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request types for the API.

use bim_table_core::CategorySelection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `PUT /api/v1/selection`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    #[serde(flatten)]
    pub selection: CategorySelection,
    /// Fields to extract onto elements. Absent or empty means all.
    #[serde(default)]
    pub active_parameters: Option<Vec<String>>,
}

/// Query of `GET /api/v1/table`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TableQuery {
    /// Hold the request until a run settles.
    #[serde(default)]
    pub wait: bool,
    /// Oldest generation the waiter accepts.
    pub after: Option<u64>,
}

/// Body of `POST /api/v1/extract`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    /// Root of the scene graph.
    pub tree: Value,
    #[serde(flatten)]
    pub selection: CategorySelection,
    #[serde(default)]
    pub active_parameters: Option<Vec<String>>,
    /// Skip cache lookup if true.
    #[serde(default)]
    pub skip_cache: bool,
}

impl ExtractRequest {
    /// The inputs that determine the result, for cache keying.
    pub fn key(&self) -> ExtractKey<'_> {
        ExtractKey {
            tree: &self.tree,
            selection: &self.selection,
            active_parameters: self.active_parameters.as_deref(),
        }
    }
}

/// Everything the pipeline output depends on.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractKey<'a> {
    pub tree: &'a Value,
    #[serde(flatten)]
    pub selection: &'a CategorySelection,
    pub active_parameters: Option<&'a [String]>,
}
