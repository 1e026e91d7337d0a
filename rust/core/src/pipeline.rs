// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Table row assembly - the full `tree → rows + columns` pipeline.
//!
//! [`Pipeline::run`] is a pure function of its inputs: all intermediate
//! state is local to one invocation, and the output carries no timings or
//! generated ids, so running it twice over the same tree and selection
//! yields identical results.

use crate::category::{CategoryRole, CategoryTable};
use crate::config::ExtractionConfig;
use crate::discovery::{DiscoveryProgressFn, DiscoverySource, ParameterDescriptor, ParameterDiscovery};
use crate::element::{ActiveParameters, NormalizedElement};
use crate::error::{Error, Result};
use crate::relations::{resolve_relationships, TableRow};
use crate::source::{acquire_source, RetryPolicy, SourceProvider};
use crate::walker::{ExtractionStats, TreeWalker, WalkProgressFn};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

/// Categories selected for each side of the table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySelection {
    #[serde(default, rename = "parentCategories")]
    pub parent: Vec<String>,
    #[serde(default, rename = "childCategories")]
    pub child: Vec<String>,
}

impl CategorySelection {
    pub fn new<P, C>(parent: P, child: C) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            parent: parent.into_iter().map(Into::into).collect(),
            child: child.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty() && self.child.is_empty()
    }

    /// Whether a category is selected on either side.
    pub fn contains(&self, category: &str) -> bool {
        self.parent.iter().chain(&self.child).any(|c| c == category)
    }

    /// Categories selected for one role.
    pub fn for_role(&self, role: CategoryRole) -> &[String] {
        match role {
            CategoryRole::Parent => &self.parent,
            CategoryRole::Child => &self.child,
        }
    }
}

/// Output of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Elements in a selected category.
    pub filtered_elements: Vec<NormalizedElement>,
    /// Every extracted element.
    pub processed_elements: Vec<NormalizedElement>,
    pub table_rows: Vec<TableRow>,
    pub parent_columns: Vec<ParameterDescriptor>,
    pub child_columns: Vec<ParameterDescriptor>,
    pub is_complete: bool,
    pub stats: ExtractionStats,
}

/// Optional progress hooks for a run.
#[derive(Clone, Copy, Default)]
pub struct PipelineProgress<'p> {
    pub walk: Option<WalkProgressFn<'p>>,
    pub discovery: Option<DiscoveryProgressFn<'p>>,
}

/// The extraction pipeline with its read-only configuration.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: ExtractionConfig,
    categories: CategoryTable,
}

impl Pipeline {
    pub fn new(config: ExtractionConfig, categories: CategoryTable) -> Self {
        Self { config, categories }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    /// Run the pipeline over a tree.
    ///
    /// `active_parameters` limits which fields are extracted onto elements;
    /// `None` or an empty list extracts everything.
    pub async fn run(
        &self,
        tree: &Value,
        selection: &CategorySelection,
        active_parameters: Option<&[String]>,
    ) -> Result<PipelineResult> {
        self.run_with_progress(tree, selection, active_parameters, PipelineProgress::default())
            .await
    }

    pub async fn run_with_progress(
        &self,
        tree: &Value,
        selection: &CategorySelection,
        active_parameters: Option<&[String]>,
        progress: PipelineProgress<'_>,
    ) -> Result<PipelineResult> {
        let start = Instant::now();
        let active = active_parameters
            .map(ActiveParameters::new)
            .unwrap_or_default();

        tracing::info!(
            parent_categories = selection.parent.len(),
            child_categories = selection.child.len(),
            active_parameters = active_parameters.map_or(0, <[String]>::len),
            "Starting extraction pipeline"
        );

        let mut walker = TreeWalker::new(&self.config, &self.categories, &active);
        if let Some(walk_progress) = progress.walk {
            walker = walker.with_progress(walk_progress);
        }
        let extraction = walker.walk(tree).await?;
        let stats = extraction.stats.clone();

        if stats.total_nodes > 0 && stats.processed_nodes == 0 {
            tracing::warn!(
                total_nodes = stats.total_nodes,
                skipped_nodes = stats.skipped_nodes,
                "Extraction produced no elements"
            );
            return Err(Error::EmptyResult {
                total_nodes: stats.total_nodes,
                skipped_nodes: stats.skipped_nodes,
            });
        }

        // Discovery sees every extracted record and filters per role itself
        let sources: Vec<DiscoverySource<'_>> = extraction
            .iter()
            .map(|(element, record)| DiscoverySource {
                id: &element.id,
                category: &element.category,
                record,
            })
            .collect();

        let mut discovery = ParameterDiscovery::new(&self.config);
        if let Some(discovery_progress) = progress.discovery {
            discovery = discovery.with_progress(discovery_progress);
        }
        let (parent_columns, child_columns) = futures_util::future::try_join(
            discovery.discover(&sources, CategoryRole::Parent, &selection.parent),
            discovery.discover(&sources, CategoryRole::Child, &selection.child),
        )
        .await?;

        let selected: FxHashSet<&str> = selection
            .parent
            .iter()
            .chain(&selection.child)
            .map(String::as_str)
            .collect();
        let filtered_elements: Vec<NormalizedElement> = extraction
            .elements
            .iter()
            .filter(|e| selected.contains(e.category.as_str()))
            .cloned()
            .collect();

        let table_rows = resolve_relationships(&filtered_elements, selection);

        tracing::info!(
            total_nodes = stats.total_nodes,
            processed_nodes = stats.processed_nodes,
            skipped_nodes = stats.skipped_nodes,
            filtered = filtered_elements.len(),
            rows = table_rows.len(),
            parent_columns = parent_columns.len(),
            child_columns = child_columns.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Extraction pipeline complete"
        );

        Ok(PipelineResult {
            filtered_elements,
            processed_elements: extraction.elements,
            table_rows,
            parent_columns,
            child_columns,
            is_complete: true,
            stats,
        })
    }

    /// Acquire the current tree from `provider` (retrying per `policy`) and
    /// run the pipeline over it.
    pub async fn run_from_source(
        &self,
        provider: &dyn SourceProvider,
        policy: &RetryPolicy,
        selection: &CategorySelection,
        active_parameters: Option<&[String]>,
    ) -> Result<PipelineResult> {
        let tree = acquire_source(provider, policy).await?;
        self.run(&tree, selection, active_parameters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::UNGROUPED_ID;
    use serde_json::json;

    fn model() -> Value {
        json!({
            "id": "root",
            "children": [
                { "id": "1", "type": "Wall", "Mark": "W1" },
                { "id": "2", "type": "Beam", "Host": "W1" },
                { "id": "3", "type": "Beam", "Host": "W9" },
                { "id": "4", "type": "Floor", "Identity Data": { "Mark": "F1" } }
            ]
        })
    }

    #[tokio::test]
    async fn test_filtering_by_selection() {
        let pipeline = Pipeline::default();
        let selection = CategorySelection::new(["Walls"], ["Structural Framing"]);
        let result = pipeline.run(&model(), &selection, None).await.unwrap();

        assert!(result.is_complete);
        assert_eq!(result.processed_elements.len(), 4);
        assert_eq!(result.filtered_elements.len(), 3);
        assert_eq!(result.table_rows.len(), 2);
        assert_eq!(result.table_rows[0].details.len(), 1);
        assert_eq!(result.table_rows[1].element.id, UNGROUPED_ID);
        assert!(result.parent_columns.iter().any(|c| c.field == "mark"));
        assert!(result.child_columns.iter().any(|c| c.field == "host"));
    }

    #[tokio::test]
    async fn test_empty_selection_still_extracts() {
        let pipeline = Pipeline::default();
        let result = pipeline
            .run(&model(), &CategorySelection::default(), None)
            .await
            .unwrap();
        assert_eq!(result.processed_elements.len(), 4);
        assert!(result.filtered_elements.is_empty());
        assert!(result.table_rows.is_empty());
        assert!(result.parent_columns.is_empty());
        assert!(result.child_columns.is_empty());
    }

    #[tokio::test]
    async fn test_no_usable_elements_is_an_error() {
        let pipeline = Pipeline::default();
        let tree = json!({ "id": "root", "children": [{ "id": "a" }, { "name": "b" }] });
        let err = pipeline
            .run(&tree, &CategorySelection::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EmptyResult {
                total_nodes: 3,
                skipped_nodes: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_active_parameters_limit_element_fields_not_columns() {
        let pipeline = Pipeline::default();
        let selection = CategorySelection::new(["Walls", "Floors"], Vec::<String>::new());
        let active = vec!["Mark".to_string()];
        let result = pipeline.run(&model(), &selection, Some(&active)).await.unwrap();

        for element in &result.processed_elements {
            assert!(element.parameters.keys().all(|k| k == "mark"));
        }
        assert!(result.parent_columns.iter().any(|c| c.field == "id"));
    }

    #[test]
    fn test_selection_json_shape() {
        let selection: CategorySelection = serde_json::from_str(
            r#"{ "parentCategories": ["Walls"], "childCategories": ["Doors"] }"#,
        )
        .unwrap();
        assert_eq!(selection.for_role(CategoryRole::Parent), ["Walls".to_string()]);
        assert!(selection.contains("Doors"));
        assert!(!selection.contains("Roofs"));
    }
}
