// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tree walker - depth-first extraction of normalized elements from a raw
//! scene graph.
//!
//! The walk is pre-order and iterative, so traversal order (and with it the
//! duplicate-id guard and every counter) is the same on every run over the
//! same tree. After each batch of visited nodes the walker yields to the
//! scheduler so a large model does not monopolise the host thread.

use crate::category::CategoryTable;
use crate::config::ExtractionConfig;
use crate::element::{identifier, normalize, type_indicator, ActiveParameters, NormalizedElement};
use crate::error::{Error, Result};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::borrow::Cow;

/// Counters of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    /// Candidate records seen (a node and a distinct embedded model count twice).
    pub total_nodes: usize,
    /// Records that became elements.
    pub processed_nodes: usize,
    /// Records without a type indicator, duplicates and malformed records.
    pub skipped_nodes: usize,
    /// Subset of `skipped_nodes` whose id had already been emitted.
    pub duplicate_nodes: usize,
    /// Nodes below the depth limit that were never visited.
    pub depth_limited_nodes: usize,
    /// Malformed records, in traversal order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<NodeIssue>,
}

/// A record that failed normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIssue {
    /// Identifier, or a path-like hint when the record has none.
    pub node: String,
    pub reason: String,
}

/// Progress snapshot reported after each walker batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkProgress {
    pub visited: usize,
    pub processed: usize,
    pub batch: usize,
}

/// Result of one walk.
///
/// Keeps the source record of every element (borrowed from the tree, or
/// owned when a node and its embedded model were merged) so parameter
/// discovery can see the original group structure.
#[derive(Debug, Clone)]
pub struct Extraction<'a> {
    pub elements: Vec<NormalizedElement>,
    pub records: Vec<Cow<'a, Value>>,
    pub stats: ExtractionStats,
}

impl Extraction<'_> {
    /// Pairs of element and source record.
    pub fn iter(&self) -> impl Iterator<Item = (&NormalizedElement, &Value)> {
        self.elements
            .iter()
            .zip(self.records.iter().map(|r| r.as_ref()))
    }
}

/// Progress callback shared across awaits.
pub type WalkProgressFn<'p> = &'p (dyn Fn(WalkProgress) + Send + Sync);

/// Depth-first element extractor.
pub struct TreeWalker<'c> {
    config: &'c ExtractionConfig,
    categories: &'c CategoryTable,
    active: &'c ActiveParameters,
    progress: Option<WalkProgressFn<'c>>,
}

enum Outcome {
    Extracted(NormalizedElement),
    Unqualified,
    Duplicate(String),
    Malformed(NodeIssue),
}

impl<'c> TreeWalker<'c> {
    pub fn new(
        config: &'c ExtractionConfig,
        categories: &'c CategoryTable,
        active: &'c ActiveParameters,
    ) -> Self {
        Self {
            config,
            categories,
            active,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: WalkProgressFn<'c>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Walk the tree under `root`.
    ///
    /// Only a root that is not an object fails the walk; every per-node
    /// problem is counted in [`ExtractionStats`] and skipped.
    pub async fn walk<'a>(&self, root: &'a Value) -> Result<Extraction<'a>> {
        if !root.is_object() {
            return Err(Error::InvalidRoot(format!(
                "expected an object, found {}",
                json_kind(root)
            )));
        }

        let batch_size = self.config.walk_batch_size.max(1);
        let mut stats = ExtractionStats::default();
        let mut elements = Vec::new();
        let mut records = Vec::new();
        let mut seen_ids: FxHashSet<String> = FxHashSet::default();

        let mut stack: Vec<(&'a Value, usize)> = vec![(root, 0)];
        let mut visited = 0usize;
        let mut batch = 0usize;

        while let Some((node, depth)) = stack.pop() {
            visited += 1;

            match node.as_object() {
                Some(obj) => {
                    for record in self.candidates(node, obj) {
                        stats.total_nodes += 1;
                        match self.extract(&record, &mut seen_ids) {
                            Outcome::Extracted(element) => {
                                stats.processed_nodes += 1;
                                elements.push(element);
                                records.push(record);
                            }
                            Outcome::Unqualified => stats.skipped_nodes += 1,
                            Outcome::Duplicate(id) => {
                                tracing::trace!(id = %id, "Skipping duplicate element");
                                stats.skipped_nodes += 1;
                                stats.duplicate_nodes += 1;
                            }
                            Outcome::Malformed(issue) => {
                                tracing::warn!(node = %issue.node, reason = %issue.reason, "Skipping malformed node");
                                stats.skipped_nodes += 1;
                                stats.issues.push(issue);
                            }
                        }
                    }

                    let children = self.child_collections(obj);
                    if depth < self.config.max_depth {
                        // Reverse so the first child is popped first (pre-order)
                        for collection in children.iter().rev() {
                            for child in collection.iter().rev() {
                                stack.push((child, depth + 1));
                            }
                        }
                    } else {
                        stats.depth_limited_nodes += children.iter().map(|c| c.len()).sum::<usize>();
                    }
                }
                None => {
                    stats.total_nodes += 1;
                    stats.skipped_nodes += 1;
                    let issue = NodeIssue {
                        node: format!("<{} at depth {}>", json_kind(node), depth),
                        reason: "node is not an object".to_string(),
                    };
                    tracing::warn!(node = %issue.node, "Skipping malformed node");
                    stats.issues.push(issue);
                }
            }

            if visited % batch_size == 0 {
                batch += 1;
                tracing::debug!(
                    batch,
                    visited,
                    processed = stats.processed_nodes,
                    pending = stack.len(),
                    "Walker batch complete"
                );
                if let Some(progress) = self.progress {
                    progress(WalkProgress {
                        visited,
                        processed: stats.processed_nodes,
                        batch,
                    });
                }
                tokio::task::yield_now().await;
            }
        }

        if let Some(progress) = self.progress {
            progress(WalkProgress {
                visited,
                processed: stats.processed_nodes,
                batch: batch + 1,
            });
        }

        if stats.depth_limited_nodes > 0 {
            tracing::debug!(
                depth_limited = stats.depth_limited_nodes,
                max_depth = self.config.max_depth,
                "Depth limit reached"
            );
        }

        Ok(Extraction {
            elements,
            records,
            stats,
        })
    }

    /// Records describing `node`: the node itself plus any embedded model.
    /// A model with the node's identifier is merged into one record.
    fn candidates<'a>(
        &self,
        node: &'a Value,
        obj: &'a Map<String, Value>,
    ) -> SmallVec<[Cow<'a, Value>; 2]> {
        let mut out = SmallVec::new();
        let embedded: SmallVec<[(&'a Value, &'a Map<String, Value>); 1]> = self
            .config
            .embedded_keys
            .iter()
            .filter_map(|key| obj.get(key))
            .filter_map(|v| v.as_object().map(|m| (v, m)))
            .collect();

        if embedded.is_empty() {
            out.push(Cow::Borrowed(node));
            return out;
        }

        let node_id = identifier(obj, self.config);
        let mut merged: Option<Map<String, Value>> = None;
        let mut separate: SmallVec<[&'a Value; 1]> = SmallVec::new();

        for (model_value, model) in embedded {
            let same_entity = node_id.is_some() && identifier(model, self.config) == node_id;
            if same_entity {
                let base = merged.get_or_insert_with(|| self.strip_embedded(obj));
                for (key, value) in model {
                    if !base.contains_key(key) && !self.config.is_reserved_key(key) {
                        base.insert(key.clone(), value.clone());
                    }
                }
            } else {
                separate.push(model_value);
            }
        }

        match merged {
            Some(record) => out.push(Cow::Owned(Value::Object(record))),
            None => out.push(Cow::Borrowed(node)),
        }
        out.extend(separate.into_iter().map(Cow::Borrowed));
        out
    }

    fn strip_embedded(&self, node: &Map<String, Value>) -> Map<String, Value> {
        node.iter()
            .filter(|(key, _)| !self.config.is_reserved_key(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Distinct child collections of a node and of its embedded records.
    fn child_collections<'a>(&self, node: &'a Map<String, Value>) -> SmallVec<[&'a Vec<Value>; 4]> {
        let mut collections: SmallVec<[&'a Vec<Value>; 4]> = SmallVec::new();
        let mut push_from = |record: &'a Map<String, Value>| {
            for key in &self.config.child_keys {
                if let Some(Value::Array(items)) = record.get(key) {
                    if !items.is_empty() && !collections.iter().any(|c| std::ptr::eq(*c, items)) {
                        collections.push(items);
                    }
                }
            }
        };

        push_from(node);
        for key in &self.config.embedded_keys {
            if let Some(model) = node.get(key).and_then(Value::as_object) {
                push_from(model);
            }
        }
        collections
    }

    fn extract(&self, record: &Value, seen_ids: &mut FxHashSet<String>) -> Outcome {
        let Some(record) = record.as_object() else {
            return Outcome::Malformed(NodeIssue {
                node: format!("<{}>", json_kind(record)),
                reason: "record is not an object".to_string(),
            });
        };
        let Some(type_name) = type_indicator(record, self.config) else {
            return Outcome::Unqualified;
        };

        match normalize(record, type_name, self.config, self.categories, self.active) {
            Ok(element) => {
                if seen_ids.insert(element.id.clone()) {
                    Outcome::Extracted(element)
                } else {
                    Outcome::Duplicate(element.id)
                }
            }
            Err(Error::MalformedNode { node, reason }) => Outcome::Malformed(NodeIssue { node, reason }),
            Err(other) => Outcome::Malformed(NodeIssue {
                node: "<unknown>".to_string(),
                reason: other.to_string(),
            }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
