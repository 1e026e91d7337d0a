// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extraction configuration.
//!
//! Scene graphs coming out of different viewers and exporters disagree on
//! almost every key name, so everything the walker and the discovery engine
//! look up by name is listed here rather than hard-coded.

use serde::{Deserialize, Serialize};

/// Default maximum traversal depth below the root.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Default number of nodes the walker visits between yields.
pub const DEFAULT_WALK_BATCH_SIZE: usize = 200;

/// Default number of nodes discovery inspects between yields.
pub const DEFAULT_DISCOVERY_BATCH_SIZE: usize = 50;

/// Default name of the field that single-value envelopes carry.
pub const DEFAULT_UNWRAP_FIELD: &str = "value";

/// Key names and limits used while walking and normalizing raw nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionConfig {
    /// Nodes deeper than this (root = 0) are never visited.
    pub max_depth: usize,
    /// Nodes visited between two cooperative yields in the walker.
    pub walk_batch_size: usize,
    /// Nodes inspected between two cooperative yields in discovery.
    pub discovery_batch_size: usize,
    /// Field name of single-value envelopes (`{ "value": 3.2, "units": "m" }`).
    pub unwrap_field: String,
    /// Keys identifying a node, tried in order.
    pub id_keys: Vec<String>,
    /// Type indicator keys: the explicit type tag first, then fallbacks.
    pub type_keys: Vec<String>,
    /// Last-resort type indicator.
    pub category_key: String,
    /// Keys holding child collections.
    pub child_keys: Vec<String>,
    /// Keys holding an embedded record describing the same node.
    pub embedded_keys: Vec<String>,
    /// Field names that carry a parent's Mark.
    pub mark_keys: Vec<String>,
    /// Group searched for Mark before any other group.
    pub mark_group: String,
    /// Field names that carry a child's Host.
    pub host_keys: Vec<String>,
    /// Group searched for Host before any other group.
    pub host_group: String,
    /// Key of the flat, ungrouped parameter bag.
    pub parameter_bag_key: String,
    /// Structural groups every exporter agrees on.
    pub fixed_groups: Vec<String>,
    /// Prefixes marking a group as a property set (matched case-insensitively).
    pub property_set_prefixes: Vec<String>,
    /// How far discovery descends into nested objects inside a group.
    pub max_group_depth: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            walk_batch_size: DEFAULT_WALK_BATCH_SIZE,
            discovery_batch_size: DEFAULT_DISCOVERY_BATCH_SIZE,
            unwrap_field: DEFAULT_UNWRAP_FIELD.to_string(),
            id_keys: strings(&["id", "elementId"]),
            type_keys: strings(&["speckle_type", "type"]),
            category_key: "category".to_string(),
            child_keys: strings(&["children", "elements", "@elements", "Elements", "@Elements"]),
            embedded_keys: strings(&["model"]),
            mark_keys: strings(&["Mark", "mark"]),
            mark_group: "Identity Data".to_string(),
            host_keys: strings(&["Host", "host"]),
            host_group: "Constraints".to_string(),
            parameter_bag_key: "parameters".to_string(),
            fixed_groups: strings(&[
                "Identity Data",
                "Constraints",
                "Dimensions",
                "Data",
                "Text",
                "Phasing",
                "Structural",
                "Construction",
                "Materials and Finishes",
                "Analytical Properties",
                "Graphics",
                "General",
                "Other",
            ]),
            property_set_prefixes: strings(&["Pset_", "Qto_"]),
            max_group_depth: 4,
        }
    }
}

impl ExtractionConfig {
    /// Whether `key` names a structural member of the node (children,
    /// embedded records, internal bookkeeping) rather than a field.
    pub fn is_reserved_key(&self, key: &str) -> bool {
        key.starts_with("__")
            || self.child_keys.iter().any(|k| k == key)
            || self.embedded_keys.iter().any(|k| k == key)
    }

    /// Whether `name` is one of the configured fixed groups.
    pub fn is_fixed_group(&self, name: &str) -> bool {
        self.fixed_groups.iter().any(|g| g == name)
    }

    /// Whether `name` carries a property-set prefix.
    pub fn is_property_set(&self, name: &str) -> bool {
        self.property_set_prefixes.iter().any(|prefix| {
            name.len() > prefix.len()
                && name.is_char_boundary(prefix.len())
                && name[..prefix.len()].eq_ignore_ascii_case(prefix)
        })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
