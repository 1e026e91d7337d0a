// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relationship resolution - nests child rows under parent rows by
//! Mark/Host.
//!
//! Matching is exact string equality between a child's Host and a parent's
//! Mark. Nothing is trimmed or case-folded here: a Host that differs from
//! every Mark only by case ends up in the Ungrouped row, where it is visible.

use crate::element::{NormalizedElement, ParameterMap};
use crate::pipeline::CategorySelection;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Fixed id of the synthetic row collecting orphaned children.
pub const UNGROUPED_ID: &str = "ungrouped";

/// Category of the synthetic row.
pub const UNGROUPED_CATEGORY: &str = "Ungrouped";

/// Type of the synthetic row.
pub const UNGROUPED_TYPE: &str = "Groups";

/// One table row: a parent with its children, or a child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    #[serde(flatten)]
    pub element: NormalizedElement,
    pub is_child: bool,
    /// Always empty for children.
    #[serde(default)]
    pub details: Vec<TableRow>,
}

impl TableRow {
    pub fn parent(element: NormalizedElement) -> Self {
        Self {
            element,
            is_child: false,
            details: Vec::new(),
        }
    }

    pub fn child(element: NormalizedElement) -> Self {
        Self {
            element,
            is_child: true,
            details: Vec::new(),
        }
    }

    /// Whether this is the synthetic Ungrouped row.
    pub fn is_ungrouped(&self) -> bool {
        !self.is_child && self.element.id == UNGROUPED_ID
    }
}

/// Attach children to parents.
///
/// Elements whose category is a selected child category are children; all
/// others are parents. When several parents share a Mark the last one owns
/// it. Children with no Host, or a Host matching no Mark, are collected
/// under one trailing Ungrouped row.
pub fn resolve_relationships(
    elements: &[NormalizedElement],
    selection: &CategorySelection,
) -> Vec<TableRow> {
    let child_categories: FxHashSet<&str> =
        selection.child.iter().map(String::as_str).collect();

    let (children, parents): (Vec<&NormalizedElement>, Vec<&NormalizedElement>) = elements
        .iter()
        .partition(|e| child_categories.contains(e.category.as_str()));

    let mut by_mark: FxHashMap<&str, usize> = FxHashMap::default();
    for (index, parent) in parents.iter().copied().enumerate() {
        by_mark.insert(parent.mark.as_str(), index);
    }

    let mut rows: Vec<TableRow> = parents
        .into_iter()
        .map(|p| TableRow::parent(p.clone()))
        .collect();

    let mut orphans = Vec::new();
    for child in children {
        let target = child
            .host
            .as_deref()
            .filter(|host| !host.is_empty())
            .and_then(|host| by_mark.get(host).copied());

        match target {
            Some(index) => rows[index].details.push(TableRow::child(child.clone())),
            None => orphans.push(TableRow::child(child.clone())),
        }
    }

    if !orphans.is_empty() {
        tracing::debug!(orphans = orphans.len(), "Children without a matching host");
        let mut ungrouped = TableRow::parent(ungrouped_element());
        ungrouped.details = orphans;
        rows.push(ungrouped);
    }

    rows
}

fn ungrouped_element() -> NormalizedElement {
    NormalizedElement {
        id: UNGROUPED_ID.to_string(),
        type_name: UNGROUPED_TYPE.to_string(),
        category: UNGROUPED_CATEGORY.to_string(),
        mark: UNGROUPED_CATEGORY.to_string(),
        host: None,
        parameters: ParameterMap::new(),
        children: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(id: &str, category: &str, mark: &str, host: Option<&str>) -> NormalizedElement {
        NormalizedElement {
            id: id.to_string(),
            type_name: category.to_string(),
            category: category.to_string(),
            mark: mark.to_string(),
            host: host.map(str::to_string),
            parameters: ParameterMap::new(),
            children: Vec::new(),
        }
    }

    fn selection() -> CategorySelection {
        CategorySelection {
            parent: vec!["Walls".to_string()],
            child: vec!["Doors".to_string()],
        }
    }

    #[test]
    fn test_children_attach_by_host() {
        let elements = vec![
            element("p1", "Walls", "A", None),
            element("p2", "Walls", "B", None),
            element("c1", "Doors", "c1", Some("A")),
            element("c2", "Doors", "c2", Some("A")),
            element("c3", "Doors", "c3", Some("Z")),
        ];
        let rows = resolve_relationships(&elements, &selection());

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].element.mark, "A");
        assert_eq!(rows[0].details.len(), 2);
        assert_eq!(rows[1].element.mark, "B");
        assert!(rows[1].details.is_empty());

        let ungrouped: Vec<_> = rows.iter().filter(|r| r.is_ungrouped()).collect();
        assert_eq!(ungrouped.len(), 1);
        assert_eq!(ungrouped[0].details.len(), 1);
        assert_eq!(ungrouped[0].details[0].element.host.as_deref(), Some("Z"));
        assert!(rows[0].details.iter().all(|c| c.is_child && c.details.is_empty()));
    }

    #[test]
    fn test_last_parent_wins_on_mark_collision() {
        let elements = vec![
            element("p1", "Walls", "A", None),
            element("p2", "Walls", "A", None),
            element("c1", "Doors", "c1", Some("A")),
        ];
        let rows = resolve_relationships(&elements, &selection());
        assert!(rows[0].details.is_empty());
        assert_eq!(rows[1].details.len(), 1);
    }

    #[test]
    fn test_matching_is_exact() {
        let elements = vec![
            element("p1", "Walls", "W1", None),
            element("c1", "Doors", "c1", Some("w1")),
            element("c2", "Doors", "c2", Some("W1 ")),
            element("c3", "Doors", "c3", None),
            element("c4", "Doors", "c4", Some("")),
        ];
        let rows = resolve_relationships(&elements, &selection());
        assert_eq!(rows.len(), 2);
        assert!(rows[0].details.is_empty());
        assert_eq!(rows[1].element.id, UNGROUPED_ID);
        assert_eq!(rows[1].details.len(), 4);
    }

    #[test]
    fn test_no_orphans_no_ungrouped_row() {
        let elements = vec![
            element("p1", "Walls", "W1", None),
            element("c1", "Doors", "c1", Some("W1")),
        ];
        let rows = resolve_relationships(&elements, &selection());
        assert_eq!(rows.len(), 1);
        assert!(!rows.iter().any(TableRow::is_ungrouped));
    }

    #[test]
    fn test_row_serialization_is_flat() {
        let rows = resolve_relationships(&[element("p1", "Walls", "W1", None)], &selection());
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["id"], "p1");
        assert_eq!(json["isChild"], false);
        assert_eq!(json["details"], serde_json::json!([]));
    }
}
