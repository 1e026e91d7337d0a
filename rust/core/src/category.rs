// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Category classification - maps raw type strings (`IfcWallStandardCase`,
//! `Objects.BuiltElements.Beam`, ...) onto display categories by keyword.
//!
//! Child categories are checked before parent categories: they are the more
//! specific ones, and a node matching both must land in the child bucket.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fallback category name. Never matched directly.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Which side of the parent/child table a category feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryRole {
    Parent,
    Child,
}

impl fmt::Display for CategoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryRole::Parent => f.write_str("parent"),
            CategoryRole::Child => f.write_str("child"),
        }
    }
}

/// One category and the keywords that select it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDef {
    pub name: String,
    pub role: CategoryRole,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl CategoryDef {
    pub fn new(name: &str, role: CategoryRole, patterns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            role,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Ordered category table. Declaration order is match order within a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CategoryTableDef", into = "CategoryTableDef")]
pub struct CategoryTable {
    categories: Vec<CategoryDef>,
    /// Lower-cased patterns, parallel to `categories`.
    lowered: Vec<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct CategoryTableDef {
    categories: Vec<CategoryDef>,
}

impl From<CategoryTableDef> for CategoryTable {
    fn from(def: CategoryTableDef) -> Self {
        CategoryTable::new(def.categories)
    }
}

impl From<CategoryTable> for CategoryTableDef {
    fn from(table: CategoryTable) -> Self {
        CategoryTableDef {
            categories: table.categories,
        }
    }
}

impl CategoryTable {
    /// Build a table. The Uncategorized sentinel is appended (or reset to an
    /// empty pattern list) so it can only ever be reached as a fallback.
    pub fn new(categories: Vec<CategoryDef>) -> Self {
        let mut categories: Vec<CategoryDef> = categories
            .into_iter()
            .filter(|c| !c.name.trim().is_empty())
            .collect();

        match categories.iter_mut().find(|c| c.name == UNCATEGORIZED) {
            Some(sentinel) => {
                sentinel.patterns.clear();
                sentinel.role = CategoryRole::Parent;
            }
            None => categories.push(CategoryDef::new(UNCATEGORIZED, CategoryRole::Parent, &[])),
        }

        let lowered = categories
            .iter()
            .map(|c| {
                c.patterns
                    .iter()
                    .map(|p| p.trim().to_lowercase())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .collect();

        Self {
            categories,
            lowered,
        }
    }

    /// Classify a raw type string.
    pub fn classify(&self, type_name: &str) -> &str {
        let type_lower = type_name.to_lowercase();
        if type_lower.is_empty() {
            return UNCATEGORIZED;
        }

        self.first_match(&type_lower, CategoryRole::Child)
            .or_else(|| self.first_match(&type_lower, CategoryRole::Parent))
            .unwrap_or(UNCATEGORIZED)
    }

    fn first_match(&self, type_lower: &str, role: CategoryRole) -> Option<&str> {
        self.categories
            .iter()
            .zip(&self.lowered)
            .filter(|(c, _)| c.role == role && c.name != UNCATEGORIZED)
            .find(|(_, patterns)| patterns.iter().any(|p| type_lower.contains(p.as_str())))
            .map(|(c, _)| c.name.as_str())
    }

    /// All categories, in declaration order.
    pub fn categories(&self) -> &[CategoryDef] {
        &self.categories
    }

    /// Names of the categories with the given role.
    pub fn names(&self, role: CategoryRole) -> impl Iterator<Item = &str> {
        self.categories
            .iter()
            .filter(move |c| c.role == role)
            .map(|c| c.name.as_str())
    }

    /// Role of a category by name.
    pub fn role_of(&self, name: &str) -> Option<CategoryRole> {
        self.categories.iter().find(|c| c.name == name).map(|c| c.role)
    }
}

impl Default for CategoryTable {
    /// Revit/IFC flavoured default table.
    fn default() -> Self {
        use CategoryRole::{Child, Parent};

        CategoryTable::new(vec![
            // Hosted and framing elements
            CategoryDef::new("Doors", Child, &["door"]),
            CategoryDef::new("Windows", Child, &["window"]),
            CategoryDef::new("Openings", Child, &["opening"]),
            CategoryDef::new("Structural Framing", Child, &["beam", "member", "framing", "brace"]),
            CategoryDef::new("Structural Rebar", Child, &["reinforcing", "rebar"]),
            CategoryDef::new("Fasteners", Child, &["fastener", "anchor"]),
            // Hosts
            CategoryDef::new("Walls", Parent, &["wall"]),
            CategoryDef::new("Floors", Parent, &["slab", "floor"]),
            CategoryDef::new("Roofs", Parent, &["roof"]),
            CategoryDef::new("Columns", Parent, &["column"]),
            CategoryDef::new("Foundations", Parent, &["footing", "pile", "foundation"]),
            CategoryDef::new("Stairs", Parent, &["stair"]),
            CategoryDef::new("Railings", Parent, &["railing"]),
            CategoryDef::new("Ceilings", Parent, &["ceiling", "covering"]),
            CategoryDef::new("Furniture", Parent, &["furniture", "furnishing"]),
            CategoryDef::new("Rooms", Parent, &["space", "room"]),
            CategoryDef::new("Levels", Parent, &["storey", "level"]),
            CategoryDef::new("Generic Models", Parent, &["proxy", "generic"]),
        ])
    }
}
