// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Field access over schema-less node records.
//!
//! A record holds fields in three places: structural groups (fixed names such
//! as `"Identity Data"` or property sets such as `Pset_WallCommon`), the flat
//! `parameters` bag, and plain scalars on the record itself. [`visit_fields`]
//! walks all of them in document order and tags each field with the
//! [`ParameterGroup`] it was found in. Both element normalization and
//! parameter discovery go through it, so first-occurrence rules agree.

use crate::config::ExtractionConfig;
use crate::value::{coerce, is_envelope, ValueType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Display name of fields found directly on the record.
pub const TOP_LEVEL_GROUP: &str = "Top Level";

/// Display name of fields found in the flat parameter bag.
pub const PARAMETERS_GROUP: &str = "Parameters";

/// Where a field was found on a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "camelCase")]
pub enum ParameterGroup {
    /// One of the configured fixed groups.
    Fixed(String),
    /// A group whose name carries a property-set prefix.
    PropertySet(String),
    /// The flat, ungrouped parameter bag.
    Parameters,
    /// A scalar directly on the record.
    TopLevel,
}

impl ParameterGroup {
    /// Name shown as the column's source group.
    pub fn display_name(&self) -> &str {
        match self {
            ParameterGroup::Fixed(name) | ParameterGroup::PropertySet(name) => name,
            ParameterGroup::Parameters => PARAMETERS_GROUP,
            ParameterGroup::TopLevel => TOP_LEVEL_GROUP,
        }
    }

    /// Classify a record key as a structural group, if it is one.
    pub fn from_key(key: &str, config: &ExtractionConfig) -> Option<Self> {
        if key == config.parameter_bag_key {
            Some(ParameterGroup::Parameters)
        } else if config.is_fixed_group(key) {
            Some(ParameterGroup::Fixed(key.to_string()))
        } else if config.is_property_set(key) {
            Some(ParameterGroup::PropertySet(key.to_string()))
        } else {
            None
        }
    }
}

impl fmt::Display for ParameterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Stable column key for a field name: whitespace runs become `_`, then
/// lower-cased. `"Base Offset"` → `"base_offset"`.
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Visit every field of `record` in document order.
///
/// The callback receives the field's display name, its group and the raw
/// value (still possibly wrapped in an envelope).
pub fn visit_fields<'a, F>(record: &'a Map<String, Value>, config: &ExtractionConfig, mut visit: F)
where
    F: FnMut(&'a str, &ParameterGroup, &'a Value),
{
    for (key, value) in record {
        if config.is_reserved_key(key) {
            continue;
        }

        match (ParameterGroup::from_key(key, config), value) {
            (Some(group), Value::Object(members)) if !is_envelope(value, &config.unwrap_field) => {
                visit_group(members, &group, config, 0, &mut visit);
            }
            (Some(group), Value::Array(entries)) => {
                // Bags exported as a list of `{ name, value }` entries
                for entry in entries {
                    if let Some((name, inner)) = named_entry(entry, config) {
                        visit(name, &group, inner);
                    }
                }
            }
            (_, v) if is_scalar(v, config) => visit(key.as_str(), &ParameterGroup::TopLevel, v),
            _ => {}
        }
    }
}

fn visit_group<'a, F>(
    members: &'a Map<String, Value>,
    group: &ParameterGroup,
    config: &ExtractionConfig,
    depth: usize,
    visit: &mut F,
) where
    F: FnMut(&'a str, &ParameterGroup, &'a Value),
{
    for (key, value) in members {
        if let Some((name, inner)) = named_entry(value, config) {
            visit(name, group, inner);
            continue;
        }
        match value {
            Value::Object(nested) if !is_envelope(value, &config.unwrap_field) => {
                if depth < config.max_group_depth {
                    visit_group(nested, group, config, depth + 1, visit);
                }
            }
            _ => visit(key.as_str(), group, value),
        }
    }
}

/// A `{ "name": "Mark", "value": ... }` entry, as parameter bags are usually
/// exported. Returns the entry's own name and the envelope.
fn named_entry<'a>(value: &'a Value, config: &ExtractionConfig) -> Option<(&'a str, &'a Value)> {
    let obj = value.as_object()?;
    if !obj.contains_key(&config.unwrap_field) {
        return None;
    }
    let name = obj.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value))
}

fn is_scalar(value: &Value, config: &ExtractionConfig) -> bool {
    match value {
        Value::Object(_) => is_envelope(value, &config.unwrap_field),
        Value::Array(_) => false,
        _ => true,
    }
}

/// Which well-known field to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    Mark,
    Host,
}

/// Find a Mark or Host value on a record.
///
/// Precedence: a top-level field named by the configured keys, then the
/// preferred group (`Identity Data` for Mark, `Constraints` for Host), then
/// any other group in document order. Values are coerced to strings; empty
/// strings count as absent.
pub fn find_key_field(
    record: &Map<String, Value>,
    field: KeyField,
    config: &ExtractionConfig,
) -> Option<String> {
    let (keys, preferred) = match field {
        KeyField::Mark => (&config.mark_keys, config.mark_group.as_str()),
        KeyField::Host => (&config.host_keys, config.host_group.as_str()),
    };
    let wanted: Vec<String> = keys.iter().map(|k| normalize_key(k)).collect();
    let matches = |name: &str| wanted.iter().any(|w| *w == normalize_key(name));

    for key in keys {
        if let Some(found) = record.get(key).and_then(|v| as_key_string(v, config)) {
            return Some(found);
        }
    }

    let mut in_preferred = None;
    let mut elsewhere = None;
    visit_fields(record, config, |name, group, value| {
        if in_preferred.is_some() || !matches(name) {
            return;
        }
        let Some(found) = as_key_string(value, config) else {
            return;
        };
        if group.display_name() == preferred {
            in_preferred = Some(found);
        } else if elsewhere.is_none() && *group != ParameterGroup::TopLevel {
            elsewhere = Some(found);
        }
    });

    in_preferred.or(elsewhere)
}

fn as_key_string(value: &Value, config: &ExtractionConfig) -> Option<String> {
    coerce(value, Some(ValueType::String), &config.unwrap_field)
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect(record: &Value) -> Vec<(String, String)> {
        let config = ExtractionConfig::default();
        let mut out = Vec::new();
        visit_fields(record.as_object().unwrap(), &config, |name, group, _| {
            out.push((name.to_string(), group.display_name().to_string()));
        });
        out
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Base Offset"), "base_offset");
        assert_eq!(normalize_key("  Top  Constraint\t"), "top_constraint");
        assert_eq!(normalize_key("Mark"), "mark");
        assert_eq!(normalize_key("   "), "");
    }

    #[test]
    fn test_visits_groups_bag_and_top_level_in_order() {
        let record = json!({
            "id": "1",
            "speckle_type": "Wall",
            "Identity Data": { "Mark": "W1", "Comments": "" },
            "parameters": {
                "ABC_123": { "name": "Fire Rating", "value": "2h", "units": null }
            },
            "Pset_WallCommon": { "IsExternal": true },
            "children": [{ "id": "2" }],
            "displayValue": [{ "vertices": [] }],
            "renderMaterial": { "opacity": 1 }
        });
        assert_eq!(
            collect(&record),
            vec![
                ("id".into(), TOP_LEVEL_GROUP.into()),
                ("speckle_type".into(), TOP_LEVEL_GROUP.into()),
                ("Mark".into(), "Identity Data".into()),
                ("Comments".into(), "Identity Data".into()),
                ("Fire Rating".into(), PARAMETERS_GROUP.into()),
                ("IsExternal".into(), "Pset_WallCommon".into()),
            ]
        );
    }

    #[test]
    fn test_nested_objects_inside_group_are_flattened() {
        let record = json!({
            "Dimensions": { "Length": 4.2, "Profile": { "Width": 0.3, "Depth": { "value": 0.5 } } }
        });
        let names: Vec<_> = collect(&record).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Length", "Width", "Depth"]);
    }

    #[test]
    fn test_top_level_envelope_is_a_field() {
        let record = json!({ "Area": { "value": 12.5, "units": "m2" } });
        assert_eq!(collect(&record), vec![("Area".into(), TOP_LEVEL_GROUP.into())]);
    }

    #[test]
    fn test_bag_as_entry_list() {
        let record = json!({
            "parameters": [
                { "name": "Mark", "value": "B7" },
                { "name": "", "value": 1 },
                "junk"
            ]
        });
        assert_eq!(collect(&record), vec![("Mark".into(), PARAMETERS_GROUP.into())]);
    }

    #[test]
    fn test_mark_precedence() {
        let config = ExtractionConfig::default();

        let top = json!({ "Mark": "TOP", "Identity Data": { "Mark": "ID" } });
        assert_eq!(
            find_key_field(top.as_object().unwrap(), KeyField::Mark, &config).as_deref(),
            Some("TOP")
        );

        let grouped = json!({ "Other": { "Mark": "OTHER" }, "Identity Data": { "Mark": "ID" } });
        assert_eq!(
            find_key_field(grouped.as_object().unwrap(), KeyField::Mark, &config).as_deref(),
            Some("ID")
        );

        let elsewhere = json!({ "parameters": { "x": { "name": "Mark", "value": "P1" } } });
        assert_eq!(
            find_key_field(elsewhere.as_object().unwrap(), KeyField::Mark, &config).as_deref(),
            Some("P1")
        );
    }

    #[test]
    fn test_host_lookup_skips_empty_values() {
        let config = ExtractionConfig::default();
        let record = json!({ "Host": "  ", "Constraints": { "Host": { "value": "W1" } } });
        assert_eq!(
            find_key_field(record.as_object().unwrap(), KeyField::Host, &config).as_deref(),
            Some("W1")
        );

        let none = json!({ "Constraints": { "Base Offset": 0 } });
        assert_eq!(find_key_field(none.as_object().unwrap(), KeyField::Host, &config), None);
    }
}
