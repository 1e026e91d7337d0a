// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Normalized elements - the flat, typed form of one scene-graph node.

use crate::category::CategoryTable;
use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use crate::fields::{find_key_field, normalize_key, visit_fields, KeyField};
use crate::value::{coerce, unwrap_envelope, ParameterValueState};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parameters of one element, keyed by normalized field key.
pub type ParameterMap = BTreeMap<String, ParameterValueState>;

/// One extracted element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedElement {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub category: String,
    /// Join key for children. Falls back to `id`.
    pub mark: String,
    pub host: Option<String>,
    pub parameters: ParameterMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NormalizedElement>,
}

/// Normalized keys of the fields a caller wants extracted.
///
/// An empty selection means "everything discoverable".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveParameters {
    keys: FxHashSet<String>,
}

impl ActiveParameters {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: names
                .into_iter()
                .map(|n| normalize_key(n.as_ref()))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Whether a normalized key should be extracted.
    #[inline]
    pub fn wants(&self, key: &str) -> bool {
        self.keys.is_empty() || self.keys.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Type indicator of a record: explicit type tag, fallback type fields, then
/// the category field. `None` when the node does not qualify for extraction.
pub fn type_indicator(record: &Map<String, Value>, config: &ExtractionConfig) -> Option<String> {
    config
        .type_keys
        .iter()
        .chain(std::iter::once(&config.category_key))
        .filter_map(|key| record.get(key))
        .find_map(|v| text_of(v, config))
}

/// Identifier of a record. Numeric ids are accepted and rendered as text.
pub fn identifier(record: &Map<String, Value>, config: &ExtractionConfig) -> Option<String> {
    config
        .id_keys
        .iter()
        .filter_map(|key| record.get(key))
        .find_map(|v| text_of(v, config))
}

fn text_of(value: &Value, config: &ExtractionConfig) -> Option<String> {
    match unwrap_envelope(value, &config.unwrap_field) {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize a qualifying record into an element.
///
/// `type_name` is the record's type indicator (see [`type_indicator`]).
/// Fails with [`Error::MalformedNode`] when the record has no identifier.
pub fn normalize(
    record: &Map<String, Value>,
    type_name: String,
    config: &ExtractionConfig,
    categories: &CategoryTable,
    active: &ActiveParameters,
) -> Result<NormalizedElement> {
    let id = identifier(record, config).ok_or_else(|| Error::MalformedNode {
        node: format!("<{type_name}>"),
        reason: "missing identifier".to_string(),
    })?;

    let category = categories.classify(&type_name).to_string();
    let mark = find_key_field(record, KeyField::Mark, config).unwrap_or_else(|| id.clone());
    let host = find_key_field(record, KeyField::Host, config);

    let mut parameters = ParameterMap::new();
    visit_fields(record, config, |name, _group, value| {
        let key = normalize_key(name);
        if key.is_empty() || !active.wants(&key) || parameters.contains_key(&key) {
            return;
        }
        let coerced = coerce(value, None, &config.unwrap_field);
        parameters.insert(key, ParameterValueState::fetched(coerced));
    });

    Ok(NormalizedElement {
        id,
        type_name,
        category,
        mark,
        host,
        parameters,
        children: Vec::new(),
    })
}
