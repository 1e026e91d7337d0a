// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parameter discovery - builds the column catalogue for one side of the
//! table from every field found on the selected population.
//!
//! Fields are deduplicated by normalized key. The first occurrence decides
//! the column's header, source group, type and category; later occurrences
//! are dropped, not merged. Work is split into fixed-size batches with a
//! yield between them.

use crate::category::CategoryRole;
use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use crate::fields::{normalize_key, visit_fields};
use crate::value::{coerce, looks_like_date, ParamValue, ValueType};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A discovered column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    /// Normalized key, unique within one discovery result.
    pub field: String,
    /// Field name as first seen.
    pub header: String,
    /// Display name of the group the field was first seen in.
    pub source_group: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Category of the node the field was first seen on.
    pub category: String,
}

/// One node offered to discovery.
#[derive(Debug, Clone, Copy)]
pub struct DiscoverySource<'r> {
    pub id: &'r str,
    pub category: &'r str,
    /// Raw record; anything other than an object fails discovery.
    pub record: &'r Value,
}

/// Progress snapshot reported after each discovery batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryProgress {
    pub role: CategoryRole,
    pub processed: usize,
    pub total: usize,
    pub batch: usize,
}

/// Progress callback shared across awaits.
pub type DiscoveryProgressFn<'p> = &'p (dyn Fn(DiscoveryProgress) + Send + Sync);

/// Batched parameter discovery.
///
/// Holds no state between runs, so the parent and child catalogues can be
/// discovered concurrently from the same engine.
pub struct ParameterDiscovery<'c> {
    config: &'c ExtractionConfig,
    progress: Option<DiscoveryProgressFn<'c>>,
}

impl<'c> ParameterDiscovery<'c> {
    pub fn new(config: &'c ExtractionConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: DiscoveryProgressFn<'c>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Discover the columns of every source whose category is in
    /// `categories`. No categories means no columns.
    pub async fn discover(
        &self,
        sources: &[DiscoverySource<'_>],
        role: CategoryRole,
        categories: &[String],
    ) -> Result<Vec<ParameterDescriptor>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let selected: FxHashSet<&str> = categories.iter().map(String::as_str).collect();
        let population: Vec<&DiscoverySource<'_>> = sources
            .iter()
            .filter(|s| selected.contains(s.category))
            .collect();

        let batch_size = self.config.discovery_batch_size.max(1);
        let total = population.len();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut descriptors = Vec::new();
        let mut processed = 0usize;

        for (batch, chunk) in population.chunks(batch_size).enumerate() {
            for source in chunk {
                self.discover_node(source, &mut seen, &mut descriptors)
                    .map_err(|reason| Error::DiscoveryFailure {
                        role,
                        batch,
                        node: source.id.to_string(),
                        reason,
                    })?;
            }

            processed += chunk.len();
            tracing::debug!(
                role = %role,
                batch,
                processed,
                total,
                columns = descriptors.len(),
                "Discovery batch complete"
            );
            if let Some(progress) = self.progress {
                progress(DiscoveryProgress {
                    role,
                    processed,
                    total,
                    batch,
                });
            }
            tokio::task::yield_now().await;
        }

        Ok(descriptors)
    }

    fn discover_node(
        &self,
        source: &DiscoverySource<'_>,
        seen: &mut FxHashSet<String>,
        descriptors: &mut Vec<ParameterDescriptor>,
    ) -> std::result::Result<(), String> {
        let record = source
            .record
            .as_object()
            .ok_or_else(|| "record is not an object".to_string())?;

        visit_fields(record, self.config, |name, group, value| {
            let field = normalize_key(name);
            if field.is_empty() || seen.contains(&field) {
                return;
            }
            seen.insert(field.clone());
            descriptors.push(ParameterDescriptor {
                field,
                header: name.trim().to_string(),
                source_group: group.display_name().to_string(),
                value_type: column_type(value, self.config),
                category: source.category.to_string(),
            });
        });
        Ok(())
    }
}

/// Column type of a raw value. Nulls default to string; strings in ISO date
/// form are reported as dates.
pub fn column_type(value: &Value, config: &ExtractionConfig) -> ValueType {
    match coerce(value, None, &config.unwrap_field) {
        ParamValue::Null => ValueType::String,
        ParamValue::Bool(_) => ValueType::Boolean,
        ParamValue::Number(_) => ValueType::Number,
        ParamValue::String(s) if looks_like_date(&s) => ValueType::Date,
        ParamValue::String(_) => ValueType::String,
    }
}
