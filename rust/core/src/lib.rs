// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # BIM-Table Core
//!
//! Turns a BIM scene graph (a JSON tree of objects with nested children and
//! loosely structured property groups) into a two-level table: parent
//! elements with their hosted child elements attached, plus the column
//! catalogue for each side.
//!
//! ## Overview
//!
//! - **Tree walking**: iterative pre-order traversal with a depth bound, a
//!   duplicate-id guard and cooperative yields between batches
//! - **Normalization**: flat elements with a category, a Mark, an optional
//!   Host and typed parameter values
//! - **Parameter discovery**: first-occurrence-wins column catalogues per
//!   table side
//! - **Relationship resolution**: children nested under the parent whose
//!   Mark equals their Host, orphans under a synthetic Ungrouped row
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bim_table_core::{CategorySelection, Pipeline};
//!
//! let pipeline = Pipeline::default();
//! let selection = CategorySelection::new(["Walls"], ["Structural Framing"]);
//! let result = pipeline.run(&tree, &selection, None).await?;
//!
//! for row in &result.table_rows {
//!     println!("{} ({} children)", row.element.mark, row.details.len());
//! }
//! ```
//!
//! ## Waiting for a source
//!
//! When the tree is published by a host that loads it asynchronously, hand
//! the pipeline a [`SourceProvider`] and a [`RetryPolicy`]:
//!
//! ```rust,ignore
//! let (tx, rx) = tokio::sync::watch::channel(None);
//! // ... the host later sends Some(Arc::new(tree)) on `tx`
//! let result = pipeline
//!     .run_from_source(&rx, &RetryPolicy::default(), &selection, None)
//!     .await?;
//! ```

pub mod category;
pub mod config;
pub mod discovery;
pub mod element;
pub mod error;
pub mod fields;
pub mod pipeline;
pub mod relations;
pub mod source;
pub mod value;
pub mod walker;

pub use category::{CategoryDef, CategoryRole, CategoryTable, UNCATEGORIZED};
pub use config::ExtractionConfig;
pub use discovery::{DiscoveryProgress, ParameterDescriptor, ParameterDiscovery};
pub use element::{ActiveParameters, NormalizedElement, ParameterMap};
pub use error::{Error, Result};
pub use fields::{normalize_key, ParameterGroup};
pub use pipeline::{CategorySelection, Pipeline, PipelineProgress, PipelineResult};
pub use relations::{resolve_relationships, TableRow, UNGROUPED_ID};
pub use source::{acquire_source, RetryPolicy, SourceProvider, StaticSource};
pub use value::{coerce, infer_type, ParamValue, ParameterValueState, ValueType};
pub use walker::{ExtractionStats, TreeWalker, WalkProgress};
