// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Response types for the API.

use bim_table_core::PipelineResult;
use serde::{Deserialize, Serialize};

/// Response of a one-shot extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    /// Cache key for this result (SHA256 of the request inputs).
    pub cache_key: String,
    pub result: PipelineResult,
    pub stats: ExtractStats,
}

/// Request-level statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractStats {
    /// Time spent in the pipeline (ms).
    pub total_time_ms: u64,
    /// Whether result was from cache.
    pub from_cache: bool,
}

/// Acknowledgement of a change handed to the snapshot service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    pub accepted: bool,
    /// Status of the published table at the time of the response.
    pub status: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bim_table_core::{CategorySelection, ParamValue, Pipeline};
    use serde_json::json;

    #[tokio::test]
    async fn test_stored_response_reads_back_unchanged() {
        let tree = json!({
            "id": "root",
            "elements": [
                {
                    "id": "1",
                    "type": "Basic Wall",
                    "Identity Data": { "Mark": "W1", "Comments": null },
                    "Dimensions": { "Length": { "value": 3.5, "units": "m" }, "Width": 2 },
                    "Constraints": { "Room Bounding": true, "Install Date": "2024-02-01" }
                },
                { "id": "2", "type": "Beam", "Host": "W1", "Dimensions": { "Cut Length": "12 mm" } },
                { "id": "3", "type": "Door", "Host": "W9", "Fire Rating": "42%" }
            ]
        });
        let result = Pipeline::default()
            .run(&tree, &CategorySelection::new(["Walls"], ["Structural Framing", "Doors"]), None)
            .await
            .unwrap();
        assert!(result.table_rows.iter().any(|row| row.is_ungrouped()));
        let wall = &result.table_rows[0].element;
        assert!(wall
            .parameters
            .values()
            .any(|p| matches!(p.fetched_value, ParamValue::Number(_))));

        let response = ExtractResponse {
            cache_key: "k".repeat(64),
            result,
            stats: ExtractStats {
                total_time_ms: 4,
                from_cache: false,
            },
        };
        let bytes = serde_json::to_vec(&response).unwrap();
        let read: ExtractResponse = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(read.result, response.result);
        assert_eq!(read.cache_key, response.cache_key);
        assert_eq!(read.stats.total_time_ms, 4);
    }
}
