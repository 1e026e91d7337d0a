// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Benchmark of the extraction pipeline on synthetic scene graphs.
//!
//! Each level holds walls with hosted doors and windows, and every element
//! carries a few property groups and a parameter bag.
//!
//! Run with: cargo bench -p bim-table-server --bench pipeline

use bim_table_core::{CategorySelection, Pipeline};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

/// Generate a tree with `levels * walls_per_level` walls, each hosting two
/// children.
fn generate_tree(levels: usize, walls_per_level: usize) -> Value {
    let levels: Vec<Value> = (0..levels)
        .map(|level| {
            let walls: Vec<Value> = (0..walls_per_level)
                .map(|i| {
                    let mark = format!("W-{level}-{i}");
                    json!({
                        "id": format!("wall-{level}-{i}"),
                        "speckle_type": "Objects.BuiltElements.Wall",
                        "Identity Data": { "Mark": mark, "Comments": "" },
                        "Dimensions": {
                            "Length": { "value": 4.0 + i as f64 },
                            "Area": { "value": 12.5 }
                        },
                        "Pset_WallCommon": { "IsExternal": i % 2 == 0, "FireRating": "2h" },
                        "parameters": {
                            "p1": { "name": "Phase Created", "value": "New Construction" },
                            "p2": { "name": "Install Date", "value": "2024-03-01" }
                        },
                        "elements": [
                            {
                                "id": format!("door-{level}-{i}"),
                                "type": "Single-Flush Door",
                                "Constraints": { "Host": mark },
                                "Dimensions": { "Width": "0.9", "Height": "2.1" }
                            },
                            {
                                "id": format!("window-{level}-{i}"),
                                "type": "Fixed Window",
                                "Host": mark,
                                "Other": { "Sill Height": "35%" }
                            }
                        ]
                    })
                })
                .collect();
            json!({
                "id": format!("level-{level}"),
                "type": "Level",
                "elements": walls
            })
        })
        .collect();

    json!({ "id": "root", "name": "Synthetic model", "elements": levels })
}

fn bench_pipeline(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let pipeline = Pipeline::default();
    let selection = CategorySelection::new(["Walls"], ["Doors", "Windows"]);

    let mut group = c.benchmark_group("pipeline");

    for walls in [100, 1_000, 5_000] {
        let tree = generate_tree(10, walls / 10);
        // Each wall hosts two children
        group.throughput(Throughput::Elements((walls * 3) as u64));

        group.bench_with_input(BenchmarkId::new("run", walls), &tree, |b, tree| {
            b.to_async(&runtime)
                .iter(|| async { black_box(pipeline.run(tree, &selection, None).await.expect("run")) });
        });

        let active = vec!["Mark".to_string(), "Host".to_string()];
        group.bench_with_input(BenchmarkId::new("run_active_subset", walls), &tree, |b, tree| {
            b.to_async(&runtime).iter(|| async {
                black_box(pipeline.run(tree, &selection, Some(&active)).await.expect("run"))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
