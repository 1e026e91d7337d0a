// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Snapshot service - keeps the published table in sync with the source tree.
//!
//! A single task owns the current selection and listens for three things: a
//! replaced source tree, a changed selection, and manual refreshes. Each of
//! them starts a new pipeline run under a fresh generation number; a result
//! is only published if its generation is still the latest, so a slow run can
//! never overwrite the output of a newer one. Failures publish a state
//! without data.

use crate::error::{pipeline_status, ApiError};
use bim_table_core::{CategorySelection, Pipeline, PipelineResult, RetryPolicy};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// What the table currently shows.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PipelineState {
    /// No source tree loaded.
    #[default]
    NoData,
    /// A run is in progress.
    Loading { generation: u64 },
    Ready {
        generation: u64,
        result: Arc<PipelineResult>,
    },
    /// The latest run failed; nothing is shown.
    Failed {
        generation: u64,
        error: String,
        code: &'static str,
        /// Re-running without changing anything may succeed.
        transient: bool,
    },
}

impl PipelineState {
    pub fn status(&self) -> &'static str {
        match self {
            PipelineState::NoData => "noData",
            PipelineState::Loading { .. } => "loading",
            PipelineState::Ready { .. } => "ready",
            PipelineState::Failed { .. } => "failed",
        }
    }

    pub fn generation(&self) -> Option<u64> {
        match self {
            PipelineState::NoData => None,
            PipelineState::Loading { generation }
            | PipelineState::Ready { generation, .. }
            | PipelineState::Failed { generation, .. } => Some(*generation),
        }
    }

    /// Whether the state is final for its generation.
    pub fn is_settled(&self) -> bool {
        !matches!(self, PipelineState::Loading { .. })
    }
}

#[derive(Debug)]
enum Command {
    SetSelection {
        selection: CategorySelection,
        active_parameters: Option<Vec<String>>,
    },
    Refresh,
}

struct RunOutcome {
    generation: u64,
    result: bim_table_core::Result<PipelineResult>,
}

/// Cloneable handle to the snapshot service.
///
/// The service stops once every handle has been dropped.
#[derive(Clone)]
pub struct SnapshotHandle {
    source: Arc<watch::Sender<Option<Arc<Value>>>>,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<PipelineState>,
}

impl SnapshotHandle {
    /// Replace the source tree. `None` clears it.
    pub fn replace_source(&self, tree: Option<Value>) {
        self.source.send_replace(tree.map(Arc::new));
    }

    pub fn has_source(&self) -> bool {
        self.source.borrow().is_some()
    }

    /// Change the category selection and active parameters, then re-run.
    pub async fn set_selection(
        &self,
        selection: CategorySelection,
        active_parameters: Option<Vec<String>>,
    ) -> Result<(), ApiError> {
        self.send(Command::SetSelection {
            selection,
            active_parameters,
        })
        .await
    }

    /// Re-run the pipeline with unchanged inputs.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.send(Command::Refresh).await
    }

    async fn send(&self, command: Command) -> Result<(), ApiError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ApiError::ServiceStopped)
    }

    /// The currently published state.
    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    /// Wait until a settled state is published.
    ///
    /// With `after`, a ready or failed state must also belong to that
    /// generation or a later one. `NoData` counts as settled once no source
    /// tree is pending. Returns the state current at `timeout` if nothing
    /// qualifying arrives by then.
    pub async fn wait_settled(&self, after: Option<u64>, timeout: Duration) -> Result<PipelineState, ApiError> {
        let mut rx = self.subscribe();
        let settled = |state: &PipelineState| {
            state.is_settled()
                && match state {
                    PipelineState::NoData => !self.has_source(),
                    _ => after.map_or(true, |min| state.generation().is_some_and(|g| g >= min)),
                }
        };

        let outcome = tokio::time::timeout(timeout, rx.wait_for(settled)).await;
        match outcome {
            Ok(Ok(state)) => Ok(state.clone()),
            Ok(Err(_)) => Err(ApiError::ServiceStopped),
            Err(_) => {
                tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Table wait timed out");
                Ok(self.state())
            }
        }
    }
}

struct SnapshotService {
    pipeline: Arc<Pipeline>,
    policy: RetryPolicy,
    source: watch::Receiver<Option<Arc<Value>>>,
    selection: CategorySelection,
    active_parameters: Option<Vec<String>>,
    state: watch::Sender<PipelineState>,
    generation: u64,
    running: Option<JoinHandle<()>>,
    results: mpsc::UnboundedSender<RunOutcome>,
}

/// Start the snapshot service on the current runtime.
pub fn spawn(pipeline: Arc<Pipeline>, policy: RetryPolicy, selection: CategorySelection) -> SnapshotHandle {
    let (source_tx, source_rx) = watch::channel(None);
    let (state_tx, state_rx) = watch::channel(PipelineState::NoData);
    let (command_tx, command_rx) = mpsc::channel(32);
    let (result_tx, result_rx) = mpsc::unbounded_channel();

    let service = SnapshotService {
        pipeline,
        policy,
        source: source_rx,
        selection,
        active_parameters: None,
        state: state_tx,
        generation: 0,
        running: None,
        results: result_tx,
    };
    tokio::spawn(service.run(command_rx, result_rx));

    SnapshotHandle {
        source: Arc::new(source_tx),
        commands: command_tx,
        state: state_rx,
    }
}

impl SnapshotService {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut results: mpsc::UnboundedReceiver<RunOutcome>,
    ) {
        tracing::debug!("Snapshot service started");

        loop {
            tokio::select! {
                changed = self.source.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let has_tree = self.source.borrow_and_update().is_some();
                    if has_tree {
                        self.trigger("source replaced");
                    } else {
                        self.clear();
                    }
                }
                command = commands.recv() => match command {
                    Some(Command::SetSelection { selection, active_parameters }) => {
                        self.selection = selection;
                        self.active_parameters = active_parameters;
                        self.trigger("selection changed");
                    }
                    Some(Command::Refresh) => self.trigger("manual refresh"),
                    None => break,
                },
                Some(outcome) = results.recv() => self.publish(outcome),
            }
        }

        if let Some(task) = self.running.take() {
            task.abort();
        }
        tracing::debug!("Snapshot service stopped");
    }

    /// Start a run under a new generation, superseding any run in flight.
    fn trigger(&mut self, reason: &'static str) {
        self.generation += 1;
        let generation = self.generation;
        if let Some(task) = self.running.take() {
            task.abort();
        }

        tracing::info!(
            generation,
            reason,
            parent_categories = self.selection.parent.len(),
            child_categories = self.selection.child.len(),
            "Re-running pipeline"
        );
        self.state.send_replace(PipelineState::Loading { generation });

        let pipeline = self.pipeline.clone();
        let source = self.source.clone();
        let policy = self.policy;
        let selection = self.selection.clone();
        let active = self.active_parameters.clone();
        let results = self.results.clone();

        self.running = Some(tokio::spawn(async move {
            let result = pipeline
                .run_from_source(&source, &policy, &selection, active.as_deref())
                .await;
            // The receiver only goes away when the service stops
            let _ = results.send(RunOutcome { generation, result });
        }));
    }

    fn clear(&mut self) {
        self.generation += 1;
        if let Some(task) = self.running.take() {
            task.abort();
        }
        tracing::info!(generation = self.generation, "Source cleared");
        self.state.send_replace(PipelineState::NoData);
    }

    fn publish(&mut self, outcome: RunOutcome) {
        if outcome.generation != self.generation {
            tracing::debug!(
                stale = outcome.generation,
                current = self.generation,
                "Discarding stale pipeline result"
            );
            return;
        }
        self.running = None;

        let generation = outcome.generation;
        let next = match outcome.result {
            Ok(result) => {
                tracing::info!(
                    generation,
                    rows = result.table_rows.len(),
                    elements = result.processed_elements.len(),
                    "Published table snapshot"
                );
                PipelineState::Ready {
                    generation,
                    result: Arc::new(result),
                }
            }
            Err(err) => {
                tracing::error!(generation, error = %err, "Pipeline run failed");
                PipelineState::Failed {
                    generation,
                    code: pipeline_status(&err).1,
                    transient: err.is_transient(),
                    error: err.to_string(),
                }
            }
        };
        self.state.send_replace(next);
    }
}
