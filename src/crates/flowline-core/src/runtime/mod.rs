//! Execution runtime: turns a [`PipelineDefinition`] into a running
//! concurrent streaming pipeline.
//!
//! [`PipelineInstance::instantiate`] creates one [`Stage`](stage) per graph
//! node (a bounded queue plus a worker pool) and wires the stages per the
//! graph's edges. The instance then exposes:
//!
//! - **Submission**: [`submit`](PipelineInstance::submit) /
//!   [`submit_async`](PipelineInstance::submit_async) for single-entry
//!   pipelines, plus name-qualified `_to` forms for multi-entry pipelines.
//!   A blocked async submission is the backpressure mechanism: full
//!   downstream queues propagate stalls upstream.
//! - **Observation**: [`try_receive`](PipelineInstance::try_receive) /
//!   [`receive_async`](PipelineInstance::receive_async) (and `_from` forms)
//!   over the observable exit nodes, with end-of-stream distinguishable
//!   from a temporarily empty queue.
//! - **Ingestion**: [`run_ingestion`](PipelineInstance::run_ingestion)
//!   drives every valid bound source concurrently.
//! - **Lifecycle**: [`complete`](PipelineInstance::complete) begins the
//!   drain, [`await_completion`](PipelineInstance::await_completion)
//!   resolves when every stage finished.
//!
//! Instantiation fails only when the fatal no-entry-points diagnostic fired
//! (no stages are created) or a non-broadcast node has no registered
//! handler. All other diagnostics are advisory: the pipeline runs normally.
//!
//! Stages are spawned onto the ambient tokio runtime, so instantiation must
//! happen inside one.

pub mod handlers;

mod ingest;
mod stage;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, ReceiveError, Result, TryReceiveError};
use crate::graph::{IngestBinding, NodeKind, PipelineDefinition};
use crate::validator::validate;

pub use handlers::{
    action, producer_fn, transform, transform_many, HandlerRegistry, IngestProducer, StepHandler,
    StepOutput, StreamProducer,
};
pub use stage::StageState;

use ingest::IngestPlan;
use stage::Stage;

/// Tracing target for pipeline-level lifecycle.
const TRACING_TARGET: &str = "flowline::pipeline";

/// External submission port of one entry node. Closing the slot is how
/// `complete()` signals that no further external submissions will occur.
pub(crate) struct EntryPort {
    sender: RwLock<Option<mpsc::Sender<Value>>>,
}

impl EntryPort {
    fn new(sender: mpsc::Sender<Value>) -> Self {
        Self {
            sender: RwLock::new(Some(sender)),
        }
    }

    pub(crate) fn sender(&self) -> Option<mpsc::Sender<Value>> {
        self.sender.read().clone()
    }

    fn close(&self) {
        *self.sender.write() = None;
    }
}

/// Receive side of one observable exit node.
struct ExitPort {
    receiver: Mutex<mpsc::Receiver<Value>>,
}

/// Observable stage state, one per node.
struct StageMonitor {
    name: String,
    state: watch::Receiver<StageState>,
}

/// A running pipeline.
pub struct PipelineInstance {
    definition: PipelineDefinition,
    entries: HashMap<String, EntryPort>,
    exits: HashMap<String, ExitPort>,
    monitors: Vec<StageMonitor>,
    ingest_plans: Vec<IngestPlan>,
    sole_entry: Option<String>,
    sole_exit: Option<String>,
}

impl PipelineInstance {
    /// Instantiates every stage of the definition and wires them per its
    /// edges.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NoEntryPoints`] when the definition carries the
    /// fatal diagnostic (the returned error holds the full diagnostic set),
    /// or [`PipelineError::MissingHandler`] when a non-broadcast node has no
    /// handler registered.
    pub fn instantiate(
        definition: &PipelineDefinition,
        registry: &HandlerRegistry,
    ) -> Result<Self> {
        if !definition.has_any_input_types() {
            return Err(PipelineError::NoEntryPoints {
                diagnostics: validate(definition),
            });
        }

        // Resolve every handler up front so a missing one refuses the whole
        // instantiation instead of leaving a half-wired pipeline.
        let mut handlers = Vec::with_capacity(definition.step_nodes.len());
        for node in &definition.step_nodes {
            let handler = match node.kind {
                NodeKind::Broadcast => identity_handler(),
                _ => registry
                    .step(&node.name)
                    .ok_or_else(|| PipelineError::MissingHandler(node.name.clone()))?,
            };
            handlers.push(handler);
        }

        let mut senders = Vec::with_capacity(definition.step_nodes.len());
        let mut receivers = Vec::with_capacity(definition.step_nodes.len());
        for node in &definition.step_nodes {
            let (tx, rx) = mpsc::channel(node.max_queue_depth);
            senders.push(tx);
            receivers.push(rx);
        }

        let mut entries = HashMap::new();
        let mut exits = HashMap::new();
        let mut monitors = Vec::with_capacity(definition.step_nodes.len());

        for ((node, queue), handler) in definition
            .step_nodes
            .iter()
            .zip(receivers)
            .zip(handlers)
        {
            let downstream: Vec<mpsc::Sender<Value>> = node
                .successors
                .iter()
                .filter_map(|id| senders.get(*id))
                .cloned()
                .collect();

            let exit = if node.has_observable_output() {
                let (exit_tx, exit_rx) = mpsc::channel(node.max_queue_depth);
                exits.insert(
                    node.name.clone(),
                    ExitPort {
                        receiver: Mutex::new(exit_rx),
                    },
                );
                Some(exit_tx)
            } else {
                None
            };

            if node.is_entry {
                entries.insert(node.name.clone(), EntryPort::new(senders[node.id].clone()));
            }

            let (state_tx, state_rx) = watch::channel(StageState::Idle);
            monitors.push(StageMonitor {
                name: node.name.clone(),
                state: state_rx,
            });

            Stage {
                name: node.name.clone(),
                kind: node.kind,
                max_parallelism: node.max_parallelism,
                handler,
                queue,
                downstream,
                exit,
                state: Arc::new(state_tx),
            }
            .spawn();
        }
        // The stages now own the only inter-stage senders; dropping these
        // leaves entry ports as the sole external handles.
        drop(senders);

        let ingest_plans = Self::plan_ingestion(definition, registry);
        let sole_entry = single_key(&entries);
        let sole_exit = single_key(&exits);

        tracing::debug!(
            target: TRACING_TARGET,
            stages = definition.step_nodes.len(),
            entries = entries.len(),
            exits = exits.len(),
            sources = ingest_plans.len(),
            "pipeline instantiated"
        );

        Ok(Self {
            definition: definition.clone(),
            entries,
            exits,
            monitors,
            ingest_plans,
            sole_entry,
            sole_exit,
        })
    }

    /// Keeps every schedulable, bound source that has a registered
    /// producer, preserving the definition's (priority, name) startup
    /// order.
    fn plan_ingestion(
        definition: &PipelineDefinition,
        registry: &HandlerRegistry,
    ) -> Vec<IngestPlan> {
        let mut plans = Vec::new();
        for source in &definition.ingest_sources {
            if !source.is_schedulable() {
                continue;
            }
            let IngestBinding::Bound(target) = source.binding else {
                continue;
            };
            let Some(node) = definition.node(target) else {
                continue;
            };
            match registry.source(&source.name) {
                Some(producer) => plans.push(IngestPlan {
                    name: source.name.clone(),
                    entry: node.name.clone(),
                    producer,
                }),
                None => tracing::warn!(
                    target: TRACING_TARGET,
                    source = %source.name,
                    "no producer registered for ingestion source; skipping"
                ),
            }
        }
        plans
    }

    /// The definition this instance was built from.
    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Non-blocking submission to the sole entry node.
    ///
    /// Returns `Ok(false)` when the entry queue is full or the pipeline has
    /// already completed.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NoSingleEntry`] when the pipeline has more than one
    /// entry node; use [`submit_to`](Self::submit_to).
    pub fn submit(&self, value: Value) -> Result<bool> {
        let entry = self.sole_entry()?;
        self.submit_to(entry, value)
    }

    /// Non-blocking submission to a named entry node.
    pub fn submit_to(&self, entry: &str, value: Value) -> Result<bool> {
        let port = self
            .entries
            .get(entry)
            .ok_or_else(|| PipelineError::UnknownEntry(entry.to_string()))?;
        match port.sender() {
            Some(tx) => Ok(tx.try_send(value).is_ok()),
            None => Ok(false),
        }
    }

    /// Submission to the sole entry node, waiting for queue space.
    ///
    /// The wait is the backpressure path: it resolves once the entry queue
    /// has room. Returns `Ok(false)` when the pipeline has already
    /// completed.
    pub async fn submit_async(&self, value: Value) -> Result<bool> {
        let entry = self.sole_entry()?;
        self.submit_async_to(entry, value).await
    }

    /// Submission to a named entry node, waiting for queue space.
    pub async fn submit_async_to(&self, entry: &str, value: Value) -> Result<bool> {
        let port = self
            .entries
            .get(entry)
            .ok_or_else(|| PipelineError::UnknownEntry(entry.to_string()))?;
        let Some(tx) = port.sender() else {
            return Ok(false);
        };
        Ok(tx.send(value).await.is_ok())
    }

    /// Non-blocking receive from the sole observable exit node.
    ///
    /// [`TryReceiveError::Empty`] means the queue is temporarily empty;
    /// [`TryReceiveError::Completed`] means no further values will arrive.
    pub fn try_receive(&self) -> std::result::Result<Value, TryReceiveError> {
        match self.sole_exit {
            Some(ref exit) => self.try_receive_from(exit),
            None => Err(TryReceiveError::NoSingleExit(self.exits.len())),
        }
    }

    /// Non-blocking receive from a named exit node.
    pub fn try_receive_from(&self, exit: &str) -> std::result::Result<Value, TryReceiveError> {
        let port = self
            .exits
            .get(exit)
            .ok_or_else(|| TryReceiveError::UnknownExit(exit.to_string()))?;
        let mut receiver = port
            .receiver
            .try_lock()
            .map_err(|_| TryReceiveError::Empty)?;
        receiver.try_recv().map_err(|err| match err {
            mpsc::error::TryRecvError::Empty => TryReceiveError::Empty,
            mpsc::error::TryRecvError::Disconnected => TryReceiveError::Completed,
        })
    }

    /// Blocking receive from the sole observable exit node.
    ///
    /// Blocks while the exit queue is empty and the stage has not
    /// completed. A fired cancellation signal interrupts only this call and
    /// surfaces as [`ReceiveError::Cancelled`].
    pub async fn receive_async(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Value, ReceiveError> {
        match self.sole_exit {
            Some(ref exit) => self.receive_async_from(exit, cancel).await,
            None => Err(ReceiveError::NoSingleExit(self.exits.len())),
        }
    }

    /// Blocking receive from a named exit node.
    pub async fn receive_async_from(
        &self,
        exit: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Value, ReceiveError> {
        let port = self
            .exits
            .get(exit)
            .ok_or_else(|| ReceiveError::UnknownExit(exit.to_string()))?;
        let mut receiver = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ReceiveError::Cancelled),
            guard = port.receiver.lock() => guard,
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ReceiveError::Cancelled),
            value = receiver.recv() => value.ok_or(ReceiveError::Completed),
        }
    }

    /// Runs every valid ingestion source concurrently, routing each
    /// consumed value to its bound entry node through the submission path.
    ///
    /// Sources are started in (priority, name) order: startup ordering
    /// only, not a scheduling priority. Resolves once every source has
    /// completed or the cancellation signal fired.
    pub async fn run_ingestion(&self, cancel: CancellationToken) {
        let loops = self
            .ingest_plans
            .iter()
            .map(|plan| ingest::run_source(self, plan, cancel.clone()));
        futures::future::join_all(loops).await;
    }

    /// Signals that no further external submissions will occur, beginning
    /// the drain. Subsequent submissions return `Ok(false)`.
    pub fn complete(&self) {
        for port in self.entries.values() {
            port.close();
        }
        tracing::debug!(target: TRACING_TARGET, "pipeline completion requested");
    }

    /// Resolves once every stage has finished. Idempotent.
    pub async fn await_completion(&self) {
        for monitor in &self.monitors {
            let mut state = monitor.state.clone();
            let _ = state
                .wait_for(|s| matches!(s, StageState::Completed | StageState::Faulted))
                .await;
        }
    }

    /// Current state of a stage, by node name.
    pub fn stage_state(&self, name: &str) -> Option<StageState> {
        self.monitors
            .iter()
            .find(|m| m.name == name)
            .map(|m| *m.state.borrow())
    }

    fn sole_entry(&self) -> Result<&str> {
        self.sole_entry
            .as_deref()
            .ok_or(PipelineError::NoSingleEntry(self.entries.len()))
    }
}

/// Identity pass-through used by synthetic broadcast stages.
fn identity_handler() -> StepHandler {
    Arc::new(|value| Box::pin(async move { Ok(StepOutput::One(value)) }))
}

fn single_key<V>(map: &HashMap<String, V>) -> Option<String> {
    if map.len() == 1 {
        map.keys().next().cloned()
    } else {
        None
    }
}
