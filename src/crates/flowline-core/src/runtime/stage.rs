//! The runtime embodiment of one step node: a bounded queue plus a worker
//! pool.
//!
//! Each stage owns its queue and workers exclusively; the bounded `mpsc`
//! channels between stages are the only synchronization connecting them.
//! Completion propagation rides channel closure: a stage holds a sender
//! clone into every successor queue and drops them when it completes, so a
//! stage whose `recv` returns `None` knows that all of its upstream edges
//! have signaled completion and its queue is empty.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;

use crate::graph::NodeKind;
use crate::runtime::handlers::{StepHandler, StepOutput};

/// Tracing target for stage lifecycle and per-item failures.
const TRACING_TARGET: &str = "flowline::stage";

/// Lifecycle of a stage.
///
/// `Faulted` is reachable only from an unrecoverable wiring failure, never
/// from a per-item handler error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Created but not yet running.
    Idle,
    /// Workers are pulling from the queue.
    Running,
    /// Upstream completed and the queue drained; waiting for in-flight
    /// workers.
    Draining,
    /// All work finished; completion propagated downstream.
    Completed,
    /// Stage wiring broke irrecoverably.
    Faulted,
}

/// One stage, ready to be spawned.
pub(crate) struct Stage {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) max_parallelism: usize,
    pub(crate) handler: StepHandler,
    pub(crate) queue: mpsc::Receiver<Value>,
    pub(crate) downstream: Vec<mpsc::Sender<Value>>,
    pub(crate) exit: Option<mpsc::Sender<Value>>,
    pub(crate) state: Arc<watch::Sender<StageState>>,
}

impl Stage {
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Dispatch loop: acquire a worker slot first, then pull one item and
    /// hand it to a worker task holding the slot. With one permit this
    /// processes strictly in arrival order.
    async fn run(self) {
        let Stage {
            name,
            kind,
            max_parallelism,
            handler,
            mut queue,
            downstream,
            exit,
            state,
        } = self;

        let _ = state.send(StageState::Running);
        tracing::debug!(target: TRACING_TARGET, stage = %name, "stage running");

        let workers = Arc::new(Semaphore::new(max_parallelism));
        let shared = Arc::new(WorkerContext {
            name,
            kind,
            handler,
            downstream,
            exit,
            state,
        });

        loop {
            let permit = match workers.clone().acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore is never closed; treat closure as shutdown.
                Err(_) => break,
            };
            match queue.recv().await {
                Some(item) => {
                    let ctx = Arc::clone(&shared);
                    tokio::spawn(async move {
                        ctx.process(item).await;
                        drop(ctx);
                        drop(permit);
                    });
                }
                None => break,
            }
        }

        let _ = shared.state.send(StageState::Draining);
        tracing::debug!(target: TRACING_TARGET, stage = %shared.name, "stage draining");

        // Wait for in-flight workers by reclaiming every permit.
        let permits = u32::try_from(max_parallelism).unwrap_or(u32::MAX);
        if let Ok(all) = workers.acquire_many(permits).await {
            drop(all);
        }

        let state = Arc::clone(&shared.state);
        let stage_name = shared.name.clone();
        // Dropping the worker context drops the downstream and exit senders,
        // which is the completion signal successors observe.
        drop(shared);

        if *state.borrow() != StageState::Faulted {
            let _ = state.send(StageState::Completed);
        }
        tracing::debug!(target: TRACING_TARGET, stage = %stage_name, "stage completed");
    }
}

struct WorkerContext {
    name: String,
    kind: NodeKind,
    handler: StepHandler,
    downstream: Vec<mpsc::Sender<Value>>,
    exit: Option<mpsc::Sender<Value>>,
    state: Arc<watch::Sender<StageState>>,
}

impl WorkerContext {
    async fn process(&self, item: Value) {
        match (self.handler)(item).await {
            Ok(output) => {
                // Classification is the contract: actions never emit.
                if self.kind == NodeKind::Action {
                    return;
                }
                match output {
                    StepOutput::None => {}
                    StepOutput::One(value) => self.forward(value).await,
                    StepOutput::Many(values) => {
                        for value in values {
                            self.forward(value).await;
                        }
                    }
                }
            }
            Err(error) => {
                // Swallow-and-continue: the item produced nothing and the
                // worker is free again. Never escalates.
                tracing::warn!(
                    target: TRACING_TARGET,
                    stage = %self.name,
                    error = %error,
                    "step failed; item dropped"
                );
            }
        }
    }

    async fn forward(&self, value: Value) {
        for tx in &self.downstream {
            if tx.send(value.clone()).await.is_err() {
                self.fault("successor queue closed while stage was running");
            }
        }
        if let Some(exit) = &self.exit {
            if exit.send(value).await.is_err() {
                self.fault("exit queue closed while stage was running");
            }
        }
    }

    fn fault(&self, reason: &str) {
        let _ = self.state.send(StageState::Faulted);
        tracing::error!(target: TRACING_TARGET, stage = %self.name, reason, "stage faulted");
    }
}
