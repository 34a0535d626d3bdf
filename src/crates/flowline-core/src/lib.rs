//! # flowline-core: declarative step pipelines with a streaming runtime
//!
//! Describe a processing pipeline as a set of independently named **steps**,
//! each declaring which step(s) consume its output; flowline compiles that
//! declaration into a validated execution graph and runs it as a concurrent
//! streaming pipeline with bounded queues, per-stage parallelism limits,
//! automatic fan-out, backpressure, and graceful completion.
//!
//! ## Pipeline lifecycle
//!
//! ```text
//! descriptors ──► builder::build ──► PipelineDefinition + Diagnostics
//!                                          │
//!                                          ▼
//!                       PipelineInstance::instantiate (+ HandlerRegistry)
//!                                          │
//!                  submit / receive / run_ingestion / complete / await
//! ```
//!
//! - [`builder::build`] resolves successor names into a concrete directed
//!   graph, classifies each step's runtime kind from its declared output
//!   shape, synthesizes broadcast nodes for fan-out, and binds ingestion
//!   sources to entry nodes. The result is deterministic in the descriptor
//!   *set*: input order never changes ids, edges, or diagnostics.
//! - [`validator::validate`] reports structural problems as collected
//!   [`Diagnostic`]s. Only a pipeline without entry points is fatal;
//!   everything else is advisory and the pipeline runs normally.
//! - [`PipelineInstance`] runs one stage per node: a bounded queue plus a
//!   semaphore-limited worker pool. Full queues block submissions
//!   (backpressure); per-item handler failures are swallowed and logged,
//!   never escalated; completion propagates stage to stage until
//!   [`PipelineInstance::await_completion`] resolves.
//!
//! ## Quick start
//!
//! ```rust
//! use flowline_core::builder::build;
//! use flowline_core::descriptor::{StepDescriptor, ValueShape};
//! use flowline_core::runtime::{transform, HandlerRegistry, PipelineInstance};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let steps = vec![
//!     StepDescriptor::new("double", ValueShape::plain("i64"), Some(ValueShape::plain("i64")))
//!         .entry()
//!         .with_successor("stringify"),
//!     StepDescriptor::new("stringify", ValueShape::plain("i64"), Some(ValueShape::plain("String")))
//!         .exit(),
//! ];
//!
//! let outcome = build(&steps, &[]);
//! assert!(outcome.diagnostics.is_empty());
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_step(
//!     "double",
//!     transform(|v| async move { Ok(json!(v.as_i64().unwrap_or(0) * 2)) }),
//! );
//! registry.register_step(
//!     "stringify",
//!     transform(|v| async move { Ok(json!(v.to_string())) }),
//! );
//!
//! let pipeline = PipelineInstance::instantiate(&outcome.definition, &registry)?;
//! pipeline.submit_async(json!(21)).await?;
//! pipeline.complete();
//! pipeline.await_completion().await;
//!
//! assert_eq!(pipeline.try_receive()?, json!("42"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency contract
//!
//! Each stage owns its queue and worker pool exclusively; bounded queues
//! are the only synchronization between stages. Within one stage at most
//! `max_parallelism` items are processed concurrently with no cross-item
//! ordering guarantee; a stage with `max_parallelism == 1` processes
//! strictly in arrival order. Cancellation tokens interrupt only the
//! blocked operation they were passed to; pipeline-wide shutdown is driven
//! exclusively by completion propagation.

pub mod builder;
pub mod descriptor;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod runtime;
pub mod validator;

pub use builder::{build, BuildOutcome};
pub use descriptor::{IngestDescriptor, StepDescriptor, ValueShape};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use error::{BoxError, PipelineError, ReceiveError, Result, TryReceiveError};
pub use graph::{IngestBinding, IngestSource, NodeId, NodeKind, PipelineDefinition, StepNode};
pub use runtime::{HandlerRegistry, IngestProducer, PipelineInstance, StageState, StepOutput};
pub use validator::validate;
