//! Construction-time descriptors consumed by the graph builder.
//!
//! Descriptors are the immutable, behavior-free metadata an external
//! discovery collaborator hands to [`build`](crate::builder::build): one
//! [`StepDescriptor`] per declared unit of work and one [`IngestDescriptor`]
//! per external producer. They carry names, value shapes, and tuning hints,
//! never closures. Behavior is supplied separately at instantiation time via
//! the [`HandlerRegistry`](crate::runtime::HandlerRegistry).
//!
//! # Value shapes
//!
//! A [`ValueShape`] describes a value type semantically rather than
//! structurally: the unwrapped type name plus two independent flags,
//! *awaited* (the value arrives via a deferred computation) and
//! *is_collection* (the value is logically zero-or-more items). The builder
//! classifies each step's runtime kind from its output shape, and the
//! unwrapped type name is the join key that binds ingestion sources to entry
//! steps.

use serde::{Deserialize, Serialize};

/// Default number of concurrent workers per stage when a descriptor gives no
/// hint.
pub const DEFAULT_MAX_PARALLELISM: usize = 8;

/// Default bounded-queue capacity per stage when a descriptor gives no hint.
pub const DEFAULT_QUEUE_DEPTH: usize = 5;

/// Semantic descriptor of a value type.
///
/// The two flags are independent: an awaited collection
/// (`awaited && is_collection`) is a deferred computation yielding
/// zero-or-more items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueShape {
    /// The unwrapped (non-async, non-collection) type name.
    pub type_name: String,
    /// The value arrives via a deferred/awaited computation.
    pub awaited: bool,
    /// The value is logically zero-or-more items rather than exactly one.
    pub is_collection: bool,
}

impl ValueShape {
    /// A plain, synchronously produced single value.
    pub fn plain(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            awaited: false,
            is_collection: false,
        }
    }

    /// A single value produced by an awaited computation.
    pub fn awaited(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            awaited: true,
            is_collection: false,
        }
    }

    /// A synchronously produced collection of values.
    pub fn collection(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            awaited: false,
            is_collection: true,
        }
    }

    /// A collection produced by an awaited computation.
    pub fn awaited_collection(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            awaited: true,
            is_collection: true,
        }
    }

    /// The unwrapped type name, stripped of async/collection wrappers.
    pub fn unwrapped(&self) -> &str {
        &self.type_name
    }
}

/// One declared unit of work.
///
/// `successors` reference other steps *by name*; resolution happens in the
/// builder. A name with no matching step is silently dropped there, so
/// forward-declared or optional steps are tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    /// Unique name; the join key for successor references.
    pub name: String,
    /// Shape of the single input value each invocation receives.
    pub input: ValueShape,
    /// Shape of the produced value; `None` means the step produces nothing.
    pub output: Option<ValueShape>,
    /// Names of the steps that consume this step's output.
    pub successors: Vec<String>,
    /// The step accepts external submissions.
    pub is_entry: bool,
    /// The step's output is externally observable.
    pub is_exit: bool,
    /// Concurrent-worker bound hint; `None` or `Some(0)` means the default.
    pub max_parallelism: Option<usize>,
    /// Queue-capacity hint; `None` or `Some(0)` means the default.
    pub max_queue_depth: Option<usize>,
}

impl StepDescriptor {
    /// Creates a descriptor with no successors, no role flags, and default
    /// tuning.
    pub fn new(name: impl Into<String>, input: ValueShape, output: Option<ValueShape>) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            successors: Vec::new(),
            is_entry: false,
            is_exit: false,
            max_parallelism: None,
            max_queue_depth: None,
        }
    }

    /// Adds a declared successor name.
    pub fn with_successor(mut self, name: impl Into<String>) -> Self {
        self.successors.push(name.into());
        self
    }

    /// Marks the step as a pipeline submission point.
    pub fn entry(mut self) -> Self {
        self.is_entry = true;
        self
    }

    /// Marks the step as a pipeline observation point.
    pub fn exit(mut self) -> Self {
        self.is_exit = true;
        self
    }

    /// Overrides the concurrent-worker bound.
    pub fn with_max_parallelism(mut self, limit: usize) -> Self {
        self.max_parallelism = Some(limit);
        self
    }

    /// Overrides the queue capacity.
    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }

    /// The effective worker bound: the hint when positive, else the default.
    pub fn effective_parallelism(&self) -> usize {
        match self.max_parallelism {
            Some(limit) if limit > 0 => limit,
            _ => DEFAULT_MAX_PARALLELISM,
        }
    }

    /// The effective queue capacity: the hint when positive, else the
    /// default.
    pub fn effective_queue_depth(&self) -> usize {
        match self.max_queue_depth {
            Some(depth) if depth > 0 => depth,
            _ => DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// A named external producer that periodically yields values for an entry
/// step.
///
/// `priority` orders source startup only (ascending, ties broken by name);
/// it is not a runtime scheduling priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestDescriptor {
    /// Unique name among ingestion sources.
    pub name: String,
    /// Startup ordering, ascending.
    pub priority: i32,
    /// Shape of each produced value.
    pub produced: ValueShape,
    /// The producer yields a sequence rather than one awaited value per
    /// pull.
    pub is_stream: bool,
    /// The producer is independently schedulable (not bound to an
    /// instance).
    pub free_standing: bool,
}

impl IngestDescriptor {
    /// Creates a free-standing, awaited-single-value source.
    pub fn new(name: impl Into<String>, priority: i32, produced: ValueShape) -> Self {
        Self {
            name: name.into(),
            priority,
            produced,
            is_stream: false,
            free_standing: true,
        }
    }

    /// Marks the source as yielding a stream of values.
    pub fn streaming(mut self) -> Self {
        self.is_stream = true;
        self
    }

    /// Marks the source as instance-bound, i.e. not independently
    /// schedulable.
    pub fn instance_bound(mut self) -> Self {
        self.free_standing = false;
        self
    }
}
