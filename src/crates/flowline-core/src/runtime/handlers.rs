//! Behavior registration for pipeline instantiation.
//!
//! Descriptors are metadata only, so the runtime needs a separate channel
//! for behavior: a [`HandlerRegistry`] mapping step names to
//! [`StepHandler`]s and ingestion-source names to [`IngestProducer`]s.
//! Handlers receive one dequeued item and return a [`StepOutput`]; whatever
//! error they raise is swallowed and logged at the stage boundary, never
//! propagated.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::BoxError;

/// What one handler invocation produced.
#[derive(Debug, Clone)]
pub enum StepOutput {
    /// Nothing; the item was consumed.
    None,
    /// Exactly one output item.
    One(Value),
    /// Zero-or-more output items.
    Many(Vec<Value>),
}

/// A step's behavior: one dequeued item in, a [`StepOutput`] out.
pub type StepHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, std::result::Result<StepOutput, BoxError>> + Send + Sync>;

/// Wraps an async closure that consumes items and produces nothing.
pub fn action<F, Fut>(f: F) -> StepHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move |value| {
        let fut = f(value);
        Box::pin(async move { fut.await.map(|()| StepOutput::None) })
    })
}

/// Wraps an async closure that produces exactly one output per item.
pub fn transform<F, Fut>(f: F) -> StepHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, BoxError>> + Send + 'static,
{
    Arc::new(move |value| {
        let fut = f(value);
        Box::pin(async move { fut.await.map(StepOutput::One) })
    })
}

/// Wraps an async closure that produces zero-or-more outputs per item.
pub fn transform_many<F, Fut>(f: F) -> StepHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Vec<Value>, BoxError>> + Send + 'static,
{
    Arc::new(move |value| {
        let fut = f(value);
        Box::pin(async move { fut.await.map(StepOutput::Many) })
    })
}

/// An external producer feeding an entry node.
///
/// `next_value` blocks until the producer yields; returning `None` ends the
/// source and its ingestion loop.
#[async_trait]
pub trait IngestProducer: Send + Sync {
    /// Pulls the next value, or `None` when the source is exhausted.
    async fn next_value(&self) -> Option<Value>;
}

/// Adapts an async closure into an [`IngestProducer`].
pub fn producer_fn<F, Fut>(f: F) -> Arc<dyn IngestProducer>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Value>> + Send + 'static,
{
    struct FnProducer(Box<dyn Fn() -> BoxFuture<'static, Option<Value>> + Send + Sync>);

    #[async_trait]
    impl IngestProducer for FnProducer {
        async fn next_value(&self) -> Option<Value> {
            (self.0)().await
        }
    }

    Arc::new(FnProducer(Box::new(
        move || -> BoxFuture<'static, Option<Value>> { Box::pin(f()) },
    )))
}

/// Adapts a value stream into an [`IngestProducer`].
pub struct StreamProducer {
    inner: Mutex<BoxStream<'static, Value>>,
}

impl StreamProducer {
    /// Wraps any `Send` stream of values.
    pub fn new(stream: impl Stream<Item = Value> + Send + 'static) -> Self {
        Self {
            inner: Mutex::new(stream.boxed()),
        }
    }
}

#[async_trait]
impl IngestProducer for StreamProducer {
    async fn next_value(&self) -> Option<Value> {
        self.inner.lock().await.next().await
    }
}

/// Behavior for every step and ingestion source of one pipeline instance.
#[derive(Default)]
pub struct HandlerRegistry {
    steps: HashMap<String, StepHandler>,
    sources: HashMap<String, Arc<dyn IngestProducer>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for a step name, replacing any previous one.
    pub fn register_step(&mut self, name: impl Into<String>, handler: StepHandler) -> &mut Self {
        self.steps.insert(name.into(), handler);
        self
    }

    /// Registers the producer for an ingestion-source name.
    pub fn register_source(
        &mut self,
        name: impl Into<String>,
        producer: Arc<dyn IngestProducer>,
    ) -> &mut Self {
        self.sources.insert(name.into(), producer);
        self
    }

    pub(crate) fn step(&self, name: &str) -> Option<StepHandler> {
        self.steps.get(name).cloned()
    }

    pub(crate) fn source(&self, name: &str) -> Option<Arc<dyn IngestProducer>> {
        self.sources.get(name).cloned()
    }
}
