//! Ingestion loops: independently scheduled producers feeding entry nodes.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::runtime::handlers::IngestProducer;
use crate::runtime::PipelineInstance;

const TRACING_TARGET: &str = "flowline::ingest";

/// One valid, bound source ready to run.
pub(crate) struct IngestPlan {
    pub(crate) name: String,
    pub(crate) entry: String,
    pub(crate) producer: Arc<dyn IngestProducer>,
}

/// Pull loop for one source. Ends when the producer is exhausted, the
/// cancellation signal fires, or the pipeline stops accepting submissions.
pub(crate) async fn run_source(
    pipeline: &PipelineInstance,
    plan: &IngestPlan,
    cancel: CancellationToken,
) {
    tracing::debug!(
        target: TRACING_TARGET,
        source = %plan.name,
        entry = %plan.entry,
        "ingestion source started"
    );

    loop {
        let pulled = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            value = plan.producer.next_value() => value,
        };
        let Some(value) = pulled else { break };

        // Routed through the submission path, so ingestion observes the
        // same backpressure and post-completion rejection as callers.
        let routed = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = pipeline.submit_async_to(&plan.entry, value) => result,
        };
        if !matches!(routed, Ok(true)) {
            break;
        }
    }

    tracing::debug!(target: TRACING_TARGET, source = %plan.name, "ingestion source stopped");
}
