//! A small fan-out pipeline: one entry step broadcasting to two branches
//! that rejoin at a single exit.
//!
//! Run with: `cargo run --example simple_pipeline`

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use flowline_core::builder::build;
use flowline_core::descriptor::{StepDescriptor, ValueShape};
use flowline_core::error::ReceiveError;
use flowline_core::runtime::{transform, HandlerRegistry, PipelineInstance};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Start(entry) -> {scale, offset}; both -> report(exit).
    let steps = vec![
        StepDescriptor::new("start", ValueShape::plain("i64"), Some(ValueShape::plain("i64")))
            .entry()
            .with_successor("scale")
            .with_successor("offset"),
        StepDescriptor::new("scale", ValueShape::plain("i64"), Some(ValueShape::plain("i64")))
            .with_successor("report"),
        StepDescriptor::new("offset", ValueShape::plain("i64"), Some(ValueShape::plain("i64")))
            .with_successor("report"),
        StepDescriptor::new(
            "report",
            ValueShape::plain("i64"),
            Some(ValueShape::plain("String")),
        )
        .exit(),
    ];

    let outcome = build(&steps, &[]);
    for diagnostic in &outcome.diagnostics {
        eprintln!("diagnostic: {diagnostic}");
    }

    let mut registry = HandlerRegistry::new();
    registry.register_step(
        "start",
        transform(|v: Value| async move { Ok(v) }),
    );
    registry.register_step(
        "scale",
        transform(|v: Value| async move { Ok(json!(v.as_i64().unwrap_or(0) * 10)) }),
    );
    registry.register_step(
        "offset",
        transform(|v: Value| async move { Ok(json!(v.as_i64().unwrap_or(0) + 1)) }),
    );
    registry.register_step(
        "report",
        transform(|v: Value| async move { Ok(json!(format!("result = {v}"))) }),
    );

    let pipeline = PipelineInstance::instantiate(&outcome.definition, &registry)?;
    for i in 0..3 {
        pipeline.submit_async(json!(i)).await?;
    }
    pipeline.complete();

    // Drain while the pipeline finishes; each submission reaches the exit
    // twice, once per branch.
    let cancel = CancellationToken::new();
    loop {
        match pipeline.receive_async(&cancel).await {
            Ok(value) => println!("{value}"),
            Err(ReceiveError::Completed) => break,
            Err(other) => return Err(other.into()),
        }
    }

    pipeline.await_completion().await;
    Ok(())
}
