//! Builder throughput: descriptor sets of increasing width.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use flowline_core::builder::build;
use flowline_core::descriptor::{StepDescriptor, ValueShape};

fn chain(width: usize) -> Vec<StepDescriptor> {
    (0..width)
        .map(|i| {
            let mut step = StepDescriptor::new(
                format!("step_{i:04}"),
                ValueShape::plain("Item"),
                Some(ValueShape::plain("Item")),
            );
            if i == 0 {
                step.is_entry = true;
            }
            if i + 1 == width {
                step.is_exit = true;
            } else {
                // Every other step fans out to exercise broadcast synthesis.
                step.successors.push(format!("step_{:04}", i + 1));
                if i % 2 == 0 && i + 2 < width {
                    step.successors.push(format!("step_{:04}", i + 2));
                }
            }
            step
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");
    for width in [16usize, 64, 256] {
        let steps = chain(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &steps, |b, steps| {
            b.iter(|| build(steps, &[]));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build);
criterion_main!(benches);
