use std::hint::black_box;
use std::sync::Arc;

use common::Buffer2;
use criterion::{criterion_group, criterion_main, Criterion};

use sidus::config::{MeasurementConfig, SegmentationConfig};
use sidus::pipeline::Outbox;
use sidus::plugins::register_builtin_plugins;
use sidus::segmentation::Segmentation;
use sidus::task::TaskRegistry;
use sidus::{Frame, MemorySink, Pipeline, PipelineConfig, PluginManager, Threshold};

/// Regular grid of Gaussian stars, every third one blended with a neighbour.
fn star_grid(size: usize, spacing: usize) -> Frame {
    let mut stars = Vec::new();
    for (row, cy) in (spacing / 2..size).step_by(spacing).enumerate() {
        for (col, cx) in (spacing / 2..size).step_by(spacing).enumerate() {
            stars.push((cx as f32, cy as f32));
            if (row + col) % 3 == 0 {
                stars.push((cx as f32 + 4.0, cy as f32 + 1.0));
            }
        }
    }

    let mut image = Buffer2::new_filled(size, size, 0.0f32);
    for &(cx, cy) in &stars {
        let x0 = (cx as usize).saturating_sub(8);
        let y0 = (cy as usize).saturating_sub(8);
        for y in y0..(cy as usize + 8).min(size) {
            for x in x0..(cx as usize + 8).min(size) {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                *image.get_mut(x, y) += 10.0 * (-(dx * dx + dy * dy) / 4.5).exp();
            }
        }
    }
    Frame::new(Arc::new(image), Threshold::Constant(0.5)).unwrap()
}

fn bench_segmentation(c: &mut Criterion) {
    let frame = star_grid(1024, 24);
    let segmentation =
        Segmentation::new(&SegmentationConfig::default(), Arc::new(TaskRegistry::new())).unwrap();

    c.bench_function("segmentation_1024", |b| {
        b.iter(|| {
            let mut outbox = Outbox::new();
            segmentation.process_frame(black_box(&frame), &mut outbox);
            black_box(outbox.len());
        })
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let frame = star_grid(1024, 24);
    let config = PipelineConfig::default();
    let mut manager = PluginManager::new();
    register_builtin_plugins(&mut manager, &MeasurementConfig::default());
    let registries = manager.load().unwrap();
    let mut pipeline = Pipeline::new(config, registries).unwrap();

    c.bench_function("pipeline_1024", |b| {
        b.iter(|| {
            let mut sink = MemorySink::new();
            let diagnostics = pipeline.process_frame(black_box(&frame), &mut sink);
            black_box(diagnostics.sources_output);
        })
    });
}

criterion_group!(benches, bench_segmentation, bench_pipeline);
criterion_main!(benches);
