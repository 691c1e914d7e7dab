// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use tether_graph::{
    ButtonConsumer, DeviceForwarder, DeviceId, DeviceSpec, FeatureKey, Grabber, InteractionGraph,
    Tool,
};

struct SilentTool {
    consumed: Vec<FeatureKey>,
    downs: u64,
}

impl SilentTool {
    fn consuming(consumed: Vec<FeatureKey>) -> Box<Self> {
        Box::new(Self { consumed, downs: 0 })
    }
}

impl Tool for SilentTool {
    fn class_name(&self) -> &str {
        "silent"
    }

    fn consumed_features(&self) -> &[FeatureKey] {
        &self.consumed
    }

    fn as_button_consumer(&mut self) -> Option<&mut dyn ButtonConsumer> {
        Some(self)
    }

    fn as_forwarder(&self) -> Option<&dyn DeviceForwarder> {
        Some(self)
    }
}

impl DeviceForwarder for SilentTool {
    // Every fabricated feature derives from the whole consumed set; good
    // enough to exercise chain walks.
    fn source_features(&self, _forwarded: FeatureKey) -> Vec<FeatureKey> {
        self.consumed.clone()
    }

    fn forwarded_features(&self, _source: FeatureKey) -> Vec<FeatureKey> {
        Vec::new()
    }
}

impl ButtonConsumer for SilentTool {
    fn button_down(&mut self, _key: FeatureKey) {
        self.downs += 1;
    }

    fn button_up(&mut self, _key: FeatureKey) {}
}

/// One ungrabbed base device plus `stages` stacked tools, each consuming the
/// previous stage's button and fabricating the next device.
fn build_chain(stages: usize) -> (InteractionGraph, DeviceId, FeatureKey) {
    let mut graph = InteractionGraph::new();
    let base = graph.add_device(DeviceSpec::new("base", 1, 0));
    assert!(graph.release_device(base, Grabber::Physical));
    let mut key = FeatureKey::button(base, 0);
    for stage in 0..stages {
        let tool = graph
            .add_tool(SilentTool::consuming(vec![key]))
            .expect("chain assignment is valid");
        let device = graph
            .add_virtual_device(tool, DeviceSpec::new(format!("stage-{stage}"), 1, 0))
            .expect("producer is live");
        key = FeatureKey::button(device, 0);
    }
    (graph, base, key)
}

fn bench_releveling(c: &mut Criterion) {
    let mut group = c.benchmark_group("grab_release_releveling");
    for stages in [8usize, 32, 128] {
        let (mut graph, base, _top) = build_chain(stages);
        let grabber = graph
            .add_tool(SilentTool::consuming(Vec::new()))
            .expect("empty assignment is valid");
        group.throughput(Throughput::Elements(stages as u64));
        group.bench_function(format!("stages_{stages}"), |b| {
            b.iter(|| {
                assert!(graph.acquire_device(black_box(base), Grabber::Tool(grabber)));
                assert!(graph.release_device(black_box(base), Grabber::Tool(grabber)));
            });
        });
    }
    group.finish();
}

fn bench_chain_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_build");
    for stages in [8usize, 32] {
        group.throughput(Throughput::Elements(stages as u64));
        group.bench_function(format!("stages_{stages}"), |b| {
            b.iter_with_large_drop(|| build_chain(black_box(stages)));
        });
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_dispatch");
    let (mut graph, base, _top) = build_chain(8);
    let key = FeatureKey::button(base, 0);
    group.throughput(Throughput::Elements(2));
    group.bench_function("press_release", |b| {
        b.iter(|| {
            graph.feature_pressed(black_box(key)).expect("key is live");
            graph.feature_released(black_box(key)).expect("key is live");
        });
    });
    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("root_resolution");
    for stages in [8usize, 32] {
        let (graph, _base, top) = build_chain(stages);
        group.bench_function(format!("stages_{stages}"), |b| {
            b.iter(|| graph.resolve_root_feature(black_box(top)));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_releveling,
    bench_chain_build,
    bench_dispatch,
    bench_resolution
);
criterion_main!(benches);
