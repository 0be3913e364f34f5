use anomaly_engine::{
    AlertSink, CriticalBounds, DeliveryError, DetectionConfig, DetectorEngine, IngestWorker, IngestionCoordinator, PayloadSchema, Reading,
};
use async_trait::async_trait;
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

struct Discard;

#[async_trait]
impl AlertSink for Discard {
    async fn deliver(&self, _alert: &Value) -> Result<(), DeliveryError> { Ok(()) }
    fn name(&self) -> &str { "discard" }
}

fn window(n: usize) -> Vec<f64> { (0..n).map(|i| 50.0 + (i % 7) as f64 * 0.5).collect() }

fn evaluate_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_overhead");
    group.measurement_time(Duration::from_secs(5));
    let engine = DetectorEngine::default();
    let bounds = Some(CriticalBounds::new(10.0, 150.0));
    let now = Utc::now();
    for n in [4usize, 20, 100] {
        let w = window(n);
        group.bench_with_input(BenchmarkId::new("detector_evaluate", n), &w, |b, w| {
            b.iter(|| black_box(engine.evaluate(black_box(120.0), "N", w, Some(50.0), bounds, now)))
        });
    }

    let coordinator = IngestionCoordinator::new(&DetectionConfig::default());
    let mut i = 0u64;
    group.bench_function("coordinator_process_reading", |b| {
        b.iter(|| {
            i += 1;
            let r = Reading::new(format!("dev-{}", i % 64), "temperature", 20.0 + (i % 11) as f64, now);
            black_box(coordinator.process_reading(&r))
        })
    });
    group.finish();
}

fn handle_payload(c: &mut Criterion) {
    let Ok(rt) = tokio::runtime::Runtime::new() else { return };
    let worker = IngestWorker::new(
        Arc::new(IngestionCoordinator::new(&DetectionConfig::default())),
        Arc::new(Discard),
        PayloadSchema::default(),
    );
    let payload = br#"{"device_id":"soil-1","edge_node":"edge-a","N":90,"P":42,"K":43,"temperature":20.8,"humidity":82.0,"ph":6.5,"rainfall":202.9}"#;
    c.bench_function("worker_handle_payload", |b| b.to_async(&rt).iter(|| worker.handle(payload)));
}

criterion_group!(benches, evaluate_overhead, handle_payload);
criterion_main!(benches);
