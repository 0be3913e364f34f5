//! Broker side: decode each message, run it through the coordinator, forward when
//! the analysis calls for it.

use crate::coordinator::IngestionCoordinator;
use crate::reading::{PayloadSchema, SensorPayload};
use crate::sink::AlertSink;
use futures::StreamExt;
use sentinel_core::INGEST_METRICS;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Rejected,
    Evaluated { forwarded: bool },
    DeliveryFailed,
}

#[derive(Clone)]
pub struct IngestWorker {
    coordinator: Arc<IngestionCoordinator>,
    sink: Arc<dyn AlertSink>,
    schema: PayloadSchema,
}

impl IngestWorker {
    pub fn new(coordinator: Arc<IngestionCoordinator>, sink: Arc<dyn AlertSink>, schema: PayloadSchema) -> Self {
        Self { coordinator, sink, schema }
    }

    pub fn coordinator(&self) -> &IngestionCoordinator { &self.coordinator }

    pub async fn handle(&self, bytes: &[u8]) -> HandleOutcome {
        INGEST_METRICS.payloads_total.inc();
        let payload = match SensorPayload::decode(bytes, &self.schema) {
            Ok(p) => p,
            Err(e) => {
                INGEST_METRICS.rejected_total.with_label_values(&[e.reason()]).inc();
                warn!(target: "anomaly.ingest", error = %e, "payload rejected");
                return HandleOutcome::Rejected;
            }
        };

        // Baseline locks are released once process_payload returns.
        let analysis = self.coordinator.process_payload(&payload);
        if !analysis.should_forward() { return HandleOutcome::Evaluated { forwarded: false }; }

        let alert = analysis.enriched();
        match self.sink.deliver(&alert).await {
            Ok(()) => {
                INGEST_METRICS.forwarded_total.inc();
                info!(target: "anomaly.ingest", entity = %analysis.entity(), severity = %analysis.max_severity(), sink = self.sink.name(), "alert forwarded");
                HandleOutcome::Evaluated { forwarded: true }
            }
            Err(e) => {
                INGEST_METRICS.delivery_failures_total.inc();
                warn!(target: "anomaly.ingest", entity = %analysis.entity(), sink = self.sink.name(), error = %e, "alert delivery failed");
                HandleOutcome::DeliveryFailed
            }
        }
    }
}

/// Consumes `subject` in arrival order until the subscription closes.
pub async fn run_subscription(client: async_nats::Client, subject: String, worker: IngestWorker) -> anyhow::Result<()> {
    let mut sub = client.subscribe(subject.clone()).await?;
    info!(target: "anomaly.ingest", %subject, "subscribed");
    while let Some(msg) = sub.next().await {
        worker.handle(&msg.payload).await;
    }
    info!(target: "anomaly.ingest", %subject, "subscription ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use crate::sink::DeliveryError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;

    #[derive(Default)]
    struct Recorder { seen: Mutex<Vec<Value>>, fail: bool }

    #[async_trait]
    impl AlertSink for Recorder {
        async fn deliver(&self, alert: &Value) -> Result<(), DeliveryError> {
            self.seen.lock().push(alert.clone());
            if self.fail { Err(DeliveryError::Publish("down".into())) } else { Ok(()) }
        }
        fn name(&self) -> &str { "recorder" }
    }

    fn worker(sink: Arc<Recorder>) -> IngestWorker {
        let cfg = DetectionConfig::default();
        IngestWorker::new(Arc::new(IngestionCoordinator::new(&cfg)), sink, PayloadSchema::default())
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_without_state() {
        let sink = Arc::new(Recorder::default());
        let w = worker(sink.clone());
        assert_eq!(w.handle(b"{oops").await, HandleOutcome::Rejected);
        assert_eq!(w.handle(br#"{"N": 4}"#).await, HandleOutcome::Rejected);
        assert!(w.coordinator().store().is_empty());
        assert!(sink.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn forwards_enriched_payload() {
        let sink = Arc::new(Recorder::default());
        let w = worker(sink.clone());
        assert_eq!(w.handle(br#"{"device_id":"d","N":100}"#).await, HandleOutcome::Evaluated { forwarded: false });
        assert_eq!(w.handle(br#"{"device_id":"d","N":200}"#).await, HandleOutcome::Evaluated { forwarded: true });
        let seen = sink.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["anomaly_analysis"]["N"]["anomalies_detected"][0]["method"], "change_rate");
    }

    #[tokio::test]
    async fn failed_delivery_keeps_baseline() {
        let sink = Arc::new(Recorder { fail: true, ..Recorder::default() });
        let w = worker(sink.clone());
        w.handle(br#"{"device_id":"d","N":100}"#).await;
        assert_eq!(w.handle(br#"{"device_id":"d","N":300}"#).await, HandleOutcome::DeliveryFailed);
        assert_eq!(w.coordinator().store().window("d", "N"), vec![100.0, 300.0]);
        assert_eq!(sink.seen.lock().len(), 1);
    }
}
