use anomaly_engine::{
    run_subscription, AlertSink, EngineConfig, HttpAlertSink, IngestWorker, IngestionCoordinator, NatsAlertSink, PayloadSchema,
};
use anyhow::{Context, Result};
use sentinel_core::{clear_ready, init_tracing, load_settings, mark_ready, start_health_server};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("anomaly-engine")?;
    let cfg: EngineConfig = load_settings("anomaly-engine")?;
    cfg.validate().context("invalid configuration")?;

    let health = start_health_server(cfg.health_port).await?;
    info!(target: "anomaly-engine", %health, nats = %cfg.transport.nats_url, subject = %cfg.transport.input_subject, "starting");

    let nc = async_nats::connect(cfg.transport.nats_url.as_str()).await.context("nats connect")?;
    let sink: Arc<dyn AlertSink> = match &cfg.alert.http_endpoint {
        Some(url) => Arc::new(HttpAlertSink::new(url.clone(), Duration::from_millis(cfg.alert.timeout_ms))?),
        None => Arc::new(NatsAlertSink::new(nc.clone(), cfg.alert.subject.clone())),
    };
    info!(target: "anomaly-engine", sink = sink.name(), sensitivity = ?cfg.detection.sensitivity, "alert sink configured");

    let coordinator = Arc::new(IngestionCoordinator::new(&cfg.detection));
    let worker = IngestWorker::new(coordinator, sink, PayloadSchema::from(&cfg.ingest));
    let mut ingest = tokio::spawn(run_subscription(nc.clone(), cfg.transport.input_subject.clone(), worker));
    mark_ready();

    tokio::select! {
        res = &mut ingest => match res {
            Ok(Ok(())) => info!(target: "anomaly-engine", "subscription closed"),
            Ok(Err(e)) => error!(target: "anomaly-engine", error = %e, "subscription failed"),
            Err(e) => error!(target: "anomaly-engine", error = %e, "ingest task panicked"),
        },
        _ = tokio::signal::ctrl_c() => info!(target: "anomaly-engine", "shutdown_signal_received"),
    }
    clear_ready();
    ingest.abort();
    Ok(())
}
