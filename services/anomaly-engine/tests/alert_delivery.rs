use anomaly_engine::{
    AlertSink, DeliveryError, DetectionConfig, HandleOutcome, HttpAlertSink, IngestWorker, IngestionCoordinator, PayloadSchema, Sensitivity,
};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

type Inbox = Arc<Mutex<Vec<Value>>>;

async fn receive(State(inbox): State<Inbox>, Json(alert): Json<Value>) -> StatusCode {
    inbox.lock().push(alert);
    StatusCode::ACCEPTED
}

async fn receiver() -> (SocketAddr, Inbox) {
    let inbox: Inbox = Arc::default();
    let app = Router::new()
        .route("/alerts", post(receive))
        .route("/down", post(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .with_state(inbox.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (addr, inbox)
}

fn worker(url: String, sensitivity: Sensitivity) -> IngestWorker {
    let sink = HttpAlertSink::new(url, Duration::from_secs(2)).unwrap();
    let cfg = DetectionConfig { sensitivity, ..DetectionConfig::default() };
    IngestWorker::new(Arc::new(IngestionCoordinator::new(&cfg)), Arc::new(sink), PayloadSchema::default())
}

#[tokio::test]
async fn posts_enriched_payload_once() {
    let (addr, inbox) = receiver().await;
    // a single change-rate finding still forwards at low sensitivity
    let w = worker(format!("http://{addr}/alerts"), Sensitivity::Low);
    assert_eq!(w.handle(br#"{"device_id":"soil-1","edge_node":"edge-a","rainfall":200}"#).await, HandleOutcome::Evaluated { forwarded: false });
    assert_eq!(w.handle(br#"{"device_id":"soil-1","edge_node":"edge-a","rainfall":90}"#).await, HandleOutcome::Evaluated { forwarded: true });
    let seen = inbox.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["edge_node"], "edge-a");
    assert_eq!(seen[0]["rainfall"], 90);
    let report = &seen[0]["anomaly_analysis"]["rainfall"];
    assert_eq!(report["severity"], "medium");
    assert_eq!(report["anomalies_detected"][0]["method"], "change_rate");
    assert_eq!(report["anomalies_detected"][0]["description"], "Change rate: 55.00%");
}

#[tokio::test]
async fn non_success_status_is_a_failure_and_baseline_survives() {
    let (addr, inbox) = receiver().await;
    let w = worker(format!("http://{addr}/down"), Sensitivity::Medium);
    w.handle(br#"{"device_id":"soil-1","K":40}"#).await;
    assert_eq!(w.handle(br#"{"device_id":"soil-1","K":80}"#).await, HandleOutcome::DeliveryFailed);
    assert_eq!(w.coordinator().store().window("soil-1", "K"), vec![40.0, 80.0]);
    assert!(inbox.lock().is_empty());

    let sink = HttpAlertSink::new(format!("http://{addr}/down"), Duration::from_secs(2)).unwrap();
    let err = sink.deliver(&serde_json::json!({})).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Status(s) if s == StatusCode::SERVICE_UNAVAILABLE));
}

#[tokio::test]
async fn unreachable_endpoint_reports_http_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let sink = HttpAlertSink::new(format!("http://{addr}/alerts"), Duration::from_millis(500)).unwrap();
    assert!(matches!(sink.deliver(&serde_json::json!({"x": 1})).await, Err(DeliveryError::Http(_))));
    assert_eq!(sink.name(), "http");
}
