//! Core shared utilities for sentinel services: tracing setup, layered config,
//! health/readiness flags and the Prometheus `/metrics` endpoint.

use anyhow::Result;
use axum::{http::{header, StatusCode}, response::{IntoResponse, Response}, routing::get, Router};
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{Encoder, TextEncoder};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod metrics_ext;
pub use metrics_ext::{DetectionMetrics, IngestMetrics, DETECTION_METRICS, INGEST_METRICS};

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }

fn env_flag(name: &str) -> bool {
    std::env::var(name).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Installs the global subscriber once per process.
///
/// `RUST_LOG` drives the filter (default `info`), `SENTINEL_JSON_LOG=1` switches
/// to flattened JSON lines. With the `otlp` feature and
/// `OTEL_EXPORTER_OTLP_ENDPOINT` set, spans are also exported over OTLP/gRPC.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let fmt_layer = if env_flag("SENTINEL_JSON_LOG") {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .boxed()
        };
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(fmt_layer).with(env_filter);
        #[cfg(feature = "otlp")]
        let registry = registry.with(otlp::layer(service)?);
        registry.try_init()?;
        Ok(())
    })?;
    Lazy::force(&STARTED_AT);
    info!(target: "sentinel-core", %service, "tracing initialized");
    Ok(())
}

#[cfg(feature = "otlp")]
mod otlp {
    use anyhow::Result;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{trace::{SdkTracerProvider, Tracer}, Resource};
    use tracing_opentelemetry::OpenTelemetryLayer;
    use tracing_subscriber::registry::LookupSpan;

    pub(crate) fn layer<S>(service: &str) -> Result<Option<OpenTelemetryLayer<S, Tracer>>>
    where
        S: tracing::Subscriber + for<'span> LookupSpan<'span>,
    {
        let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else { return Ok(None) };
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;
        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(Resource::builder().with_service_name(service.to_string()).build())
            .build();
        let tracer = provider.tracer(service.to_string());
        opentelemetry::global::set_tracer_provider(provider);
        Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
    }
}

/// Layered settings: serde defaults, then the file named by
/// `SENTINEL_CONFIG_FILE` (format from extension), then `SENTINEL__*` env vars
/// (`__` separates nesting, e.g. `SENTINEL__DETECTION__WINDOW_SIZE=30`).
pub fn load_settings<T: DeserializeOwned>(service: &str) -> Result<T> {
    let mut builder = config::Config::builder().set_default("service_name", service)?;
    if let Ok(file) = std::env::var("SENTINEL_CONFIG_FILE") {
        info!(target: "sentinel-core", %file, "loading config file");
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("SENTINEL")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = builder.build()?;
    Ok(cfg.try_deserialize()?)
}

pub fn health_router() -> Router {
    Router::new()
        .route("/live", get(|| async { axum::Json(serde_json::json!({"live": NODE_LIVENESS.load(Ordering::SeqCst)})) }))
        .route("/ready", get(|| async { axum::Json(serde_json::json!({"ready": NODE_READINESS.load(Ordering::SeqCst)})) }))
        .route("/status", get(|| async {
            axum::Json(serde_json::json!({
                "live": NODE_LIVENESS.load(Ordering::SeqCst),
                "ready": NODE_READINESS.load(Ordering::SeqCst),
                "uptime_secs": STARTED_AT.elapsed().as_secs(),
            }))
        }))
        .route("/metrics", get(metrics_handler))
}

pub async fn start_health_server(port: u16) -> Result<SocketAddr> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    serve_health(listener)
}

/// Serves the health router on an already-bound listener (port 0 in tests).
pub fn serve_health(listener: TcpListener) -> Result<SocketAddr> {
    let addr = listener.local_addr()?;
    info!(target: "sentinel-core", ?addr, "health server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_router()).await {
            tracing::error!(error=?e, "health server failed");
        }
    });
    Ok(addr)
}

/// Text exposition of everything in the default Prometheus registry.
pub fn render_metrics() -> Result<String> {
    let families = prometheus::gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

async fn metrics_handler() -> Response {
    match render_metrics() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(req.as_bytes()).await.unwrap();
        let mut body = String::new();
        stream.read_to_string(&mut body).await.unwrap();
        body
    }

    #[tokio::test]
    async fn health_endpoints_report_flags_and_metrics() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = serve_health(listener).unwrap();
        DETECTION_METRICS.readings_total.inc();
        mark_ready();

        let live = http_get(addr, "/live").await;
        assert!(live.starts_with("HTTP/1.1 200"));
        assert!(live.contains("\"live\":true"));

        let ready = http_get(addr, "/ready").await;
        assert!(ready.contains("\"ready\":true"));

        let metrics = http_get(addr, "/metrics").await;
        assert!(metrics.contains("sentinel_readings_evaluated_total"));
    }

    #[derive(Debug, Deserialize)]
    struct Probe { service_name: String, #[serde(default)] window: Option<u32> }

    #[test]
    fn settings_default_service_name() {
        let probe: Probe = load_settings("probe-service").unwrap();
        assert_eq!(probe.service_name, "probe-service");
        assert!(probe.window.is_none());
    }
}
