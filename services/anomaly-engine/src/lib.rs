//! Streaming anomaly engine for multi-parameter sensor payloads.
//!
//! Readings keyed by (entity, parameter) are scored by four independent detectors
//! (z-score, IQR fence, change rate, static critical bounds) against a rolling
//! per-series baseline. Severity follows the number of positive detectors and a
//! sensitivity tier decides escalation. Forwarded payloads carry the original
//! fields plus an `anomaly_analysis` map.

pub mod baseline;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod policy;
pub mod reading;
pub mod sink;
pub mod transport;

pub use baseline::{BaselineStore, SeriesKey, DEFAULT_WINDOW_SIZE};
pub use config::{AlertConfig, BoundEntry, ConfigError, DetectionConfig, EngineConfig, IngestConfig, TransportConfig};
pub use coordinator::{Analysis, IngestionCoordinator, ParameterOutcome};
pub use detector::{AnomalyReport, CriticalBounds, DetectorEngine, DetectorSettings, Evidence, Finding, Method, Severity, ThresholdStatus};
pub use policy::{should_escalate, ForwardingPolicy, Sensitivity};
pub use reading::{IngestError, PayloadSchema, Reading, SensorPayload};
pub use sink::{AlertSink, DeliveryError, HttpAlertSink, NatsAlertSink};
pub use transport::{run_subscription, HandleOutcome, IngestWorker};
