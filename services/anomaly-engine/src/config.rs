use crate::baseline::DEFAULT_WINDOW_SIZE;
use crate::detector::{CriticalBounds, DetectorSettings};
use crate::policy::Sensitivity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be finite and non-negative, got {value}")] InvalidThreshold { name: &'static str, value: f64 },
    #[error("window_size must be at least 1")] ZeroWindow,
    #[error("critical bounds for {parameter} are inverted: low {low} > high {high}")] InvertedBounds { parameter: String, low: f64, high: f64 },
    #[error("entity field must not be empty")] EmptyEntityField,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub service_name: String,
    pub health_port: u16,
    pub detection: DetectionConfig,
    pub ingest: IngestConfig,
    pub transport: TransportConfig,
    pub alert: AlertConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_name: "anomaly-engine".into(),
            health_port: 9091,
            detection: DetectionConfig::default(),
            ingest: IngestConfig::default(),
            transport: TransportConfig::default(),
            alert: AlertConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        if self.ingest.entity_field.is_empty() { return Err(ConfigError::EmptyEntityField); }
        Ok(())
    }
}

/// One configured critical range. Both ends must be present for the threshold
/// method to run on that parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundEntry {
    pub parameter: String,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
}

/// Construction-time detection surface; immutable once the coordinator is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub zscore_threshold: f64,
    pub iqr_multiplier: f64,
    pub change_rate_threshold: f64,
    pub window_size: usize,
    pub critical_bounds: Vec<BoundEntry>,
    pub sensitivity: Sensitivity,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let d = DetectorSettings::default();
        Self {
            zscore_threshold: d.zscore_threshold,
            iqr_multiplier: d.iqr_multiplier,
            change_rate_threshold: d.change_rate_threshold,
            window_size: DEFAULT_WINDOW_SIZE,
            critical_bounds: Vec::new(),
            sensitivity: Sensitivity::Medium,
        }
    }
}

impl DetectionConfig {
    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            zscore_threshold: self.zscore_threshold,
            iqr_multiplier: self.iqr_multiplier,
            change_rate_threshold: self.change_rate_threshold,
        }
    }

    /// Complete entries only; a later entry for the same parameter wins.
    pub fn critical_bounds(&self) -> HashMap<String, CriticalBounds> {
        let mut out = HashMap::new();
        for e in &self.critical_bounds {
            match (e.low, e.high) {
                (Some(low), Some(high)) => { out.insert(e.parameter.clone(), CriticalBounds::new(low, high)); }
                _ => warn!(parameter = %e.parameter, "incomplete critical bounds ignored"),
            }
        }
        out
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("zscore_threshold", self.zscore_threshold),
            ("iqr_multiplier", self.iqr_multiplier),
            ("change_rate_threshold", self.change_rate_threshold),
        ] {
            if !value.is_finite() || value < 0.0 { return Err(ConfigError::InvalidThreshold { name, value }); }
        }
        if self.window_size == 0 { return Err(ConfigError::ZeroWindow); }
        for e in &self.critical_bounds {
            if let (Some(low), Some(high)) = (e.low, e.high) {
                if low > high { return Err(ConfigError::InvertedBounds { parameter: e.parameter.clone(), low, high }); }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Field carrying the entity key (device identifier).
    pub entity_field: String,
    pub timestamp_field: String,
    /// Never evaluated as parameters. The entity and timestamp fields are always excluded too.
    pub metadata_fields: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { entity_field: "device_id".into(), timestamp_field: "timestamp".into(), metadata_fields: vec!["device_id".into(), "edge_node".into(), "timestamp".into()] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub nats_url: String,
    pub input_subject: String,
}

impl Default for TransportConfig {
    fn default() -> Self { Self { nats_url: "127.0.0.1:4222".into(), input_subject: "farm.cloud.>".into() } }
}

/// Alerts go to `http_endpoint` when set, otherwise they are published on `subject`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub http_endpoint: Option<String>,
    pub subject: String,
    pub timeout_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self { Self { http_endpoint: None, subject: "farm.alerts".into(), timeout_ms: 5_000 } }
}
