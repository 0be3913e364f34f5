//! Payload decoding: raw broker bytes → entity key, timestamp and numeric parameters.
//!
//! A payload is rejected as a whole (no reading is produced) when it is not a JSON
//! object, has no usable entity key, or carries a timestamp that cannot be parsed.
//! Non-numeric fields are silently left out of the parameter set.

use crate::config::IngestConfig;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("payload is not valid json: {0}")] Decode(#[from] serde_json::Error),
    #[error("payload is not a json object")] NotAnObject,
    #[error("missing or empty entity field `{0}`")] MissingEntity(String),
    #[error("unparseable timestamp in field `{0}`")] InvalidTimestamp(String),
}

impl IngestError {
    /// Short label for the rejection counter.
    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::Decode(_) => "decode",
            IngestError::NotAnObject => "not_object",
            IngestError::MissingEntity(_) => "missing_entity",
            IngestError::InvalidTimestamp(_) => "invalid_timestamp",
        }
    }
}

/// One (entity, parameter, value) observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub entity: String,
    pub parameter: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    /// Used instead of the stored previous value for change-rate when set.
    pub previous_override: Option<f64>,
}

impl Reading {
    pub fn new(entity: impl Into<String>, parameter: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { entity: entity.into(), parameter: parameter.into(), value, timestamp, previous_override: None }
    }

    pub fn with_previous(mut self, previous: f64) -> Self {
        self.previous_override = Some(previous);
        self
    }
}

/// Field layout of incoming payloads.
#[derive(Debug, Clone)]
pub struct PayloadSchema {
    entity_field: String,
    timestamp_field: String,
    excluded: HashSet<String>,
}

impl Default for PayloadSchema {
    fn default() -> Self { Self::from(&IngestConfig::default()) }
}

impl From<&IngestConfig> for PayloadSchema {
    fn from(cfg: &IngestConfig) -> Self {
        let mut excluded: HashSet<String> = cfg.metadata_fields.iter().cloned().collect();
        excluded.insert(cfg.entity_field.clone());
        excluded.insert(cfg.timestamp_field.clone());
        Self { entity_field: cfg.entity_field.clone(), timestamp_field: cfg.timestamp_field.clone(), excluded }
    }
}

impl PayloadSchema {
    pub fn entity_field(&self) -> &str { &self.entity_field }
    pub fn is_metadata(&self, field: &str) -> bool { self.excluded.contains(field) }
}

/// A decoded multi-parameter payload. `raw` keeps the original object so it can be
/// forwarded with the analysis attached.
#[derive(Debug, Clone)]
pub struct SensorPayload {
    pub entity: String,
    pub timestamp: DateTime<Utc>,
    pub parameters: BTreeMap<String, f64>,
    pub raw: Map<String, Value>,
}

impl SensorPayload {
    pub fn decode(bytes: &[u8], schema: &PayloadSchema) -> Result<Self, IngestError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value, schema)
    }

    pub fn from_value(value: Value, schema: &PayloadSchema) -> Result<Self, IngestError> {
        let Value::Object(raw) = value else { return Err(IngestError::NotAnObject) };

        let entity = match raw.get(&schema.entity_field) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(IngestError::MissingEntity(schema.entity_field.clone())),
        };

        let timestamp = match raw.get(&schema.timestamp_field) {
            None | Some(Value::Null) => Utc::now(),
            Some(v) => parse_timestamp(v).ok_or_else(|| IngestError::InvalidTimestamp(schema.timestamp_field.clone()))?,
        };

        let parameters = raw
            .iter()
            .filter(|(k, _)| !schema.is_metadata(k))
            .filter_map(|(k, v)| v.as_f64().map(|x| (k.clone(), x)))
            .collect();

        Ok(Self { entity, timestamp, parameters, raw })
    }

    /// One reading per numeric parameter, all sharing the payload timestamp.
    pub fn readings(&self) -> impl Iterator<Item = Reading> + '_ {
        self.parameters.iter().map(|(p, v)| Reading::new(self.entity.clone(), p.clone(), *v, self.timestamp))
    }
}

/// Epoch seconds (integer or fractional) or an RFC 3339 string.
fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() { return DateTime::from_timestamp(secs, 0); }
            let f = n.as_f64()?;
            let secs = f.floor();
            let nanos = ((f - secs) * 1e9).round().min(999_999_999.0) as u32;
            DateTime::from_timestamp(secs as i64, nanos)
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)),
        _ => None,
    }
}
