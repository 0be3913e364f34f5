//! Per-reading orchestration: read baseline → evaluate → policy → record.
//!
//! For one (entity, parameter) the whole sequence runs under that series' lock, so a
//! reading is always judged against the state left by the previous reading and never
//! against its own value. The coordinator performs no I/O; callers deliver alerts
//! after it returns, i.e. after every baseline lock has been released.

use crate::baseline::BaselineStore;
use crate::config::DetectionConfig;
use crate::detector::{AnomalyReport, CriticalBounds, DetectorEngine, Severity};
use crate::policy::ForwardingPolicy;
use crate::reading::{Reading, SensorPayload};
use sentinel_core::DETECTION_METRICS;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Result of one parameter's evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterOutcome {
    pub report: AnomalyReport,
    pub escalate: bool,
}

/// Aggregated verdict over every numeric parameter of one payload.
#[derive(Debug, Clone)]
pub struct Analysis {
    entity: String,
    outcomes: BTreeMap<String, ParameterOutcome>,
    original: Map<String, Value>,
}

impl Analysis {
    pub fn entity(&self) -> &str { &self.entity }
    pub fn reports(&self) -> impl Iterator<Item = &AnomalyReport> { self.outcomes.values().map(|o| &o.report) }
    pub fn report(&self, parameter: &str) -> Option<&AnomalyReport> { self.outcomes.get(parameter).map(|o| &o.report) }
    pub fn outcome(&self, parameter: &str) -> Option<&ParameterOutcome> { self.outcomes.get(parameter) }
    pub fn len(&self) -> usize { self.outcomes.len() }
    pub fn is_empty(&self) -> bool { self.outcomes.is_empty() }

    pub fn any_escalated(&self) -> bool { self.outcomes.values().any(|o| o.escalate) }
    pub fn any_findings(&self) -> bool { self.reports().any(|r| !r.is_normal()) }

    /// Forward when any parameter escalated under the policy, or when any parameter
    /// produced at least one finding regardless of sensitivity.
    pub fn should_forward(&self) -> bool { self.any_escalated() || self.any_findings() }

    pub fn max_severity(&self) -> Severity { self.reports().map(AnomalyReport::severity).max().unwrap_or(Severity::Normal) }

    /// The original payload with an `anomaly_analysis` map (parameter → report) added.
    pub fn enriched(&self) -> Value {
        let mut out = self.original.clone();
        let analysis: Map<String, Value> = self
            .outcomes
            .iter()
            .filter_map(|(p, o)| serde_json::to_value(&o.report).ok().map(|v| (p.clone(), v)))
            .collect();
        out.insert("anomaly_analysis".into(), Value::Object(analysis));
        Value::Object(out)
    }
}

pub struct IngestionCoordinator {
    store: BaselineStore,
    engine: DetectorEngine,
    policy: ForwardingPolicy,
    bounds: HashMap<String, CriticalBounds>,
}

impl IngestionCoordinator {
    pub fn new(cfg: &DetectionConfig) -> Self {
        Self::from_parts(
            BaselineStore::new(cfg.window_size),
            DetectorEngine::new(cfg.detector_settings()),
            ForwardingPolicy::new(cfg.sensitivity),
            cfg.critical_bounds(),
        )
    }

    pub fn from_parts(store: BaselineStore, engine: DetectorEngine, policy: ForwardingPolicy, bounds: HashMap<String, CriticalBounds>) -> Self {
        info!(target: "anomaly.coordinator", window = store.window_size(), sensitivity = ?policy.sensitivity(), bounded = bounds.len(), "coordinator ready");
        Self { store, engine, policy, bounds }
    }

    pub fn store(&self) -> &BaselineStore { &self.store }
    pub fn policy(&self) -> &ForwardingPolicy { &self.policy }

    pub fn process_reading(&self, reading: &Reading) -> ParameterOutcome {
        let start = Instant::now();
        let bounds = self.bounds.get(&reading.parameter).copied();
        let outcome = self.store.with_series(&reading.entity, &reading.parameter, |series| {
            let window = series.window();
            let previous = reading.previous_override.or(series.previous());
            let report = self.engine.evaluate(reading.value, &reading.parameter, &window, previous, bounds, reading.timestamp);
            let escalate = self.policy.should_escalate(report.severity());
            series.record(reading.value);
            ParameterOutcome { report, escalate }
        });
        record_metrics(&outcome, start);
        if !outcome.report.is_normal() {
            debug!(target: "anomaly.coordinator", entity = %reading.entity, parameter = %reading.parameter, severity = %outcome.report.severity(), escalate = outcome.escalate, "anomalous reading");
        }
        outcome
    }

    #[instrument(skip(self, payload), fields(entity = %payload.entity, parameters = payload.parameters.len()))]
    pub fn process_payload(&self, payload: &SensorPayload) -> Analysis {
        let outcomes = payload.readings().map(|r| (r.parameter.clone(), self.process_reading(&r))).collect();
        Analysis { entity: payload.entity.clone(), outcomes, original: payload.raw.clone() }
    }
}

fn record_metrics(outcome: &ParameterOutcome, start: Instant) {
    let m = &*DETECTION_METRICS;
    m.readings_total.inc();
    m.severity_total.with_label_values(&[outcome.report.severity().as_str()]).inc();
    for f in outcome.report.findings() { m.findings_total.with_label_values(&[f.method().as_str()]).inc(); }
    if outcome.escalate { m.escalations_total.inc(); }
    m.evaluate_latency_ms.observe(start.elapsed().as_secs_f64() * 1000.0);
}
