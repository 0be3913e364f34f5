//! Four-method anomaly detector over a per-series baseline window.
//!
//! Every method is a pure function returning `Option<Finding>`; `DetectorEngine::evaluate`
//! runs all of them unconditionally and folds the results into an [`AnomalyReport`].
//! Degenerate inputs (too few samples, zero spread, zero previous value, missing bounds)
//! make a single method abstain and are never surfaced as errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub const ZSCORE_MIN_SAMPLES: usize = 2;
pub const IQR_MIN_SAMPLES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity { Normal, Medium, High, Critical }

impl Severity {
    /// 0 → normal, 1 → medium, 2 → high, 3+ → critical.
    pub fn from_finding_count(count: usize) -> Self {
        match count {
            0 => Severity::Normal,
            1 => Severity::Medium,
            2 => Severity::High,
            _ => Severity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self { Severity::Normal => "normal", Severity::Medium => "medium", Severity::High => "high", Severity::Critical => "critical" }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method { Zscore, Iqr, ChangeRate, Threshold }

impl Method {
    pub const ALL: [Method; 4] = [Method::Zscore, Method::Iqr, Method::ChangeRate, Method::Threshold];

    pub fn as_str(&self) -> &'static str {
        match self { Method::Zscore => "zscore", Method::Iqr => "iqr", Method::ChangeRate => "change_rate", Method::Threshold => "threshold" }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStatus { BelowCritical, AboveCritical }

impl fmt::Display for ThresholdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { ThresholdStatus::BelowCritical => "below_critical", ThresholdStatus::AboveCritical => "above_critical" })
    }
}

/// Method-specific payload of a finding; serialized with a `method` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Evidence {
    Zscore { value: f64 },
    Iqr { bounds: (f64, f64) },
    ChangeRate { change_rate: f64 },
    Threshold { status: ThresholdStatus },
}

impl Evidence {
    pub fn method(&self) -> Method {
        match self {
            Evidence::Zscore { .. } => Method::Zscore,
            Evidence::Iqr { .. } => Method::Iqr,
            Evidence::ChangeRate { .. } => Method::ChangeRate,
            Evidence::Threshold { .. } => Method::Threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(flatten)]
    pub evidence: Evidence,
    pub description: String,
}

impl Finding {
    pub fn method(&self) -> Method { self.evidence.method() }
}

/// Static critical range for one parameter. Both ends are required.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalBounds { pub low: f64, pub high: f64 }

impl CriticalBounds {
    pub fn new(low: f64, high: f64) -> Self { Self { low, high } }
}

/// Per-parameter verdict. Severity is derived from the finding count at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    parameter: String,
    value: f64,
    timestamp: DateTime<Utc>,
    #[serde(rename = "anomalies_detected")]
    findings: Vec<Finding>,
    severity: Severity,
}

impl AnomalyReport {
    pub fn new(parameter: impl Into<String>, value: f64, timestamp: DateTime<Utc>, findings: Vec<Finding>) -> Self {
        let severity = Severity::from_finding_count(findings.len());
        Self { parameter: parameter.into(), value, timestamp, findings, severity }
    }

    pub fn parameter(&self) -> &str { &self.parameter }
    pub fn value(&self) -> f64 { self.value }
    pub fn timestamp(&self) -> DateTime<Utc> { self.timestamp }
    pub fn findings(&self) -> &[Finding] { &self.findings }
    pub fn severity(&self) -> Severity { self.severity }
    pub fn is_normal(&self) -> bool { self.findings.is_empty() }

    pub fn methods(&self) -> Vec<Method> { self.findings.iter().map(Finding::method).collect() }
    pub fn has(&self, method: Method) -> bool { self.findings.iter().any(|f| f.method() == method) }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorSettings {
    pub zscore_threshold: f64,
    pub iqr_multiplier: f64,
    pub change_rate_threshold: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self { Self { zscore_threshold: 2.5, iqr_multiplier: 1.5, change_rate_threshold: 0.3 } }
}

#[derive(Debug, Clone, Default)]
pub struct DetectorEngine { settings: DetectorSettings }

impl DetectorEngine {
    pub fn new(settings: DetectorSettings) -> Self { Self { settings } }
    pub fn settings(&self) -> &DetectorSettings { &self.settings }

    /// Evaluates `value` against the prior window/previous value. Findings keep the
    /// fixed order zscore, iqr, change_rate, threshold.
    pub fn evaluate(
        &self,
        value: f64,
        parameter: &str,
        window: &[f64],
        previous: Option<f64>,
        bounds: Option<CriticalBounds>,
        timestamp: DateTime<Utc>,
    ) -> AnomalyReport {
        let findings: Vec<Finding> = [
            zscore(value, window, self.settings.zscore_threshold),
            iqr(value, window, self.settings.iqr_multiplier),
            change_rate(value, previous, self.settings.change_rate_threshold),
            threshold(value, bounds),
        ]
        .into_iter()
        .flatten()
        .collect();
        for f in &findings {
            debug!(%parameter, value, method = f.method().as_str(), description = %f.description, "finding");
        }
        AnomalyReport::new(parameter, value, timestamp, findings)
    }
}

fn mean(xs: &[f64]) -> f64 { xs.iter().sum::<f64>() / xs.len() as f64 }

/// Sample (n-1) standard deviation; exactly zero for a constant window.
fn sample_stddev(xs: &[f64], mean: f64) -> f64 {
    if xs.iter().all(|&x| x == xs[0]) { return 0.0; }
    let ss: f64 = xs.iter().map(|x| (x - mean).powi(2)).sum();
    (ss / (xs.len() as f64 - 1.0)).sqrt()
}

pub fn zscore(value: f64, window: &[f64], threshold: f64) -> Option<Finding> {
    if window.len() < ZSCORE_MIN_SAMPLES { return None; }
    let m = mean(window);
    let sd = sample_stddev(window, m);
    if sd == 0.0 { return None; }
    let z = ((value - m) / sd).abs();
    (z >= threshold).then(|| Finding { evidence: Evidence::Zscore { value: z }, description: format!("Z-score: {z:.2}") })
}

/// Index-based quartiles (`sorted[n/4]`, `sorted[3n/4]`), no interpolation.
pub fn iqr_bounds(window: &[f64], multiplier: f64) -> Option<(f64, f64)> {
    if window.len() < IQR_MIN_SAMPLES { return None; }
    let mut sorted = window.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let q1 = sorted[n / 4];
    let q3 = sorted[(3 * n) / 4];
    let spread = q3 - q1;
    Some((q1 - multiplier * spread, q3 + multiplier * spread))
}

pub fn iqr(value: f64, window: &[f64], multiplier: f64) -> Option<Finding> {
    let (lo, hi) = iqr_bounds(window, multiplier)?;
    (value < lo || value > hi).then(|| Finding {
        evidence: Evidence::Iqr { bounds: (lo, hi) },
        description: format!("IQR: outside [{lo:.2}, {hi:.2}]"),
    })
}

pub fn change_rate(value: f64, previous: Option<f64>, threshold: f64) -> Option<Finding> {
    let prev = previous.filter(|p| *p != 0.0)?;
    let rate = ((value - prev) / prev).abs();
    (rate >= threshold).then(|| Finding {
        evidence: Evidence::ChangeRate { change_rate: rate },
        description: format!("Change rate: {:.2}%", rate * 100.0),
    })
}

pub fn threshold(value: f64, bounds: Option<CriticalBounds>) -> Option<Finding> {
    let b = bounds?;
    let status = if value < b.low {
        ThresholdStatus::BelowCritical
    } else if value > b.high {
        ThresholdStatus::AboveCritical
    } else {
        return None;
    };
    Some(Finding { evidence: Evidence::Threshold { status }, description: format!("Threshold violation: {status}") })
}
