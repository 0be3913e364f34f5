//! Severity → escalation decision, keyed by the configured sensitivity tier.

use crate::detector::Severity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// Exact `low` / `medium` / `high`; anything else is treated as `medium`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw {
            "low" => Sensitivity::Low,
            "high" => Sensitivity::High,
            _ => Sensitivity::Medium,
        }
    }

    /// Severities that trigger escalation at this tier.
    pub fn triggers(self) -> &'static [Severity] {
        match self {
            Sensitivity::Low => &[Severity::Critical],
            Sensitivity::Medium => &[Severity::Critical, Severity::High],
            Sensitivity::High => &[Severity::Critical, Severity::High, Severity::Medium],
        }
    }
}

impl From<&str> for Sensitivity {
    fn from(raw: &str) -> Self { Self::parse_lenient(raw) }
}

impl From<String> for Sensitivity {
    fn from(raw: String) -> Self { Self::parse_lenient(&raw) }
}

pub fn should_escalate(severity: Severity, sensitivity: Sensitivity) -> bool {
    sensitivity.triggers().contains(&severity)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardingPolicy { sensitivity: Sensitivity }

impl ForwardingPolicy {
    pub fn new(sensitivity: Sensitivity) -> Self { Self { sensitivity } }
    pub fn sensitivity(&self) -> Sensitivity { self.sensitivity }
    pub fn should_escalate(&self, severity: Severity) -> bool { should_escalate(severity, self.sensitivity) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Severity; 4] = [Severity::Normal, Severity::Medium, Severity::High, Severity::Critical];

    #[test]
    fn escalation_table() {
        let expect = |s: Sensitivity| ALL.iter().map(|sev| should_escalate(*sev, s)).collect::<Vec<_>>();
        assert_eq!(expect(Sensitivity::Low), [false, false, false, true]);
        assert_eq!(expect(Sensitivity::Medium), [false, false, true, true]);
        assert_eq!(expect(Sensitivity::High), [false, true, true, true]);
    }

    #[test]
    fn low_vs_medium_on_high_severity() {
        assert!(!should_escalate(Severity::High, Sensitivity::Low));
        assert!(should_escalate(Severity::High, Sensitivity::Medium));
    }

    #[test]
    fn unknown_sensitivity_behaves_as_medium() {
        for raw in ["", "extreme", "MEDIUM", "Low"] {
            let s = Sensitivity::from(raw);
            assert_eq!(s, Sensitivity::Medium);
            for sev in ALL { assert_eq!(should_escalate(sev, s), should_escalate(sev, Sensitivity::Medium)); }
        }
    }

    #[test]
    fn deserializes_leniently() {
        let s: Sensitivity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(s, Sensitivity::High);
        let s: Sensitivity = serde_json::from_str("\"paranoid\"").unwrap();
        assert_eq!(s, Sensitivity::Medium);
        assert_eq!(serde_json::to_string(&Sensitivity::Low).unwrap(), "\"low\"");
    }
}
