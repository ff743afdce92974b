//! Append-only record of builder and dispatcher decisions.
//!
//! Advisory conditions are pushed here as `Warning`s so that clinical review
//! sees them even though generation went ahead. Every entry is mirrored to the
//! `log` facade; the log output itself is never consulted.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    DoseFormFallback,
    UnknownRoute,
    UnusualRoute,
    LargeVolume,
    LargeDoseRange,
    DoseAboveMedicationMax,
    DoseStepMismatch,
    ShortInterval,
    DailyDoseMismatch,
    TaperDoseJump,
    TaperDirectionInconsistent,
    TaperShortPhase,
    TaperTimingMismatch,
    StrategyTie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    State,
    Decision,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub step: usize,
    pub kind: AuditKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<Warning>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: AuditKind, message: String, warning: Option<Warning>) {
        let step = self.entries.len() + 1;
        self.entries.push(AuditEntry {
            step,
            kind,
            message,
            warning,
        });
    }

    /// Records a state transition ("dose added", "route set").
    pub fn state(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("state: {}", message);
        self.push(AuditKind::State, message, None);
    }

    /// Records a selection or validation outcome.
    pub fn decision(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("decision: {}", message);
        self.push(AuditKind::Decision, message, None);
    }

    pub fn warn(&mut self, warning: Warning) {
        warn!("{}", warning);
        let message = warning.message.clone();
        self.push(AuditKind::Warning, message, Some(warning));
    }

    /// Records `warning` unless an identical one is already on the trail.
    /// Returns whether it was recorded.
    pub fn warn_once(&mut self, warning: Warning) -> bool {
        let seen = self.entries.iter().any(|e| e.warning.as_ref() == Some(&warning));
        if !seen {
            self.warn(warning);
        }
        !seen
    }

    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        for warning in warnings {
            self.warn(warning);
        }
    }

    /// Appends another trail, renumbering its entries.
    pub fn absorb(&mut self, other: &AuditTrail) {
        for entry in &other.entries {
            self.push(entry.kind, entry.message.clone(), entry.warning.clone());
        }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.entries
            .iter()
            .filter_map(|e| e.warning.clone())
            .collect()
    }

    pub fn has_warning(&self, code: WarningCode) -> bool {
        self.entries
            .iter()
            .any(|e| e.warning.as_ref().map_or(false, |w| w.code == code))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plain-language rendering for clinical review.
    pub fn explain(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                let label = match e.kind {
                    AuditKind::State => "STATE",
                    AuditKind::Decision => "DECISION",
                    AuditKind::Warning => "WARNING",
                };
                format!("{:>3}. {:<8} {}", e.step, label, e.message)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trail_is_ordered_and_keeps_warnings() {
        let mut trail = AuditTrail::new();
        trail.state("dose added: 1 tablet");
        trail.warn(Warning::new(WarningCode::LargeVolume, "verify 1200 mL"));
        trail.decision("route mapped to oral");

        assert_eq!(trail.len(), 3);
        assert_eq!(trail.entries()[1].step, 2);
        assert_eq!(trail.warnings().len(), 1);
        assert!(trail.has_warning(WarningCode::LargeVolume));
        assert!(!trail.has_warning(WarningCode::UnknownRoute));

        let text = trail.explain();
        assert!(text.contains("WARNING"));
        assert!(text.lines().next().unwrap().contains("dose added"));
    }

    #[test]
    fn test_absorb_renumbers() {
        let mut first = AuditTrail::new();
        first.state("a");
        let mut second = AuditTrail::new();
        second.state("b");
        second.warn(Warning::new(WarningCode::StrategyTie, "tie"));
        first.absorb(&second);
        assert_eq!(first.entries().iter().map(|e| e.step).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(first.warnings().len(), 1);
    }

    #[test]
    fn test_warn_once_skips_identical_warnings() {
        let mut trail = AuditTrail::new();
        let mismatch = Warning::new(WarningCode::DailyDoseMismatch, "12 tablet per day exceeds 6 tablet");
        assert!(trail.warn_once(mismatch.clone()));
        assert!(!trail.warn_once(mismatch));
        assert!(trail.warn_once(Warning::new(WarningCode::DailyDoseMismatch, "8 tablet per day exceeds 6 tablet")));
        assert_eq!(trail.warnings().len(), 2);
    }
}
