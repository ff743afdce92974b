//! Clinical dosing inputs fed to builders and the dispatcher.

use crate::error::{SigError, SigResult};
use crate::medication::Quantity;
use crate::units::normalize_unit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseInput {
    pub value: f64,
    pub unit: String,
    /// Upper bound for a single-value range ("1 to 2 tablets").
    #[serde(default)]
    pub max_value: Option<f64>,
}

impl DoseInput {
    pub fn new(value: f64, unit: &str) -> Self {
        Self {
            value,
            unit: normalize_unit(unit),
            max_value: None,
        }
    }

    pub fn with_max(mut self, max_value: f64) -> Self {
        self.max_value = Some(max_value);
        self
    }

    pub fn quantity(&self) -> Quantity {
        Quantity::new(self.value, &self.unit)
    }

    /// Largest amount this dose can deliver.
    pub fn upper_quantity(&self) -> Quantity {
        Quantity::new(self.max_value.unwrap_or(self.value), &self.unit)
    }

    pub fn validate(&self) -> SigResult<()> {
        if !self.value.is_finite() || self.value <= 0.0 {
            return Err(SigError::InvalidDose(
                format!("Dose value must be positive, got {}", self.value)
            ));
        }
        if self.unit.trim().is_empty() {
            return Err(SigError::InvalidDose("Dose unit must be specified".to_string()));
        }
        if let Some(max) = self.max_value {
            if max < self.value {
                return Err(SigError::InvalidDose(
                    format!("Dose max value {} is below dose value {}", max, self.value)
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseRangeInput {
    pub min: f64,
    pub max: f64,
    pub unit: String,
}

impl DoseRangeInput {
    pub fn new(min: f64, max: f64, unit: &str) -> Self {
        Self {
            min,
            max,
            unit: normalize_unit(unit),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min - 1e-9 && value <= self.max + 1e-9
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodUnit {
    #[serde(rename = "h", alias = "hour")]
    Hour,
    #[serde(rename = "d", alias = "day")]
    Day,
    #[serde(rename = "wk", alias = "week")]
    Week,
    #[serde(rename = "mo", alias = "month")]
    Month,
}

impl PeriodUnit {
    pub fn hours(&self) -> f64 {
        match self {
            Self::Hour => 1.0,
            Self::Day => 24.0,
            Self::Week => 24.0 * 7.0,
            Self::Month => 24.0 * 30.0,
        }
    }

    pub fn days(&self) -> f64 {
        self.hours() / 24.0
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Hour => "h",
            Self::Day => "d",
            Self::Week => "wk",
            Self::Month => "mo",
        }
    }

    pub fn singular(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl FromStr for PeriodUnit {
    type Err = SigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "h" | "hr" | "hour" | "hours" => Ok(Self::Hour),
            "d" | "day" | "days" => Ok(Self::Day),
            "wk" | "w" | "week" | "weeks" => Ok(Self::Week),
            "mo" | "month" | "months" => Ok(Self::Month),
            other => Err(SigError::InvalidTiming(format!("Unknown period unit: {}", other))),
        }
    }
}

impl fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Time-of-day qualifiers attached to a timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhenTag {
    Morning,
    Afternoon,
    Evening,
    Bedtime,
    Meals,
}

impl WhenTag {
    /// FHIR event-timing code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Morning => "MORN",
            Self::Afternoon => "AFT",
            Self::Evening => "EVE",
            Self::Bedtime => "HS",
            Self::Meals => "C",
        }
    }

    pub fn phrase(&self) -> &'static str {
        match self {
            Self::Morning => "in the morning",
            Self::Afternoon => "in the afternoon",
            Self::Evening => "in the evening",
            Self::Bedtime => "at bedtime",
            Self::Meals => "with meals",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingInput {
    pub frequency: u32,
    pub period: f64,
    pub period_unit: PeriodUnit,
    #[serde(default)]
    pub when: Vec<WhenTag>,
}

impl TimingInput {
    pub fn new(frequency: u32, period: f64, period_unit: PeriodUnit) -> Self {
        Self {
            frequency,
            period,
            period_unit,
            when: Vec::new(),
        }
    }

    pub fn daily(frequency: u32) -> Self {
        Self::new(frequency, 1.0, PeriodUnit::Day)
    }

    pub fn with_when(mut self, when: WhenTag) -> Self {
        self.when.push(when);
        self
    }

    /// Administrations per 24 hours.
    pub fn per_day(&self) -> f64 {
        self.frequency as f64 * 24.0 / (self.period * self.period_unit.hours())
    }

    pub fn validate(&self) -> SigResult<()> {
        if self.frequency == 0 {
            return Err(SigError::InvalidTiming("Frequency must be at least 1".to_string()));
        }
        if !self.period.is_finite() || self.period <= 0.0 {
            return Err(SigError::InvalidTiming(
                format!("Period must be positive, got {}", self.period)
            ));
        }
        Ok(())
    }

    /// Same frequency, period and time-of-day pattern.
    pub fn same_pattern(&self, other: &TimingInput) -> bool {
        self.frequency == other.frequency
            && (self.period * self.period_unit.hours() - other.period * other.period_unit.hours()).abs() < 1e-9
            && self.when == other.when
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRangeInput {
    pub min_frequency: u32,
    pub max_frequency: u32,
    pub period: f64,
    pub period_unit: PeriodUnit,
}

impl FrequencyRangeInput {
    pub fn new(min_frequency: u32, max_frequency: u32, period: f64, period_unit: PeriodUnit) -> Self {
        Self {
            min_frequency,
            max_frequency,
            period,
            period_unit,
        }
    }

    pub fn period_hours(&self) -> f64 {
        self.period * self.period_unit.hours()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AsNeeded {
    #[serde(default)]
    pub reason: Option<String>,
}

impl AsNeeded {
    pub fn for_reason(reason: &str) -> Self {
        Self {
            reason: Some(reason.to_string()),
        }
    }
}

/// Maximum amount over a period, e.g. 4 g per 24 hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxDosePerPeriod {
    pub dose: Quantity,
    pub period: f64,
    pub period_unit: PeriodUnit,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DoseConstraints {
    #[serde(default)]
    pub max_dose_per_period: Option<MaxDosePerPeriod>,
    #[serde(default)]
    pub max_dose_per_administration: Option<Quantity>,
}

impl DoseConstraints {
    pub fn validate(&self) -> SigResult<()> {
        if let Some(max) = &self.max_dose_per_period {
            if max.dose.value <= 0.0 || max.period <= 0.0 {
                return Err(SigError::InvalidDose(
                    "Maximum dose per period must have a positive dose and period".to_string()
                ));
            }
        }
        if let Some(max) = &self.max_dose_per_administration {
            if max.value <= 0.0 {
                return Err(SigError::InvalidDose(
                    "Maximum dose per administration must be positive".to_string()
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxDailyDoseConstraint {
    pub max_dose_per_day: Quantity,
    #[serde(default)]
    pub max_administrations_per_day: Option<u32>,
    #[serde(default)]
    pub warning_message: Option<String>,
}

impl MaxDailyDoseConstraint {
    pub fn new(max_dose: f64, unit: &str) -> Self {
        Self {
            max_dose_per_day: Quantity::new(max_dose, unit),
            max_administrations_per_day: None,
            warning_message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDuration {
    pub value: f64,
    pub unit: PeriodUnit,
}

impl PhaseDuration {
    pub fn new(value: f64, unit: PeriodUnit) -> Self {
        Self { value, unit }
    }

    pub fn days(&self) -> f64 {
        self.value * self.unit.days()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaperingPhase {
    pub sequence: u32,
    pub name: String,
    pub dose: DoseInput,
    pub timing: TimingInput,
    pub duration: PhaseDuration,
    #[serde(default)]
    pub special_instructions: Vec<String>,
    #[serde(default)]
    pub transition_note: Option<String>,
}

impl TaperingPhase {
    pub fn new(sequence: u32, name: &str, dose: DoseInput, timing: TimingInput, duration: PhaseDuration) -> Self {
        Self {
            sequence,
            name: name.to_string(),
            dose,
            timing,
            duration,
            special_instructions: Vec::new(),
            transition_note: None,
        }
    }

    pub fn with_transition_note(mut self, note: &str) -> Self {
        self.transition_note = Some(note.to_string());
        self
    }
}
