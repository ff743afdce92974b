//! The externally visible signature instruction (FHIR Dosage shaped).

use crate::config::{RouteCode, UnitCode};
use crate::dosing::{PeriodUnit, WhenTag};
use crate::medication::Quantity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodedQuantity {
    pub value: f64,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl CodedQuantity {
    pub fn new(quantity: &Quantity, code: Option<&UnitCode>) -> Self {
        Self {
            value: quantity.value,
            unit: quantity.unit.clone(),
            system: code.map(|c| c.system.clone()),
            code: code.map(|c| c.code.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityRange {
    pub low: CodedQuantity,
    pub high: CodedQuantity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseAndRate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dose_quantity: Option<CodedQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dose_range: Option<QuantityRange>,
}

impl DoseAndRate {
    pub fn quantity(quantity: CodedQuantity) -> Self {
        Self {
            dose_quantity: Some(quantity),
            dose_range: None,
        }
    }

    pub fn range(low: CodedQuantity, high: CodedQuantity) -> Self {
        Self {
            dose_quantity: None,
            dose_range: Some(QuantityRange { low, high }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsDuration {
    pub value: f64,
    pub unit: PeriodUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingRepeat {
    pub frequency: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_max: Option<u32>,
    pub period: f64,
    pub period_unit: PeriodUnit,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds_duration: Option<BoundsDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds_period: Option<BoundsPeriod>,
}

impl TimingRepeat {
    pub fn new(frequency: u32, period: f64, period_unit: PeriodUnit, when: &[WhenTag]) -> Self {
        Self {
            frequency,
            frequency_max: None,
            period,
            period_unit,
            when: when.iter().map(|w| w.code().to_string()).collect(),
            bounds_duration: None,
            bounds_period: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub repeat: TimingRepeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    pub system: String,
    pub code: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    pub coding: Vec<Coding>,
    pub text: String,
}

impl CodeableConcept {
    pub fn from_route(route: &RouteCode) -> Self {
        Self {
            coding: vec![Coding {
                system: route.system.clone(),
                code: route.code.clone(),
                display: route.display.clone(),
            }],
            text: route.display.clone(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.coding.first().map(|c| c.code.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxDosePerPeriodOut {
    pub numerator: CodedQuantity,
    pub denominator: CodedQuantity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Sequential,
    Concurrent,
    Conditional,
}

/// Links an instruction to its neighbours within one regimen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionRelationship {
    pub kind: RelationshipKind,
    pub position: u32,
    pub total: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInstruction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    pub text: String,
    pub dose_and_rate: Vec<DoseAndRate>,
    pub timing: Timing,
    pub route: CodeableConcept,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_needed_boolean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_needed_for: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_dose_per_period: Option<MaxDosePerPeriodOut>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_instruction: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<InstructionRelationship>,
}

impl SignatureInstruction {
    /// Copy with replaced text; used by modifiers, which never mutate in place.
    pub fn with_text(&self, text: String) -> Self {
        Self {
            text,
            ..self.clone()
        }
    }

    /// Copy with an extra additional instruction, skipping duplicates.
    pub fn with_additional_instruction(&self, instruction: &str) -> Self {
        let mut additional = self.additional_instruction.clone();
        if !additional.iter().any(|a| a == instruction) {
            additional.push(instruction.to_string());
        }
        Self {
            additional_instruction: additional,
            ..self.clone()
        }
    }

    pub fn first_dose_quantity(&self) -> Option<&CodedQuantity> {
        self.dose_and_rate.iter().find_map(|d| d.dose_quantity.as_ref())
    }
}
