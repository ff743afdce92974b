//! Combination products. Each dose is broken down into the amount of every
//! active ingredient it delivers.

use super::base::{BuilderCore, StateDose};
use super::{BuilderKind, SignatureBuilder};
use crate::audit::AuditTrail;
use crate::dosing::{AsNeeded, DoseConstraints, DoseInput, TimingInput};
use crate::engine::Engine;
use crate::error::{SigError, SigResult};
use crate::instruction::SignatureInstruction;
use crate::medication::{MedicationProfile, Quantity};
use crate::units::{format_number, inverse_scale, normalize_unit, scale_by_strength};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientAmount {
    pub name: String,
    pub amount: f64,
    pub unit: String,
}

impl fmt::Display for IngredientAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, format_number(self.amount), self.unit)
    }
}

/// Per-ingredient amounts delivered by `dose`.
///
/// Volume and count doses scale each ingredient's strength directly. A mass
/// dose is read as an amount of the first ingredient and converted to the
/// dispensed quantity first.
pub fn ingredient_breakdown(medication: &MedicationProfile, dose: &Quantity) -> SigResult<Vec<IngredientAmount>> {
    let dispensed = match medication.primary_strength() {
        Some(primary) if scale_by_strength(dose, primary).is_none() => inverse_scale(dose, primary),
        _ => Some(dose.clone()),
    };

    medication
        .ingredients
        .iter()
        .map(|ingredient| {
            dispensed
                .as_ref()
                .and_then(|amount| scale_by_strength(amount, &ingredient.strength))
                .map(|amount| IngredientAmount {
                    name: ingredient.name.clone(),
                    amount: amount.value,
                    unit: amount.unit,
                })
                .ok_or_else(|| {
                    SigError::InvalidDose(format!(
                        "A dose of {} cannot be related to {} strength {}",
                        dose, ingredient.name, ingredient.strength
                    ))
                })
        })
        .collect()
}

pub fn contents_text(breakdown: &[IngredientAmount]) -> String {
    let parts: Vec<String> = breakdown.iter().map(|b| b.to_string()).collect();
    format!("Each dose contains: {}", parts.join(", "))
}

/// Contents line for a recorded dose, spanning both ends of a ranged dose.
pub fn dose_contents_text(medication: &MedicationProfile, dose: &DoseInput) -> SigResult<String> {
    match dose.max_value {
        Some(_) => range_contents_text(medication, &dose.quantity(), &dose.upper_quantity()),
        None => Ok(contents_text(&ingredient_breakdown(medication, &dose.quantity())?)),
    }
}

/// "Each dose contains: amoxicillin 250 to 500 mg, clavulanate 62.5 to 125 mg"
pub fn range_contents_text(medication: &MedicationProfile, low: &Quantity, high: &Quantity) -> SigResult<String> {
    let lows = ingredient_breakdown(medication, low)?;
    let highs = ingredient_breakdown(medication, high)?;
    let parts: Vec<String> = lows
        .iter()
        .zip(&highs)
        .map(|(low, high)| {
            format!(
                "{} {} to {} {}",
                high.name,
                format_number(low.amount),
                format_number(high.amount),
                high.unit
            )
        })
        .collect();
    Ok(format!("Each dose contains: {}", parts.join(", ")))
}

pub struct MultiIngredientBuilder {
    core: BuilderCore,
    breakdown: Vec<IngredientAmount>,
}

impl MultiIngredientBuilder {
    pub fn new(medication: Arc<MedicationProfile>, engine: &Engine) -> Self {
        Self {
            core: BuilderCore::for_medication(medication, engine),
            breakdown: Vec::new(),
        }
    }

    /// Breakdown of the most recently added dose.
    pub fn breakdown(&self) -> &[IngredientAmount] {
        &self.breakdown
    }

    pub fn core(&self) -> &BuilderCore {
        &self.core
    }
}

impl SignatureBuilder for MultiIngredientBuilder {
    fn kind(&self) -> BuilderKind {
        BuilderKind::MultiIngredient
    }

    fn medication(&self) -> &MedicationProfile {
        self.core.medication()
    }

    fn add_dose(&mut self, dose: DoseInput) -> SigResult<&mut dyn SignatureBuilder> {
        let dose = DoseInput {
            unit: normalize_unit(&dose.unit),
            ..dose
        };
        self.core.check_dose(&dose)?;

        let breakdown = match ingredient_breakdown(self.core.medication(), &dose.quantity()) {
            Ok(breakdown) => breakdown,
            Err(err) => {
                self.core.audit_mut().decision(format!("rejected dose {}: {}", dose.quantity(), err));
                return Err(err);
            }
        };
        self.core
            .audit_mut()
            .decision(format!("{} -> {}", dose.quantity(), contents_text(&breakdown)));
        self.breakdown = breakdown;
        self.core.push_dose(StateDose::plain(dose));
        Ok(self)
    }

    fn add_timing(&mut self, timing: TimingInput) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_timing(timing)?;
        Ok(self)
    }

    fn add_route(&mut self, route: &str) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_route(route)?;
        Ok(self)
    }

    fn add_constraints(&mut self, constraints: DoseConstraints) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_constraints(constraints)?;
        Ok(self)
    }

    fn add_as_needed(&mut self, as_needed: AsNeeded) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_as_needed(as_needed);
        Ok(self)
    }

    fn add_special_instructions(&mut self, instructions: Vec<String>) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_special_instructions(instructions);
        Ok(self)
    }

    fn render(&self) -> SigResult<Vec<SignatureInstruction>> {
        let medication = self.core.medication();
        self.core
            .render_doses(|dose| Ok(vec![dose_contents_text(medication, &dose.dose)?]))
    }

    fn audit(&self) -> &AuditTrail {
        self.core.audit()
    }

    fn serialize(&self) -> SigResult<Value> {
        self.core.serialize(self.kind(), json!({ "breakdown": serde_json::to_value(&self.breakdown)? }))
    }
}
