//! Specialty dispensers (Topiclick, pumps, nasal sprays, inhalers).
//!
//! Doses may be given in actuations ("4 clicks") or in the canonical volume
//! or mass. Actuation counts are converted to the canonical amount for
//! doseAndRate while the patient keeps seeing the count.

use super::base::BuilderCore;
use super::specialty::{conversion_note, DispenserRules};
use super::{BuilderKind, SignatureBuilder};
use crate::audit::AuditTrail;
use crate::dosing::{AsNeeded, DoseConstraints, DoseInput, TimingInput};
use crate::engine::Engine;
use crate::error::SigResult;
use crate::instruction::SignatureInstruction;
use crate::medication::{DispenserInfo, MedicationProfile};
use crate::template::quantity_text;
use crate::units::normalize_unit;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct DispenserBuilder {
    core: BuilderCore,
    rules: DispenserRules,
}

impl DispenserBuilder {
    pub fn new(medication: Arc<MedicationProfile>, dispenser: DispenserInfo, engine: &Engine) -> Self {
        let rules = DispenserRules::new(dispenser);
        let core = rules.core(medication, engine);
        Self { core, rules }
    }

    pub fn dispenser(&self) -> &DispenserInfo {
        self.rules.dispenser()
    }

    pub fn core(&self) -> &BuilderCore {
        &self.core
    }
}

impl SignatureBuilder for DispenserBuilder {
    fn kind(&self) -> BuilderKind {
        BuilderKind::Dispenser
    }

    fn medication(&self) -> &MedicationProfile {
        self.core.medication()
    }

    fn add_dose(&mut self, dose: DoseInput) -> SigResult<&mut dyn SignatureBuilder> {
        let dose = DoseInput {
            unit: normalize_unit(&dose.unit),
            ..dose
        };
        let resolved = match self.rules.resolve_dose(dose.clone(), self.core.medication().primary_strength()) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.core.audit_mut().decision(format!(
                    "rejected dose {}: {}",
                    quantity_text(dose.value, &dose.unit),
                    err
                ));
                return Err(err);
            }
        };
        self.core.check_dose(&resolved.dose)?;

        if let Some(display) = &resolved.display {
            if display.unit != resolved.dose.unit {
                self.core.audit_mut().decision(format!(
                    "{} converted to {}",
                    quantity_text(display.value, &display.unit),
                    quantity_text(resolved.dose.value, &resolved.dose.unit)
                ));
            }
        }
        self.core.push_dose(resolved);
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
        self.core
            .render_doses(|dose| Ok(conversion_note(dose.shown(), &dose.dose).into_iter().collect()))
    }

    fn audit(&self) -> &AuditTrail {
        self.core.audit()
    }

    fn serialize(&self) -> SigResult<Value> {
        self.core.serialize(self.kind(), json!({ "dispenser": serde_json::to_value(self.rules.dispenser())? }))
    }
}
