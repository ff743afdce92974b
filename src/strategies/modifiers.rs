//! Stock modifiers. Each works from the rendered instruction and the
//! request alone.

use super::{ModifierStrategy, StrategyContext};
use crate::error::SigResult;
use crate::instruction::SignatureInstruction;
use crate::medication::{DispenserInfo, MedicationProfile, Quantity};
use crate::template::quantity_text;
use crate::units::{
    convert, format_number, inverse_scale, is_tablet_unit, scale_by_strength, unit_kind, UnitKind,
};

/// Inserts `annotation` after the first " {needle}" in `text`, unless the
/// text already carries it.
fn annotate(text: &str, needle: &str, annotation: &str) -> Option<String> {
    let annotated = format!("{} ({})", needle, annotation);
    if text.contains(&annotated) {
        return None;
    }
    let pattern = format!(" {}", needle);
    let at = text.find(&pattern)? + 1;
    let mut out = String::with_capacity(text.len() + annotation.len() + 3);
    out.push_str(&text[..at]);
    out.push_str(&annotated);
    out.push_str(&text[at + needle.len()..]);
    Some(out)
}

fn mass_text(quantity: &Quantity) -> String {
    format!("{} {}", format_number(quantity.value), quantity.unit)
}

/// "2 tablets" becomes "2 tablets (20 mg)" for single-ingredient solid
/// doses.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrengthDisplayModifier;

impl ModifierStrategy for StrengthDisplayModifier {
    fn name(&self) -> &str {
        "strength_display"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn applies_to(&self, ctx: &StrategyContext) -> bool {
        let medication = &ctx.medication;
        medication.ingredients.len() == 1 && medication.resolved_dispenser().is_none()
    }

    fn modify(&self, instruction: SignatureInstruction, ctx: &StrategyContext) -> SigResult<SignatureInstruction> {
        let (Some(dose), Some(strength)) = (instruction.first_dose_quantity(), ctx.medication.primary_strength())
        else {
            return Ok(instruction);
        };
        if !is_tablet_unit(&dose.unit) {
            return Ok(instruction);
        }
        let Some(mass) = scale_by_strength(&Quantity::new(dose.value, &dose.unit), strength) else {
            return Ok(instruction);
        };

        let needle = quantity_text(dose.value, &dose.unit);
        Ok(match annotate(&instruction.text, &needle, &mass_text(&mass)) {
            Some(text) => instruction.with_text(text),
            None => instruction,
        })
    }
}

/// "4 clicks" becomes "4 clicks (100 mg)" for dispenser products.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispenserUnitModifier;

impl DispenserUnitModifier {
    /// Actuation count and delivered mass for a canonical dose.
    fn count_and_mass(
        medication: &MedicationProfile,
        dispenser: &DispenserInfo,
        dose: &Quantity,
    ) -> Option<(f64, Quantity)> {
        let strength = medication.primary_strength();
        match unit_kind(&dose.unit) {
            UnitKind::Volume => {
                let ml = convert(dose.value, &dose.unit, "mL")?;
                let mass = scale_by_strength(&Quantity::new(ml, "mL"), strength?)?;
                Some((ml * dispenser.units_per_ml?, mass))
            }
            UnitKind::Mass => {
                let count = match &dispenser.mass_per_unit {
                    Some(per_unit) if per_unit.value > 0.0 => {
                        convert(dose.value, &dose.unit, &per_unit.unit)? / per_unit.value
                    }
                    _ => {
                        let volume = inverse_scale(dose, strength?)?;
                        convert(volume.value, &volume.unit, "mL")? * dispenser.units_per_ml?
                    }
                };
                Some((count, dose.clone()))
            }
            _ => None,
        }
    }
}

impl ModifierStrategy for DispenserUnitModifier {
    fn name(&self) -> &str {
        "dispenser_units"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn applies_to(&self, ctx: &StrategyContext) -> bool {
        ctx.medication.resolved_dispenser().is_some()
    }

    fn modify(&self, instruction: SignatureInstruction, ctx: &StrategyContext) -> SigResult<SignatureInstruction> {
        let (Some(dose), Some(dispenser)) = (instruction.first_dose_quantity(), ctx.medication.resolved_dispenser())
        else {
            return Ok(instruction);
        };
        let dose = Quantity::new(dose.value, &dose.unit);
        let Some((count, mass)) = Self::count_and_mass(&ctx.medication, &dispenser, &dose) else {
            return Ok(instruction);
        };

        let needle = quantity_text(count, dispenser.kind.unit_label());
        Ok(match annotate(&instruction.text, &needle, &mass_text(&mass)) {
            Some(text) => instruction.with_text(text),
            None => instruction,
        })
    }
}

const DO_NOT_SHARE: &str = "Do not share this medication.";
const DO_NOT_STOP: &str = "Do not stop taking this medication suddenly.";

/// Counselling lines for controlled substances and tapered medications.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecialInstructionModifier;

impl ModifierStrategy for SpecialInstructionModifier {
    fn name(&self) -> &str {
        "special_instructions"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn applies_to(&self, ctx: &StrategyContext) -> bool {
        ctx.medication.is_controlled || ctx.medication.is_taper || ctx.is_taper()
    }

    fn modify(&self, instruction: SignatureInstruction, ctx: &StrategyContext) -> SigResult<SignatureInstruction> {
        let mut out = instruction;
        if ctx.medication.is_controlled {
            out = out.with_additional_instruction(DO_NOT_SHARE);
        }
        if ctx.medication.is_taper || ctx.is_taper() {
            out = out.with_additional_instruction(DO_NOT_STOP);
        }
        Ok(out)
    }
}
