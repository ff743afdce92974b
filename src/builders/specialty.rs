//! Dose handling for specialty products, shared by the fixed and as-needed
//! builders.
//!
//! A dispenser turns actuation counts into canonical volumes or masses and
//! caps the count per dose. A combination product annotates each dose with
//! the amount of every ingredient it delivers.

use super::base::{BuilderCore, DoseFormPolicy, StateDose};
use super::multi_ingredient::{dose_contents_text, ingredient_breakdown, range_contents_text};
use super::render::RenderDose;
use crate::dosing::{DoseInput, DoseRangeInput};
use crate::engine::Engine;
use crate::error::{SigError, SigResult};
use crate::medication::{DispenserInfo, MedicationProfile, Quantity, Ratio};
use crate::template::{dose_text, quantity_text, DosePhrase};
use crate::units::{
    clicks_to_ml, convert, inverse_scale, is_dispenser_unit, ml_to_clicks, round_to, sprays_to_mass, unit_kind,
    UnitKind, EPSILON,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct DispenserRules {
    dispenser: DispenserInfo,
}

impl DispenserRules {
    pub fn new(dispenser: DispenserInfo) -> Self {
        Self { dispenser }
    }

    pub fn dispenser(&self) -> &DispenserInfo {
        &self.dispenser
    }

    /// Builder core running under the dispenser's policy.
    pub fn core(&self, medication: Arc<MedicationProfile>, engine: &Engine) -> BuilderCore {
        let policy = DoseFormPolicy::for_dispenser(&medication, &self.dispenser);
        let mut core = BuilderCore::new(medication, policy, engine);
        core.audit_mut().decision(format!(
            "{} dispenser: {} per mL, max {} per dose",
            self.dispenser.kind,
            self.dispenser.units_per_ml.map_or("unknown".to_string(), |u| u.to_string()),
            self.dispenser.max_units_per_dose.map_or("unlimited".to_string(), |m| m.to_string()),
        ));
        core
    }

    pub fn label(&self) -> &'static str {
        self.dispenser.kind.unit_label()
    }

    fn check_unit_limit(&self, count: f64) -> SigResult<()> {
        if let Some(max) = self.dispenser.max_units_per_dose {
            if count > max + EPSILON {
                return Err(SigError::DispenserLimitExceeded(format!(
                    "{} exceeds the {} maximum of {} per dose",
                    quantity_text(count, self.label()),
                    self.dispenser.kind,
                    quantity_text(max, self.label())
                )));
            }
        }
        Ok(())
    }

    /// Canonical amount for `count` actuations. Click dispensers prefer the
    /// volume, spray devices the labelled mass per spray; with neither the
    /// raw count is kept.
    fn count_to_canonical(&self, count: f64) -> SigResult<Quantity> {
        let by_volume = match self.dispenser.units_per_ml {
            Some(units_per_ml) => Some(Quantity::new(clicks_to_ml(count, units_per_ml)?, "mL")),
            None => None,
        };
        let by_mass = self
            .dispenser
            .mass_per_unit
            .as_ref()
            .map(|per_unit| sprays_to_mass(count, per_unit));

        let preferred = if self.dispenser.kind.is_spray_based() {
            by_mass.or(by_volume)
        } else {
            by_volume.or(by_mass)
        };
        Ok(preferred.unwrap_or_else(|| Quantity::new(count, self.label())))
    }

    /// Actuation count delivering `amount`, when the dispenser data allows it.
    fn canonical_to_count(&self, amount: &Quantity, strength: Option<&Ratio>) -> SigResult<Option<f64>> {
        match unit_kind(&amount.unit) {
            UnitKind::Volume => match (self.dispenser.units_per_ml, convert(amount.value, &amount.unit, "mL")) {
                (Some(units_per_ml), Some(ml)) => Ok(Some(ml_to_clicks(ml, units_per_ml)?)),
                _ => Ok(None),
            },
            UnitKind::Mass => {
                if let Some(per_unit) = self.dispenser.mass_per_unit.as_ref().filter(|p| p.value > 0.0) {
                    if let Some(value) = convert(amount.value, &amount.unit, &per_unit.unit) {
                        return Ok(Some(value / per_unit.value));
                    }
                }
                // Through the product concentration (mg/mL)
                let volume = strength
                    .and_then(|strength| inverse_scale(amount, strength))
                    .and_then(|volume| convert(volume.value, &volume.unit, "mL"));
                match (self.dispenser.units_per_ml, volume) {
                    (Some(units_per_ml), Some(ml)) => Ok(Some(ml_to_clicks(ml, units_per_ml)?)),
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    /// Canonical dose plus the actuation count shown to the patient. Both
    /// ends of a ranged dose are held to the per-dose count limit.
    pub fn resolve_dose(&self, dose: DoseInput, strength: Option<&Ratio>) -> SigResult<StateDose> {
        dose.validate()?;
        let label = self.label();

        if is_dispenser_unit(&dose.unit) {
            if dose.unit != label {
                return Err(SigError::InvalidDose(format!(
                    "A {} dispenses {}s, not {}s",
                    self.dispenser.kind, label, dose.unit
                )));
            }
            self.check_unit_limit(dose.max_value.unwrap_or(dose.value))?;

            let canonical = self.count_to_canonical(dose.value)?;
            let max_value = match dose.max_value {
                Some(max) => Some(self.count_to_canonical(max)?.value),
                None => None,
            };
            return Ok(StateDose {
                dose: DoseInput {
                    value: canonical.value,
                    unit: canonical.unit,
                    max_value,
                },
                display: Some(dose),
            });
        }

        if !matches!(unit_kind(&dose.unit), UnitKind::Mass | UnitKind::Volume) {
            return Err(SigError::InvalidDose(format!(
                "Unit '{}' cannot be dispensed by a {}",
                dose.unit, self.dispenser.kind
            )));
        }

        let display = match self.canonical_to_count(&dose.quantity(), strength)? {
            Some(count) => {
                let max_count = match dose.max_value {
                    Some(max) => self.canonical_to_count(&Quantity::new(max, &dose.unit), strength)?,
                    None => None,
                };
                self.check_unit_limit(max_count.unwrap_or(count))?;
                Some(DoseInput {
                    value: round_to(count, 2),
                    unit: label.to_string(),
                    max_value: max_count.map(|m| round_to(m, 2)),
                })
            }
            None => None,
        };
        Ok(StateDose { dose, display })
    }

    pub fn resolve_range(&self, range: &DoseRangeInput, strength: Option<&Ratio>) -> SigResult<ResolvedRange> {
        let resolved = self.resolve_dose(DoseInput::new(range.min, &range.unit).with_max(range.max), strength)?;
        Ok(ResolvedRange {
            display: as_range(resolved.shown()),
            canonical: as_range(&resolved.dose),
        })
    }
}

fn as_range(dose: &DoseInput) -> DoseRangeInput {
    DoseRangeInput::new(dose.value, dose.max_value.unwrap_or(dose.value), &dose.unit)
}

/// "4 clicks = 1 mL", when the patient reads a different unit than the one
/// coded.
pub fn conversion_note(shown: &DoseInput, canonical: &DoseInput) -> Option<String> {
    if shown.unit == canonical.unit {
        return None;
    }
    Some(format!(
        "{} = {}",
        quantity_text(shown.value, &shown.unit),
        quantity_text(canonical.value, &canonical.unit)
    ))
}

/// A PRN dose range as the patient reads it and as it is coded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRange {
    pub display: DoseRangeInput,
    pub canonical: DoseRangeInput,
}

impl ResolvedRange {
    pub fn plain(range: DoseRangeInput) -> Self {
        Self {
            display: range.clone(),
            canonical: range,
        }
    }

    pub fn render_dose(&self) -> RenderDose {
        RenderDose::Range {
            display: self.display.clone(),
            canonical: self.canonical.clone(),
        }
    }

    fn conversion_note(&self) -> Option<String> {
        if self.display.unit == self.canonical.unit {
            return None;
        }
        let phrase = |range: &DoseRangeInput| {
            dose_text(&DosePhrase::Range {
                min: range.min,
                max: range.max,
                unit: range.unit.clone(),
            })
        };
        Some(format!("{} = {}", phrase(&self.display), phrase(&self.canonical)))
    }
}

/// How a builder treats doses of the medication it was created for.
#[derive(Debug, Clone, PartialEq)]
pub enum Specialty {
    Plain,
    Dispenser(DispenserRules),
    MultiIngredient,
}

impl Specialty {
    /// Combination products first, then specialty dispensers, as in the
    /// builder factory.
    pub fn for_medication(medication: &MedicationProfile) -> Self {
        if medication.is_multi_ingredient {
            Self::MultiIngredient
        } else if let Some(dispenser) = medication.resolved_dispenser() {
            Self::Dispenser(DispenserRules::new(dispenser))
        } else {
            Self::Plain
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Plain => "plain".to_string(),
            Self::Dispenser(rules) => format!("{} dispenser", rules.dispenser().kind),
            Self::MultiIngredient => "multi-ingredient".to_string(),
        }
    }

    pub fn core(&self, medication: Arc<MedicationProfile>, engine: &Engine) -> BuilderCore {
        match self {
            Self::Dispenser(rules) => rules.core(medication, engine),
            Self::Plain | Self::MultiIngredient => BuilderCore::for_medication(medication, engine),
        }
    }

    pub fn resolve_dose(&self, dose: DoseInput, medication: &MedicationProfile) -> SigResult<StateDose> {
        match self {
            Self::Dispenser(rules) => rules.resolve_dose(dose, medication.primary_strength()),
            Self::MultiIngredient => {
                ingredient_breakdown(medication, &dose.upper_quantity())?;
                Ok(StateDose::plain(dose))
            }
            Self::Plain => Ok(StateDose::plain(dose)),
        }
    }

    pub fn resolve_range(&self, range: DoseRangeInput, medication: &MedicationProfile) -> SigResult<ResolvedRange> {
        match self {
            Self::Dispenser(rules) => rules.resolve_range(&range, medication.primary_strength()),
            Self::MultiIngredient => {
                ingredient_breakdown(medication, &Quantity::new(range.max, &range.unit))?;
                Ok(ResolvedRange::plain(range))
            }
            Self::Plain => Ok(ResolvedRange::plain(range)),
        }
    }

    /// Additional instructions for one recorded dose.
    pub fn dose_notes(&self, dose: &StateDose, medication: &MedicationProfile) -> SigResult<Vec<String>> {
        match self {
            Self::Dispenser(_) => Ok(conversion_note(dose.shown(), &dose.dose).into_iter().collect()),
            Self::MultiIngredient => Ok(vec![dose_contents_text(medication, &dose.dose)?]),
            Self::Plain => Ok(Vec::new()),
        }
    }

    /// Additional instructions for a dose range.
    pub fn range_notes(&self, range: &ResolvedRange, medication: &MedicationProfile) -> SigResult<Vec<String>> {
        match self {
            Self::Dispenser(_) => Ok(range.conversion_note().into_iter().collect()),
            Self::MultiIngredient => {
                let canonical = &range.canonical;
                Ok(vec![range_contents_text(
                    medication,
                    &Quantity::new(canonical.min, &canonical.unit),
                    &Quantity::new(canonical.max, &canonical.unit),
                )?])
            }
            Self::Plain => Ok(Vec::new()),
        }
    }
}
