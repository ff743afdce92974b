pub mod base;
pub mod dispenser;
pub mod multi_ingredient;
pub mod prn;
pub mod render;
pub mod specialty;
pub mod standard;
pub mod tapering;

use crate::audit::{AuditTrail, Warning};
use crate::dosing::{AsNeeded, DoseConstraints, DoseInput, TimingInput};
use crate::engine::Engine;
use crate::error::SigResult;
use crate::instruction::SignatureInstruction;
use crate::medication::{DoseFormFamily, MedicationProfile};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use base::{BuilderCore, BuilderState, DoseFormPolicy, StateDose};
pub use dispenser::DispenserBuilder;
pub use multi_ingredient::{IngredientAmount, MultiIngredientBuilder};
pub use prn::PrnBuilder;
pub use specialty::{DispenserRules, ResolvedRange, Specialty};
pub use standard::StandardBuilder;
pub use tapering::{TaperingBuilder, TaperingSchedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderKind {
    Solid,
    Liquid,
    Topical,
    Injection,
    Dispenser,
    MultiIngredient,
    Tapering,
    Prn,
}

impl BuilderKind {
    pub fn for_family(family: DoseFormFamily) -> Self {
        match family {
            DoseFormFamily::Solid => Self::Solid,
            DoseFormFamily::Liquid => Self::Liquid,
            DoseFormFamily::Topical => Self::Topical,
            DoseFormFamily::Injection => Self::Injection,
        }
    }
}

/// Accumulates dosing inputs for one medication and renders signatures.
///
/// Configuration calls chain: `b.add_dose(d)?.add_timing(t)?.add_route("oral")?`.
/// A builder belongs to one request; `render` never changes its state.
pub trait SignatureBuilder: Send {
    fn kind(&self) -> BuilderKind;
    fn medication(&self) -> &MedicationProfile;
    fn add_dose(&mut self, dose: DoseInput) -> SigResult<&mut dyn SignatureBuilder>;
    fn add_timing(&mut self, timing: TimingInput) -> SigResult<&mut dyn SignatureBuilder>;
    fn add_route(&mut self, route: &str) -> SigResult<&mut dyn SignatureBuilder>;
    fn add_constraints(&mut self, constraints: DoseConstraints) -> SigResult<&mut dyn SignatureBuilder>;
    fn add_as_needed(&mut self, as_needed: AsNeeded) -> SigResult<&mut dyn SignatureBuilder>;
    fn add_special_instructions(&mut self, instructions: Vec<String>) -> SigResult<&mut dyn SignatureBuilder>;
    fn render(&self) -> SigResult<Vec<SignatureInstruction>>;
    fn audit(&self) -> &AuditTrail;

    fn explain(&self) -> String {
        self.audit().explain()
    }

    fn warnings(&self) -> Vec<Warning> {
        self.audit().warnings()
    }

    /// Debug-only JSON snapshot of medication and state.
    fn serialize(&self) -> SigResult<serde_json::Value>;
}

/// Selects the builder for a medication. First match wins: multi-ingredient,
/// tapering, specialty dispenser, dose-form family, then tablet fallback.
pub fn create_builder(medication: Arc<MedicationProfile>, engine: &Engine) -> SigResult<Box<dyn SignatureBuilder>> {
    medication.validate()?;

    if medication.is_multi_ingredient {
        debug!("{}: multi-ingredient builder", medication.name);
        return Ok(Box::new(MultiIngredientBuilder::new(medication, engine)));
    }

    if medication.is_taper {
        debug!("{}: tapering builder", medication.name);
        return Ok(Box::new(TaperingBuilder::new(medication, engine)));
    }

    if let Some(dispenser) = medication.resolved_dispenser() {
        debug!("{}: {} dispenser builder", medication.name, dispenser.kind);
        return Ok(Box::new(DispenserBuilder::new(medication, dispenser, engine)));
    }

    debug!("{}: standard builder for {}", medication.name, medication.dose_form);
    Ok(Box::new(StandardBuilder::new(medication, engine)))
}

/// Ranged as-needed builder. Dispenser and combination products keep their
/// specialty dose handling.
pub fn create_prn_builder(medication: Arc<MedicationProfile>, engine: &Engine) -> SigResult<PrnBuilder> {
    medication.validate()?;
    Ok(PrnBuilder::new(medication, engine))
}

pub fn create_tapering_builder(medication: Arc<MedicationProfile>, engine: &Engine) -> SigResult<TaperingBuilder> {
    medication.validate()?;
    Ok(TaperingBuilder::new(medication, engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::WarningCode;
    use crate::dosing::PeriodUnit;
    use crate::error::SigError;
    use crate::medication::{DispenserInfo, DispenserKind, DoseForm, Quantity};

    fn tablet(name: &str) -> MedicationProfile {
        MedicationProfile::new("med-1", name, DoseForm::Tablet)
            .with_ingredient("lisinopril", Quantity::new(10.0, "mg"), Quantity::new(1.0, "tablet"))
    }

    #[test]
    fn test_factory_selection_order() {
        let engine = Engine::default();

        let combo = MedicationProfile::new("m", "Augmentin", DoseForm::Suspension)
            .with_ingredient("amoxicillin", Quantity::new(250.0, "mg"), Quantity::new(5.0, "mL"))
            .with_ingredient("clavulanate", Quantity::new(62.5, "mg"), Quantity::new(5.0, "mL"))
            .tapering();
        assert_eq!(create_builder(Arc::new(combo), &engine).unwrap().kind(), BuilderKind::MultiIngredient);

        let taper = tablet("Prednisone 10 mg").tapering();
        assert_eq!(create_builder(Arc::new(taper), &engine).unwrap().kind(), BuilderKind::Tapering);

        let clicks = MedicationProfile::new("m", "Estradiol Topiclick", DoseForm::Cream)
            .with_ingredient("estradiol", Quantity::new(1.0, "mg"), Quantity::new(1.0, "mL"));
        assert_eq!(create_builder(Arc::new(clicks), &engine).unwrap().kind(), BuilderKind::Dispenser);

        let catalog_dispenser = tablet("Odd")
            .with_dispenser(DispenserInfo::for_kind(DispenserKind::Pump));
        assert_eq!(
            create_builder(Arc::new(catalog_dispenser), &engine).unwrap().kind(),
            BuilderKind::Dispenser
        );

        let liquid = MedicationProfile::new("m", "Cetirizine syrup", DoseForm::Syrup)
            .with_ingredient("cetirizine", Quantity::new(5.0, "mg"), Quantity::new(5.0, "mL"));
        assert_eq!(create_builder(Arc::new(liquid), &engine).unwrap().kind(), BuilderKind::Liquid);

        assert_eq!(create_builder(Arc::new(tablet("Lisinopril")), &engine).unwrap().kind(), BuilderKind::Solid);
    }

    #[test]
    fn test_unknown_dose_form_falls_back_to_tablet() {
        let engine = Engine::default();
        let wafer = MedicationProfile::new("m", "Mystery wafer", "wafer".parse().unwrap())
            .with_ingredient("x", Quantity::new(5.0, "mg"), Quantity::new(1.0, "tablet"));
        let mut builder = create_builder(Arc::new(wafer), &engine).unwrap();
        assert_eq!(builder.kind(), BuilderKind::Solid);
        assert!(builder.warnings().iter().any(|w| w.code == WarningCode::DoseFormFallback));

        builder
            .add_dose(DoseInput::new(1.0, "tablet")).unwrap()
            .add_timing(TimingInput::new(1, 1.0, PeriodUnit::Day)).unwrap()
            .add_route("oral").unwrap();
        let rendered = builder.render().unwrap();
        assert_eq!(rendered[0].text, "Take 1 tablet by mouth once daily.");
    }

    #[test]
    fn test_factory_rejects_invalid_profile() {
        let engine = Engine::default();
        let empty = MedicationProfile::new("m", "Nothing", DoseForm::Tablet);
        assert!(matches!(
            create_builder(Arc::new(empty), &engine),
            Err(SigError::InvalidMedication(_))
        ));
    }
}
