//! Builder for the plain dose-form families: solid, liquid, topical and
//! injection. The family's `DoseFormPolicy` supplies every rule.

use super::base::BuilderCore;
use super::{BuilderKind, SignatureBuilder};
use crate::audit::AuditTrail;
use crate::dosing::{AsNeeded, DoseConstraints, DoseInput, TimingInput};
use crate::engine::Engine;
use crate::error::SigResult;
use crate::instruction::SignatureInstruction;
use crate::medication::MedicationProfile;
use serde_json::Value;
use std::sync::Arc;

pub struct StandardBuilder {
    core: BuilderCore,
}

impl StandardBuilder {
    pub fn new(medication: Arc<MedicationProfile>, engine: &Engine) -> Self {
        Self {
            core: BuilderCore::for_medication(medication, engine),
        }
    }

    pub fn core(&self) -> &BuilderCore {
        &self.core
    }
}

impl SignatureBuilder for StandardBuilder {
    fn kind(&self) -> BuilderKind {
        BuilderKind::for_family(self.core.policy().family)
    }

    fn medication(&self) -> &MedicationProfile {
        self.core.medication()
    }

    fn add_dose(&mut self, dose: DoseInput) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_dose(dose)?;
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
        self.core.render_doses(|_| Ok(Vec::new()))
    }

    fn audit(&self) -> &AuditTrail {
        self.core.audit()
    }

    fn serialize(&self) -> SigResult<Value> {
        self.core.serialize(self.kind(), Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{Warning, WarningCode};
    use crate::dosing::{MaxDosePerPeriod, PeriodUnit, WhenTag};
    use crate::error::SigError;
    use crate::instruction::RelationshipKind;
    use crate::medication::{DosageLimits, DoseForm, Quantity, ScoringType};

    fn tablet(scoring: Option<ScoringType>) -> Arc<MedicationProfile> {
        let mut med = MedicationProfile::new("warfarin-5", "Warfarin 5 mg tablet", DoseForm::Tablet)
            .with_ingredient("warfarin", Quantity::new(5.0, "mg"), Quantity::new(1.0, "tablet"));
        med.scoring = scoring;
        Arc::new(med)
    }

    fn suspension() -> Arc<MedicationProfile> {
        Arc::new(
            MedicationProfile::new("amox-susp", "Amoxicillin 250 mg/5 mL suspension", DoseForm::Suspension)
                .with_ingredient("amoxicillin", Quantity::new(250.0, "mg"), Quantity::new(5.0, "mL")),
        )
    }

    #[test]
    fn test_tablet_render() {
        let engine = Engine::default();
        let mut builder = StandardBuilder::new(tablet(Some(ScoringType::Half)), &engine);
        builder
            .add_dose(DoseInput::new(1.5, "tablets")).unwrap()
            .add_timing(TimingInput::daily(1).with_when(WhenTag::Evening)).unwrap()
            .add_route("PO").unwrap();

        let rendered = builder.render().unwrap();
        assert_eq!(rendered.len(), 1);
        let instruction = &rendered[0];
        assert_eq!(instruction.text, "Take 1 1/2 tablets by mouth once daily in the evening.");
        assert_eq!(instruction.route.code(), Some("26643006"));
        assert_eq!(instruction.timing.repeat.frequency, 1);
        assert_eq!(instruction.first_dose_quantity().unwrap().value, 1.5);
        assert!(instruction.relationship.is_none());
    }

    #[test]
    fn test_scoring_enforced_on_add_dose() {
        let engine = Engine::default();

        let mut unscored = StandardBuilder::new(tablet(Some(ScoringType::None)), &engine);
        assert!(matches!(
            unscored.add_dose(DoseInput::new(0.5, "tablet")),
            Err(SigError::FractionalDoseNotAllowed(_))
        ));
        assert!(unscored.add_dose(DoseInput::new(2.0, "tablet")).is_ok());

        let mut quarter = StandardBuilder::new(tablet(Some(ScoringType::Quarter)), &engine);
        assert!(quarter.add_dose(DoseInput::new(0.75, "tablet")).is_ok());
        assert!(matches!(
            quarter.add_dose(DoseInput::new(0.2, "tablet")),
            Err(SigError::BelowTabletFloor(_))
        ));

        // mg doses are not tablet fractions
        let mut by_mass = StandardBuilder::new(tablet(Some(ScoringType::None)), &engine);
        assert!(by_mass.add_dose(DoseInput::new(2.5, "mg")).is_ok());
        assert!(by_mass.add_dose(DoseInput::new(5.0, "mL")).is_err());
    }

    #[test]
    fn test_non_fractional_product_rejects_split_tablets() {
        let engine = Engine::default();
        let mut med = MedicationProfile::new("metop-er", "Metoprolol ER 50 mg tablet", DoseForm::Tablet)
            .with_ingredient("metoprolol", Quantity::new(50.0, "mg"), Quantity::new(1.0, "tablet"));
        med.is_fractional = Some(false);
        let mut builder = StandardBuilder::new(Arc::new(med), &engine);
        assert!(matches!(
            builder.add_dose(DoseInput::new(1.3, "tablet")),
            Err(SigError::FractionalDoseNotAllowed(_))
        ));
        assert!(builder.add_dose(DoseInput::new(1.0, "tablet")).is_ok());
    }

    #[test]
    fn test_rejected_dose_leaves_no_state_but_is_audited() {
        let engine = Engine::default();
        let mut builder = StandardBuilder::new(tablet(Some(ScoringType::None)), &engine);
        assert!(builder.add_dose(DoseInput::new(1.5, "tablet")).is_err());
        assert!(builder.core().state().doses.is_empty());
        assert!(builder.explain().contains("rejected dose"));
    }

    #[test]
    fn test_render_requires_complete_state() {
        let engine = Engine::default();
        let mut builder = StandardBuilder::new(tablet(None), &engine);
        assert!(matches!(builder.render(), Err(SigError::IncompleteState(_))));
        builder.add_dose(DoseInput::new(1.0, "tablet")).unwrap();
        assert!(matches!(builder.render(), Err(SigError::IncompleteState(_))));
        builder.add_timing(TimingInput::daily(1)).unwrap();
        assert!(matches!(builder.render(), Err(SigError::IncompleteState(_))));
        builder.add_route("oral").unwrap();
        assert!(builder.render().is_ok());
    }

    #[test]
    fn test_render_is_idempotent() {
        let engine = Engine::default();
        let mut builder = StandardBuilder::new(tablet(None), &engine);
        builder
            .add_dose(DoseInput::new(1.0, "tablet")).unwrap()
            .add_timing(TimingInput::daily(2)).unwrap()
            .add_route("oral").unwrap();
        let before = builder.core().state().clone();
        let first = builder.render().unwrap();
        let second = builder.render().unwrap();
        assert_eq!(first, second);
        assert_eq!(&before, builder.core().state());
    }

    #[test]
    fn test_suspension_adds_shake_well_and_flags_large_volume() {
        let engine = Engine::default();
        let mut builder = StandardBuilder::new(suspension(), &engine);
        builder
            .add_dose(DoseInput::new(1200.0, "mL")).unwrap()
            .add_timing(TimingInput::new(1, 8.0, PeriodUnit::Hour)).unwrap()
            .add_route("oral").unwrap();
        assert_eq!(builder.kind(), BuilderKind::Liquid);
        assert!(builder.warnings().iter().any(|w| w.code == WarningCode::LargeVolume));

        let rendered = builder.render().unwrap();
        assert_eq!(rendered[0].text, "Take 1200 mL by mouth every 8 hours.");
        assert!(rendered[0].additional_instruction.contains(&"Shake well before use.".to_string()));
    }

    #[test]
    fn test_unknown_and_unusual_routes_are_advisory() {
        let engine = Engine::default();
        let mut builder = StandardBuilder::new(tablet(None), &engine);
        builder.add_route("intrathecal").unwrap();
        assert!(builder.warnings().iter().any(|w| w.code == WarningCode::UnknownRoute));

        builder.add_route("IV").unwrap();
        assert!(builder.warnings().iter().any(|w| w.code == WarningCode::UnusualRoute));
        assert!(matches!(builder.add_route("  "), Err(SigError::InvalidRoute(_))));

        builder
            .add_dose(DoseInput::new(1.0, "tablet")).unwrap()
            .add_timing(TimingInput::daily(1)).unwrap();
        assert_eq!(builder.render().unwrap()[0].route.code(), Some("47625008"));
    }

    #[test]
    fn test_medication_limits_and_constraints() {
        let engine = Engine::default();
        let med = MedicationProfile::new("apap", "Acetaminophen 500 mg", DoseForm::Tablet)
            .with_ingredient("acetaminophen", Quantity::new(500.0, "mg"), Quantity::new(1.0, "tablet"))
            .with_limits(DosageLimits {
                min_dose: None,
                max_dose: Some(Quantity::new(1000.0, "mg")),
                step: None,
            });
        let mut builder = StandardBuilder::new(Arc::new(med), &engine);
        assert!(matches!(
            builder.add_dose(DoseInput::new(3.0, "tablet")),
            Err(SigError::DoseOutOfRange(_))
        ));

        builder
            .add_dose(DoseInput::new(2.0, "tablet")).unwrap()
            .add_timing(TimingInput::new(1, 6.0, PeriodUnit::Hour)).unwrap()
            .add_route("oral").unwrap()
            .add_as_needed(AsNeeded::for_reason("pain")).unwrap()
            .add_constraints(DoseConstraints {
                max_dose_per_period: Some(MaxDosePerPeriod {
                    dose: Quantity::new(4.0, "g"),
                    period: 1.0,
                    period_unit: PeriodUnit::Day,
                }),
                max_dose_per_administration: None,
            }).unwrap()
            .add_special_instructions(vec!["Avoid alcohol.".to_string(), " ".to_string()]).unwrap();

        let instruction = builder.render().unwrap().remove(0);
        assert_eq!(instruction.text, "Take 2 tablets by mouth every 6 hours as needed for pain.");
        assert_eq!(instruction.as_needed_boolean, Some(true));
        assert_eq!(
            instruction.additional_instruction,
            vec!["Do not exceed 4 g in 24 hours".to_string(), "Avoid alcohol.".to_string()]
        );
        assert_eq!(instruction.max_dose_per_period.unwrap().numerator.unit, "g");

        let too_small = DoseConstraints {
            max_dose_per_period: None,
            max_dose_per_administration: Some(Quantity::new(500.0, "mg")),
        };
        assert!(builder.add_constraints(too_small).is_err());
        assert!(!builder.warnings().iter().any(|w| w.code == WarningCode::DailyDoseMismatch));
    }

    #[test]
    fn test_schedule_exceeding_period_maximum_warns() {
        let engine = Engine::default();
        let med = MedicationProfile::new("apap", "Acetaminophen 500 mg", DoseForm::Tablet)
            .with_ingredient("acetaminophen", Quantity::new(500.0, "mg"), Quantity::new(1.0, "tablet"));
        let constraints = DoseConstraints {
            max_dose_per_period: Some(MaxDosePerPeriod {
                dose: Quantity::new(3.0, "g"),
                period: 1.0,
                period_unit: PeriodUnit::Day,
            }),
            max_dose_per_administration: None,
        };

        // constraints first, then a schedule of 6 g a day
        let mut builder = StandardBuilder::new(Arc::new(med.clone()), &engine);
        builder
            .add_constraints(constraints.clone()).unwrap()
            .add_dose(DoseInput::new(2.0, "tablet")).unwrap()
            .add_timing(TimingInput::new(1, 4.0, PeriodUnit::Hour)).unwrap()
            .add_route("oral").unwrap();
        let mismatches: Vec<Warning> = builder
            .warnings()
            .into_iter()
            .filter(|w| w.code == WarningCode::DailyDoseMismatch)
            .collect();
        assert_eq!(mismatches.len(), 1);
        assert!(mismatches[0].message.contains("12 tablet per day"));

        // schedule first, constraints last
        let mut late = StandardBuilder::new(Arc::new(med), &engine);
        late.add_dose(DoseInput::new(2.0, "tablet")).unwrap()
            .add_timing(TimingInput::new(1, 4.0, PeriodUnit::Hour)).unwrap()
            .add_constraints(constraints).unwrap();
        assert!(late.warnings().iter().any(|w| w.code == WarningCode::DailyDoseMismatch));
    }

    #[test]
    fn test_multiple_doses_render_sequentially() {
        let engine = Engine::default();
        let mut builder = StandardBuilder::new(tablet(None), &engine);
        builder
            .add_dose(DoseInput::new(1.0, "tablet")).unwrap()
            .add_dose(DoseInput::new(2.0, "tablet")).unwrap()
            .add_timing(TimingInput::daily(1)).unwrap()
            .add_route("oral").unwrap();
        let rendered = builder.render().unwrap();
        assert_eq!(rendered.len(), 2);
        let link = rendered[0].relationship.as_ref().unwrap();
        assert_eq!(link.kind, RelationshipKind::Sequential);
        assert_eq!(link.next.as_deref(), Some("dose-2"));
        assert_eq!(rendered[1].relationship.as_ref().unwrap().previous.as_deref(), Some("dose-1"));
    }

    #[test]
    fn test_serialize_snapshot() {
        let engine = Engine::default();
        let mut builder = StandardBuilder::new(tablet(None), &engine);
        builder.add_dose(DoseInput::new(1.0, "tablet")).unwrap();
        let snapshot = builder.serialize().unwrap();
        assert_eq!(snapshot["builder"], "solid");
        assert_eq!(snapshot["state"]["doses"][0]["dose"]["value"], 1.0);
        assert_eq!(snapshot["medication"]["dose_form"], "tablet");
    }
}
