//! As-needed regimens with dose ranges, frequency ranges and a declared
//! maximum daily dose. Dispenser and combination products keep their
//! specialty dose handling through `Specialty`.

use super::base::{sequential_link, BuilderCore, StateDose};
use super::render::{fixed_frequency, max_dose_text, RenderDose, RenderInput};
use super::specialty::{ResolvedRange, Specialty};
use super::{BuilderKind, SignatureBuilder};
use crate::audit::{AuditTrail, Warning};
use crate::dosing::{
    AsNeeded, DoseConstraints, DoseInput, DoseRangeInput, FrequencyRangeInput, MaxDailyDoseConstraint,
    MaxDosePerPeriod, PeriodUnit, TimingInput,
};
use crate::engine::Engine;
use crate::error::{SigError, SigResult};
use crate::instruction::SignatureInstruction;
use crate::medication::{MedicationProfile, Quantity};
use crate::template::{quantity_text, FrequencyPhrase};
use crate::units::{format_number, normalize_unit, EPSILON};
use crate::validation::{
    check_max_daily, check_period_maximum, express_in, validate_dose_range, validate_dose_unit,
    validate_frequency_range, DailyExposure, FrequencyWindow,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct PrnBuilder {
    core: BuilderCore,
    specialty: Specialty,
    dose_range: Option<ResolvedRange>,
    frequency_range: Option<FrequencyRangeInput>,
    window: Option<FrequencyWindow>,
    max_daily: Option<MaxDailyDoseConstraint>,
}

impl PrnBuilder {
    pub fn new(medication: Arc<MedicationProfile>, engine: &Engine) -> Self {
        let specialty = Specialty::for_medication(&medication);
        let mut core = specialty.core(medication, engine);
        if specialty != Specialty::Plain {
            core.audit_mut()
                .decision(format!("as-needed doses use {} handling", specialty.label()));
        }
        core.add_as_needed(AsNeeded::default());
        Self {
            core,
            specialty,
            dose_range: None,
            frequency_range: None,
            window: None,
            max_daily: None,
        }
    }

    pub fn core(&self) -> &BuilderCore {
        &self.core
    }

    pub fn specialty(&self) -> &Specialty {
        &self.specialty
    }

    /// The allowed range in canonical units.
    pub fn dose_range(&self) -> Option<&DoseRangeInput> {
        self.dose_range.as_ref().map(|r| &r.canonical)
    }

    pub fn frequency_window(&self) -> Option<&FrequencyWindow> {
        self.window.as_ref()
    }

    /// Sets the allowed dose range. Later doses must fall inside it.
    pub fn set_dose_range(&mut self, range: DoseRangeInput) -> SigResult<&mut Self> {
        let range = DoseRangeInput {
            unit: normalize_unit(&range.unit),
            ..range
        };
        let medication = self.core.medication();
        let resolved = self.specialty.resolve_range(range, medication)?;
        let canonical = &resolved.canonical;
        validate_dose_unit(self.core.policy().family, &canonical.unit)?;
        let warnings = validate_dose_range(
            canonical,
            medication.limits.as_ref(),
            medication.primary_strength(),
            self.core.thresholds(),
        )?;

        for recorded in &self.core.state().doses {
            self.check_in_range(canonical, &recorded.dose)?;
        }

        let display = &resolved.display;
        let audit = self.core.audit_mut();
        audit.extend_warnings(warnings);
        audit.state(format!(
            "dose range set to {} to {} {}",
            format_number(display.min),
            format_number(display.max),
            display.unit
        ));
        self.dose_range = Some(resolved);
        self.recheck_limits()?;
        Ok(self)
    }

    /// Sets the allowed frequency range and derives the dosing window.
    pub fn set_frequency_range(&mut self, range: FrequencyRangeInput) -> SigResult<&mut Self> {
        let (window, warnings) = validate_frequency_range(&range, self.core.thresholds())?;
        if let Some(timing) = &self.core.state().timing {
            Self::check_timing_in_range(&range, timing)?;
        }

        let audit = self.core.audit_mut();
        audit.extend_warnings(warnings);
        audit.state(format!(
            "frequency range set to {} to {} per {} {}",
            range.min_frequency, range.max_frequency, range.period, range.period_unit
        ));
        audit.decision(format!(
            "dosing interval {} to {} hours, at most {} administrations per day",
            format_number(window.min_interval_hours),
            format_number(window.max_interval_hours),
            window.max_daily_administrations
        ));
        self.frequency_range = Some(range);
        self.window = Some(window);
        self.recheck_limits()?;
        Ok(self)
    }

    /// Declares the maximum daily dose and cross-checks it against the
    /// theoretical daily maximum of the regimen.
    pub fn set_max_daily_dose_constraint(&mut self, constraint: MaxDailyDoseConstraint) -> SigResult<&mut Self> {
        check_max_daily(&constraint, &[], None)?;
        self.core
            .audit_mut()
            .state(format!("maximum daily dose set to {}", constraint.max_dose_per_day));
        self.max_daily = Some(constraint);
        self.recheck_limits()?;
        Ok(self)
    }

    /// Largest single amount against the busiest schedule: the range maximum
    /// (or each recorded dose) at the window's ceiling (or the fixed timing).
    pub fn exposures(&self) -> Vec<DailyExposure> {
        let state = self.core.state();
        let administrations = match (&self.window, &state.timing) {
            (Some(window), _) => window.max_daily_administrations as f64,
            (None, Some(timing)) => timing.per_day(),
            (None, None) => return Vec::new(),
        };
        let amounts: Vec<Quantity> = match &self.dose_range {
            Some(range) => vec![Quantity::new(range.canonical.max, &range.canonical.unit)],
            None => state.doses.iter().map(|d| d.dose.upper_quantity()).collect(),
        };
        amounts
            .into_iter()
            .map(|per_dose| DailyExposure::new(per_dose, administrations))
            .collect()
    }

    /// Re-runs the daily and per-period maximum checks after any change to
    /// doses, ranges, timing or constraints.
    fn recheck_limits(&mut self) -> SigResult<()> {
        let exposures = self.exposures();
        let strength = self.core.medication().primary_strength();
        let mut warnings: Vec<Warning> = match &self.max_daily {
            Some(constraint) => check_max_daily(constraint, &exposures, strength)?,
            None => Vec::new(),
        };
        if let Some(max) = self
            .core
            .state()
            .constraints
            .as_ref()
            .and_then(|c| c.max_dose_per_period.as_ref())
        {
            warnings.extend(exposures.iter().filter_map(|e| check_period_maximum(max, e, strength)));
        }
        let audit = self.core.audit_mut();
        for warning in warnings {
            audit.warn_once(warning);
        }
        Ok(())
    }

    fn check_in_range(&self, range: &DoseRangeInput, dose: &DoseInput) -> SigResult<()> {
        let strength = self.core.medication().primary_strength();
        for candidate in [dose.quantity(), dose.upper_quantity()] {
            let value = express_in(&candidate, &range.unit, strength).ok_or_else(|| {
                SigError::InvalidDose(format!(
                    "Dose of {} cannot be compared with the {} dose range",
                    candidate, range.unit
                ))
            })?;
            if !range.contains(value) {
                return Err(SigError::DoseOutOfRange(format!(
                    "Dose of {} is outside the allowed range of {} to {} {}",
                    candidate,
                    format_number(range.min),
                    format_number(range.max),
                    range.unit
                )));
            }
        }
        Ok(())
    }

    fn check_timing_in_range(range: &FrequencyRangeInput, timing: &TimingInput) -> SigResult<()> {
        // administrations of `timing` within one range period
        let per_period = timing.frequency as f64 * range.period_hours() / (timing.period * timing.period_unit.hours());
        if per_period < range.min_frequency as f64 - EPSILON || per_period > range.max_frequency as f64 + EPSILON {
            return Err(SigError::FrequencyOutOfRange(format!(
                "{} per {} {} is outside the allowed range of {} to {} per {} {}",
                timing.frequency,
                format_number(timing.period),
                timing.period_unit,
                range.min_frequency,
                range.max_frequency,
                format_number(range.period),
                range.period_unit
            )));
        }
        Ok(())
    }

    fn max_daily_text(&self) -> Vec<String> {
        let Some(constraint) = &self.max_daily else {
            return Vec::new();
        };
        let mut text = vec![max_dose_text(&constraint.max_dose_per_day, 1.0, PeriodUnit::Day)];
        if let Some(count) = constraint.max_administrations_per_day {
            text.push(format!("Do not take more than {} doses in 24 hours", count));
        }
        if let Some(message) = &constraint.warning_message {
            text.push(message.clone());
        }
        text
    }
}

impl SignatureBuilder for PrnBuilder {
    fn kind(&self) -> BuilderKind {
        BuilderKind::Prn
    }

    fn medication(&self) -> &MedicationProfile {
        self.core.medication()
    }

    fn add_dose(&mut self, dose: DoseInput) -> SigResult<&mut dyn SignatureBuilder> {
        let dose = DoseInput {
            unit: normalize_unit(&dose.unit),
            ..dose
        };
        let resolved = self
            .specialty
            .resolve_dose(dose.clone(), self.core.medication())
            .and_then(|resolved| -> SigResult<StateDose> {
                if let Some(range) = &self.dose_range {
                    self.check_in_range(&range.canonical, &resolved.dose)?;
                }
                Ok(resolved)
            });
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                self.core
                    .audit_mut()
                    .decision(format!("rejected dose {}: {}", quantity_text(dose.value, &dose.unit), err));
                return Err(err);
            }
        };
        self.core.check_dose(&resolved.dose)?;
        self.core.push_dose(resolved);
        self.recheck_limits()?;
        Ok(self)
    }

    fn add_timing(&mut self, timing: TimingInput) -> SigResult<&mut dyn SignatureBuilder> {
        if let Some(range) = &self.frequency_range {
            Self::check_timing_in_range(range, &timing)?;
        }
        self.core.add_timing(timing)?;
        self.recheck_limits()?;
        Ok(self)
    }

    fn add_route(&mut self, route: &str) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_route(route)?;
        Ok(self)
    }

    fn add_constraints(&mut self, constraints: DoseConstraints) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_constraints(constraints)?;
        self.recheck_limits()?;
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

    /// A dose range renders as one ranged instruction; otherwise every
    /// recorded dose renders like a standard builder's.
    fn render(&self) -> SigResult<Vec<SignatureInstruction>> {
        let state = self.core.state();
        let medication = self.core.medication();
        let doses: Vec<(RenderDose, Vec<String>)> = match &self.dose_range {
            Some(range) => vec![(range.render_dose(), self.specialty.range_notes(range, medication)?)],
            None if !state.doses.is_empty() => state
                .doses
                .iter()
                .map(|d| -> SigResult<(RenderDose, Vec<String>)> {
                    Ok((d.render_dose(), self.specialty.dose_notes(d, medication)?))
                })
                .collect::<SigResult<_>>()?,
            None => {
                return Err(SigError::IncompleteState(
                    "no dose or dose range has been set".to_string(),
                ))
            }
        };
        let frequency = match (&self.frequency_range, &state.timing) {
            (Some(range), _) => FrequencyPhrase::Range {
                min: range.min_frequency,
                max: range.max_frequency,
                period: range.period,
                period_unit: range.period_unit,
            },
            (None, Some(timing)) => fixed_frequency(timing),
            (None, None) => {
                return Err(SigError::IncompleteState(
                    "no timing or frequency range has been set".to_string(),
                ))
            }
        };
        let route = self.core.route_code()?;

        let max_dose_per_period = match &self.max_daily {
            Some(constraint) => Some(MaxDosePerPeriod {
                dose: constraint.max_dose_per_day.clone(),
                period: 1.0,
                period_unit: PeriodUnit::Day,
            }),
            None => state.constraints.as_ref().and_then(|c| c.max_dose_per_period.clone()),
        };
        let max_daily_text = self.max_daily_text();

        let total = doses.len() as u32;
        let instructions = doses
            .into_iter()
            .enumerate()
            .map(|(index, (dose, mut notes))| {
                let position = index as u32 + 1;
                let linked = total > 1;
                notes.extend(max_daily_text.iter().cloned());
                let input = RenderInput {
                    template: self.core.policy().template,
                    dose,
                    frequency: frequency.clone(),
                    route: route.clone(),
                    as_needed: Some(state.as_needed.clone().unwrap_or_default()),
                    duration: None,
                    bounds_period: None,
                    prefix: None,
                    additional_instructions: self.core.additional_instructions(&notes),
                    max_dose_per_period: max_dose_per_period.clone(),
                    id: linked.then(|| format!("dose-{}", position)),
                    sequence: linked.then_some(position),
                    relationship: linked.then(|| sequential_link("dose", position, total)),
                };
                self.core.render_input(&input)
            })
            .collect();
        Ok(instructions)
    }

    fn audit(&self) -> &AuditTrail {
        self.core.audit()
    }

    fn serialize(&self) -> SigResult<Value> {
        self.core.serialize(
            self.kind(),
            json!({
                "specialty": self.specialty.label(),
                "dose_range": serde_json::to_value(&self.dose_range)?,
                "frequency_range": serde_json::to_value(&self.frequency_range)?,
                "window": serde_json::to_value(self.window)?,
                "max_daily": serde_json::to_value(&self.max_daily)?,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::WarningCode;
    use crate::medication::{DispenserInfo, DispenserKind, DoseForm, Quantity, ScoringType};
    use approx::assert_relative_eq;

    fn tablet(scoring: Option<ScoringType>) -> Arc<MedicationProfile> {
        let mut med = MedicationProfile::new("apap-500", "Acetaminophen 500 mg tablet", DoseForm::Tablet)
            .with_ingredient("acetaminophen", Quantity::new(500.0, "mg"), Quantity::new(1.0, "tablet"));
        med.scoring = scoring;
        Arc::new(med)
    }

    fn ranged(scoring: Option<ScoringType>) -> PrnBuilder {
        let mut builder = PrnBuilder::new(tablet(scoring), &Engine::default());
        builder
            .set_dose_range(DoseRangeInput::new(1.0, 2.0, "tablets"))
            .unwrap()
            .set_frequency_range(FrequencyRangeInput::new(1, 3, 1.0, PeriodUnit::Day))
            .unwrap()
            .set_max_daily_dose_constraint(MaxDailyDoseConstraint::new(6.0, "tablet"))
            .unwrap();
        builder
    }

    #[test]
    fn test_ranged_render() {
        let mut builder = ranged(None);
        builder.add_route("oral").unwrap();
        assert!(builder.warnings().is_empty());

        let instruction = builder.render().unwrap().remove(0);
        assert_eq!(instruction.text, "Take 1 to 2 tablets by mouth 1 to 3 times daily as needed.");
        assert_eq!(instruction.as_needed_boolean, Some(true));
        assert_eq!(instruction.additional_instruction, vec!["Do not exceed 6 tablet in 24 hours".to_string()]);
        assert_eq!(instruction.timing.repeat.frequency, 1);
        assert_eq!(instruction.timing.repeat.frequency_max, Some(3));

        let range = instruction.dose_and_rate[0].dose_range.as_ref().unwrap();
        assert_eq!(range.low.value, 1.0);
        assert_eq!(range.high.value, 2.0);
        let max = instruction.max_dose_per_period.as_ref().unwrap();
        assert_eq!(max.numerator.value, 6.0);
        assert_eq!(max.denominator.unit, "d");
    }

    #[test]
    fn test_doses_must_fall_in_range() {
        let mut builder = ranged(None);
        assert!(matches!(
            builder.add_dose(DoseInput::new(3.0, "tablet")),
            Err(SigError::DoseOutOfRange(_))
        ));
        // 1000 mg is 2 tablets
        assert!(builder.add_dose(DoseInput::new(1000.0, "mg")).is_ok());
        assert!(matches!(
            builder.add_dose(DoseInput::new(1.0, "tablet").with_max(3.0)),
            Err(SigError::DoseOutOfRange(_))
        ));
    }

    #[test]
    fn test_in_range_fraction_follows_scoring() {
        let mut half = ranged(Some(ScoringType::Half));
        assert!(half.add_dose(DoseInput::new(1.5, "tablet")).is_ok());

        let mut unscored = ranged(Some(ScoringType::None));
        assert!(matches!(
            unscored.add_dose(DoseInput::new(1.5, "tablet")),
            Err(SigError::FractionalDoseNotAllowed(_))
        ));
    }

    #[test]
    fn test_timing_must_fall_in_frequency_range() {
        let mut builder = ranged(None);
        assert!(matches!(
            builder.add_timing(TimingInput::daily(4)),
            Err(SigError::FrequencyOutOfRange(_))
        ));
        assert!(builder.add_timing(TimingInput::new(1, 8.0, PeriodUnit::Hour)).is_ok());
        assert!(builder.add_timing(TimingInput::daily(2)).is_ok());
    }

    #[test]
    fn test_range_validation() {
        let mut builder = PrnBuilder::new(tablet(None), &Engine::default());
        assert!(matches!(
            builder.set_dose_range(DoseRangeInput::new(0.2, 1.0, "tablet")),
            Err(SigError::BelowTabletFloor(_))
        ));
        assert!(matches!(
            builder.set_dose_range(DoseRangeInput::new(2.0, 1.0, "tablet")),
            Err(SigError::InvalidDose(_))
        ));
        assert!(matches!(
            builder.set_frequency_range(FrequencyRangeInput::new(3, 1, 1.0, PeriodUnit::Day)),
            Err(SigError::InvalidTiming(_))
        ));
        assert!(builder.dose_range().is_none());

        builder.set_dose_range(DoseRangeInput::new(50.0, 1000.0, "mg")).unwrap();
        assert!(builder.warnings().iter().any(|w| w.code == WarningCode::LargeDoseRange));

        builder
            .set_frequency_range(FrequencyRangeInput::new(1, 4, 2.0, PeriodUnit::Hour))
            .unwrap();
        assert!(builder.warnings().iter().any(|w| w.code == WarningCode::ShortInterval));
        assert_eq!(builder.frequency_window().unwrap().max_daily_administrations, 48);
    }

    #[test]
    fn test_declared_daily_maximum_mismatch() {
        let mut builder = ranged(None);
        builder
            .set_max_daily_dose_constraint(MaxDailyDoseConstraint::new(4.0, "tablet"))
            .unwrap();
        assert!(builder.warnings().iter().any(|w| w.code == WarningCode::DailyDoseMismatch));

        // 3 x 2 tablets x 500 mg = 3000 mg
        let mut by_mass = ranged(None);
        by_mass
            .set_max_daily_dose_constraint(MaxDailyDoseConstraint::new(3.0, "g"))
            .unwrap();
        assert!(!by_mass.warnings().iter().any(|w| w.code == WarningCode::DailyDoseMismatch));
    }

    #[test]
    fn test_fixed_timing_and_reason() {
        let mut builder = PrnBuilder::new(tablet(None), &Engine::default());
        builder
            .add_dose(DoseInput::new(1.0, "tablet")).unwrap()
            .add_timing(TimingInput::new(1, 6.0, PeriodUnit::Hour)).unwrap()
            .add_route("oral").unwrap()
            .add_as_needed(AsNeeded::for_reason("headache")).unwrap();
        let instruction = builder.render().unwrap().remove(0);
        assert_eq!(instruction.text, "Take 1 tablet by mouth every 6 hours as needed for headache.");
        assert_eq!(instruction.as_needed_for.as_deref(), Some("headache"));
    }

    #[test]
    fn test_render_requires_dose_and_frequency() {
        let mut builder = PrnBuilder::new(tablet(None), &Engine::default());
        builder.add_route("oral").unwrap();
        assert!(matches!(builder.render(), Err(SigError::IncompleteState(_))));
        builder.set_dose_range(DoseRangeInput::new(1.0, 2.0, "tablet")).unwrap();
        assert!(matches!(builder.render(), Err(SigError::IncompleteState(_))));
        builder.add_timing(TimingInput::daily(2)).unwrap();
        assert_eq!(
            builder.render().unwrap()[0].text,
            "Take 1 to 2 tablets by mouth twice daily as needed."
        );
    }

    fn mismatches(builder: &PrnBuilder) -> usize {
        builder
            .warnings()
            .iter()
            .filter(|w| w.code == WarningCode::DailyDoseMismatch)
            .count()
    }

    #[test]
    fn test_fixed_schedule_checked_against_daily_cap() {
        let mut builder = PrnBuilder::new(tablet(None), &Engine::default());
        builder
            .set_max_daily_dose_constraint(MaxDailyDoseConstraint::new(6.0, "tablet"))
            .unwrap();
        // 2 tablets every 4 hours is 12 tablets a day
        builder
            .add_dose(DoseInput::new(2.0, "tablets")).unwrap()
            .add_timing(TimingInput::new(1, 4.0, PeriodUnit::Hour)).unwrap()
            .add_route("oral").unwrap();
        assert_eq!(mismatches(&builder), 1);

        let mut within = PrnBuilder::new(tablet(None), &Engine::default());
        within
            .add_dose(DoseInput::new(1.0, "tablet")).unwrap()
            .add_timing(TimingInput::new(1, 6.0, PeriodUnit::Hour)).unwrap();
        within
            .set_max_daily_dose_constraint(MaxDailyDoseConstraint::new(6.0, "tablet"))
            .unwrap();
        assert_eq!(mismatches(&within), 0);
    }

    #[test]
    fn test_repeated_rechecks_record_one_warning() {
        let mut builder = ranged(None);
        builder
            .set_max_daily_dose_constraint(MaxDailyDoseConstraint::new(4.0, "tablet"))
            .unwrap()
            .set_dose_range(DoseRangeInput::new(1.0, 2.0, "tablet"))
            .unwrap()
            .set_frequency_range(FrequencyRangeInput::new(1, 3, 1.0, PeriodUnit::Day))
            .unwrap()
            .set_dose_range(DoseRangeInput::new(1.0, 2.0, "tablet"))
            .unwrap();
        assert_eq!(mismatches(&builder), 1);
    }

    fn topiclick(max_units: f64) -> Arc<MedicationProfile> {
        let mut dispenser = DispenserInfo::for_kind(DispenserKind::Topiclick);
        dispenser.max_units_per_dose = Some(max_units);
        Arc::new(
            MedicationProfile::new("prog-topiclick", "Progesterone 100 mg/mL Topiclick", DoseForm::Cream)
                .with_ingredient("progesterone", Quantity::new(100.0, "mg"), Quantity::new(1.0, "mL"))
                .with_dispenser(dispenser),
        )
    }

    #[test]
    fn test_dispenser_range_obeys_count_limit() {
        let mut builder = PrnBuilder::new(topiclick(8.0), &Engine::default());
        assert!(matches!(builder.specialty(), Specialty::Dispenser(_)));
        assert!(matches!(
            builder.set_dose_range(DoseRangeInput::new(4.0, 12.0, "clicks")),
            Err(SigError::DispenserLimitExceeded(_))
        ));
        assert!(matches!(
            builder.add_dose(DoseInput::new(12.0, "clicks")),
            Err(SigError::DispenserLimitExceeded(_))
        ));
        assert!(builder.core().state().doses.is_empty());

        builder
            .set_dose_range(DoseRangeInput::new(2.0, 4.0, "clicks"))
            .unwrap()
            .set_frequency_range(FrequencyRangeInput::new(1, 2, 1.0, PeriodUnit::Day))
            .unwrap();
        assert_relative_eq!(builder.dose_range().unwrap().max, 1.0);
        // 4 clicks is 1 mL, inside the range
        assert!(builder.add_dose(DoseInput::new(4.0, "clicks")).is_ok());
        builder.add_route("topical").unwrap();

        let instruction = builder.render().unwrap().remove(0);
        assert_eq!(instruction.text, "Apply 2 to 4 clicks topically 1 to 2 times daily as needed.");
        let range = instruction.dose_and_rate[0].dose_range.as_ref().unwrap();
        assert_relative_eq!(range.low.value, 0.5);
        assert_relative_eq!(range.high.value, 1.0);
        assert_eq!(range.high.unit, "mL");
        assert!(instruction.additional_instruction[0].starts_with("Before first use, prime"));
        assert!(instruction
            .additional_instruction
            .contains(&"2 to 4 clicks = 0.5 to 1 mL".to_string()));
    }

    #[test]
    fn test_combination_range_lists_ingredient_span() {
        let med = Arc::new(
            MedicationProfile::new("amox-clav", "Amoxicillin/Clavulanate suspension", DoseForm::Suspension)
                .with_ingredient("amoxicillin", Quantity::new(250.0, "mg"), Quantity::new(5.0, "mL"))
                .with_ingredient("clavulanate", Quantity::new(62.5, "mg"), Quantity::new(5.0, "mL")),
        );
        let mut builder = PrnBuilder::new(med, &Engine::default());
        assert_eq!(builder.specialty(), &Specialty::MultiIngredient);
        builder
            .set_dose_range(DoseRangeInput::new(5.0, 10.0, "mL"))
            .unwrap()
            .set_frequency_range(FrequencyRangeInput::new(1, 2, 1.0, PeriodUnit::Day))
            .unwrap();
        builder.add_route("oral").unwrap();

        let instruction = builder.render().unwrap().remove(0);
        assert_eq!(instruction.text, "Take 5 to 10 mL by mouth 1 to 2 times daily as needed.");
        assert_eq!(
            instruction.additional_instruction,
            vec![
                "Shake well before use.".to_string(),
                "Each dose contains: amoxicillin 250 to 500 mg, clavulanate 62.5 to 125 mg".to_string(),
            ]
        );
        assert!(matches!(
            builder.add_dose(DoseInput::new(3.0, "drops")),
            Err(SigError::InvalidDose(_))
        ));
    }
}
