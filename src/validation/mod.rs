//! Stateless safety rules.
//!
//! Fatal rules return `SigError`; advisory rules return `Warning`s for the
//! caller to record. None of these functions touch builder state.

use crate::audit::{Warning, WarningCode};
use crate::config::Thresholds;
use crate::dosing::{
    DoseRangeInput, FrequencyRangeInput, MaxDailyDoseConstraint, MaxDosePerPeriod, PeriodUnit, PhaseDuration, TaperingPhase,
    TimingInput,
};
use crate::error::{SigError, SigResult};
use crate::medication::{DosageLimits, DoseFormFamily, Quantity, Ratio, ScoringType};
use crate::units::{
    approx_eq, convert, format_number, inverse_scale, is_tablet_unit, round_to, scale_by_strength, split_fraction, unit_kind,
    UnitKind, EPSILON,
};
use serde::{Deserialize, Serialize};

/// Smallest tablet fraction that may ever be instructed.
pub const MIN_TABLET_FRACTION: f64 = 0.25;

pub fn validate_tablet_fraction(value: f64, scoring: Option<ScoringType>) -> SigResult<()> {
    if value < MIN_TABLET_FRACTION - EPSILON {
        return Err(SigError::BelowTabletFloor(value));
    }

    let (_, remainder) = split_fraction(value);
    let allowed: &[f64] = match scoring {
        Some(ScoringType::None) => &[0.0],
        Some(ScoringType::Half) => &[0.0, 0.5],
        Some(ScoringType::Quarter) => &[0.0, 0.25, 0.5, 0.75],
        None => return Ok(()),
    };

    // Remainders just below a whole number ("0.9999999") count as whole
    if allowed.iter().any(|a| approx_eq(remainder, *a)) || approx_eq(remainder, 1.0) {
        Ok(())
    } else {
        let scoring_text = match scoring {
            Some(ScoringType::None) => "an unscored",
            Some(ScoringType::Half) => "a half-scored",
            _ => "a quarter-scored",
        };
        Err(SigError::FractionalDoseNotAllowed(
            format!("{} tablet cannot be given as {} tablet", scoring_text, format_number(value))
        ))
    }
}

/// Dose units a dose-form family accepts.
pub fn validate_dose_unit(family: DoseFormFamily, unit: &str) -> SigResult<()> {
    let kind = unit_kind(unit);
    let accepted = match family {
        DoseFormFamily::Solid => kind == UnitKind::Mass || is_tablet_unit(unit),
        DoseFormFamily::Liquid => matches!(kind, UnitKind::Mass | UnitKind::Volume) || unit == "drop",
        DoseFormFamily::Topical => kind != UnitKind::Unknown && !is_tablet_unit(unit),
        DoseFormFamily::Injection => matches!(kind, UnitKind::Mass | UnitKind::Volume) || unit == "unit",
    };
    if accepted {
        Ok(())
    } else {
        Err(SigError::InvalidDose(
            format!("Unit '{}' is not valid for a {:?} dose form", unit, family)
        ))
    }
}

pub fn check_large_volume(dose: &Quantity, thresholds: &Thresholds) -> Option<Warning> {
    let ml = if unit_kind(&dose.unit) == UnitKind::Volume {
        convert(dose.value, &dose.unit, "mL")?
    } else {
        return None;
    };
    if ml > thresholds.large_volume_ml {
        Some(Warning::new(
            WarningCode::LargeVolume,
            format!("Dose of {} exceeds {} mL; verify the volume", dose, format_number(thresholds.large_volume_ml)),
        ))
    } else {
        None
    }
}

/// Expresses `dose` in `target_unit`, going through the strength ratio when
/// the dimensions differ (tablets against a mg limit, or mg against tablets).
pub fn express_in(dose: &Quantity, target_unit: &str, strength: Option<&Ratio>) -> Option<f64> {
    if let Some(value) = convert(dose.value, &dose.unit, target_unit) {
        return Some(value);
    }
    let strength = strength?;
    if let Some(scaled) = scale_by_strength(dose, strength) {
        if let Some(value) = convert(scaled.value, &scaled.unit, target_unit) {
            return Some(value);
        }
    }
    let dispensed = inverse_scale(dose, strength)?;
    convert(dispensed.value, &dispensed.unit, target_unit)
}

/// Medication catalog min/max are hard limits; the step is advisory.
pub fn check_medication_limits(
    dose: &Quantity,
    limits: &DosageLimits,
    strength: Option<&Ratio>,
) -> SigResult<Vec<Warning>> {
    let mut warnings = Vec::new();

    if let Some(min) = &limits.min_dose {
        if let Some(value) = express_in(dose, &min.unit, strength) {
            if value < min.value - EPSILON {
                return Err(SigError::DoseOutOfRange(
                    format!("Dose of {} is below the medication minimum of {}", dose, min)
                ));
            }
        }
    }

    if let Some(max) = &limits.max_dose {
        if let Some(value) = express_in(dose, &max.unit, strength) {
            if value > max.value + EPSILON {
                return Err(SigError::DoseOutOfRange(
                    format!("Dose of {} exceeds the medication maximum of {}", dose, max)
                ));
            }
        }
    }

    if let Some(step) = &limits.step {
        if let Some(value) = express_in(dose, &step.unit, strength) {
            if step.value > 0.0 {
                let steps = value / step.value;
                if !approx_eq(steps, steps.round()) {
                    warnings.push(Warning::new(
                        WarningCode::DoseStepMismatch,
                        format!("Dose of {} is not a multiple of the {} dosing step", dose, step),
                    ));
                }
            }
        }
    }

    Ok(warnings)
}

/// PRN dose range checks. The range minimum is held to the medication
/// limits; a maximum above the medication max is only advisory.
pub fn validate_dose_range(
    range: &DoseRangeInput,
    limits: Option<&DosageLimits>,
    strength: Option<&Ratio>,
    thresholds: &Thresholds,
) -> SigResult<Vec<Warning>> {
    if !range.min.is_finite() || range.min <= 0.0 {
        return Err(SigError::InvalidDose(
            format!("Dose range minimum must be positive, got {}", range.min)
        ));
    }
    if !range.max.is_finite() || range.max < range.min {
        return Err(SigError::InvalidDose(
            format!("Dose range maximum {} is below minimum {}", range.max, range.min)
        ));
    }
    if is_tablet_unit(&range.unit) && range.min < MIN_TABLET_FRACTION - EPSILON {
        return Err(SigError::BelowTabletFloor(range.min));
    }

    let mut warnings = Vec::new();
    let min_quantity = Quantity::new(range.min, &range.unit);
    let max_quantity = Quantity::new(range.max, &range.unit);

    if let Some(limits) = limits {
        if let Some(med_min) = &limits.min_dose {
            if let Some(value) = express_in(&min_quantity, &med_min.unit, strength) {
                if value < med_min.value - EPSILON {
                    return Err(SigError::DoseOutOfRange(
                        format!("Range minimum {} is below the medication minimum of {}", min_quantity, med_min)
                    ));
                }
            }
        }
        if let Some(med_max) = &limits.max_dose {
            if let Some(value) = express_in(&min_quantity, &med_max.unit, strength) {
                if value > med_max.value + EPSILON {
                    return Err(SigError::DoseOutOfRange(
                        format!("Range minimum {} exceeds the medication maximum of {}", min_quantity, med_max)
                    ));
                }
            }
            if let Some(value) = express_in(&max_quantity, &med_max.unit, strength) {
                if value > med_max.value + EPSILON {
                    warnings.push(Warning::new(
                        WarningCode::DoseAboveMedicationMax,
                        format!("Range maximum {} exceeds the medication maximum of {}", max_quantity, med_max),
                    ));
                }
            }
        }
    }

    if range.max > range.min * thresholds.large_range_factor + EPSILON {
        warnings.push(Warning::new(
            WarningCode::LargeDoseRange,
            format!(
                "Dose range {} to {} {} spans more than {}x",
                format_number(range.min),
                format_number(range.max),
                range.unit,
                format_number(thresholds.large_range_factor)
            ),
        ));
    }

    Ok(warnings)
}

/// Derived spacing of a PRN frequency range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyWindow {
    pub min_interval_hours: f64,
    pub max_interval_hours: f64,
    pub max_daily_administrations: u32,
}

pub fn validate_frequency_range(
    range: &FrequencyRangeInput,
    thresholds: &Thresholds,
) -> SigResult<(FrequencyWindow, Vec<Warning>)> {
    if range.min_frequency == 0 {
        return Err(SigError::InvalidTiming("Minimum frequency must be at least 1".to_string()));
    }
    if range.max_frequency < range.min_frequency {
        return Err(SigError::InvalidTiming(
            format!("Maximum frequency {} is below minimum {}", range.max_frequency, range.min_frequency)
        ));
    }
    if !range.period.is_finite() || range.period <= 0.0 {
        return Err(SigError::InvalidTiming(
            format!("Period must be positive, got {}", range.period)
        ));
    }

    let period_hours = range.period_hours();
    let window = FrequencyWindow {
        min_interval_hours: period_hours / range.max_frequency as f64,
        max_interval_hours: period_hours / range.min_frequency as f64,
        max_daily_administrations: (range.max_frequency as f64 * 24.0 / period_hours - EPSILON).ceil().max(1.0) as u32,
    };

    let mut warnings = Vec::new();
    if window.min_interval_hours < thresholds.min_interval_hours - EPSILON {
        warnings.push(Warning::new(
            WarningCode::ShortInterval,
            format!(
                "Doses could be given only {} hours apart",
                format_number(round_to(window.min_interval_hours, 2))
            ),
        ));
    }

    Ok((window, warnings))
}

/// Largest single amount of a regimen and how often it can be given.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyExposure {
    pub per_dose: Quantity,
    pub administrations_per_day: f64,
}

impl DailyExposure {
    pub fn new(per_dose: Quantity, administrations_per_day: f64) -> Self {
        Self {
            per_dose,
            administrations_per_day,
        }
    }

    /// A fixed dose given on a fixed schedule.
    pub fn from_timing(per_dose: Quantity, timing: &TimingInput) -> Self {
        Self {
            per_dose,
            administrations_per_day: timing.per_day(),
        }
    }

    /// Whole administrations that can fall inside `hours`, never fewer than one.
    fn administrations_within(&self, hours: f64) -> f64 {
        (self.administrations_per_day * hours / 24.0 - EPSILON).ceil().max(1.0)
    }
}

/// Cross-checks the theoretical daily maximum of a regimen against the
/// declared PRN cap.
pub fn check_max_daily(
    constraint: &MaxDailyDoseConstraint,
    exposures: &[DailyExposure],
    strength: Option<&Ratio>,
) -> SigResult<Vec<Warning>> {
    if constraint.max_dose_per_day.value <= 0.0 {
        return Err(SigError::InvalidDose("Maximum daily dose must be positive".to_string()));
    }
    if constraint.max_administrations_per_day == Some(0) {
        return Err(SigError::InvalidDose(
            "Maximum administrations per day must be at least 1".to_string()
        ));
    }

    let declared = &constraint.max_dose_per_day;
    let mut warnings = Vec::new();
    for exposure in exposures {
        let mut administrations = exposure.administrations_within(24.0);
        if let Some(cap) = constraint.max_administrations_per_day {
            administrations = administrations.min(cap as f64);
        }
        if let Some(warning) = exceeds_declared(exposure, administrations, declared, "per day", strength) {
            warnings.push(warning);
        }
    }

    Ok(warnings)
}

/// Same cross-check for a `max_dose_per_period` constraint.
pub fn check_period_maximum(
    max: &MaxDosePerPeriod,
    exposure: &DailyExposure,
    strength: Option<&Ratio>,
) -> Option<Warning> {
    let hours = max.period * max.period_unit.hours();
    let administrations = exposure.administrations_within(hours);
    let span = if approx_eq(max.period, 1.0) {
        format!("per {}", max.period_unit.singular())
    } else {
        format!("per {} {}s", format_number(max.period), max.period_unit.singular())
    };
    exceeds_declared(exposure, administrations, &max.dose, &span, strength)
}

fn exceeds_declared(
    exposure: &DailyExposure,
    administrations: f64,
    declared: &Quantity,
    span: &str,
    strength: Option<&Ratio>,
) -> Option<Warning> {
    let per_dose = &exposure.per_dose;
    let theoretical = Quantity::new(per_dose.value * administrations, &per_dose.unit);
    let value = express_in(&theoretical, &declared.unit, strength)?;
    if value <= declared.value + EPSILON {
        return None;
    }
    Some(Warning::new(
        WarningCode::DailyDoseMismatch,
        format!(
            "Theoretical maximum of {} {} ({} x {} administrations) exceeds the declared limit of {}",
            theoretical,
            span,
            per_dose,
            format_number(administrations),
            declared
        ),
    ))
}

/// Routes a dose-form family is normally given by.
pub fn usual_routes(family: DoseFormFamily) -> &'static [&'static str] {
    match family {
        DoseFormFamily::Solid => &["oral", "sublingual", "buccal", "vaginal", "rectal"],
        DoseFormFamily::Liquid => &["oral", "sublingual", "buccal", "nasal", "ophthalmic", "otic", "rectal"],
        DoseFormFamily::Topical => &["topical", "transdermal", "vaginal", "rectal", "ophthalmic", "otic", "nasal"],
        DoseFormFamily::Injection => &["intravenous", "intramuscular", "subcutaneous"],
    }
}

pub fn check_route(usual: &[String], route: &str, form_label: &str) -> Option<Warning> {
    if usual.is_empty() || usual.iter().any(|r| r == route) {
        None
    } else {
        Some(Warning::new(
            WarningCode::UnusualRoute,
            format!("Route '{}' is unusual for {}", route, form_label),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaperDirection {
    Ascending,
    Descending,
    Constant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaperAnalysis {
    pub phases: Vec<TaperingPhase>,
    pub direction: TaperDirection,
    pub total_days: f64,
    pub total_duration: PhaseDuration,
    pub warnings: Vec<Warning>,
}

/// Under a week stays in days; otherwise weeks to one decimal.
pub fn total_duration(days: f64) -> PhaseDuration {
    if days < 7.0 {
        PhaseDuration::new(days, PeriodUnit::Day)
    } else {
        PhaseDuration::new(round_to(days / 7.0, 1), PeriodUnit::Week)
    }
}

/// Validates a tapering schedule and derives its direction and length.
/// Phases are returned sorted by sequence number.
pub fn analyze_taper(
    phases: &[TaperingPhase],
    strength: Option<&Ratio>,
    thresholds: &Thresholds,
) -> SigResult<TaperAnalysis> {
    if phases.is_empty() {
        return Err(SigError::MissingPhases);
    }

    let mut sorted = phases.to_vec();
    sorted.sort_by_key(|p| p.sequence);
    for (index, phase) in sorted.iter().enumerate() {
        let expected = index as u32 + 1;
        if phase.sequence != expected {
            return Err(SigError::NonContiguousPhases(
                format!("expected phase {} but found phase {}", expected, phase.sequence)
            ));
        }
        if !phase.duration.value.is_finite() || phase.duration.value <= 0.0 {
            return Err(SigError::InvalidPhase(
                format!("Phase {} must have a positive duration", phase.sequence)
            ));
        }
        phase.dose.validate()?;
        phase.timing.validate()?;
    }

    let reference_unit = sorted[0].dose.unit.clone();
    let mut amounts = Vec::with_capacity(sorted.len());
    for phase in &sorted {
        let amount = express_in(&phase.dose.quantity(), &reference_unit, strength).ok_or_else(|| {
            SigError::InvalidPhase(format!(
                "Phase {} dose unit '{}' cannot be compared with '{}'",
                phase.sequence, phase.dose.unit, reference_unit
            ))
        })?;
        amounts.push(amount);
    }

    let first = amounts[0];
    let last = amounts[amounts.len() - 1];
    let direction = if approx_eq(first, last) {
        TaperDirection::Constant
    } else if last > first {
        TaperDirection::Ascending
    } else {
        TaperDirection::Descending
    };

    let mut warnings = Vec::new();
    for (pair, amount_pair) in sorted.windows(2).zip(amounts.windows(2)) {
        let (from, to) = (amount_pair[0], amount_pair[1]);
        let change = (to - from).abs() / from;
        if change > thresholds.taper_jump_fraction + EPSILON {
            warnings.push(Warning::new(
                WarningCode::TaperDoseJump,
                format!(
                    "Dose changes by {}% between phase {} and phase {}",
                    format_number(round_to(change * 100.0, 1)),
                    pair[0].sequence,
                    pair[1].sequence
                ),
            ));
        }

        let against_direction = match direction {
            TaperDirection::Descending => to > from + EPSILON,
            TaperDirection::Ascending => to < from - EPSILON,
            TaperDirection::Constant => !approx_eq(to, from),
        };
        if against_direction {
            warnings.push(Warning::new(
                WarningCode::TaperDirectionInconsistent,
                format!(
                    "Phase {} to phase {} runs against the {:?} schedule",
                    pair[0].sequence, pair[1].sequence, direction
                ),
            ));
        }
    }

    for phase in &sorted {
        if phase.duration.days() < thresholds.short_phase_days - EPSILON {
            warnings.push(Warning::new(
                WarningCode::TaperShortPhase,
                format!(
                    "Phase {} lasts only {} days",
                    phase.sequence,
                    format_number(round_to(phase.duration.days(), 2))
                ),
            ));
        }
    }

    let mismatched: Vec<String> = sorted
        .iter()
        .skip(1)
        .filter(|p| !p.timing.same_pattern(&sorted[0].timing))
        .map(|p| p.sequence.to_string())
        .collect();
    if !mismatched.is_empty() {
        warnings.push(Warning::new(
            WarningCode::TaperTimingMismatch,
            format!("Phases {} use a different timing pattern than phase 1", mismatched.join(", ")),
        ));
    }

    let total_days: f64 = sorted.iter().map(|p| p.duration.days()).sum();

    Ok(TaperAnalysis {
        phases: sorted,
        direction,
        total_days,
        total_duration: total_duration(total_days),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dosing::{DoseInput, TimingInput};
    use approx::assert_relative_eq;

    fn thresholds() -> Thresholds {
        Thresholds::default()
    }

    fn phase(sequence: u32, mg: f64, weeks: f64) -> TaperingPhase {
        TaperingPhase::new(
            sequence,
            &format!("Phase {}", sequence),
            DoseInput::new(mg, "mg"),
            TimingInput::daily(1),
            PhaseDuration::new(weeks, PeriodUnit::Week),
        )
    }

    #[test]
    fn test_tablet_floor_applies_to_every_scoring() {
        for scoring in [None, Some(ScoringType::None), Some(ScoringType::Half), Some(ScoringType::Quarter)] {
            for value in [0.0, 0.1, 0.2, 0.249] {
                assert!(matches!(
                    validate_tablet_fraction(value, scoring),
                    Err(SigError::BelowTabletFloor(_))
                ));
            }
        }
    }

    #[test]
    fn test_scoring_remainders() {
        let half = Some(ScoringType::Half);
        let quarter = Some(ScoringType::Quarter);
        let unscored = Some(ScoringType::None);

        for ok in [0.5, 1.0, 1.5, 2.0, 3.5] {
            assert!(validate_tablet_fraction(ok, half).is_ok(), "half {}", ok);
        }
        for bad in [0.25, 0.75, 1.25, 1.75] {
            assert!(matches!(
                validate_tablet_fraction(bad, half),
                Err(SigError::FractionalDoseNotAllowed(_))
            ));
        }
        for ok in [0.25, 0.5, 0.75, 1.0, 1.25, 2.75] {
            assert!(validate_tablet_fraction(ok, quarter).is_ok(), "quarter {}", ok);
        }
        for bad in [0.3, 1.1, 1.6] {
            assert!(validate_tablet_fraction(bad, quarter).is_err());
        }
        for ok in [1.0, 2.0, 3.0] {
            assert!(validate_tablet_fraction(ok, unscored).is_ok());
        }
        for bad in [0.5, 1.5, 2.25] {
            assert!(validate_tablet_fraction(bad, unscored).is_err());
        }
        assert!(validate_tablet_fraction(1.3, None).is_ok());
    }

    #[test]
    fn test_dose_units_by_family() {
        assert!(validate_dose_unit(DoseFormFamily::Solid, "tablet").is_ok());
        assert!(validate_dose_unit(DoseFormFamily::Solid, "mg").is_ok());
        assert!(validate_dose_unit(DoseFormFamily::Solid, "mL").is_err());
        assert!(validate_dose_unit(DoseFormFamily::Liquid, "mL").is_ok());
        assert!(validate_dose_unit(DoseFormFamily::Liquid, "tablet").is_err());
        assert!(validate_dose_unit(DoseFormFamily::Topical, "application").is_ok());
        assert!(validate_dose_unit(DoseFormFamily::Injection, "unit").is_ok());
    }

    #[test]
    fn test_route_plausibility() {
        let solid: Vec<String> = usual_routes(DoseFormFamily::Solid).iter().map(|r| r.to_string()).collect();
        assert!(check_route(&solid, "oral", "tablet").is_none());
        let warning = check_route(&solid, "intravenous", "tablet").unwrap();
        assert_eq!(warning.code, WarningCode::UnusualRoute);
        assert!(check_route(&[], "intravenous", "anything").is_none());
    }

    #[test]
    fn test_large_volume_is_advisory() {
        assert!(check_large_volume(&Quantity::new(1500.0, "mL"), &thresholds()).is_some());
        assert!(check_large_volume(&Quantity::new(2.0, "L"), &thresholds()).is_some());
        assert!(check_large_volume(&Quantity::new(10.0, "mL"), &thresholds()).is_none());
        assert!(check_large_volume(&Quantity::new(5000.0, "mg"), &thresholds()).is_none());
    }

    #[test]
    fn test_medication_limits_through_strength() {
        let limits = DosageLimits {
            min_dose: Some(Quantity::new(250.0, "mg")),
            max_dose: Some(Quantity::new(1000.0, "mg")),
            step: Some(Quantity::new(250.0, "mg")),
        };
        let strength = Ratio::new(Quantity::new(500.0, "mg"), Quantity::new(1.0, "tablet"));

        assert!(check_medication_limits(&Quantity::new(2.0, "tablet"), &limits, Some(&strength))
            .unwrap()
            .is_empty());
        assert!(matches!(
            check_medication_limits(&Quantity::new(3.0, "tablet"), &limits, Some(&strength)),
            Err(SigError::DoseOutOfRange(_))
        ));
        assert!(check_medication_limits(&Quantity::new(0.1, "g"), &limits, None).is_err());

        let warnings = check_medication_limits(&Quantity::new(300.0, "mg"), &limits, None).unwrap();
        assert_eq!(warnings[0].code, WarningCode::DoseStepMismatch);
    }

    #[test]
    fn test_dose_range_checks() {
        let limits = DosageLimits {
            min_dose: None,
            max_dose: Some(Quantity::new(2.0, "tablet")),
            step: None,
        };

        assert!(matches!(
            validate_dose_range(&DoseRangeInput::new(2.0, 1.0, "tablet"), None, None, &thresholds()),
            Err(SigError::InvalidDose(_))
        ));
        assert!(matches!(
            validate_dose_range(&DoseRangeInput::new(3.0, 4.0, "tablet"), Some(&limits), None, &thresholds()),
            Err(SigError::DoseOutOfRange(_))
        ));

        let warnings =
            validate_dose_range(&DoseRangeInput::new(1.0, 3.0, "tablet"), Some(&limits), None, &thresholds()).unwrap();
        assert_eq!(warnings[0].code, WarningCode::DoseAboveMedicationMax);

        let warnings = validate_dose_range(&DoseRangeInput::new(1.0, 20.0, "mg"), None, None, &thresholds()).unwrap();
        assert_eq!(warnings[0].code, WarningCode::LargeDoseRange);
    }

    #[test]
    fn test_frequency_window() {
        let range = FrequencyRangeInput::new(1, 3, 1.0, PeriodUnit::Day);
        let (window, warnings) = validate_frequency_range(&range, &thresholds()).unwrap();
        assert_relative_eq!(window.min_interval_hours, 8.0);
        assert_relative_eq!(window.max_interval_hours, 24.0);
        assert_eq!(window.max_daily_administrations, 3);
        assert!(warnings.is_empty());

        let hourly = FrequencyRangeInput::new(1, 4, 2.0, PeriodUnit::Hour);
        let (window, warnings) = validate_frequency_range(&hourly, &thresholds()).unwrap();
        assert_relative_eq!(window.min_interval_hours, 0.5);
        assert_eq!(window.max_daily_administrations, 48);
        assert_eq!(warnings[0].code, WarningCode::ShortInterval);

        assert!(validate_frequency_range(&FrequencyRangeInput::new(3, 1, 1.0, PeriodUnit::Day), &thresholds()).is_err());
        assert!(validate_frequency_range(&FrequencyRangeInput::new(0, 1, 1.0, PeriodUnit::Day), &thresholds()).is_err());
    }

    #[test]
    fn test_max_daily_discrepancy_note() {
        // up to 2 tablets, up to 4 times a day
        let exposure = [DailyExposure::new(Quantity::new(2.0, "tablet"), 4.0)];
        let constraint = MaxDailyDoseConstraint::new(6.0, "tablet");
        let warnings = check_max_daily(&constraint, &exposure, None).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WarningCode::DailyDoseMismatch);

        let mut capped = constraint.clone();
        capped.max_administrations_per_day = Some(3);
        assert!(check_max_daily(&capped, &exposure, None).unwrap().is_empty());

        assert!(check_max_daily(&MaxDailyDoseConstraint::new(0.0, "tablet"), &[], None).is_err());
    }

    #[test]
    fn test_fixed_schedule_against_daily_cap() {
        // 2 tablets every 4 hours is 12 tablets a day
        let every_four_hours = TimingInput::new(1, 4.0, PeriodUnit::Hour);
        let exposure = DailyExposure::from_timing(Quantity::new(2.0, "tablet"), &every_four_hours);
        assert_relative_eq!(exposure.administrations_per_day, 6.0);

        let warnings = check_max_daily(&MaxDailyDoseConstraint::new(6.0, "tablet"), &[exposure.clone()], None).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("12 tablet per day"));

        // 500 mg tablets against a 4 g cap: 6 g a day
        let strength = Ratio::new(Quantity::new(500.0, "mg"), Quantity::new(1.0, "tablet"));
        let warnings = check_max_daily(&MaxDailyDoseConstraint::new(4.0, "g"), &[exposure], Some(&strength)).unwrap();
        assert_eq!(warnings.len(), 1);

        let twice_daily = DailyExposure::from_timing(Quantity::new(1.0, "tablet"), &TimingInput::daily(2));
        assert!(check_max_daily(&MaxDailyDoseConstraint::new(6.0, "tablet"), &[twice_daily], None).unwrap().is_empty());
    }

    #[test]
    fn test_period_maximum() {
        let max = MaxDosePerPeriod {
            dose: Quantity::new(4.0, "g"),
            period: 1.0,
            period_unit: PeriodUnit::Day,
        };
        let exposure = DailyExposure::from_timing(Quantity::new(1000.0, "mg"), &TimingInput::new(1, 4.0, PeriodUnit::Hour));
        let warning = check_period_maximum(&max, &exposure, None).unwrap();
        assert_eq!(warning.code, WarningCode::DailyDoseMismatch);
        assert!(warning.message.contains("per day"));

        let four_times = DailyExposure::from_timing(Quantity::new(1000.0, "mg"), &TimingInput::daily(4));
        assert!(check_period_maximum(&max, &four_times, None).is_none());

        // Weekly dosing counts one administration inside a single day
        let weekly = DailyExposure::from_timing(Quantity::new(50.0, "mg"), &TimingInput::new(1, 1.0, PeriodUnit::Week));
        let daily_cap = MaxDosePerPeriod { dose: Quantity::new(40.0, "mg"), ..max };
        assert!(check_period_maximum(&daily_cap, &weekly, None).is_some());
    }

    #[test]
    fn test_descending_taper_analysis() {
        let phases = vec![phase(1, 40.0, 2.0), phase(2, 20.0, 2.0), phase(3, 10.0, 2.0), phase(4, 5.0, 1.0)];
        let analysis = analyze_taper(&phases, None, &thresholds()).unwrap();
        assert_eq!(analysis.direction, TaperDirection::Descending);
        assert_relative_eq!(analysis.total_days, 49.0);
        assert_eq!(analysis.total_duration.unit, PeriodUnit::Week);
        assert_relative_eq!(analysis.total_duration.value, 7.0);
        assert!(analysis.warnings.iter().all(|w| w.code != WarningCode::TaperDirectionInconsistent));
    }

    #[test]
    fn test_ascending_and_irregular_taper() {
        let analysis = analyze_taper(&[phase(1, 5.0, 1.0), phase(2, 10.0, 1.0)], None, &thresholds()).unwrap();
        assert_eq!(analysis.direction, TaperDirection::Ascending);
        // 100 % increase is a large jump
        assert!(analysis.warnings.iter().any(|w| w.code == WarningCode::TaperDoseJump));

        let mut short = phase(2, 30.0, 1.0);
        short.duration = PhaseDuration::new(2.0, PeriodUnit::Day);
        short.timing = TimingInput::daily(2);
        let phases = vec![phase(1, 40.0, 1.0), short, phase(3, 35.0, 1.0), phase(4, 20.0, 1.0)];
        let analysis = analyze_taper(&phases, None, &thresholds()).unwrap();
        let codes: Vec<WarningCode> = analysis.warnings.iter().map(|w| w.code).collect();
        assert!(codes.contains(&WarningCode::TaperDirectionInconsistent));
        assert!(codes.contains(&WarningCode::TaperShortPhase));
        assert!(codes.contains(&WarningCode::TaperTimingMismatch));
        assert_relative_eq!(analysis.total_days, 23.0);
        assert_relative_eq!(analysis.total_duration.value, 3.3);
    }

    #[test]
    fn test_taper_structure_errors() {
        assert!(matches!(analyze_taper(&[], None, &thresholds()), Err(SigError::MissingPhases)));
        assert!(matches!(
            analyze_taper(&[phase(1, 40.0, 1.0), phase(3, 20.0, 1.0)], None, &thresholds()),
            Err(SigError::NonContiguousPhases(_))
        ));
        assert!(matches!(
            analyze_taper(&[phase(2, 40.0, 1.0)], None, &thresholds()),
            Err(SigError::NonContiguousPhases(_))
        ));

        let unordered = analyze_taper(&[phase(2, 20.0, 1.0), phase(1, 40.0, 1.0)], None, &thresholds()).unwrap();
        assert_eq!(unordered.phases[0].sequence, 1);

        let mut mixed = phase(2, 20.0, 1.0);
        mixed.dose = DoseInput::new(5.0, "mL");
        assert!(matches!(
            analyze_taper(&[phase(1, 40.0, 1.0), mixed], None, &thresholds()),
            Err(SigError::InvalidPhase(_))
        ));
    }

    #[test]
    fn test_short_schedule_stays_in_days() {
        let d = total_duration(5.0);
        assert_eq!(d.unit, PeriodUnit::Day);
        assert_relative_eq!(d.value, 5.0);
    }
}
