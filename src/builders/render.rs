//! Pure rendering of one instruction from an immutable snapshot.
//!
//! Builders assemble a `RenderInput` per dose or per tapering phase and call
//! `render_snapshot`; nothing here reads or writes builder state.

use crate::config::{tables::UCUM_SYSTEM, RouteCode, UnitTable};
use crate::dosing::{AsNeeded, DoseInput, DoseRangeInput, MaxDosePerPeriod, PeriodUnit, PhaseDuration, TimingInput};
use crate::instruction::{
    BoundsDuration, BoundsPeriod, CodeableConcept, CodedQuantity, DoseAndRate, InstructionRelationship,
    MaxDosePerPeriodOut, SignatureInstruction, Timing, TimingRepeat,
};
use crate::medication::Quantity;
use crate::template::{DosePhrase, FrequencyPhrase, TemplateData, TemplateKey, TemplateRenderer};
use crate::units::{approx_eq, format_number};

#[derive(Debug, Clone, PartialEq)]
pub enum RenderDose {
    /// `display` is what the patient reads; `canonical` goes into doseAndRate.
    Single { display: DoseInput, canonical: DoseInput },
    Range { display: DoseRangeInput, canonical: DoseRangeInput },
}

impl RenderDose {
    pub fn plain(dose: &DoseInput) -> Self {
        Self::Single {
            display: dose.clone(),
            canonical: dose.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderInput {
    pub template: TemplateKey,
    pub dose: RenderDose,
    pub frequency: FrequencyPhrase,
    pub route: RouteCode,
    pub as_needed: Option<AsNeeded>,
    pub duration: Option<PhaseDuration>,
    pub bounds_period: Option<BoundsPeriod>,
    pub prefix: Option<String>,
    pub additional_instructions: Vec<String>,
    pub max_dose_per_period: Option<MaxDosePerPeriod>,
    pub id: Option<String>,
    pub sequence: Option<u32>,
    pub relationship: Option<InstructionRelationship>,
}

pub fn fixed_frequency(timing: &TimingInput) -> FrequencyPhrase {
    FrequencyPhrase::Fixed {
        frequency: timing.frequency,
        period: timing.period,
        period_unit: timing.period_unit,
        when: timing.when.clone(),
    }
}

/// "Do not exceed 4 g in 24 hours"
pub fn max_dose_text(dose: &Quantity, period: f64, period_unit: PeriodUnit) -> String {
    let span = match period_unit {
        PeriodUnit::Hour | PeriodUnit::Day => format!("{} hours", format_number(period * period_unit.hours())),
        _ if approx_eq(period, 1.0) => format!("1 {}", period_unit.singular()),
        _ => format!("{} {}s", format_number(period), period_unit.singular()),
    };
    format!("Do not exceed {} {} in {}", format_number(dose.value), dose.unit, span)
}

fn coded(quantity: &Quantity, units: &UnitTable) -> CodedQuantity {
    CodedQuantity::new(quantity, units.lookup(&quantity.unit))
}

fn dose_and_rate(dose: &RenderDose, units: &UnitTable) -> DoseAndRate {
    match dose {
        RenderDose::Single { canonical, .. } => match canonical.max_value {
            Some(max) => DoseAndRate::range(
                coded(&canonical.quantity(), units),
                coded(&Quantity::new(max, &canonical.unit), units),
            ),
            None => DoseAndRate::quantity(coded(&canonical.quantity(), units)),
        },
        RenderDose::Range { canonical, .. } => DoseAndRate::range(
            coded(&Quantity::new(canonical.min, &canonical.unit), units),
            coded(&Quantity::new(canonical.max, &canonical.unit), units),
        ),
    }
}

fn dose_phrase(dose: &RenderDose) -> DosePhrase {
    match dose {
        RenderDose::Single { display, .. } => match display.max_value {
            Some(max) => DosePhrase::Range {
                min: display.value,
                max,
                unit: display.unit.clone(),
            },
            None => DosePhrase::Single {
                value: display.value,
                unit: display.unit.clone(),
            },
        },
        RenderDose::Range { display, .. } => DosePhrase::Range {
            min: display.min,
            max: display.max,
            unit: display.unit.clone(),
        },
    }
}

fn timing_repeat(frequency: &FrequencyPhrase) -> TimingRepeat {
    match frequency {
        FrequencyPhrase::Fixed { frequency, period, period_unit, when } => {
            TimingRepeat::new(*frequency, *period, *period_unit, when)
        }
        FrequencyPhrase::Range { min, max, period, period_unit } => {
            let mut repeat = TimingRepeat::new(*min, *period, *period_unit, &[]);
            repeat.frequency_max = Some(*max);
            repeat
        }
    }
}

pub fn render_snapshot(
    input: &RenderInput,
    renderer: &dyn TemplateRenderer,
    units: &UnitTable,
) -> SignatureInstruction {
    let data = TemplateData {
        dose: dose_phrase(&input.dose),
        route_phrase: input.route.phrase.clone(),
        frequency: input.frequency.clone(),
        as_needed: input.as_needed.is_some(),
        as_needed_for: input.as_needed.as_ref().and_then(|a| a.reason.clone()),
        duration: input.duration.clone(),
        prefix: input.prefix.clone(),
    };
    let text = renderer.render(input.template, &data);

    let mut repeat = timing_repeat(&input.frequency);
    repeat.bounds_duration = input.duration.as_ref().map(|d| BoundsDuration {
        value: d.value,
        unit: d.unit,
    });
    repeat.bounds_period = input.bounds_period.clone();

    let max_dose_per_period = input.max_dose_per_period.as_ref().map(|max| MaxDosePerPeriodOut {
        numerator: coded(&max.dose, units),
        denominator: CodedQuantity {
            value: max.period,
            unit: max.period_unit.code().to_string(),
            system: Some(UCUM_SYSTEM.to_string()),
            code: Some(max.period_unit.code().to_string()),
        },
    });

    let mut additional_instruction: Vec<String> = Vec::new();
    for instruction in &input.additional_instructions {
        let trimmed = instruction.trim();
        if !trimmed.is_empty() && !additional_instruction.iter().any(|a| a == trimmed) {
            additional_instruction.push(trimmed.to_string());
        }
    }

    SignatureInstruction {
        id: input.id.clone(),
        sequence: input.sequence,
        text,
        dose_and_rate: vec![dose_and_rate(&input.dose, units)],
        timing: Timing { repeat },
        route: CodeableConcept::from_route(&input.route),
        as_needed_boolean: input.as_needed.as_ref().map(|_| true),
        as_needed_for: input.as_needed.as_ref().and_then(|a| a.reason.clone()),
        max_dose_per_period,
        additional_instruction,
        relationship: input.relationship.clone(),
    }
}
