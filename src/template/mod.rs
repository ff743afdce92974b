//! Phrase templates turning flattened template data into patient-facing text.
//!
//! The engine only depends on the `TemplateRenderer` trait; `PhraseTemplates`
//! is the stock English implementation.

use crate::dosing::{PeriodUnit, PhaseDuration, WhenTag};
use crate::units::{approx_eq, format_number, is_tablet_unit, normalize_unit, split_fraction, unit_kind, UnitKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKey {
    Oral,
    Liquid,
    Topical,
    Injection,
    ClickDispenser,
    SprayDispenser,
    Inhaler,
}

impl TemplateKey {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Oral | Self::Liquid => "Take",
            Self::Topical | Self::ClickDispenser => "Apply",
            Self::Injection => "Inject",
            Self::SprayDispenser => "Use",
            Self::Inhaler => "Inhale",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DosePhrase {
    Single { value: f64, unit: String },
    Range { min: f64, max: f64, unit: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrequencyPhrase {
    Fixed {
        frequency: u32,
        period: f64,
        period_unit: PeriodUnit,
        when: Vec<WhenTag>,
    },
    Range {
        min: u32,
        max: u32,
        period: f64,
        period_unit: PeriodUnit,
    },
}

/// Flattened input for one rendered sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateData {
    pub dose: DosePhrase,
    pub route_phrase: String,
    pub frequency: FrequencyPhrase,
    pub as_needed: bool,
    pub as_needed_for: Option<String>,
    pub duration: Option<PhaseDuration>,
    pub prefix: Option<String>,
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, key: TemplateKey, data: &TemplateData) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PhraseTemplates;

impl TemplateRenderer for PhraseTemplates {
    fn render(&self, key: TemplateKey, data: &TemplateData) -> String {
        let mut sentence = format!("{} {}", key.verb(), dose_text(&data.dose));

        if !data.route_phrase.is_empty() {
            sentence.push(' ');
            sentence.push_str(&data.route_phrase);
        }

        sentence.push(' ');
        sentence.push_str(&frequency_text(&data.frequency));

        if let Some(duration) = &data.duration {
            sentence.push(' ');
            sentence.push_str(&duration_text(duration));
        }

        if data.as_needed {
            sentence.push_str(" as needed");
            if let Some(reason) = &data.as_needed_for {
                sentence.push_str(" for ");
                sentence.push_str(reason);
            }
        }
        sentence.push('.');

        match &data.prefix {
            Some(prefix) => format!("{}: {}", prefix, sentence),
            None => sentence,
        }
    }
}

/// Number display; countable units get fractions ("1 1/2").
pub fn format_amount(value: f64, unit: &str) -> String {
    if !is_tablet_unit(unit) && unit_kind(unit) != UnitKind::Count {
        return format_number(value);
    }
    let (whole, remainder) = split_fraction(value);
    let fraction = if approx_eq(remainder, 0.25) {
        "1/4"
    } else if approx_eq(remainder, 0.5) {
        "1/2"
    } else if approx_eq(remainder, 0.75) {
        "3/4"
    } else {
        return format_number(value);
    };
    if whole < 1.0 {
        fraction.to_string()
    } else {
        format!("{} {}", whole as i64, fraction)
    }
}

/// Unit label agreeing with the amount; only countable units take a plural.
pub fn unit_label(unit: &str, value: f64) -> String {
    let unit = normalize_unit(unit);
    if unit_kind(&unit) != UnitKind::Count || value <= 1.0 + 1e-9 {
        return unit;
    }
    if unit.ends_with("ch") || unit.ends_with('s') {
        format!("{}es", unit)
    } else {
        format!("{}s", unit)
    }
}

/// "2 tablets", "1/2 tablet", "5 mL".
pub fn quantity_text(value: f64, unit: &str) -> String {
    format!("{} {}", format_amount(value, unit), unit_label(unit, value))
}

pub fn dose_text(dose: &DosePhrase) -> String {
    match dose {
        DosePhrase::Single { value, unit } => quantity_text(*value, unit),
        DosePhrase::Range { min, max, unit } => format!(
            "{} to {} {}",
            format_amount(*min, unit),
            format_amount(*max, unit),
            unit_label(unit, *max)
        ),
    }
}

fn count_word(frequency: u32) -> String {
    match frequency {
        1 => "once".to_string(),
        2 => "twice".to_string(),
        3 => "three times".to_string(),
        4 => "four times".to_string(),
        n => format!("{} times", n),
    }
}

fn adverb(unit: PeriodUnit) -> &'static str {
    match unit {
        PeriodUnit::Hour => "hourly",
        PeriodUnit::Day => "daily",
        PeriodUnit::Week => "weekly",
        PeriodUnit::Month => "monthly",
    }
}

fn every(period: f64, unit: PeriodUnit) -> String {
    if approx_eq(period, 1.0) {
        format!("every {}", unit.singular())
    } else {
        format!("every {} {}s", format_number(period), unit.singular())
    }
}

pub fn frequency_text(frequency: &FrequencyPhrase) -> String {
    match frequency {
        FrequencyPhrase::Fixed { frequency, period, period_unit, when } => {
            let base = if approx_eq(*period, 1.0) && *period_unit != PeriodUnit::Hour {
                format!("{} {}", count_word(*frequency), adverb(*period_unit))
            } else if *frequency == 1 {
                every(*period, *period_unit)
            } else {
                format!("{} {}", count_word(*frequency), every(*period, *period_unit))
            };
            if when.is_empty() {
                base
            } else {
                let when_text = when.iter().map(|w| w.phrase()).collect::<Vec<_>>().join(" and ");
                format!("{} {}", base, when_text)
            }
        }
        FrequencyPhrase::Range { min, max, period, period_unit } => {
            if approx_eq(*period, 1.0) && *period_unit != PeriodUnit::Hour {
                format!("{} to {} times {}", min, max, adverb(*period_unit))
            } else {
                format!("{} to {} times {}", min, max, every(*period, *period_unit))
            }
        }
    }
}

pub fn duration_text(duration: &PhaseDuration) -> String {
    let unit = duration.unit.singular();
    if approx_eq(duration.value, 1.0) {
        format!("for 1 {}", unit)
    } else {
        format!("for {} {}s", format_number(duration.value), unit)
    }
}
