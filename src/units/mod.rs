//! Unit and dose value helpers.
//!
//! Only the fixed conversions the dosing domain needs live here: same-dimension
//! scaling (mcg/mg/g/kg, mL/L), strength-ratio scaling, dispenser counts to
//! volume and tablet fractions. No general unit algebra is attempted.

use crate::error::{SigError, SigResult};
use crate::medication::{Quantity, Ratio};
use serde::{Deserialize, Serialize};

/// Tolerance used when comparing doses and fractional remainders.
pub const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Mass,
    Volume,
    Count,
    Unknown,
}

/// Canonical spelling for a unit string ("Tabs" -> "tablet", "ml" -> "mL").
pub fn normalize_unit(unit: &str) -> String {
    let trimmed = unit.trim();
    let canonical = match trimmed.to_lowercase().as_str() {
        "tab" | "tabs" | "tablet" | "tablets" | "tablet(s)" => "tablet",
        "cap" | "caps" | "capsule" | "capsules" | "capsule(s)" => "capsule",
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => "mL",
        "l" | "liter" | "liters" | "litre" | "litres" => "L",
        "mg" | "milligram" | "milligrams" => "mg",
        "mcg" | "ug" | "µg" | "microgram" | "micrograms" => "mcg",
        "g" | "gram" | "grams" => "g",
        "kg" | "kilogram" | "kilograms" => "kg",
        "click" | "clicks" => "click",
        "spray" | "sprays" => "spray",
        "pump" | "pumps" => "pump",
        "puff" | "puffs" | "actuation" | "actuations" => "puff",
        "drop" | "drops" | "gtt" | "gtts" => "drop",
        "patch" | "patches" => "patch",
        "application" | "applications" => "application",
        "unit" | "units" | "iu" => "unit",
        _ => return trimmed.to_string(),
    };
    canonical.to_string()
}

pub fn unit_kind(unit: &str) -> UnitKind {
    match normalize_unit(unit).as_str() {
        "mcg" | "mg" | "g" | "kg" => UnitKind::Mass,
        "mL" | "L" => UnitKind::Volume,
        "tablet" | "capsule" | "click" | "spray" | "pump" | "puff" | "drop" | "patch"
        | "application" | "unit" => UnitKind::Count,
        _ => UnitKind::Unknown,
    }
}

pub fn is_tablet_unit(unit: &str) -> bool {
    matches!(normalize_unit(unit).as_str(), "tablet" | "capsule")
}

pub fn is_dispenser_unit(unit: &str) -> bool {
    matches!(normalize_unit(unit).as_str(), "click" | "spray" | "pump" | "puff")
}

/// Factor to the dimension's base unit (mg for mass, mL for volume).
fn base_factor(unit: &str) -> Option<f64> {
    match normalize_unit(unit).as_str() {
        "mcg" => Some(0.001),
        "mg" => Some(1.0),
        "g" => Some(1_000.0),
        "kg" => Some(1_000_000.0),
        "mL" => Some(1.0),
        "L" => Some(1_000.0),
        _ => None,
    }
}

/// Converts between two units of the same dimension. Identical countable units
/// convert trivially; anything else yields `None`.
pub fn convert(value: f64, from: &str, to: &str) -> Option<f64> {
    let from_norm = normalize_unit(from);
    let to_norm = normalize_unit(to);
    if from_norm == to_norm {
        return Some(value);
    }
    let from_kind = unit_kind(&from_norm);
    if from_kind != unit_kind(&to_norm) || !matches!(from_kind, UnitKind::Mass | UnitKind::Volume) {
        return None;
    }
    Some(value * base_factor(&from_norm)? / base_factor(&to_norm)?)
}

/// Scales a dose by a strength ratio: `dose` must be expressed in (or convert to)
/// the ratio's denominator unit. 10 mL at 250 mg/5 mL gives 500 mg.
pub fn scale_by_strength(dose: &Quantity, strength: &Ratio) -> Option<Quantity> {
    if strength.denominator.value <= 0.0 {
        return None;
    }
    let in_denominator = convert(dose.value, &dose.unit, &strength.denominator.unit)?;
    let amount = in_denominator / strength.denominator.value * strength.numerator.value;
    Some(Quantity::new(amount, &strength.numerator.unit))
}

/// Inverse of `scale_by_strength`: how much dispensed quantity delivers `amount`.
pub fn inverse_scale(amount: &Quantity, strength: &Ratio) -> Option<Quantity> {
    if strength.numerator.value <= 0.0 {
        return None;
    }
    let in_numerator = convert(amount.value, &amount.unit, &strength.numerator.unit)?;
    let dispensed = in_numerator / strength.numerator.value * strength.denominator.value;
    Some(Quantity::new(dispensed, &strength.denominator.unit))
}

pub fn clicks_to_ml(count: f64, units_per_ml: f64) -> SigResult<f64> {
    if units_per_ml <= 0.0 {
        return Err(SigError::InvalidDose(
            format!("Dispenser units per mL must be positive, got {}", units_per_ml)
        ));
    }
    Ok(count / units_per_ml)
}

pub fn ml_to_clicks(volume_ml: f64, units_per_ml: f64) -> SigResult<f64> {
    if units_per_ml <= 0.0 {
        return Err(SigError::InvalidDose(
            format!("Dispenser units per mL must be positive, got {}", units_per_ml)
        ));
    }
    Ok(volume_ml * units_per_ml)
}

/// Mass delivered by `count` sprays given a per-spray strength.
pub fn sprays_to_mass(count: f64, mass_per_unit: &Quantity) -> Quantity {
    Quantity::new(count * mass_per_unit.value, &mass_per_unit.unit)
}

/// Splits a dose into whole units and fractional remainder.
pub fn split_fraction(value: f64) -> (f64, f64) {
    let whole = value.trunc();
    (whole, value - whole)
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Plain number formatting without trailing zeros ("2", "0.5", "1.25").
pub fn format_number(value: f64) -> String {
    let rounded = round_to(value, 4);
    if approx_eq(rounded, rounded.round()) {
        format!("{}", rounded.round() as i64)
    } else {
        let text = format!("{:.4}", rounded);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ratio(num: f64, num_unit: &str, den: f64, den_unit: &str) -> Ratio {
        Ratio {
            numerator: Quantity::new(num, num_unit),
            denominator: Quantity::new(den, den_unit),
        }
    }

    #[test]
    fn test_normalize_unit_aliases() {
        assert_eq!(normalize_unit("Tabs"), "tablet");
        assert_eq!(normalize_unit(" ml "), "mL");
        assert_eq!(normalize_unit("micrograms"), "mcg");
        assert_eq!(normalize_unit("Clicks"), "click");
        assert_eq!(normalize_unit("sachet"), "sachet");
        assert_eq!(unit_kind("sachet"), UnitKind::Unknown);
    }

    #[test]
    fn test_same_dimension_conversion() {
        assert_relative_eq!(convert(1.0, "g", "mg").unwrap(), 1000.0);
        assert_relative_eq!(convert(500.0, "mcg", "mg").unwrap(), 0.5);
        assert_relative_eq!(convert(2.0, "L", "mL").unwrap(), 2000.0);
        assert!(convert(1.0, "mg", "mL").is_none());
        assert!(convert(1.0, "tablet", "capsule").is_none());
        assert_relative_eq!(convert(3.0, "tabs", "tablet").unwrap(), 3.0);
    }

    #[test]
    fn test_click_volume_round_trip() {
        for clicks in [1.0, 3.0, 4.0, 7.0, 12.0] {
            let ml = clicks_to_ml(clicks, 4.0).unwrap();
            let back = ml_to_clicks(ml, 4.0).unwrap();
            assert_relative_eq!(back, clicks, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_invalid_units_per_ml() {
        assert!(clicks_to_ml(2.0, 0.0).is_err());
        assert!(ml_to_clicks(2.0, -1.0).is_err());
    }

    #[test]
    fn test_scale_by_strength() {
        let liquid = ratio(250.0, "mg", 5.0, "mL");
        let amount = scale_by_strength(&Quantity::new(10.0, "mL"), &liquid).unwrap();
        assert_relative_eq!(amount.value, 500.0);

        let tablet = ratio(500.0, "mg", 1.0, "tablet");
        let amount = scale_by_strength(&Quantity::new(2.0, "tablets"), &tablet).unwrap();
        assert_relative_eq!(amount.value, 1000.0);

        let back = inverse_scale(&Quantity::new(1.0, "g"), &tablet).unwrap();
        assert_eq!(back.unit, "tablet");
        assert_relative_eq!(back.value, 2.0);
    }

    #[test]
    fn test_sprays_to_mass() {
        let per_spray = Quantity::new(50.0, "mcg");
        let total = sprays_to_mass(2.0, &per_spray);
        assert_relative_eq!(total.value, 100.0);
        assert_eq!(total.unit, "mcg");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(1.25), "1.25");
        assert_eq!(format_number(7.000000001), "7");
    }
}
