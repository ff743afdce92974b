//! Read-only medication catalog data consumed by the engine.

use crate::error::{SigError, SigResult};
use crate::units::{format_number, normalize_unit, unit_kind, UnitKind};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, unit: &str) -> Self {
        Self {
            value,
            unit: normalize_unit(unit),
        }
    }

    pub fn kind(&self) -> UnitKind {
        unit_kind(&self.unit)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_number(self.value), self.unit)
    }
}

/// Amount of active ingredient per dispensed quantity (250 mg / 5 mL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: Quantity,
    pub denominator: Quantity,
}

impl Ratio {
    pub fn new(numerator: Quantity, denominator: Quantity) -> Self {
        Self { numerator, denominator }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if (self.denominator.value - 1.0).abs() < 1e-9 {
            write!(f, "{}/{}", self.numerator, self.denominator.unit)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub strength: Ratio,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DoseForm {
    Tablet,
    Capsule,
    Solution,
    Suspension,
    Syrup,
    Elixir,
    Cream,
    Ointment,
    Gel,
    Lotion,
    Foam,
    Injection,
    Spray,
    Inhaler,
    Patch,
    Other(String),
}

impl FromStr for DoseForm {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        // Injection and device forms are checked first: "injectable suspension"
        // is an injection, not an oral suspension. "Aerosol foam" is a foam.
        let form = if lower.contains("inject") {
            Self::Injection
        } else if lower.contains("foam") {
            Self::Foam
        } else if lower.contains("inhaler") || lower.contains("aerosol") {
            Self::Inhaler
        } else if lower.contains("spray") {
            Self::Spray
        } else if lower.contains("patch") || lower.contains("transdermal") {
            Self::Patch
        } else if lower.contains("suspension") {
            Self::Suspension
        } else if lower.contains("solution") {
            Self::Solution
        } else if lower.contains("syrup") {
            Self::Syrup
        } else if lower.contains("elixir") {
            Self::Elixir
        } else if lower.contains("cream") {
            Self::Cream
        } else if lower.contains("ointment") {
            Self::Ointment
        } else if lower.contains("gel") {
            Self::Gel
        } else if lower.contains("lotion") {
            Self::Lotion
        } else if lower.contains("capsule") {
            Self::Capsule
        } else if lower.contains("tablet") || lower == "tab" {
            Self::Tablet
        } else {
            Self::Other(lower)
        };
        Ok(form)
    }
}

impl From<String> for DoseForm {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(form) => form,
            Err(never) => match never {},
        }
    }
}

impl From<DoseForm> for String {
    fn from(value: DoseForm) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DoseForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tablet => write!(f, "tablet"),
            Self::Capsule => write!(f, "capsule"),
            Self::Solution => write!(f, "solution"),
            Self::Suspension => write!(f, "suspension"),
            Self::Syrup => write!(f, "syrup"),
            Self::Elixir => write!(f, "elixir"),
            Self::Cream => write!(f, "cream"),
            Self::Ointment => write!(f, "ointment"),
            Self::Gel => write!(f, "gel"),
            Self::Lotion => write!(f, "lotion"),
            Self::Foam => write!(f, "foam"),
            Self::Injection => write!(f, "injection"),
            Self::Spray => write!(f, "spray"),
            Self::Inhaler => write!(f, "inhaler"),
            Self::Patch => write!(f, "patch"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoseFormFamily {
    Solid,
    Liquid,
    Topical,
    Injection,
}

impl DoseForm {
    /// Dose-form family lookup. Inhalers and unknown forms have no family; the
    /// builder factory resolves them separately. A spray without a nasal
    /// dispenser is applied to the skin.
    pub fn family(&self) -> Option<DoseFormFamily> {
        match self {
            Self::Tablet | Self::Capsule => Some(DoseFormFamily::Solid),
            Self::Solution | Self::Suspension | Self::Syrup | Self::Elixir => Some(DoseFormFamily::Liquid),
            Self::Cream | Self::Ointment | Self::Gel | Self::Lotion | Self::Foam | Self::Patch | Self::Spray => {
                Some(DoseFormFamily::Topical)
            }
            Self::Injection => Some(DoseFormFamily::Injection),
            Self::Inhaler | Self::Other(_) => None,
        }
    }
}

/// How a tablet may be split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringType {
    None,
    Half,
    Quarter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispenserKind {
    Topiclick,
    Pump,
    NasalSpray,
    Inhaler,
}

impl DispenserKind {
    /// Finds a specialty dispenser named in free text ("Progesterone Topiclick").
    pub fn detect(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if lower.contains("topiclick") || lower.contains("click") {
            Some(Self::Topiclick)
        } else if lower.contains("nasal") && lower.contains("spray") {
            Some(Self::NasalSpray)
        } else if lower.contains("inhaler") || (lower.contains("aerosol") && !lower.contains("foam")) {
            Some(Self::Inhaler)
        } else if lower.contains("pump") {
            Some(Self::Pump)
        } else {
            None
        }
    }

    pub fn unit_label(&self) -> &'static str {
        match self {
            Self::Topiclick => "click",
            Self::Pump => "pump",
            Self::NasalSpray => "spray",
            Self::Inhaler => "puff",
        }
    }

    pub fn is_spray_based(&self) -> bool {
        matches!(self, Self::NasalSpray | Self::Inhaler)
    }

    pub fn default_units_per_ml(&self) -> Option<f64> {
        match self {
            // 4 clicks dispense 1 mL
            Self::Topiclick => Some(4.0),
            // 0.1 mL per actuation
            Self::NasalSpray => Some(10.0),
            Self::Pump | Self::Inhaler => None,
        }
    }

    pub fn default_priming(&self) -> &'static str {
        match self {
            Self::Topiclick => "Before first use, prime the dispenser by turning the dial until medication appears.",
            Self::Pump => "Prime the pump before first use.",
            Self::NasalSpray => "Prime the spray before first use by spraying into the air until a fine mist appears.",
            Self::Inhaler => "Shake well and prime the inhaler before first use.",
        }
    }

    pub fn usage_text(&self) -> Option<&'static str> {
        match self {
            Self::Topiclick => Some("Rub into the skin until fully absorbed."),
            Self::NasalSpray => Some("Gently blow your nose before each use."),
            Self::Inhaler => Some("Rinse your mouth with water after each use."),
            Self::Pump => None,
        }
    }
}

impl fmt::Display for DispenserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topiclick => write!(f, "Topiclick"),
            Self::Pump => write!(f, "pump"),
            Self::NasalSpray => write!(f, "nasal spray"),
            Self::Inhaler => write!(f, "inhaler"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispenserInfo {
    pub kind: DispenserKind,
    pub units_per_ml: Option<f64>,
    /// Active ingredient per click/spray, when the catalog states it directly.
    pub mass_per_unit: Option<Quantity>,
    pub max_units_per_dose: Option<f64>,
    pub priming_instructions: Option<String>,
}

impl DispenserInfo {
    pub fn for_kind(kind: DispenserKind) -> Self {
        Self {
            kind,
            units_per_ml: kind.default_units_per_ml(),
            mass_per_unit: None,
            max_units_per_dose: None,
            priming_instructions: None,
        }
    }

    pub fn priming_text(&self) -> String {
        self.priming_instructions
            .clone()
            .unwrap_or_else(|| self.kind.default_priming().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DosageLimits {
    pub min_dose: Option<Quantity>,
    pub max_dose: Option<Quantity>,
    pub step: Option<Quantity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationProfile {
    pub id: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub name: String,
    pub dose_form: DoseForm,
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub dispenser: Option<DispenserInfo>,
    #[serde(default)]
    pub limits: Option<DosageLimits>,
    #[serde(default)]
    pub scoring: Option<ScoringType>,
    #[serde(default)]
    pub is_taper: bool,
    /// Catalog flag for whether the product may be split; `Some(false)`
    /// marks an unscored tablet even when no scoring type is recorded.
    #[serde(default)]
    pub is_fractional: Option<bool>,
    #[serde(default)]
    pub is_multi_ingredient: bool,
    #[serde(default)]
    pub is_controlled: bool,
}

impl MedicationProfile {
    pub fn new(id: &str, name: &str, dose_form: DoseForm) -> Self {
        Self {
            id: id.to_string(),
            sku: None,
            name: name.to_string(),
            dose_form,
            ingredients: Vec::new(),
            dispenser: None,
            limits: None,
            scoring: None,
            is_taper: false,
            is_fractional: None,
            is_multi_ingredient: false,
            is_controlled: false,
        }
    }

    pub fn with_ingredient(mut self, name: &str, numerator: Quantity, denominator: Quantity) -> Self {
        self.ingredients.push(Ingredient {
            name: name.to_string(),
            strength: Ratio::new(numerator, denominator),
        });
        self.is_multi_ingredient = self.ingredients.len() > 1;
        self
    }

    pub fn with_sku(mut self, sku: &str) -> Self {
        self.sku = Some(sku.to_string());
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringType) -> Self {
        self.scoring = Some(scoring);
        self.is_fractional = Some(scoring != ScoringType::None);
        self
    }

    pub fn with_dispenser(mut self, dispenser: DispenserInfo) -> Self {
        self.dispenser = Some(dispenser);
        self
    }

    pub fn with_limits(mut self, limits: DosageLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn tapering(mut self) -> Self {
        self.is_taper = true;
        self
    }

    pub fn controlled(mut self) -> Self {
        self.is_controlled = true;
        self
    }

    /// Scoring the dose rules should enforce. A product flagged non-fractional
    /// is treated as unscored whatever scoring type the catalog carries.
    pub fn effective_scoring(&self) -> Option<ScoringType> {
        match self.is_fractional {
            Some(false) => Some(ScoringType::None),
            _ => self.scoring,
        }
    }

    /// Strength of the first (or only) ingredient.
    pub fn primary_strength(&self) -> Option<&Ratio> {
        self.ingredients.first().map(|i| &i.strength)
    }

    pub fn has_ingredient(&self, name: &str) -> bool {
        self.ingredients.iter().any(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// Dispenser metadata from the catalog, or one inferred from a specialty
    /// dispenser named in the dose form or the medication name.
    pub fn resolved_dispenser(&self) -> Option<DispenserInfo> {
        if let Some(dispenser) = &self.dispenser {
            return Some(dispenser.clone());
        }
        DispenserKind::detect(&self.dose_form.to_string())
            .or_else(|| DispenserKind::detect(&self.name))
            .map(DispenserInfo::for_kind)
    }

    pub fn validate(&self) -> SigResult<()> {
        if self.name.trim().is_empty() {
            return Err(SigError::InvalidMedication(
                "Medication name must not be empty".to_string()
            ));
        }

        if self.ingredients.is_empty() {
            return Err(SigError::InvalidMedication(
                format!("Medication {} has no ingredients", self.name)
            ));
        }

        for ingredient in &self.ingredients {
            if ingredient.strength.numerator.value <= 0.0 || ingredient.strength.denominator.value <= 0.0 {
                return Err(SigError::InvalidMedication(
                    format!("Ingredient {} must have a positive strength", ingredient.name)
                ));
            }
        }

        if let Some(dispenser) = &self.dispenser {
            if dispenser.units_per_ml.map_or(false, |u| u <= 0.0) {
                return Err(SigError::InvalidMedication(
                    "Dispenser units per mL must be positive".to_string()
                ));
            }
            if dispenser.max_units_per_dose.map_or(false, |m| m <= 0.0) {
                return Err(SigError::InvalidMedication(
                    "Dispenser max units per dose must be positive".to_string()
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dose_form_parsing() {
        assert_eq!("Film-coated tablet".parse::<DoseForm>().unwrap(), DoseForm::Tablet);
        assert_eq!("Oral Suspension".parse::<DoseForm>().unwrap(), DoseForm::Suspension);
        assert_eq!("injectable suspension".parse::<DoseForm>().unwrap(), DoseForm::Injection);
        assert_eq!("Wafer".parse::<DoseForm>().unwrap(), DoseForm::Other("wafer".to_string()));
    }

    #[test]
    fn test_dose_form_family() {
        assert_eq!(DoseForm::Capsule.family(), Some(DoseFormFamily::Solid));
        assert_eq!(DoseForm::Syrup.family(), Some(DoseFormFamily::Liquid));
        assert_eq!(DoseForm::Gel.family(), Some(DoseFormFamily::Topical));
        assert_eq!(DoseForm::Spray.family(), Some(DoseFormFamily::Topical));
        assert_eq!(DoseForm::Inhaler.family(), None);
    }

    #[test]
    fn test_aerosol_foam_is_a_foam() {
        assert_eq!("Aerosol foam".parse::<DoseForm>().unwrap(), DoseForm::Foam);
        assert_eq!("Metered-dose aerosol".parse::<DoseForm>().unwrap(), DoseForm::Inhaler);

        let med = MedicationProfile::new("clob", "Clobetasol 0.05% aerosol foam", DoseForm::Foam);
        assert!(med.resolved_dispenser().is_none());
        assert_eq!(DispenserKind::detect("Albuterol HFA aerosol"), Some(DispenserKind::Inhaler));
    }

    #[test]
    fn test_non_fractional_flag_means_unscored() {
        let mut med = MedicationProfile::new("m1", "Warfarin 5 mg", DoseForm::Tablet);
        assert_eq!(med.effective_scoring(), None);

        med.is_fractional = Some(false);
        assert_eq!(med.effective_scoring(), Some(ScoringType::None));

        let scored = MedicationProfile::new("m2", "Lisinopril 10 mg", DoseForm::Tablet).with_scoring(ScoringType::Half);
        assert_eq!(scored.is_fractional, Some(true));
        assert_eq!(scored.effective_scoring(), Some(ScoringType::Half));

        let parsed: MedicationProfile = serde_json::from_str(
            r#"{"id":"m3","name":"Metoprolol","dose_form":"tablet","ingredients":[],"is_fractional":false}"#,
        )
        .unwrap();
        assert_eq!(parsed.effective_scoring(), Some(ScoringType::None));
    }

    #[test]
    fn test_only_nasal_sprays_get_a_spray_dispenser() {
        let topical = MedicationProfile::new("lido", "Lidocaine 4% topical spray", DoseForm::Spray);
        assert!(topical.resolved_dispenser().is_none());
        assert_eq!(topical.dose_form.family(), Some(DoseFormFamily::Topical));

        let nasal = MedicationProfile::new("flut", "Fluticasone 50 mcg nasal spray", DoseForm::Spray);
        assert_eq!(nasal.resolved_dispenser().unwrap().kind, DispenserKind::NasalSpray);
    }

    #[test]
    fn test_dose_form_serde() {
        let form: DoseForm = serde_json::from_str("\"Chewable Tablet\"").unwrap();
        assert_eq!(form, DoseForm::Tablet);
        assert_eq!(serde_json::to_string(&DoseForm::Suspension).unwrap(), "\"suspension\"");
    }

    #[test]
    fn test_dispenser_detection_from_name() {
        let med = MedicationProfile::new("m1", "Progesterone 100 mg/mL Topiclick", DoseForm::Cream)
            .with_ingredient("progesterone", Quantity::new(100.0, "mg"), Quantity::new(1.0, "mL"));
        let dispenser = med.resolved_dispenser().unwrap();
        assert_eq!(dispenser.kind, DispenserKind::Topiclick);
        assert_eq!(dispenser.units_per_ml, Some(4.0));

        let plain = MedicationProfile::new("m2", "Lisinopril 10 mg", DoseForm::Tablet);
        assert!(plain.resolved_dispenser().is_none());
    }

    #[test]
    fn test_validate_rejects_missing_ingredients() {
        let med = MedicationProfile::new("m1", "Mystery", DoseForm::Tablet);
        assert!(matches!(med.validate(), Err(SigError::InvalidMedication(_))));

        let med = med.with_ingredient("x", Quantity::new(0.0, "mg"), Quantity::new(1.0, "tablet"));
        assert!(med.validate().is_err());
    }

    #[test]
    fn test_multi_ingredient_flag_follows_ingredients() {
        let med = MedicationProfile::new("m1", "Augmentin", DoseForm::Suspension)
            .with_ingredient("amoxicillin", Quantity::new(250.0, "mg"), Quantity::new(5.0, "mL"));
        assert!(!med.is_multi_ingredient);
        let med = med.with_ingredient("clavulanate", Quantity::new(62.5, "mg"), Quantity::new(5.0, "mL"));
        assert!(med.is_multi_ingredient);
        assert_eq!(med.primary_strength().unwrap().to_string(), "250 mg/5 mL");
    }
}
