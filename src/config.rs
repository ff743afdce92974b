pub mod tables;

use crate::error::{SigError, SigResult};
use crate::medication::DoseForm;
use crate::units::normalize_unit;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Injected reference data and thresholds. Immutable once handed to an `Engine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub route_codes: RouteTable,
    pub unit_codes: UnitTable,
    pub thresholds: Thresholds,
    pub tie_break: TieBreak,
    pub taper_start_date: Option<NaiveDate>,
    pub catalog_rules: Vec<CatalogRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCode {
    pub system: String,
    pub code: String,
    pub display: String,
    /// Patient-facing wording ("by mouth").
    pub phrase: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteTable {
    pub routes: HashMap<String, RouteCode>,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl RouteTable {
    pub fn lookup(&self, name: &str) -> Option<&RouteCode> {
        let key = name.trim().to_lowercase();
        self.routes.get(&key).or_else(|| {
            self.aliases
                .get(&key)
                .and_then(|canonical| self.routes.get(canonical))
        })
    }

    /// Canonical route name for a route or alias.
    pub fn canonical_name(&self, name: &str) -> Option<String> {
        let key = name.trim().to_lowercase();
        if self.routes.contains_key(&key) {
            Some(key)
        } else {
            self.aliases.get(&key).cloned()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitCode {
    pub system: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitTable {
    pub units: HashMap<String, UnitCode>,
}

impl UnitTable {
    pub fn lookup(&self, unit: &str) -> Option<&UnitCode> {
        self.units.get(&normalize_unit(unit))
    }
}

/// Limits above or below which advisory warnings are raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub large_volume_ml: f64,
    pub large_range_factor: f64,
    pub taper_jump_fraction: f64,
    pub short_phase_days: f64,
    pub min_interval_hours: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            large_volume_ml: 1000.0,
            large_range_factor: 10.0,
            taper_jump_fraction: 0.5,
            short_phase_days: 3.0,
            min_interval_hours: 1.0,
        }
    }
}

/// What the dispatcher does when two matching base strategies share a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The earliest registered strategy wins; the tie is recorded as a warning.
    #[default]
    RegistrationOrder,
    /// Selection fails with `SigError::AmbiguousStrategy`.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchCriteria {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub medication_id: Option<String>,
    #[serde(default)]
    pub dose_form: Option<DoseForm>,
    #[serde(default)]
    pub ingredient: Option<String>,
}

impl MatchCriteria {
    pub fn is_empty(&self) -> bool {
        self.sku.is_none() && self.medication_id.is_none() && self.dose_form.is_none() && self.ingredient.is_none()
    }
}

/// Catalog-maintained generation rule, e.g. extra counselling text for one SKU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRule {
    pub name: String,
    pub criteria: MatchCriteria,
    #[serde(default)]
    pub additional_instructions: Vec<String>,
    /// Route used when the request does not name one.
    #[serde(default)]
    pub default_route: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            route_codes: tables::default_route_table(),
            unit_codes: tables::default_unit_table(),
            thresholds: Thresholds::default(),
            tie_break: TieBreak::default(),
            taper_start_date: None,
            catalog_rules: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> SigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> SigResult<Self> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SigResult<()> {
        // Unknown routes fall back to oral, so it must be present
        if self.route_codes.lookup("oral").is_none() {
            return Err(SigError::InvalidConfig(
                "Route table must contain an 'oral' entry".to_string()
            ));
        }

        for (alias, target) in &self.route_codes.aliases {
            if !self.route_codes.routes.contains_key(target) {
                return Err(SigError::InvalidConfig(
                    format!("Route alias '{}' points to unknown route '{}'", alias, target)
                ));
            }
        }

        self.validate_thresholds()?;

        for rule in &self.catalog_rules {
            if rule.criteria.is_empty() {
                return Err(SigError::InvalidConfig(
                    format!("Catalog rule '{}' has no match criteria", rule.name)
                ));
            }
        }

        Ok(())
    }

    fn validate_thresholds(&self) -> SigResult<()> {
        let t = &self.thresholds;
        let checks = [
            ("large_volume_ml", t.large_volume_ml),
            ("large_range_factor", t.large_range_factor),
            ("taper_jump_fraction", t.taper_jump_fraction),
            ("short_phase_days", t.short_phase_days),
            ("min_interval_hours", t.min_interval_hours),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(SigError::InvalidConfig(
                    format!("Threshold {} must be positive", name)
                ));
            }
        }
        Ok(())
    }
}
