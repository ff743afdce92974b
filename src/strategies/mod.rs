//! Specificity-ordered strategy dispatch.
//!
//! A request (`StrategyContext`) is matched against the registered base
//! strategies; the most specific one builds the instructions, then every
//! applicable modifier is folded over them in priority order.

pub mod base;
pub mod modifiers;

use crate::audit::{AuditTrail, Warning, WarningCode};
use crate::config::TieBreak;
use crate::dosing::{
    AsNeeded, DoseConstraints, DoseInput, DoseRangeInput, FrequencyRangeInput, MaxDailyDoseConstraint,
    TaperingPhase, TimingInput,
};
use crate::engine::Engine;
use crate::error::{SigError, SigResult};
use crate::instruction::SignatureInstruction;
use crate::medication::MedicationProfile;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use base::{CatalogRuleStrategy, DefaultStrategy};
pub use modifiers::{DispenserUnitModifier, SpecialInstructionModifier, StrengthDisplayModifier};

/// How narrowly a base strategy targets a medication. Later variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specificity {
    Default,
    DoseForm,
    DoseFormIngredient,
    MedicationId,
    Sku,
}

impl fmt::Display for Specificity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Default => "default",
            Self::DoseForm => "dose form",
            Self::DoseFormIngredient => "dose form + ingredient",
            Self::MedicationId => "medication id",
            Self::Sku => "sku",
        };
        write!(f, "{}", label)
    }
}

/// One signature request: the medication plus every clinical input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyContext {
    pub medication: Arc<MedicationProfile>,
    #[serde(default)]
    pub doses: Vec<DoseInput>,
    #[serde(default)]
    pub dose_range: Option<DoseRangeInput>,
    #[serde(default)]
    pub timing: Option<TimingInput>,
    #[serde(default)]
    pub frequency_range: Option<FrequencyRangeInput>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub as_needed: Option<AsNeeded>,
    #[serde(default)]
    pub max_daily: Option<MaxDailyDoseConstraint>,
    #[serde(default)]
    pub constraints: Option<DoseConstraints>,
    #[serde(default)]
    pub phases: Vec<TaperingPhase>,
    #[serde(default)]
    pub current_phase: Option<u32>,
    #[serde(default)]
    pub special_instructions: Vec<String>,
}

impl StrategyContext {
    pub fn new(medication: Arc<MedicationProfile>) -> Self {
        Self {
            medication,
            doses: Vec::new(),
            dose_range: None,
            timing: None,
            frequency_range: None,
            route: None,
            as_needed: None,
            max_daily: None,
            constraints: None,
            phases: Vec::new(),
            current_phase: None,
            special_instructions: Vec::new(),
        }
    }

    pub fn with_dose(mut self, dose: DoseInput) -> Self {
        self.doses.push(dose);
        self
    }

    pub fn with_timing(mut self, timing: TimingInput) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn with_route(mut self, route: &str) -> Self {
        self.route = Some(route.to_string());
        self
    }

    /// Ranged or capped as-needed request, handled by the PRN builder.
    pub fn is_prn(&self) -> bool {
        self.dose_range.is_some() || self.frequency_range.is_some() || self.max_daily.is_some()
    }

    pub fn is_taper(&self) -> bool {
        !self.phases.is_empty()
    }
}

/// Instructions produced by a base strategy, with the audit of the builder
/// that made them.
#[derive(Debug, Clone)]
pub struct StrategyOutput {
    pub instructions: Vec<SignatureInstruction>,
    pub audit: AuditTrail,
}

pub trait BaseStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn specificity(&self) -> Specificity;
    fn matches(&self, ctx: &StrategyContext) -> bool;
    fn build(&self, ctx: &StrategyContext, engine: &Engine) -> SigResult<StrategyOutput>;
}

/// Post-processing step. `modify` returns a new instruction and must not
/// depend on which other modifiers ran.
pub trait ModifierStrategy: Send + Sync {
    fn name(&self) -> &str;
    /// Lower runs first.
    fn priority(&self) -> i32;
    fn applies_to(&self, ctx: &StrategyContext) -> bool;
    fn modify(&self, instruction: SignatureInstruction, ctx: &StrategyContext) -> SigResult<SignatureInstruction>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyComposition {
    pub base: String,
    pub specificity: Specificity,
    /// In application order.
    pub modifiers: Vec<String>,
    /// Other strategies that matched at the same rank.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tied_with: Vec<String>,
}

impl fmt::Display for StrategyComposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.base, self.specificity)?;
        for modifier in &self.modifiers {
            write!(f, " -> {}", modifier)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub instructions: Vec<SignatureInstruction>,
    pub composition: StrategyComposition,
    pub warnings: Vec<Warning>,
    pub audit: AuditTrail,
}

impl DispatchOutcome {
    pub fn explain(&self) -> String {
        self.audit.explain()
    }
}

pub struct Dispatcher {
    engine: Engine,
    bases: Vec<Box<dyn BaseStrategy>>,
    modifiers: Vec<Box<dyn ModifierStrategy>>,
}

impl Dispatcher {
    pub fn new(engine: &Engine) -> Self {
        Self {
            engine: engine.clone(),
            bases: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    /// Default strategy, one strategy per configured catalog rule and the
    /// stock modifiers.
    pub fn with_defaults(engine: &Engine) -> Self {
        let mut dispatcher = Self::new(engine);
        dispatcher.register_base(Box::new(DefaultStrategy));
        for rule in &engine.config().catalog_rules {
            dispatcher.register_base(Box::new(CatalogRuleStrategy::new(rule.clone())));
        }
        dispatcher
            .register_modifier(Box::new(StrengthDisplayModifier))
            .register_modifier(Box::new(DispenserUnitModifier))
            .register_modifier(Box::new(SpecialInstructionModifier));
        dispatcher
    }

    pub fn register_base(&mut self, strategy: Box<dyn BaseStrategy>) -> &mut Self {
        self.bases.push(strategy);
        self
    }

    pub fn register_modifier(&mut self, modifier: Box<dyn ModifierStrategy>) -> &mut Self {
        self.modifiers.push(modifier);
        self
    }

    fn select(&self, ctx: &StrategyContext) -> SigResult<(&dyn BaseStrategy, Vec<String>)> {
        let candidates: Vec<&dyn BaseStrategy> = self
            .bases
            .iter()
            .map(|b| b.as_ref())
            .filter(|b| b.matches(ctx))
            .collect();

        let top = candidates
            .iter()
            .map(|b| b.specificity())
            .max()
            .ok_or_else(|| SigError::NoMatchingStrategy(ctx.medication.name.clone()))?;

        // Registration order is preserved by the filter above
        let mut tied = candidates.into_iter().filter(|b| b.specificity() == top);
        let chosen = tied
            .next()
            .ok_or_else(|| SigError::NoMatchingStrategy(ctx.medication.name.clone()))?;
        let others: Vec<String> = tied.map(|b| b.name().to_string()).collect();

        if !others.is_empty() && self.engine.config().tie_break == TieBreak::Reject {
            return Err(SigError::AmbiguousStrategy(format!(
                "{} and {} both match {} at {} specificity",
                chosen.name(),
                others.join(", "),
                ctx.medication.name,
                top
            )));
        }
        Ok((chosen, others))
    }

    fn applicable_modifiers(&self, ctx: &StrategyContext) -> Vec<&dyn ModifierStrategy> {
        let mut applicable: Vec<&dyn ModifierStrategy> = self
            .modifiers
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| m.applies_to(ctx))
            .collect();
        // Stable: equal priorities keep registration order
        applicable.sort_by_key(|m| m.priority());
        applicable
    }

    /// Which base strategy and modifiers a request would use, without
    /// building anything.
    pub fn compose(&self, ctx: &StrategyContext) -> SigResult<StrategyComposition> {
        let (base, tied_with) = self.select(ctx)?;
        Ok(StrategyComposition {
            base: base.name().to_string(),
            specificity: base.specificity(),
            modifiers: self
                .applicable_modifiers(ctx)
                .iter()
                .map(|m| m.name().to_string())
                .collect(),
            tied_with,
        })
    }

    pub fn dispatch(&self, ctx: &StrategyContext) -> SigResult<DispatchOutcome> {
        let mut audit = AuditTrail::new();
        let (base, tied_with) = self.select(ctx)?;
        audit.decision(format!(
            "selected base strategy {} ({} specificity) for {}",
            base.name(),
            base.specificity(),
            ctx.medication.name
        ));
        if !tied_with.is_empty() {
            audit.warn(Warning::new(
                WarningCode::StrategyTie,
                format!(
                    "{} tied with {} at {} specificity; registration order decided",
                    base.name(),
                    tied_with.join(", "),
                    base.specificity()
                ),
            ));
        }

        let output = base.build(ctx, &self.engine)?;
        audit.absorb(&output.audit);

        let modifiers = self.applicable_modifiers(ctx);
        let mut instructions = Vec::with_capacity(output.instructions.len());
        for instruction in output.instructions {
            let mut current = instruction;
            for modifier in &modifiers {
                current = modifier.modify(current, ctx)?;
            }
            instructions.push(current);
        }
        for modifier in &modifiers {
            audit.decision(format!("applied modifier {} (priority {})", modifier.name(), modifier.priority()));
        }

        let composition = StrategyComposition {
            base: base.name().to_string(),
            specificity: base.specificity(),
            modifiers: modifiers.iter().map(|m| m.name().to_string()).collect(),
            tied_with,
        };
        info!(
            "{}: {} instruction(s) via {}",
            ctx.medication.name,
            instructions.len(),
            composition
        );

        Ok(DispatchOutcome {
            instructions,
            warnings: audit.warnings(),
            composition,
            audit,
        })
    }

    /// Plain-language account of the composition chosen for a request.
    pub fn explain(&self, ctx: &StrategyContext) -> SigResult<String> {
        let composition = self.compose(ctx)?;
        let mut lines = vec![format!("Base strategy: {} ({} specificity)", composition.base, composition.specificity)];
        if !composition.tied_with.is_empty() {
            lines.push(format!("Tied with: {}", composition.tied_with.join(", ")));
        }
        if composition.modifiers.is_empty() {
            lines.push("Modifiers: none".to_string());
        } else {
            lines.push(format!("Modifiers: {}", composition.modifiers.join(" -> ")));
        }
        Ok(lines.join("\n"))
    }
}
