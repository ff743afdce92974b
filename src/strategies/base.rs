//! Built-in base strategies.

use super::{BaseStrategy, Specificity, StrategyContext, StrategyOutput};
use crate::builders::SignatureBuilder;
use crate::config::CatalogRule;
use crate::engine::Engine;
use crate::error::SigResult;

/// Feeds the request through the builder the context calls for: tapering
/// when phases are given, PRN for ranged requests, otherwise the factory's
/// choice for the medication.
fn run_builders(
    ctx: &StrategyContext,
    engine: &Engine,
    route: Option<&str>,
    extra_instructions: &[String],
) -> SigResult<StrategyOutput> {
    let medication = ctx.medication.clone();

    if ctx.is_taper() {
        let mut builder = engine.tapering_builder_for(medication)?;
        builder.set_sequential_phases(ctx.phases.clone())?;
        if let Some(current) = ctx.current_phase {
            builder.set_current_phase(current)?;
        }
        return finish(&mut builder, ctx, route, extra_instructions);
    }

    if ctx.is_prn() {
        let mut builder = engine.prn_builder_for(medication)?;
        if let Some(range) = &ctx.dose_range {
            builder.set_dose_range(range.clone())?;
        }
        if let Some(range) = &ctx.frequency_range {
            builder.set_frequency_range(range.clone())?;
        }
        if let Some(max_daily) = &ctx.max_daily {
            builder.set_max_daily_dose_constraint(max_daily.clone())?;
        }
        return finish(&mut builder, ctx, route, extra_instructions);
    }

    let mut builder = engine.builder_for(medication)?;
    finish(builder.as_mut(), ctx, route, extra_instructions)
}

fn finish(
    builder: &mut dyn SignatureBuilder,
    ctx: &StrategyContext,
    route: Option<&str>,
    extra_instructions: &[String],
) -> SigResult<StrategyOutput> {
    for dose in &ctx.doses {
        builder.add_dose(dose.clone())?;
    }
    if let Some(timing) = &ctx.timing {
        builder.add_timing(timing.clone())?;
    }
    if let Some(route) = route {
        builder.add_route(route)?;
    }
    if let Some(constraints) = &ctx.constraints {
        builder.add_constraints(constraints.clone())?;
    }
    if let Some(as_needed) = &ctx.as_needed {
        builder.add_as_needed(as_needed.clone())?;
    }

    let mut special = extra_instructions.to_vec();
    special.extend(ctx.special_instructions.iter().cloned());
    if !special.is_empty() {
        builder.add_special_instructions(special)?;
    }

    Ok(StrategyOutput {
        instructions: builder.render()?,
        audit: builder.audit().clone(),
    })
}

/// Matches every request; the builder factory does the work.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStrategy;

impl BaseStrategy for DefaultStrategy {
    fn name(&self) -> &str {
        "default"
    }

    fn specificity(&self) -> Specificity {
        Specificity::Default
    }

    fn matches(&self, _ctx: &StrategyContext) -> bool {
        true
    }

    fn build(&self, ctx: &StrategyContext, engine: &Engine) -> SigResult<StrategyOutput> {
        run_builders(ctx, engine, ctx.route.as_deref(), &[])
    }
}

/// Catalog-maintained rule. Its rank follows from the narrowest criterion
/// it names; every named criterion must match.
#[derive(Debug, Clone)]
pub struct CatalogRuleStrategy {
    rule: CatalogRule,
}

impl CatalogRuleStrategy {
    pub fn new(rule: CatalogRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &CatalogRule {
        &self.rule
    }
}

impl BaseStrategy for CatalogRuleStrategy {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn specificity(&self) -> Specificity {
        let criteria = &self.rule.criteria;
        if criteria.sku.is_some() {
            Specificity::Sku
        } else if criteria.medication_id.is_some() {
            Specificity::MedicationId
        } else if criteria.dose_form.is_some() && criteria.ingredient.is_some() {
            Specificity::DoseFormIngredient
        } else {
            Specificity::DoseForm
        }
    }

    fn matches(&self, ctx: &StrategyContext) -> bool {
        let criteria = &self.rule.criteria;
        let medication = &ctx.medication;
        if criteria.is_empty() {
            return false;
        }
        criteria
            .sku
            .as_ref()
            .map_or(true, |sku| medication.sku.as_deref() == Some(sku.as_str()))
            && criteria.medication_id.as_ref().map_or(true, |id| &medication.id == id)
            && criteria.dose_form.as_ref().map_or(true, |form| &medication.dose_form == form)
            && criteria.ingredient.as_ref().map_or(true, |name| medication.has_ingredient(name))
    }

    fn build(&self, ctx: &StrategyContext, engine: &Engine) -> SigResult<StrategyOutput> {
        let route = ctx.route.as_deref().or(self.rule.default_route.as_deref());
        run_builders(ctx, engine, route, &self.rule.additional_instructions)
    }
}
