//! Shared builder core: state accumulation, per-dose-form policy and the
//! plumbing every concrete builder composes.

use super::render::{fixed_frequency, max_dose_text, render_snapshot, RenderDose, RenderInput};
use super::BuilderKind;
use crate::audit::{AuditTrail, Warning, WarningCode};
use crate::config::{RouteCode, Thresholds};
use crate::dosing::{AsNeeded, DoseConstraints, DoseInput, TimingInput};
use crate::engine::Engine;
use crate::error::{SigError, SigResult};
use crate::instruction::{InstructionRelationship, RelationshipKind, SignatureInstruction};
use crate::medication::{DispenserInfo, DispenserKind, DoseForm, DoseFormFamily, MedicationProfile, Quantity, ScoringType};
use crate::template::{quantity_text, TemplateKey};
use crate::units::{is_tablet_unit, normalize_unit, EPSILON};
use crate::validation::{
    check_large_volume, check_medication_limits, check_period_maximum, check_route, express_in, usual_routes,
    validate_dose_unit, validate_tablet_fraction, DailyExposure,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Rules and wording for one dose-form family. Specialty builders wrap the
/// core with a policy of their own rather than subclassing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoseFormPolicy {
    pub family: DoseFormFamily,
    pub dose_form: DoseForm,
    pub template: TemplateKey,
    pub scoring: Option<ScoringType>,
    pub usual_routes: Vec<String>,
    pub additional_instructions: Vec<String>,
}

impl DoseFormPolicy {
    pub fn for_family(family: DoseFormFamily, dose_form: DoseForm, scoring: Option<ScoringType>) -> Self {
        let template = match family {
            DoseFormFamily::Solid => TemplateKey::Oral,
            DoseFormFamily::Liquid => TemplateKey::Liquid,
            DoseFormFamily::Topical => TemplateKey::Topical,
            DoseFormFamily::Injection => TemplateKey::Injection,
        };

        // Capsules cannot be split
        let scoring = if dose_form == DoseForm::Capsule {
            Some(ScoringType::None)
        } else {
            scoring
        };

        let mut additional_instructions = Vec::new();
        match dose_form {
            DoseForm::Suspension => additional_instructions.push("Shake well before use.".to_string()),
            DoseForm::Cream | DoseForm::Ointment | DoseForm::Gel | DoseForm::Lotion | DoseForm::Foam => {
                additional_instructions.push("For external use only.".to_string())
            }
            _ => {}
        }

        Self {
            family,
            dose_form,
            template,
            scoring,
            usual_routes: usual_routes(family).iter().map(|r| r.to_string()).collect(),
            additional_instructions,
        }
    }

    /// Policy from the dose-form family lookup, falling back to tablet rules
    /// (with a warning) when the dose form is not in the table.
    pub fn for_medication(medication: &MedicationProfile) -> (Self, Option<Warning>) {
        match medication.dose_form.family() {
            Some(family) => (
                Self::for_family(family, medication.dose_form.clone(), medication.effective_scoring()),
                None,
            ),
            None => {
                let warning = Warning::new(
                    WarningCode::DoseFormFallback,
                    format!(
                        "Dose form '{}' has no builder; using tablet rules",
                        medication.dose_form
                    ),
                );
                (
                    Self::for_family(DoseFormFamily::Solid, DoseForm::Tablet, medication.effective_scoring()),
                    Some(warning),
                )
            }
        }
    }

    /// Policy for a specialty dispenser. Canonical doses are volumes or
    /// masses, or raw counts when the dispenser has no conversion data.
    pub fn for_dispenser(medication: &MedicationProfile, dispenser: &DispenserInfo) -> Self {
        let (template, routes): (TemplateKey, &[&str]) = match dispenser.kind {
            DispenserKind::Topiclick | DispenserKind::Pump => {
                (TemplateKey::ClickDispenser, &["topical", "transdermal", "vaginal"])
            }
            DispenserKind::NasalSpray => (TemplateKey::SprayDispenser, &["nasal"]),
            DispenserKind::Inhaler => (TemplateKey::Inhaler, &["inhalation"]),
        };

        let mut additional_instructions = vec![dispenser.priming_text()];
        if let Some(usage) = dispenser.kind.usage_text() {
            additional_instructions.push(usage.to_string());
        }

        Self {
            family: DoseFormFamily::Topical,
            dose_form: medication.dose_form.clone(),
            template,
            scoring: None,
            usual_routes: routes.iter().map(|r| r.to_string()).collect(),
            additional_instructions,
        }
    }

    pub fn label(&self) -> String {
        format!("a {} ({:?})", self.dose_form, self.family)
    }

    /// Per-dose-form validation. Fatal rules return errors; advisories are
    /// returned for the caller to record.
    pub fn validate_dose(
        &self,
        dose: &DoseInput,
        medication: &MedicationProfile,
        thresholds: &Thresholds,
    ) -> SigResult<Vec<Warning>> {
        dose.validate()?;
        validate_dose_unit(self.family, &dose.unit)?;

        let mut warnings = Vec::new();

        if self.family == DoseFormFamily::Solid && is_tablet_unit(&dose.unit) {
            validate_tablet_fraction(dose.value, self.scoring)?;
            if let Some(max) = dose.max_value {
                validate_tablet_fraction(max, self.scoring)?;
            }
        } else if let Some(warning) = check_large_volume(&dose.quantity(), thresholds) {
            warnings.push(warning);
        }

        if let Some(limits) = &medication.limits {
            let strength = medication.primary_strength();
            warnings.extend(check_medication_limits(&dose.quantity(), limits, strength)?);
            if let Some(max) = dose.max_value {
                let upper = Quantity::new(max, &dose.unit);
                warnings.extend(check_medication_limits(&upper, limits, strength)?);
            }
        }

        Ok(warnings)
    }
}

/// A recorded dose: `dose` is canonical, `display` (when set) is what the
/// patient is told, e.g. clicks for a volume dose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateDose {
    pub dose: DoseInput,
    pub display: Option<DoseInput>,
}

impl StateDose {
    pub fn plain(dose: DoseInput) -> Self {
        Self { dose, display: None }
    }

    pub fn shown(&self) -> &DoseInput {
        self.display.as_ref().unwrap_or(&self.dose)
    }

    pub fn render_dose(&self) -> RenderDose {
        RenderDose::Single {
            display: self.shown().clone(),
            canonical: self.dose.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuilderState {
    pub doses: Vec<StateDose>,
    pub timing: Option<TimingInput>,
    pub route: Option<String>,
    pub constraints: Option<DoseConstraints>,
    pub as_needed: Option<AsNeeded>,
    pub special_instructions: Vec<String>,
}

pub struct BuilderCore {
    medication: Arc<MedicationProfile>,
    policy: DoseFormPolicy,
    state: BuilderState,
    audit: AuditTrail,
    engine: Engine,
}

impl BuilderCore {
    pub fn new(medication: Arc<MedicationProfile>, policy: DoseFormPolicy, engine: &Engine) -> Self {
        let mut audit = AuditTrail::new();
        audit.state(format!(
            "builder created for {} using {:?} rules ({})",
            medication.name, policy.family, policy.dose_form
        ));
        Self {
            medication,
            policy,
            state: BuilderState::default(),
            audit,
            engine: engine.clone(),
        }
    }

    /// Core with the family policy chosen from the medication's dose form.
    pub fn for_medication(medication: Arc<MedicationProfile>, engine: &Engine) -> Self {
        let (policy, fallback) = DoseFormPolicy::for_medication(&medication);
        let mut core = Self::new(medication, policy, engine);
        if let Some(warning) = fallback {
            core.audit.warn(warning);
        }
        core
    }

    pub fn medication(&self) -> &MedicationProfile {
        &self.medication
    }

    pub fn policy(&self) -> &DoseFormPolicy {
        &self.policy
    }

    pub fn state(&self) -> &BuilderState {
        &self.state
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.engine.config().thresholds
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn audit_mut(&mut self) -> &mut AuditTrail {
        &mut self.audit
    }

    /// Runs the policy checks without recording the dose.
    pub fn check_dose(&mut self, dose: &DoseInput) -> SigResult<()> {
        match self.policy.validate_dose(dose, &self.medication, &self.engine.config().thresholds) {
            Ok(warnings) => {
                self.audit.extend_warnings(warnings);
                Ok(())
            }
            Err(err) => {
                self.audit.decision(format!(
                    "rejected dose {}: {}",
                    quantity_text(dose.value, &dose.unit),
                    err
                ));
                Err(err)
            }
        }
    }

    pub fn add_dose(&mut self, dose: DoseInput) -> SigResult<()> {
        let dose = DoseInput {
            unit: normalize_unit(&dose.unit),
            ..dose
        };
        self.check_dose(&dose)?;
        self.push_dose(StateDose::plain(dose));
        Ok(())
    }

    /// Records a dose the caller has already validated.
    pub fn push_dose(&mut self, dose: StateDose) {
        let shown = dose.shown();
        self.audit.state(format!(
            "dose {} added ({} total)",
            quantity_text(shown.value, &shown.unit),
            self.state.doses.len() + 1
        ));
        self.state.doses.push(dose);
        self.recheck_period_maximum();
    }

    pub fn add_timing(&mut self, timing: TimingInput) -> SigResult<()> {
        timing.validate()?;
        self.audit.state(format!(
            "timing set to {} per {} {}",
            timing.frequency, timing.period, timing.period_unit
        ));
        self.state.timing = Some(timing);
        self.recheck_period_maximum();
        Ok(())
    }

    pub fn add_route(&mut self, route: &str) -> SigResult<()> {
        let trimmed = route.trim();
        if trimmed.is_empty() {
            return Err(SigError::InvalidRoute("Route must not be empty".to_string()));
        }

        let canonical = match self.engine.config().route_codes.canonical_name(trimmed) {
            Some(name) => name,
            None => {
                self.audit.warn(Warning::new(
                    WarningCode::UnknownRoute,
                    format!("Route '{}' is not in the route table; coding as oral", trimmed),
                ));
                "oral".to_string()
            }
        };

        if let Some(warning) = check_route(&self.policy.usual_routes, &canonical, &self.policy.label()) {
            self.audit.warn(warning);
        }

        self.audit.state(format!("route set to {}", canonical));
        self.state.route = Some(canonical);
        Ok(())
    }

    pub fn add_constraints(&mut self, constraints: DoseConstraints) -> SigResult<()> {
        constraints.validate()?;

        if let Some(max) = &constraints.max_dose_per_administration {
            let strength = self.medication.primary_strength();
            for recorded in &self.state.doses {
                let value = express_in(&recorded.dose.quantity(), &max.unit, strength);
                if value.map_or(false, |v| v > max.value + EPSILON) {
                    return Err(SigError::DoseOutOfRange(format!(
                        "Recorded dose {} exceeds the maximum per administration of {}",
                        recorded.dose.quantity(),
                        max
                    )));
                }
            }
        }

        self.audit.state("constraints set");
        self.state.constraints = Some(constraints);
        self.recheck_period_maximum();
        Ok(())
    }

    /// Each recorded dose at its largest, given on the recorded schedule.
    pub fn exposures(&self) -> Vec<DailyExposure> {
        match &self.state.timing {
            Some(timing) => self
                .state
                .doses
                .iter()
                .map(|d| DailyExposure::from_timing(d.dose.upper_quantity(), timing))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Records a warning when `exposures` can exceed the per-period maximum.
    /// Repeated checks of the same regimen record it once.
    pub fn check_period_maximum(&mut self, exposures: &[DailyExposure]) {
        let max = match self.state.constraints.as_ref().and_then(|c| c.max_dose_per_period.as_ref()) {
            Some(max) => max,
            None => return,
        };
        let strength = self.medication.primary_strength();
        let warnings: Vec<Warning> = exposures
            .iter()
            .filter_map(|exposure| check_period_maximum(max, exposure, strength))
            .collect();
        for warning in warnings {
            self.audit.warn_once(warning);
        }
    }

    fn recheck_period_maximum(&mut self) {
        let exposures = self.exposures();
        self.check_period_maximum(&exposures);
    }

    pub fn add_as_needed(&mut self, as_needed: AsNeeded) {
        match &as_needed.reason {
            Some(reason) => self.audit.state(format!("marked as needed for {}", reason)),
            None => self.audit.state("marked as needed"),
        }
        self.state.as_needed = Some(as_needed);
    }

    pub fn add_special_instructions(&mut self, instructions: Vec<String>) {
        for instruction in instructions {
            let trimmed = instruction.trim();
            if trimmed.is_empty() {
                continue;
            }
            self.audit.state(format!("special instruction added: {}", trimmed));
            self.state.special_instructions.push(trimmed.to_string());
        }
    }

    pub fn route_code(&self) -> SigResult<RouteCode> {
        let routes = &self.engine.config().route_codes;
        let name = self
            .state
            .route
            .as_deref()
            .ok_or_else(|| SigError::IncompleteState("route has not been set".to_string()))?;
        routes
            .lookup(name)
            .or_else(|| routes.lookup("oral"))
            .cloned()
            .ok_or_else(|| SigError::InvalidConfig("Route table has no oral entry".to_string()))
    }

    pub fn require_timing(&self) -> SigResult<&TimingInput> {
        self.state
            .timing
            .as_ref()
            .ok_or_else(|| SigError::IncompleteState("timing has not been set".to_string()))
    }

    /// Doses, timing and route must all be present before rendering.
    pub fn require_complete(&self) -> SigResult<()> {
        if self.state.doses.is_empty() {
            return Err(SigError::IncompleteState("no dose has been added".to_string()));
        }
        self.require_timing()?;
        self.route_code()?;
        Ok(())
    }

    /// Policy text, constraint text, `extra`, then special instructions.
    pub fn additional_instructions(&self, extra: &[String]) -> Vec<String> {
        let mut additional = self.policy.additional_instructions.clone();
        if let Some(max) = self
            .state
            .constraints
            .as_ref()
            .and_then(|c| c.max_dose_per_period.as_ref())
        {
            additional.push(max_dose_text(&max.dose, max.period, max.period_unit));
        }
        if let Some(max) = self
            .state
            .constraints
            .as_ref()
            .and_then(|c| c.max_dose_per_administration.as_ref())
        {
            additional.push(format!("Do not take more than {} at one time", max));
        }
        additional.extend(extra.iter().cloned());
        additional.extend(self.state.special_instructions.iter().cloned());
        additional
    }

    /// Snapshot for one recorded dose.
    pub fn snapshot(&self, dose: &StateDose, extra: &[String]) -> SigResult<RenderInput> {
        let timing = self.require_timing()?;
        Ok(RenderInput {
            template: self.policy.template,
            dose: dose.render_dose(),
            frequency: fixed_frequency(timing),
            route: self.route_code()?,
            as_needed: self.state.as_needed.clone(),
            duration: None,
            bounds_period: None,
            prefix: None,
            additional_instructions: self.additional_instructions(extra),
            max_dose_per_period: self
                .state
                .constraints
                .as_ref()
                .and_then(|c| c.max_dose_per_period.clone()),
            id: None,
            sequence: None,
            relationship: None,
        })
    }

    pub fn render_input(&self, input: &RenderInput) -> SignatureInstruction {
        render_snapshot(input, self.engine.renderer(), &self.engine.config().unit_codes)
    }

    /// One instruction per recorded dose; several doses are linked
    /// sequentially. `extra_for` supplies per-dose additional instructions.
    pub fn render_doses<F>(&self, extra_for: F) -> SigResult<Vec<SignatureInstruction>>
    where
        F: Fn(&StateDose) -> SigResult<Vec<String>>,
    {
        self.require_complete()?;
        let total = self.state.doses.len() as u32;
        let mut instructions = Vec::with_capacity(self.state.doses.len());

        for (index, dose) in self.state.doses.iter().enumerate() {
            let extra = extra_for(dose)?;
            let mut input = self.snapshot(dose, &extra)?;
            if total > 1 {
                let position = index as u32 + 1;
                input.id = Some(format!("dose-{}", position));
                input.sequence = Some(position);
                input.relationship = Some(sequential_link("dose", position, total));
            }
            instructions.push(self.render_input(&input));
        }

        Ok(instructions)
    }

    pub fn explain(&self) -> String {
        self.audit.explain()
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.audit.warnings()
    }

    /// Debug snapshot of medication and accumulated state; not a wire format.
    pub fn serialize(&self, kind: BuilderKind, extra: serde_json::Value) -> SigResult<serde_json::Value> {
        Ok(json!({
            "builder": serde_json::to_value(kind)?,
            "medication": serde_json::to_value(self.medication.as_ref())?,
            "policy": serde_json::to_value(&self.policy)?,
            "state": serde_json::to_value(&self.state)?,
            "warnings": serde_json::to_value(self.warnings())?,
            "extra": extra,
        }))
    }
}

/// Relationship for element `position` (1-based) of `total` linked items.
pub fn sequential_link(prefix: &str, position: u32, total: u32) -> InstructionRelationship {
    InstructionRelationship {
        kind: RelationshipKind::Sequential,
        position,
        total,
        previous: (position > 1).then(|| format!("{}-{}", prefix, position - 1)),
        next: (position < total).then(|| format!("{}-{}", prefix, position + 1)),
        condition: None,
    }
}
