//! Tapering regimens: a contiguous sequence of dose phases.
//!
//! Each phase renders from its own `RenderInput`; the builder state shared by
//! all phases (route, as-needed, constraints, special instructions) is read
//! but never rewritten while rendering.

use super::base::{sequential_link, BuilderCore};
use super::render::{fixed_frequency, RenderDose, RenderInput};
use super::{BuilderKind, SignatureBuilder};
use crate::audit::{AuditTrail, Warning};
use crate::dosing::{AsNeeded, DoseConstraints, DoseInput, PhaseDuration, TaperingPhase, TimingInput};
use crate::engine::Engine;
use crate::error::{SigError, SigResult};
use crate::instruction::{BoundsPeriod, SignatureInstruction};
use crate::medication::MedicationProfile;
use crate::template::{dose_text, duration_text, DosePhrase};
use crate::units::normalize_unit;
use crate::validation::{analyze_taper, TaperAnalysis, TaperDirection};
use chrono::{Duration, NaiveDate};
use log::info;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Validated, immutable phase sequence. Only `current_phase` may change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaperingSchedule {
    pub phases: Vec<TaperingPhase>,
    pub direction: TaperDirection,
    pub total_days: f64,
    pub total_duration: PhaseDuration,
    pub current_phase: Option<u32>,
}

impl TaperingSchedule {
    pub fn phase(&self, sequence: u32) -> Option<&TaperingPhase> {
        self.phases.iter().find(|p| p.sequence == sequence)
    }

    pub fn next_phase(&self, sequence: u32) -> Option<&TaperingPhase> {
        self.phase(sequence + 1)
    }

    /// Start date of every phase given the first phase's start.
    /// Phase lengths are counted in whole days.
    pub fn phase_periods(&self, start: NaiveDate) -> Vec<BoundsPeriod> {
        let mut periods = Vec::with_capacity(self.phases.len());
        let mut cursor = start;
        for phase in &self.phases {
            let end = cursor + Duration::days(phase.duration.days().round() as i64);
            periods.push(BoundsPeriod { start: cursor, end });
            cursor = end;
        }
        periods
    }
}

pub struct TaperingBuilder {
    core: BuilderCore,
    schedule: Option<TaperingSchedule>,
    start_date: Option<NaiveDate>,
}

impl TaperingBuilder {
    pub fn new(medication: Arc<MedicationProfile>, engine: &Engine) -> Self {
        let start_date = engine.config().taper_start_date;
        Self {
            core: BuilderCore::for_medication(medication, engine),
            schedule: None,
            start_date,
        }
    }

    pub fn with_start_date(mut self, start: NaiveDate) -> Self {
        self.start_date = Some(start);
        self
    }

    pub fn set_start_date(&mut self, start: NaiveDate) -> &mut Self {
        self.core.audit_mut().state(format!("taper start date set to {}", start));
        self.start_date = Some(start);
        self
    }

    pub fn schedule(&self) -> Option<&TaperingSchedule> {
        self.schedule.as_ref()
    }

    pub fn core(&self) -> &BuilderCore {
        &self.core
    }

    /// Validates and installs the phase list. Every phase dose goes through
    /// the dose-form policy; nothing is recorded unless all phases pass.
    pub fn set_sequential_phases(&mut self, phases: Vec<TaperingPhase>) -> SigResult<&mut Self> {
        let phases: Vec<TaperingPhase> = phases
            .into_iter()
            .map(|mut phase| {
                phase.dose.unit = normalize_unit(&phase.dose.unit);
                phase
            })
            .collect();

        let (analysis, dose_warnings) = match self.analyze(&phases) {
            Ok(result) => result,
            Err(err) => {
                self.core.audit_mut().decision(format!("rejected tapering schedule: {}", err));
                return Err(err);
            }
        };

        let audit = self.core.audit_mut();
        audit.extend_warnings(dose_warnings);
        audit.extend_warnings(analysis.warnings.clone());
        audit.decision(format!(
            "tapering schedule of {} phases, {:?}, {}",
            analysis.phases.len(),
            analysis.direction,
            duration_text(&analysis.total_duration)
        ));
        info!(
            "{}: {:?} taper over {} days",
            self.core.medication().name,
            analysis.direction,
            analysis.total_days
        );

        self.schedule = Some(TaperingSchedule {
            phases: analysis.phases,
            direction: analysis.direction,
            total_days: analysis.total_days,
            total_duration: analysis.total_duration,
            current_phase: None,
        });
        Ok(self)
    }

    fn analyze(&self, phases: &[TaperingPhase]) -> SigResult<(TaperAnalysis, Vec<Warning>)> {
        let medication = self.core.medication();
        let analysis = analyze_taper(phases, medication.primary_strength(), self.core.thresholds())?;
        let mut warnings = Vec::new();
        for phase in &analysis.phases {
            warnings.extend(
                self.core
                    .policy()
                    .validate_dose(&phase.dose, medication, self.core.thresholds())?,
            );
        }
        Ok((analysis, warnings))
    }

    /// Restricts rendering to one phase, enriched with current/next context.
    pub fn set_current_phase(&mut self, sequence: u32) -> SigResult<&mut Self> {
        let schedule = self.schedule.as_mut().ok_or(SigError::MissingPhases)?;
        if schedule.phase(sequence).is_none() {
            return Err(SigError::InvalidPhase(format!(
                "Phase {} is not in the {}-phase schedule",
                sequence,
                schedule.phases.len()
            )));
        }
        schedule.current_phase = Some(sequence);
        self.core.audit_mut().state(format!("current phase set to {}", sequence));
        Ok(self)
    }

    fn phase_input(
        &self,
        phase: &TaperingPhase,
        total: u32,
        period: Option<&BoundsPeriod>,
        context: &[String],
    ) -> SigResult<RenderInput> {
        let mut extra = phase.special_instructions.clone();
        if let Some(note) = &phase.transition_note {
            extra.push(note.clone());
        }
        extra.extend(context.iter().cloned());

        let state = self.core.state();
        Ok(RenderInput {
            template: self.core.policy().template,
            dose: RenderDose::plain(&phase.dose),
            frequency: fixed_frequency(&phase.timing),
            route: self.core.route_code()?,
            as_needed: state.as_needed.clone(),
            duration: Some(phase.duration.clone()),
            bounds_period: period.cloned(),
            prefix: Some(phase.name.clone()),
            additional_instructions: self.core.additional_instructions(&extra),
            max_dose_per_period: state.constraints.as_ref().and_then(|c| c.max_dose_per_period.clone()),
            id: Some(format!("phase-{}", phase.sequence)),
            sequence: Some(phase.sequence),
            relationship: Some(sequential_link("phase", phase.sequence, total)),
        })
    }

    fn phase_context(schedule: &TaperingSchedule, phase: &TaperingPhase, period: Option<&BoundsPeriod>) -> Vec<String> {
        let total = schedule.phases.len();
        let mut context = vec![format!(
            "Current phase: {} (phase {} of {})",
            phase.name, phase.sequence, total
        )];
        match schedule.next_phase(phase.sequence) {
            Some(next) => {
                let dose = dose_text(&DosePhrase::Single {
                    value: next.dose.value,
                    unit: next.dose.unit.clone(),
                });
                let when = match period {
                    Some(period) => format!(" starting {}", period.end),
                    None => format!(" after {}", duration_text(&phase.duration).trim_start_matches("for ")),
                };
                context.push(format!("Next phase: {}, {}{}", next.name, dose, when));
            }
            None => context.push("This is the final phase.".to_string()),
        }
        context
    }
}

impl SignatureBuilder for TaperingBuilder {
    fn kind(&self) -> BuilderKind {
        BuilderKind::Tapering
    }

    fn medication(&self) -> &MedicationProfile {
        self.core.medication()
    }

    fn add_dose(&mut self, dose: DoseInput) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_dose(dose)?;
        Ok(self)
    }

    fn add_timing(&mut self, timing: TimingInput) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_timing(timing)?;
        Ok(self)
    }

    fn add_route(&mut self, route: &str) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_route(route)?;
        Ok(self)
    }

    fn add_constraints(&mut self, constraints: DoseConstraints) -> SigResult<&mut dyn SignatureBuilder> {
        self.core.add_constraints(constraints)?;
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

    /// One instruction per phase, or only the selected current phase.
    fn render(&self) -> SigResult<Vec<SignatureInstruction>> {
        let schedule = self.schedule.as_ref().ok_or(SigError::MissingPhases)?;
        self.core.route_code()?;

        let total = schedule.phases.len() as u32;
        let periods = self.start_date.map(|start| schedule.phase_periods(start));
        let period_for = |index: usize| periods.as_ref().and_then(|p| p.get(index));

        if let Some(current) = schedule.current_phase {
            let (index, phase) = schedule
                .phases
                .iter()
                .enumerate()
                .find(|(_, p)| p.sequence == current)
                .ok_or_else(|| SigError::InvalidPhase(format!("Phase {} is not in the schedule", current)))?;
            let context = Self::phase_context(schedule, phase, period_for(index));
            let input = self.phase_input(phase, total, period_for(index), &context)?;
            return Ok(vec![self.core.render_input(&input)]);
        }

        schedule
            .phases
            .iter()
            .enumerate()
            .map(|(index, phase)| -> SigResult<SignatureInstruction> {
                let input = self.phase_input(phase, total, period_for(index), &[])?;
                Ok(self.core.render_input(&input))
            })
            .collect()
    }

    fn audit(&self) -> &AuditTrail {
        self.core.audit()
    }

    fn serialize(&self) -> SigResult<Value> {
        self.core.serialize(
            self.kind(),
            json!({
                "schedule": serde_json::to_value(&self.schedule)?,
                "start_date": serde_json::to_value(self.start_date)?,
            }),
        )
    }
}
