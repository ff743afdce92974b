use crate::error::SigResult;
use crate::instruction::SignatureInstruction;
use crate::strategies::{DispatchOutcome, StrategyContext};
use log::info;
use std::fs::File;
use std::path::Path;

pub fn save_outcome<P: AsRef<Path>>(outcome: &DispatchOutcome, ctx: &StrategyContext, output_dir: P) -> SigResult<()> {
    let output_path = output_dir.as_ref();

    save_instructions_json(&outcome.instructions, &output_path.join("instructions.json"))?;
    save_instructions_csv(&outcome.instructions, &output_path.join("instructions.csv"))?;
    generate_report(outcome, ctx, output_path)?;

    info!("All output saved to {:?}", output_path);
    Ok(())
}

fn save_instructions_json<P: AsRef<Path>>(instructions: &[SignatureInstruction], path: P) -> SigResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, instructions)?;
    Ok(())
}

fn save_instructions_csv<P: AsRef<Path>>(instructions: &[SignatureInstruction], path: P) -> SigResult<()> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record(["SEQUENCE", "ID", "TEXT", "ROUTE", "FREQUENCY", "PERIOD", "UNIT"])?;

    for (index, instruction) in instructions.iter().enumerate() {
        let repeat = &instruction.timing.repeat;
        let frequency = match repeat.frequency_max {
            Some(max) => format!("{}-{}", repeat.frequency, max),
            None => repeat.frequency.to_string(),
        };
        writer.write_record([
            instruction.sequence.unwrap_or(index as u32 + 1).to_string(),
            instruction.id.clone().unwrap_or_default(),
            instruction.text.clone(),
            instruction.route.code().unwrap_or_default().to_string(),
            frequency,
            repeat.period.to_string(),
            repeat.period_unit.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Markdown review sheet: composition, instructions, warnings and the
/// numbered audit trail.
pub fn generate_report<P: AsRef<Path>>(outcome: &DispatchOutcome, ctx: &StrategyContext, output_dir: P) -> SigResult<()> {
    let report_path = output_dir.as_ref().join("signature_report.md");
    std::fs::write(report_path, render_report(outcome, ctx))?;
    Ok(())
}

fn render_report(outcome: &DispatchOutcome, ctx: &StrategyContext) -> String {
    let composition = &outcome.composition;
    let medication = &ctx.medication;

    let instructions: Vec<String> = outcome
        .instructions
        .iter()
        .enumerate()
        .map(|(i, instruction)| {
            let mut line = format!("{}. {}", i + 1, instruction.text);
            for extra in &instruction.additional_instruction {
                line.push_str(&format!("\n   - {}", extra));
            }
            line
        })
        .collect();

    let warnings = if outcome.warnings.is_empty() {
        "- None".to_string()
    } else {
        outcome
            .warnings
            .iter()
            .map(|w| format!("- {}", w))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let modifiers = if composition.modifiers.is_empty() {
        "none".to_string()
    } else {
        composition.modifiers.join(" -> ")
    };

    format!(
        r#"# Signature Review: {}

## Medication
- **Id**: {}
- **SKU**: {}
- **Dose form**: {}
- **Ingredients**: {}

## Composition
- **Base strategy**: {} ({} specificity)
- **Modifiers**: {}

## Instructions
{}

## Warnings
{}

## Audit Trail
```
{}
```

## Files Generated
- `instructions.json`: Structured instructions
- `instructions.csv`: One row per instruction
"#,
        medication.name,
        medication.id,
        medication.sku.as_deref().unwrap_or("-"),
        medication.dose_form,
        medication
            .ingredients
            .iter()
            .map(|i| format!("{} {}", i.name, i.strength))
            .collect::<Vec<_>>()
            .join(", "),
        composition.base,
        composition.specificity,
        modifiers,
        instructions.join("\n"),
        warnings,
        outcome.explain(),
    )
}
