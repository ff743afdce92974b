use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use sig_engine::config::EngineConfig;
use sig_engine::strategies::StrategyContext;
use sig_engine::Engine;

#[derive(Parser)]
#[command(name = "sig_engine")]
#[command(about = "Compose medication signature instructions from a JSON request")]
struct Cli {
    /// Request file (medication profile plus dosing inputs)
    #[arg(short, long)]
    request: PathBuf,

    /// Engine configuration file; built-in tables when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for instructions and the review report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the strategy composition and audit trail
    #[arg(short, long)]
    explain: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    // Load configuration
    let config = match &cli.config {
        Some(path) => {
            let config = EngineConfig::from_file(path)
                .with_context(|| format!("loading configuration from {:?}", path))?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => EngineConfig::default(),
    };
    let engine = Engine::new(config).context("invalid engine configuration")?;

    let content = std::fs::read_to_string(&cli.request)
        .with_context(|| format!("reading request {:?}", cli.request))?;
    let ctx: StrategyContext = serde_json::from_str(&content)
        .with_context(|| format!("parsing request {:?}", cli.request))?;
    info!("Composing signature for {}", ctx.medication.name);

    let dispatcher = engine.dispatcher();
    let outcome = dispatcher.dispatch(&ctx)?;
    for warning in &outcome.warnings {
        warn!("{}", warning);
    }

    if cli.explain {
        println!("{}", dispatcher.explain(&ctx)?);
        println!("{}", outcome.explain());
    }
    println!("{}", serde_json::to_string_pretty(&outcome.instructions)?);

    if let Some(output) = &cli.output {
        std::fs::create_dir_all(output)?;
        sig_engine::output::save_outcome(&outcome, &ctx, output)?;
        info!("Output saved to {:?}", output);
    }

    Ok(())
}
