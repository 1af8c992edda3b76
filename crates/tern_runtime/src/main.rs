//! Tern Runtime
//!
//! Runs a script with the `uv` namespace, then drives the event loop until
//! nothing keeps it alive.

mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tern_script::ScriptRuntime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use settings::Settings;

#[derive(Parser)]
#[command(name = "tern", version, about = "Run a script on the tern event loop")]
struct Args {
    /// Script to execute
    script: PathBuf,

    /// JSON settings file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log.filter))
        .context("invalid log filter")?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    tracing::info!("Tern v{}", tern_core::VERSION);

    if let Err(e) = run(&args, &settings) {
        tracing::error!(error = %format!("{e:#}"), "tern failed");
        std::process::exit(1);
    }
    Ok(())
}

fn run(args: &Args, settings: &Settings) -> Result<()> {
    let runtime = ScriptRuntime::with_limits(settings.script.limits())
        .context("failed to initialize script runtime")?;
    runtime
        .execute_file(&args.script)
        .with_context(|| format!("script {} failed", args.script.display()))?;

    if settings.event_loop.run_after_script {
        runtime.run_loop().context("event loop stopped")?;
    }

    let stats = runtime.binding().event_loop().stats();
    tracing::debug!(
        completions = stats.completions().total(),
        iterations = stats.iterations().iterations(),
        avg_iteration_ms = stats.iterations().average_ms(),
        "event loop finished"
    );
    Ok(())
}
