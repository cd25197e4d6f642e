//! RPA Agent
//!
//! Command-line host for the flow engine: loads a flow definition, an input
//! context and an engine configuration from JSON files, runs the flow on a
//! local Chromium and hands back the `{status, input, output}` result.

use anyhow::Context as _;
use clap::Parser;
use rpa_engine::{EngineConfig, FlowDefinition, FlowEngine, FlowOutput, TesseractRecognizer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod logging;
pub use logging::{init_logging, LoggingConfig};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Flow definition (JSON)
    #[arg(long)]
    pub flow: PathBuf,

    /// Initial context variables (JSON)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Engine configuration (JSON); defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Show the browser window regardless of the flow's `headless` flag
    #[arg(long)]
    pub headed: bool,

    /// Path to the tesseract binary used for image captchas
    #[arg(long, default_value = "tesseract")]
    pub tesseract: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Everything a run needs, read from disk
#[derive(Debug)]
pub struct Job {
    pub flow: FlowDefinition,
    pub input: Value,
    pub config: EngineConfig,
}

impl Job {
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(&args.flow)
            .with_context(|| format!("Failed to read flow file {:?}", args.flow))?;
        let flow = FlowDefinition::from_json(&source)
            .with_context(|| format!("Invalid flow definition in {:?}", args.flow))?;

        let input = match &args.input {
            Some(path) => read_json(path)?,
            None => Value::Object(Default::default()),
        };

        let mut config = match &args.config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("Failed to load engine config {:?}", path))?,
            None => EngineConfig::default(),
        };
        if args.headed {
            config.headless = Some(false);
        }

        Ok(Self { flow, input, config })
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {:?}", path))
}

/// Load the job described by `args` and run it. Ctrl-C cancels the run; the
/// engine still closes the browser before the error is returned.
pub async fn run_agent(args: Args) -> anyhow::Result<FlowOutput> {
    let job = Job::load(&args)?;

    tracing::info!("Starting RPA Agent...");
    tracing::info!("  Flow:  {:?} ({} steps)", args.flow, job.flow.steps.len());
    tracing::info!("  Init:  {}", job.flow.init);
    if let Some(input) = &args.input {
        tracing::info!("  Input: {:?}", input);
    }

    let engine = FlowEngine::new(job.config)
        .with_recognizer(Arc::new(TesseractRecognizer::new(&args.tesseract)));
    let cancel = engine.cancellation_token();

    let run = engine.run(&job.flow, job.input);
    tokio::pin!(run);

    let output = tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, cancelling run...");
            cancel.cancel();
            run.await?
        }
    };

    tracing::info!("Run finished with status {}", output.status);
    Ok(output)
}
