//! RPA Agent Binary Entry Point

use clap::Parser;
use rpa_agent::{init_logging, run_agent, Args, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Held until exit so buffered file logs are flushed
    let _guard = init_logging(&LoggingConfig::from_args(&args))?;

    match run_agent(args).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Flow run failed: {:#}", e);
            Err(e)
        }
    }
}
