//! WorldWeaver command-line entry point.

use std::error::Error;

use tracing_subscriber::EnvFilter;
use worldweaver_cli::config::CliConfig;
use worldweaver_cli::{parse_args, run};
use worldweaver_core::clock::SystemClock;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Logs go to stderr so stdout carries only the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = parse_args(&args)?;

    let engine = CliConfig::from_env()?.engine()?;

    tracing::info!(world = %invocation.world.display(), "running command");
    let output = run(&invocation, &engine, &SystemClock).await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
