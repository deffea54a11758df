//! SEDA push-solver entrypoint.
//!
//! Loads `.env`, parses CLI flags, initializes tracing, then hands off to
//! `seda_push_solver::run`. Grounded on the facilitator's own `main.rs`
//! bootstrap order (dotenv -> telemetry -> config -> server).

use clap::Parser;
use dotenvy::dotenv;

use seda_push_solver::config::{CliArgs, SedaConfig};
use seda_push_solver::telemetry::Telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let cli = CliArgs::parse();

    Telemetry::init();

    let config = SedaConfig::from_env().unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to load configuration");
        std::process::exit(1);
    });

    tracing::info!(?config, "loaded configuration");

    if let Err(err) = seda_push_solver::run(config, cli.healthz_port).await {
        tracing::error!(error = %err, "solver exited with error");
        std::process::exit(1);
    }

    Ok(())
}
