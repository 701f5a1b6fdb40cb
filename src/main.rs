//! filemetrics HTTP server
//!
//! Serves a directory over HTTP and exposes request metrics for Prometheus.

use clap::Parser;
use filemetrics::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    error::AppError,
    metrics::Metrics,
    server, telemetry,
};
use prometheus::Registry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = &cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(path, template)?;
                eprintln!("Configuration template written to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate()?;

    // Initialize telemetry
    telemetry::init(&config.observability.log_level);

    tracing::info!(
        "Starting filemetrics on {}:{}",
        config.server.host,
        config.server.port
    );

    // The server cannot report anything without its metrics, so a
    // registration failure stops startup
    let metrics = Metrics::with_registry(Registry::new(), config.metrics.buckets.clone())
        .inspect_err(|e| tracing::error!(error = %e, "Failed to register metrics"))
        .map_err(AppError::from)?;

    server::run(&config, metrics).await?;

    Ok(())
}
