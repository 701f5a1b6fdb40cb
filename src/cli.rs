//! Command-line interface for filemetrics
//!
//! Provides argument parsing and subcommand handling for the filemetrics binary.

use crate::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Static file server with Prometheus request metrics
#[derive(Parser)]
#[command(name = "filemetrics")]
#[command(version)]
#[command(about = "Static file server with Prometheus request metrics")]
#[command(
    long_about = "filemetrics serves files from a directory and records request counts, \
    response status counts and latency histograms for every request, exposed in the \
    Prometheus text format."
)]
pub struct Cli {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Address to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory to serve
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

impl Cli {
    /// Apply command-line overrides on top of `config`
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(root) = &self.root {
            config.files.root = root.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# filemetrics Configuration
# ==========================
#
# Every section and key is optional; the values below are the defaults.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 9000

# ─────────────────────────────────────────────────────────────────────────────
# FILES
# ─────────────────────────────────────────────────────────────────────────────

[files]
# Directory to serve
root = "."

# Route prefix the files are served under. This is also the `path` label of
# their metrics, so every file request is counted under one series.
mount = "/"

# ─────────────────────────────────────────────────────────────────────────────
# METRICS
# ─────────────────────────────────────────────────────────────────────────────

[metrics]
# Path of the Prometheus scrape endpoint
path = "/metrics"

# Upper bounds (seconds) of the response_duration_seconds histogram buckets
buckets = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
log_level = "info"
"#
}
