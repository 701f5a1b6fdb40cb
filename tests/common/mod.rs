//! Shared helpers for integration tests

#![allow(dead_code)]

use filemetrics::{config::Config, metrics::Metrics, server};
use std::path::Path;
use tempfile::TempDir;

/// Directory tree used by the file serving tests
///
/// ```text
/// hello.txt        "hello, world\n"
/// style.css        "body {}"
/// docs/index.html  "<h1>docs</h1>"
/// empty/
/// ```
pub fn site() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory");
    std::fs::write(dir.path().join("hello.txt"), "hello, world\n").unwrap();
    std::fs::write(dir.path().join("style.css"), "body {}").unwrap();
    std::fs::create_dir(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs/index.html"), "<h1>docs</h1>").unwrap();
    std::fs::create_dir(dir.path().join("empty")).unwrap();
    dir
}

/// Default configuration serving `root`
pub fn config_for(root: &Path) -> Config {
    let mut config = Config::default();
    config.files.root = root.to_path_buf();
    config
}

/// Application serving `root` with a fresh metrics registry
pub fn app_for(root: &Path) -> (axum::Router, Metrics) {
    let metrics = Metrics::new().expect("Failed to create metrics");
    let router =
        server::build_router(&config_for(root), metrics.clone()).expect("Failed to build router");
    (server::app(router), metrics)
}

/// Value of the sample `name{label="value"}` in a text exposition
pub fn sample(output: &str, name: &str, label: &str, value: &str) -> Option<f64> {
    let selector = format!("{}{{{}=\"{}\"}}", name, label, value);
    output
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find(|line| line.split_whitespace().next() == Some(selector.as_str()))
        .and_then(|line| line.split_whitespace().last())
        .and_then(|v| v.parse().ok())
}

/// Like [`sample`], treating a missing series as zero
pub fn count(metrics: &Metrics, name: &str, label: &str, value: &str) -> f64 {
    let output = metrics.gather().expect("Failed to gather metrics");
    sample(&output, name, label, value).unwrap_or(0.0)
}
