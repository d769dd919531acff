//! Runboard CLI Module
//!
//! Command-line interface for serving the API, running a single training
//! job locally, and listing the model registry.

use clap::{Parser, Subcommand};
use colored::*;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::orchestrator::{
    train_background_task, JobSpec, OrchestratorConfig, StrategyKind, F1_SCORE, TEST_ACCURACY,
    TEST_LOSS, TRAIN_ACCURACY,
};
use crate::registry::{describe, Hyperparams, ModelKind};
use crate::tracking::{MemoryStore, NewRun, RunStatus};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "runboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Experiment-tracking dashboard backend with live training")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Server port (defaults to API_PORT or 8000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Server host (defaults to API_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,
    },

    /// Run one training job locally and print its metrics
    Train {
        /// CSV dataset; the last column is the target
        #[arg(short, long)]
        data: PathBuf,

        /// Registered model type
        #[arg(short, long, default_value = "RandomForest")]
        model: String,

        /// Hyperparameter as key=value (value parsed as JSON, else string)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// List registered model types
    Models,
}

/// Parse `key=value` pairs; values are JSON when they parse as JSON
pub fn parse_params(pairs: &[String]) -> anyhow::Result<Hyperparams> {
    let mut params = Hyperparams::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            anyhow::bail!("Expected KEY=VALUE, got '{}'", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Empty parameter name in '{}'", pair);
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        params.insert(key, value);
    }
    Ok(params)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(data_path: &Path, model_type: &str, pairs: &[String]) -> anyhow::Result<()> {
    section("Train");

    if !data_path.exists() {
        anyhow::bail!("Dataset not found: {}", data_path.display());
    }
    let params = parse_params(pairs)?;
    let dataset = data_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dataset")
        .to_string();

    let store = MemoryStore::new();
    let experiment = store.create_experiment("cli", None)?;

    let mut parameters = Map::new();
    parameters.insert("model".to_string(), json!(model_type));
    parameters.insert("dataset".to_string(), json!(dataset));
    for (key, value) in params.as_map() {
        parameters.insert(key.clone(), value.clone());
    }
    let run = store.create_run(NewRun {
        experiment_id: experiment.id,
        name: format!("{} on {}", model_type, dataset),
        parameters: Value::Object(parameters),
        tags: vec!["cli".to_string(), model_type.to_string()],
    })?;

    step_run(&format!("Training {}", model_type.cyan()));
    let start = Instant::now();
    let job = JobSpec {
        run_id: run.id,
        dataset_path: data_path.to_path_buf(),
        model_type: model_type.to_string(),
        params,
    };
    let finished = train_background_task(store.open_session(), job, &OrchestratorConfig::immediate())?;
    step_done(&format!("{:?}", start.elapsed()));

    let mut steps: BTreeMap<u64, BTreeMap<String, f64>> = BTreeMap::new();
    for point in store.metrics_for(run.id)? {
        steps.entry(point.step).or_default().insert(point.name, point.value);
    }

    if !steps.is_empty() {
        println!();
        println!(
            "  {:>5}  {:>10}  {:>10}  {:>10}  {:>10}",
            muted("step"),
            muted(TEST_ACCURACY),
            muted(TRAIN_ACCURACY),
            muted(F1_SCORE),
            muted(TEST_LOSS)
        );
        let cell = |m: &BTreeMap<String, f64>, name: &str| {
            m.get(name).map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".to_string())
        };
        for (step, metrics) in &steps {
            println!(
                "  {:>5}  {:>10}  {:>10}  {:>10}  {:>10}",
                step,
                cell(metrics, TEST_ACCURACY),
                cell(metrics, TRAIN_ACCURACY),
                cell(metrics, F1_SCORE),
                cell(metrics, TEST_LOSS)
            );
        }
    }

    println!();
    match finished.status {
        RunStatus::Completed => {
            for (name, value) in finished.metrics.iter().flatten() {
                println!("  {:<20} {}", muted(name), format!("{:.4}", value).white().bold());
            }
            println!();
            Ok(())
        }
        _ => {
            let notes = finished.notes.unwrap_or_default();
            println!("  {} {}", "failed".red().bold(), notes);
            println!();
            anyhow::bail!("Run failed: {}", notes)
        }
    }
}

pub fn cmd_models() -> anyhow::Result<()> {
    section("Models");
    for &kind in ModelKind::all() {
        let info = describe(kind);
        let defaults = serde_json::to_string(&info.defaults)?;
        println!(
            "  {:<20} {:<22} {}",
            info.id.white().bold(),
            accent(StrategyKind::for_model(kind).as_str()),
            dim(&defaults)
        );
    }
    println!();
    Ok(())
}

pub async fn cmd_serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let defaults = ServerConfig::default();
    let config = ServerConfig {
        host: host.unwrap_or(defaults.host.clone()),
        port: port.unwrap_or(defaults.port),
        ..defaults
    };

    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", "Runboard".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box(&kv("API    ", &format!("http://{}:{}/api", config.host, config.port)));
    line_box(&kv("Health ", &format!("http://{}:{}/api/health", config.host, config.port)));
    line_box(&kv("Data   ", &config.data_dir));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box_center(&format!("{}", dim("ctrl+c to stop")));
    line_box_empty();
    line_box_bottom();
    println!();

    run_server(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let pairs = vec![
            "n_estimators=40".to_string(),
            "kernel=rbf".to_string(),
            "hidden_layer_sizes=[16,8]".to_string(),
        ];
        let params = parse_params(&pairs).unwrap();
        assert_eq!(params.get_usize("n_estimators").unwrap(), Some(40));
        assert_eq!(params.get_str("kernel").unwrap(), Some("rbf"));
        assert_eq!(params.get_usize_list("hidden_layer_sizes").unwrap(), Some(vec![16, 8]));
    }

    #[test]
    fn test_parse_params_rejects_bare_key() {
        assert!(parse_params(&["max_iter".to_string()]).is_err());
        assert!(parse_params(&["=5".to_string()]).is_err());
    }
}
