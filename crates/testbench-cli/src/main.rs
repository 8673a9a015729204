//! Testbench - infrastructure verification CLI
//!
//! The `testbench` command runs the platform's infrastructure probes and
//! prints per-probe results plus the aggregate health summary.
//!
//! ## Commands
//!
//! - `list`: Show the probe catalog
//! - `run`: Execute a single probe
//! - `run-all`: Execute every probe, one at a time, in catalog order
//! - `health`: Show point-in-time counters from the health/evidence endpoint

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, Level};

use testbench_core::config::parse_timeout_secs;
use testbench_core::{
    classify, Classification, HealthClient, HealthReport, Orchestrator, ProbeResult,
    RunAllReport, StoreSnapshot, TestbenchConfig,
};

#[derive(Parser)]
#[command(name = "testbench")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Infrastructure verification testbench", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of the platform API
    #[arg(long, global = true, env = "TESTBENCH_API_URL")]
    api_url: Option<String>,

    /// Per-probe execution timeout in seconds
    #[arg(
        long,
        global = true,
        env = "TESTBENCH_PROBE_TIMEOUT_SECS",
        value_parser = parse_timeout_secs
    )]
    timeout_secs: Option<Duration>,

    /// Result output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered probes
    List,

    /// Execute a single probe
    Run {
        /// Probe id (e.g. postgres, qdrant)
        probe: String,
    },

    /// Execute every registered probe sequentially
    RunAll,

    /// Show health/evidence counters per backing store
    Health,
}

impl Cli {
    fn config(&self) -> Result<TestbenchConfig> {
        let mut config = TestbenchConfig::from_env().context("Invalid testbench environment")?;
        if let Some(url) = &self.api_url {
            config = config.with_api_url(url);
        }
        if let Some(timeout) = self.timeout_secs {
            config = config.with_probe_timeout(timeout);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    testbench_core::init_tracing(cli.json, level);

    let config = cli.config()?;
    config.validate().context("Invalid testbench configuration")?;
    debug!(api_url = %config.api_url, timeout = ?config.probe_timeout, "configuration loaded");

    match cli.command {
        Commands::List => cmd_list(&config, cli.output).await,
        Commands::Run { probe } => cmd_run(&config, &probe, cli.output).await,
        Commands::RunAll => cmd_run_all(&config, cli.output).await,
        Commands::Health => cmd_health(&config, cli.output).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// List the probe catalog
async fn cmd_list(config: &TestbenchConfig, output: OutputFormat) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let probes = orchestrator
        .refresh_registry()
        .await
        .context("Failed to load probe registry")?;

    match output {
        OutputFormat::Json => print_json(&probes),
        OutputFormat::Text => {
            if probes.is_empty() {
                println!("No probes registered.");
            }
            for probe in &probes {
                println!("  {:<16} {}", probe.id, probe.display_name());
                if !probe.description.is_empty() {
                    println!("  {:<16} {}", "", probe.description);
                }
            }
            Ok(())
        }
    }
}

/// Execute one probe
async fn cmd_run(config: &TestbenchConfig, probe_id: &str, output: OutputFormat) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    orchestrator
        .refresh_registry()
        .await
        .context("Failed to load probe registry")?;

    let result = orchestrator
        .run_one(probe_id)
        .await
        .with_context(|| format!("Failed to run probe {}", probe_id))?;

    match output {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => {
            println!("{}", render_result_line(&result));
            if let Some(trace_id) = &result.trace_id {
                println!("    trace: {}", trace_id);
            }
            println!("    evidence: {}", serde_json::to_string(&result.evidence)?);
        }
    }

    if classify(&result) == Classification::Fail {
        anyhow::bail!("Probe {} failed", probe_id);
    }
    Ok(())
}

/// Execute every probe in catalog order
async fn cmd_run_all(config: &TestbenchConfig, output: OutputFormat) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let report = orchestrator
        .run_all()
        .await
        .context("Run-all could not start")?;
    let snapshot = orchestrator.snapshot();

    match output {
        OutputFormat::Json => print_json(&RunAllOutput {
            report: &report,
            probes: &snapshot,
        })?,
        OutputFormat::Text => print!("{}", render_run_all(&report, &snapshot)),
    }

    if report.summary.failed > 0 {
        anyhow::bail!("{} probe(s) failed", report.summary.failed);
    }
    Ok(())
}

/// Show health/evidence counters
async fn cmd_health(config: &TestbenchConfig, output: OutputFormat) -> Result<()> {
    let client = HealthClient::new(config)?;
    let report = client
        .fetch()
        .await
        .context("Failed to fetch health evidence")?;

    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            print!("{}", render_health(&report));
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct RunAllOutput<'a> {
    report: &'a RunAllReport,
    probes: &'a StoreSnapshot,
}

fn status_mark(classification: Classification) -> &'static str {
    match classification {
        Classification::Pass => "✓",
        Classification::Warn => "!",
        Classification::Fail => "✗",
    }
}

fn render_result_line(result: &ProbeResult) -> String {
    let classification = classify(result);
    let mut line = format!(
        "  {} {} ({}ms): {}",
        status_mark(classification),
        result.probe_id,
        result.latency_ms,
        result.summary
    );
    if let Some(warning) = &result.warning {
        line.push_str(&format!(" [warning: {}]", warning));
    }
    line
}

fn render_run_all(report: &RunAllReport, snapshot: &StoreSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("Run ID: {}\n", report.run_id));
    out.push_str(&format!("Duration: {}ms\n\n", report.duration_ms));

    for entry in &snapshot.entries {
        match entry.phase.result() {
            Some(result) => out.push_str(&render_result_line(result)),
            None => out.push_str(&format!("  - {} ({})", entry.probe.id, entry.phase.name())),
        }
        out.push('\n');
    }
    for probe_id in &report.skipped {
        out.push_str(&format!("  skipped: {} (already running)\n", probe_id));
    }

    let s = &report.summary;
    out.push_str(&format!(
        "\nSummary: {} passed, {} warned, {} failed, {} total\n",
        s.passed, s.warned, s.failed, s.total
    ));
    out
}

fn render_health(report: &HealthReport) -> String {
    let counters = report.counters();
    if counters.is_empty() {
        return "No health counters reported.\n".to_string();
    }
    let mut out = format!("Stores: {}\n\n", report.store_names().join(", "));
    for (path, value) in counters {
        out.push_str(&format!("  {:<40} {}\n", path, value));
    }
    out
}
