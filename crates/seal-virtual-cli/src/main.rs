//! seal-virtual CLI - replay scroll traces through the list engine and check configs.

#![allow(
    clippy::needless_pass_by_value,
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::doc_markdown
)]

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use seal_virtual_core::{
    ConfigError, HeightModel, PerformanceMetrics, PoolStats, ScrollPattern, SystemMemory,
    TuningConfig, VirtualController, VirtualizerConfig, WindowState, DEFAULT_KIND,
};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "seal-virtual")]
#[command(about = "Virtualized list engine tooling for the seal dashboard")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a synthetic scroll trace and report the resulting window
    Simulate(SimulateArgs),

    /// Parse and validate a YAML engine config
    CheckConfig {
        /// Path to the config file
        #[arg(default_value = "seal-virtual.yaml")]
        config: PathBuf,

        /// Print the effective config as JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct SimulateArgs {
    /// Number of rows in the list
    #[arg(short = 'n', long, default_value_t = 100_000)]
    items: usize,

    /// Estimated row height in px
    #[arg(long, default_value_t = 80.0)]
    height: f32,

    /// Viewport height in px
    #[arg(long, default_value_t = 800.0)]
    viewport: f32,

    /// Override the configured overscan
    #[arg(long)]
    overscan: Option<usize>,

    /// Shape of the synthetic trace
    #[arg(short, long, value_enum, default_value = "steady")]
    pattern: TracePattern,

    /// Number of scroll samples to replay
    #[arg(short, long, default_value_t = 120)]
    samples: usize,

    /// Milliseconds between samples
    #[arg(short, long, default_value_t = 16.0)]
    interval: f64,

    /// YAML engine config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Feed host memory readings into the pressure monitor
    #[arg(long)]
    host_memory: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum TracePattern {
    /// Flings at 4000 px/s
    Fast,
    /// Reading pace, 600 px/s
    Steady,
    /// Short steady runs broken by large jumps
    Jump,
    /// No movement
    Idle,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a simulation run ends with.
#[derive(Debug, Serialize)]
struct SimulationReport {
    trace: &'static str,
    samples: usize,
    pattern: ScrollPattern,
    confidence: f32,
    window: WindowState,
    rendered_rows: usize,
    prefetched_rows: usize,
    tuning: TuningConfig,
    pool: PoolStats,
    metrics: PerformanceMetrics,
    under_memory_pressure: bool,
    load_more: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Simulate(args) => cmd_simulate(&args),
        Commands::CheckConfig { config, json } => cmd_check_config(config, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<VirtualizerConfig, ConfigError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading config");
            VirtualizerConfig::from_yaml_file(path)
        }
        None => Ok(VirtualizerConfig::default()),
    }
}

fn cmd_check_config(path: PathBuf, json: bool) -> Result<(), CliError> {
    let config = VirtualizerConfig::from_yaml_file(&path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("Config OK: {}", path.display());
        print!("{}", config.to_yaml()?);
    }
    Ok(())
}

fn cmd_simulate(args: &SimulateArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(overscan) = args.overscan {
        config.overscan = overscan;
    }
    let report = simulate(args, config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Offset of sample `step` for a trace shape.
fn trace_offset(pattern: TracePattern, step: usize, interval_ms: f64) -> f32 {
    let seconds = step as f64 * interval_ms / 1000.0;
    let offset = match pattern {
        TracePattern::Fast => 4000.0 * seconds,
        TracePattern::Steady => 600.0 * seconds,
        TracePattern::Jump => {
            let run = step / 8;
            run as f64 * 6000.0 + (step % 8) as f64 * 2.0
        }
        TracePattern::Idle => 0.0,
    };
    offset as f32
}

fn simulate(args: &SimulateArgs, config: VirtualizerConfig) -> Result<SimulationReport, CliError> {
    let debounce_ms = config.debounce_ms;
    let mut list = VirtualController::from_factory(
        config,
        HeightModel::fixed(args.height),
        |_| String::new(),
    )?;
    if args.host_memory {
        list = list.with_memory_source(SystemMemory::new());
    }
    list.set_viewport_size(args.viewport);
    list.set_item_count(args.items);

    let mut now = 0.0;
    for step in 0..args.samples {
        now = step as f64 * args.interval;
        list.on_scroll(trace_offset(args.pattern, step, args.interval), now);
        list.on_frame(now);
        let reconciled = list.reconcile_resources(|_| DEFAULT_KIND);
        for index in reconciled.acquired {
            if let Some(row) = list.resource_mut(index) {
                row.push_str(&format!("SEAL-{index:06}"));
            }
        }
        debug!(step, offset = list.offset(), "Replayed sample");
    }

    // Snapshot the motion classification before the scroll-end tick clears it.
    let pattern = list.state().pattern;
    let confidence = list.state().confidence;

    now += debounce_ms + args.interval;
    list.on_frame(now);
    list.reconcile_resources(|_| DEFAULT_KIND);

    let window = list.state().clone();
    Ok(SimulationReport {
        trace: trace_name(args.pattern),
        samples: args.samples,
        pattern,
        confidence,
        rendered_rows: window.render_range().map_or(0, |range| range.len()),
        prefetched_rows: window.prefetched_indices().len(),
        window,
        tuning: *list.tuning(),
        pool: list.pool_stats(),
        metrics: list.performance_metrics(),
        under_memory_pressure: list.is_under_memory_pressure(),
        load_more: list.should_load_more(),
    })
}

const fn trace_name(pattern: TracePattern) -> &'static str {
    match pattern {
        TracePattern::Fast => "fast",
        TracePattern::Steady => "steady",
        TracePattern::Jump => "jump",
        TracePattern::Idle => "idle",
    }
}

fn print_report(report: &SimulationReport) {
    println!("=== seal-virtual simulation ===");
    println!("trace={} samples={}", report.trace, report.samples);
    println!(
        "pattern={} confidence={:.2}",
        report.pattern, report.confidence
    );
    match report.window.visible_range {
        Some(range) => println!(
            "visible={}..={} offset_y={} scroll={}",
            range.start, range.end, range.offset_y, report.window.offset
        ),
        None => println!("visible=(empty)"),
    }
    println!(
        "rendered={} prefetched={} extent={}",
        report.rendered_rows, report.prefetched_rows, report.window.total_extent
    );
    println!(
        "overscan={} threshold={:.2} throttle={}ms",
        report.tuning.overscan, report.tuning.prefetch_threshold, report.tuning.scroll_throttle_ms
    );
    println!(
        "pool: created={} hits={} misses={} hit_rate={:.0}% exhausted={}",
        report.pool.created,
        report.pool.hits,
        report.pool.misses,
        report.pool.hit_rate * 100.0,
        report.pool.exhausted
    );
    println!("{}", report.metrics);
    if report.under_memory_pressure {
        println!("memory: under pressure");
    }
    if report.load_more {
        println!("load-more: requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pattern: TracePattern) -> SimulateArgs {
        SimulateArgs {
            items: 100_000,
            height: 80.0,
            viewport: 800.0,
            overscan: None,
            pattern,
            samples: 60,
            interval: 16.0,
            config: None,
            host_memory: false,
            json: false,
        }
    }

    #[test]
    fn test_cli_parses_simulate() {
        let cli = Cli::parse_from([
            "seal-virtual",
            "simulate",
            "--pattern",
            "fast",
            "-n",
            "500",
            "--json",
        ]);
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.pattern, TracePattern::Fast);
        assert_eq!(args.items, 500);
        assert!(args.json);
        assert_eq!(args.samples, 120);
    }

    #[test]
    fn test_cli_parses_check_config_default_path() {
        let cli = Cli::parse_from(["seal-virtual", "-v", "check-config"]);
        assert!(cli.verbose);
        let Commands::CheckConfig { config, json } = cli.command else {
            panic!("expected check-config");
        };
        assert_eq!(config, PathBuf::from("seal-virtual.yaml"));
        assert!(!json);
    }

    #[test]
    fn test_trace_offsets() {
        assert_eq!(trace_offset(TracePattern::Idle, 30, 16.0), 0.0);
        assert_eq!(trace_offset(TracePattern::Fast, 10, 100.0), 4000.0);
        assert_eq!(trace_offset(TracePattern::Steady, 10, 100.0), 600.0);
        assert_eq!(trace_offset(TracePattern::Jump, 9, 16.0), 6002.0);
    }

    #[test]
    fn test_simulate_fast_trace_classifies_fling() {
        let report = simulate(&args(TracePattern::Fast), VirtualizerConfig::default()).unwrap();
        assert_eq!(report.pattern, ScrollPattern::FastForward);
        assert!(!report.window.is_scrolling);
        assert!(report.pool.created > 0);
        assert_eq!(report.pool.total_outstanding, report.rendered_rows);
    }

    #[test]
    fn test_simulate_idle_trace_stays_at_top() {
        let report = simulate(&args(TracePattern::Idle), VirtualizerConfig::default()).unwrap();
        let range = report.window.visible_range.unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(report.pattern, ScrollPattern::Unknown);
        assert_eq!(report.prefetched_rows, 0);
    }

    #[test]
    fn test_simulate_empty_list() {
        let mut empty = args(TracePattern::Steady);
        empty.items = 0;
        let report = simulate(&empty, VirtualizerConfig::default()).unwrap();
        assert!(report.window.visible_range.is_none());
        assert_eq!(report.rendered_rows, 0);
    }

    #[test]
    fn test_simulate_rejects_bad_height() {
        let mut bad = args(TracePattern::Steady);
        bad.height = -1.0;
        let err = simulate(&bad, VirtualizerConfig::default()).unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_report_serializes_pattern_name() {
        let report = simulate(&args(TracePattern::Fast), VirtualizerConfig::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pattern"], "fast-forward");
        assert_eq!(json["trace"], "fast");
    }

    #[test]
    fn test_check_config_missing_file_is_io_error() {
        let err = cmd_check_config(PathBuf::from("/nonexistent/seal-virtual.yaml"), false)
            .unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::Io(_))));
    }
}
