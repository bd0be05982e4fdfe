//! Studio Simulator CLI
//!
//! Run deterministic simulation scenarios against the scene extension and
//! chart bridge.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use studio_core::PanelConfig;
use studio_sim::scenarios::ScenarioId;
use studio_sim::{RerunLogger, ScenarioResult, ScenarioRunner, SimConfig, SimExport};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Studio Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "studio-sim")]
#[command(about = "Run deterministic simulation scenarios for the studio scene", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of pose topics
    #[arg(short, long, default_value = "9")]
    topics: usize,

    /// Scenario to run (steady_stream, covariance_churn, topic_churn,
    /// diagnostics_storm, chart_interaction, malformed_flood, scale_limit,
    /// standard, all)
    #[arg(short = 'S', long, default_value = "standard")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Ticks per scenario
    #[arg(long, default_value = "300")]
    ticks: u64,

    /// Simulation config file (JSON); command-line values win
    #[arg(long)]
    config: Option<PathBuf>,

    /// Saved panel config (topic settings and diagnostics view) to start from
    #[arg(long)]
    panel: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Record the scene to a Rerun .rrd file (needs the visualization feature)
    #[arg(long)]
    rerun: Option<String>,
}

fn parse_scenarios(name: &str) -> Result<Vec<ScenarioId>, String> {
    match name {
        "all" => Ok(ScenarioId::all()),
        "standard" => Ok(ScenarioId::standard()),
        "stress" => Ok(ScenarioId::stress()),
        other => other.parse().map(|s| vec![s]),
    }
}

fn load_config(args: &Args) -> Result<SimConfig, studio_sim::SimError> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => SimConfig::default(),
    };
    config.num_topics = args.topics;
    config.ticks = args.ticks;
    Ok(config)
}

fn report(result: &ScenarioResult, json: bool) {
    if json {
        return;
    }
    if result.passed {
        info!("✓ {} (seed={}) PASSED", result.scenario.name(), result.seed);
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("Studio Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios = match parse_scenarios(&args.scenario) {
        Ok(scenarios) => scenarios,
        Err(e) => {
            eprintln!("Error: {}", e);
            let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
            eprintln!("Available scenarios: {}, standard, stress, all", names.join(", "));
            return ExitCode::FAILURE;
        }
    };

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let panel = match &args.panel {
        Some(path) => match PanelConfig::load(path) {
            Ok(panel) => panel,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => PanelConfig::default(),
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    // Export and Rerun record one scenario run
    if args.export.is_some() || args.rerun.is_some() {
        if scenarios.len() != 1 || args.seeds != 1 {
            eprintln!("Error: --export and --rerun record a single scenario and seed");
            return ExitCode::FAILURE;
        }
        let scenario = scenarios[0];
        config.seed = base_seed;

        let rerun = match &args.rerun {
            Some(path) => RerunLogger::to_file(path),
            None => RerunLogger::disabled(),
        };
        let runner = ScenarioRunner::from_config(config)
            .with_panel_config(panel)
            .with_rerun(rerun);

        let mut export = SimExport::new(scenario.name(), base_seed);
        let result = runner.run_recorded(scenario, Some(&mut export));
        report(&result, args.json);

        if let Some(path) = &args.export {
            if let Err(e) = export.write_to_file(path) {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
            info!("Exported {} frames to {}", export.frames.len(), path.display());
        }
        if args.json {
            println!("{}", result.to_json());
        }
        return if result.passed { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::from_config(SimConfig { seed, ..config.clone() })
            .with_panel_config(panel.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            report(&result, args.json);
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed: Vec<&ScenarioResult> = all_results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": all_results.iter().map(ScenarioResult::to_json).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed.is_empty() {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed.len(), total);
            for result in &failed {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit code for CI
    if failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
