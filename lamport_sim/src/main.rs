//! Lamport cluster simulator CLI
//!
//! Runs scenarios deterministically and checks the recorded event streams.

use clap::Parser;
use lamport_core::ClusterConfig;
use lamport_sim::{summary_table, write_logs, ScenarioId, ScenarioOutcome, ScenarioResult, ScenarioRunner, SimError, SimExport};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Lamport cluster simulation CLI
#[derive(Parser, Debug)]
#[command(name = "lamport-sim")]
#[command(about = "Run deterministic Lamport clock cluster simulations", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (triangle, uniform, slow_receiver, partition, lossy_links, wide_fanout, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Run a cluster config file instead of a named scenario
    #[arg(short, long)]
    config: Option<String>,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated duration in seconds
    #[arg(short, long, default_value = "60")]
    duration: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the run (single scenario, single seed) to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Write per-node log files for the run (single scenario, single seed)
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("Lamport cluster simulator v{}", env!("CARGO_PKG_VERSION"));
    }

    let custom = match &args.config {
        Some(path) => match ClusterConfig::load(path) {
            Ok(cluster) => Some(cluster),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(2);
            }
        },
        None => None,
    };

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!(
                    "Available scenarios: {}, all",
                    ScenarioId::all().iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
                );
                std::process::exit(2);
            }
        }
    };

    let single_run = custom.is_some() || (scenarios.len() == 1 && args.seeds == 1);
    if (args.export.is_some() || args.log_dir.is_some()) && !single_run {
        eprintln!("Error: --export and --log-dir need a single scenario and a single seed");
        std::process::exit(2);
    }

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed).with_duration(args.duration);

        let outcomes: Vec<Result<ScenarioOutcome, SimError>> = match &custom {
            Some(cluster) => vec![runner.run_custom(cluster.clone()).await],
            None => {
                let mut outcomes = Vec::with_capacity(scenarios.len());
                for scenario in &scenarios {
                    outcomes.push(runner.execute(*scenario).await);
                }
                outcomes
            }
        };

        for outcome in outcomes {
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Run (seed={}) could not start: {}", seed, e);
                    std::process::exit(2);
                }
            };

            if let Err(e) = save_outputs(&args, &outcome) {
                error!("Failed to write outputs: {}", e);
            }

            let result = outcome.result;
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", result.scenario, seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        result.scenario,
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
                if args.verbose {
                    for line in summary_table(&result.metrics.nodes).lines() {
                        info!("  {}", line);
                    }
                }
            }
            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();
    let passed = total - failed_count;

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to render summary: {}", e),
        }
    } else if failed_count == 0 {
        info!("All {} scenario runs passed", total);
    } else {
        error!("{}/{} scenario runs failed", failed_count, total);
        for result in all_results.iter().filter(|r| !r.passed) {
            error!(
                "  - {} seed={}: {}",
                result.scenario,
                result.seed,
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}

fn save_outputs(args: &Args, outcome: &ScenarioOutcome) -> Result<(), SimError> {
    if let Some(path) = &args.export {
        SimExport::from_run(&outcome.result, &outcome.world).write_to_file(path)?;
        info!("Exported run to {}", path);
    }
    if let Some(dir) = &args.log_dir {
        let paths = write_logs(&outcome.world, dir)?;
        info!("Wrote {} log files to {}", paths.len(), dir);
    }
    Ok(())
}
