//! Waytrail Simulator CLI
//!
//! Run the route engine through deterministic scenarios.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use waytrail_core::{EngineConfig, RouteEngine};
use waytrail_env::{TokioContext, TrailContext};
use waytrail_sim::scenarios::ScenarioId;
use waytrail_sim::{ScenarioResult, ScenarioRunner, SimConfig, SimWorld};

/// Waytrail Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "waytrail-sim")]
#[command(about = "Run deterministic route capture and playback scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of operators in crowd scenarios
    #[arg(short, long, default_value = "4")]
    operators: usize,

    /// Scenario to run (walk_and_record, replay, route_vanished, capacity_limit,
    /// pause_resume, crowd, disconnect, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Maximum simulation duration in seconds
    #[arg(short, long, default_value = "120")]
    duration: f64,

    /// Engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Drive the crowd through the async engine loop for this many
    /// virtual seconds instead of running scenarios
    #[arg(long)]
    live: Option<f64>,

    /// With --live, follow the wall clock instead of the virtual one
    #[arg(long)]
    realtime: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the run (single scenario) to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn load_engine_config(path: Option<&str>) -> EngineConfig {
    let Some(path) = path else {
        return EngineConfig::default();
    };

    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|source| EngineConfig::from_toml_str(&source).map_err(|e| e.to_string()));

    match parsed {
        Ok(config) => {
            info!("Loaded engine config from {}", path);
            config
        }
        Err(e) => {
            eprintln!("Error: {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

/// Records one lap per operator, then replays it, with the engine driven
/// by [`RouteEngine::run`] on `clock`.
async fn run_live<Ctx: TrailContext>(world: SimWorld, clock: Arc<Ctx>, seconds: f64) -> bool {
    let ids = world.spawn_operators();
    let tick = world.config.engine.base_tick_duration();
    let SimWorld {
        walkers,
        rewards,
        mut engine,
        ..
    } = world;

    for (i, op) in ids.iter().enumerate() {
        for line in [
            format!("/route create lap_{}", i),
            format!("/route edit select lap_{}", i),
            "/route edit linefollowstart".to_string(),
        ] {
            if let Err(e) = engine.execute_line(*op, &line) {
                error!("{} failed: {}", line, e);
                return false;
            }
        }
    }

    let engine = Arc::new(Mutex::new(engine));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = tokio::spawn(RouteEngine::run(engine.clone(), clock.clone(), shutdown_rx));

    // Walkers move on the same base tick deadlines the engine loop waits for
    let horizon = Duration::try_from_secs_f64(seconds).unwrap_or_default();
    let mut last = clock.now();
    let mut deadline = last;
    let mut switched = false;
    while clock.now() < horizon {
        deadline += tick;
        clock.sleep_until(deadline).await;
        let now = clock.now();
        walkers.step((now - last).as_secs_f64());
        last = now;

        if !switched && now >= horizon / 2 {
            let mut engine = engine.lock().await;
            for (i, op) in ids.iter().enumerate() {
                engine.deselect(*op);
                if let Err(e) = engine.start_playback(*op, &format!("lap_{}", i)) {
                    error!("Cannot follow lap_{}: {}", i, e);
                }
            }
            switched = true;
        }
    }

    let _ = shutdown_tx.send(true);
    let ticks = driver.await.unwrap_or(0);
    info!(
        "Live run: {} engine ticks, {} routes, {} rewards",
        ticks,
        engine.lock().await.catalog().len(),
        rewards.len()
    );
    rewards.len() == ids.len()
}

async fn live(seed: u64, operators: usize, engine: EngineConfig, seconds: f64, realtime: bool) -> bool {
    let config = SimConfig {
        seed,
        num_operators: operators,
        engine,
        ..Default::default()
    };
    let world = match SimWorld::new(config) {
        Ok(world) => world,
        Err(e) => {
            error!("Cannot start: {}", e);
            return false;
        }
    };

    if realtime {
        run_live(world, Arc::new(TokioContext::seeded(seed)), seconds).await
    } else {
        let clock = world.context.clone();
        run_live(world, clock, seconds).await
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("Waytrail Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let engine = load_engine_config(args.config.as_deref());

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if let Some(seconds) = args.live {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                eprintln!("Error: cannot start runtime: {}", e);
                std::process::exit(1);
            }
        };
        let passed = runtime.block_on(live(base_seed, args.operators, engine, seconds, args.realtime));
        if !passed {
            error!("✗ live run did not reward every operator");
            std::process::exit(1);
        }
        info!("✓ live run (seed={}) PASSED", base_seed);
        return;
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!(
                "Available scenarios: {}, all",
                ScenarioId::all()
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            std::process::exit(1);
        })]
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }

        let runner = ScenarioRunner::new(base_seed, args.operators)
            .with_duration(args.duration)
            .with_engine_config(engine);
        let (result, export) = runner.run_with_export(scenarios[0]);

        match export.write_to_file(export_path) {
            Ok(()) => info!("Exported {} frames to {}", export.frames.len(), export_path),
            Err(e) => error!("Failed to write export: {:?}", e),
        }

        if result.passed {
            info!("✓ {} (seed={}) PASSED", scenarios[0].name(), base_seed);
        } else {
            error!(
                "✗ {} FAILED: {}",
                scenarios[0].name(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
            std::process::exit(1);
        }
        return;
    }

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let runner = ScenarioRunner::new(seed, args.operators)
            .with_duration(args.duration)
            .with_engine_config(engine.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED - {} points, {} rewards",
                        scenario.name(),
                        seed,
                        result.metrics.points_captured,
                        result.metrics.rewards
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "points_captured": r.metrics.points_captured,
                    "rewards": r.metrics.rewards,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
