use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use tracing::{debug, info};
use warmpath_host::{FixedMemoryProbe, MemoryProbe, ProcessMemoryProbe};
use warmpath_utils::logger;

use crate::clock::ManualClock;
use crate::config::{ConfigUpdate, OptimizerConfig};
use crate::dispatch::Dispatcher;
use crate::runtime::{
    ExecutionOptimizer, ModuleRef, OptimizerStats, Payload, UnloadPolicy, module_ref,
};
use crate::utils::profiler::{PhaseTiming, Profiler};
use crate::VERSION;

/// Simulated time between two invocations of the synthetic workload.
const INVOCATION_GAP_MS: u64 = 1_000;

#[derive(Parser, Debug)]
#[command(
    name = "warmpath",
    version = VERSION,
    about = "Warm-path execution optimizer tools"
)]
pub struct WarmpathCli {
    #[arg(long, global = true)]
    /// Display phase timing information.
    time: bool,

    #[command(subcommand)]
    command: Command,
}

impl WarmpathCli {
    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive a synthetic multi-module workload through the optimizer and
    /// print the resulting statistics.
    Simulate {
        #[arg(short = 'n', long, default_value_t = 200)]
        invocations: u64,
        /// Report this resident size instead of reading the process.
        #[arg(long)]
        memory_mb: Option<u64>,
        /// Emergency-unload threshold; overrides configuration.
        #[arg(long)]
        threshold_mb: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as JSON.
    Config {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    logger::init_logging();
    let cli = WarmpathCli::parse();
    match &cli.command {
        Command::Simulate {
            invocations,
            memory_mb,
            threshold_mb,
            json,
        } => handle_simulate(&cli, *invocations, *memory_mb, *threshold_mb, *json),
        Command::Config { file } => handle_config(file.as_deref()),
    }
}

fn handle_config(file: Option<&Path>) -> Result<()> {
    let config = OptimizerConfig::load(file)?;
    let rendered =
        serde_json::to_string_pretty(&config).context("failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}

fn handle_simulate(
    cli: &WarmpathCli,
    invocations: u64,
    memory_mb: Option<u64>,
    threshold_mb: Option<f64>,
    json: bool,
) -> Result<()> {
    let mut profiler = Profiler::new();
    let clock = ManualClock::new();

    let mut dispatcher = profiler.record_phase("Setup", || {
        build_dispatcher(clock.clone(), memory_mb, threshold_mb)
    })?;

    let prewarmed = profiler.record_phase("Prewarm", || dispatcher.prewarm(["auth.verify"]))?;
    debug!(prewarmed, "synthetic workload prewarmed");

    let summary = profiler.record_phase("Workload", || {
        run_workload(&mut dispatcher, &clock, invocations)
    });

    let stats = dispatcher.optimizer().stats();
    if json {
        let report = json!({
            "invocations": invocations,
            "calls": summary.calls,
            "failures": summary.failures,
            "emergency_sweeps": summary.emergencies,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_stats(invocations, &summary, &stats);
    }

    if cli.time {
        print_timings(profiler.phases());
    }

    Ok(())
}

fn build_dispatcher(
    clock: ManualClock,
    memory_mb: Option<u64>,
    threshold_mb: Option<f64>,
) -> Result<Dispatcher> {
    let config = OptimizerConfig::from_env();
    let mut optimizer = ExecutionOptimizer::with_clock(config, Arc::new(clock))?;
    if threshold_mb.is_some() {
        optimizer.configure(&ConfigUpdate {
            memory_threshold_mb: threshold_mb,
            ..ConfigUpdate::default()
        })?;
    }

    let probe: Arc<dyn MemoryProbe> = match memory_mb {
        Some(mb) => Arc::new(FixedMemoryProbe::from_mb(mb)),
        None => Arc::new(ProcessMemoryProbe::new()),
    };
    optimizer.set_memory_probe(probe);

    optimizer.set_module_policy("auth", UnloadPolicy::Core);
    optimizer.set_module_policy("reports", UnloadPolicy::Immediate);

    let mut dispatcher = Dispatcher::new(optimizer);
    dispatcher
        .route("auth.verify", "auth", || load_module("auth", 8), |module, args| {
            Ok(json!({ "ok": true, "module": module_name(module), "user": args["user"] }))
        })
        .route("orders.list", "orders", || load_module("orders", 64), |module, args| {
            let page = args["page"].as_u64().unwrap_or_default();
            Ok(json!({ "module": module_name(module), "page": page, "items": [] }))
        })
        .route("orders.create", "orders", || load_module("orders", 64), |module, args| {
            Ok(json!({ "module": module_name(module), "created": args["id"] }))
        })
        .route("reports.daily", "reports", || load_module("reports", 512), |module, _| {
            Ok(json!({ "module": module_name(module), "rows": 0 }))
        })
        .route("images.resize", "images", || load_module("images", 1024), |module, args| {
            Ok(json!({ "module": module_name(module), "width": args["width"] }))
        });
    Ok(dispatcher)
}

/// Stand-in for an expensive module import.
struct SyntheticModule {
    name: &'static str,
    _heap: Vec<u8>,
}

fn load_module(name: &'static str, kib: usize) -> anyhow::Result<ModuleRef> {
    Ok(module_ref(SyntheticModule {
        name,
        _heap: vec![0; kib * 1024],
    }))
}

fn module_name(module: &ModuleRef) -> &'static str {
    module
        .downcast_ref::<SyntheticModule>()
        .map_or("unknown", |module| module.name)
}

#[derive(Debug, Default)]
struct WorkloadSummary {
    calls: u64,
    failures: u64,
    emergencies: u64,
}

/// Operations issued by invocation `index`.
fn operations_for(index: u64) -> Vec<(&'static str, Payload)> {
    let mut ops = vec![("auth.verify", json!({ "user": index % 17 }))];
    ops.push(("orders.list", json!({ "page": index % 5 })));
    if index % 3 == 0 {
        ops.push(("orders.create", json!({ "id": index })));
    }
    if index % 10 == 0 {
        ops.push(("reports.daily", json!({})));
    }
    // bursts followed by long idle stretches
    if index % 50 < 8 {
        ops.push(("images.resize", json!({ "width": 64 + index % 4 * 64 })));
    }
    ops
}

fn run_workload(
    dispatcher: &mut Dispatcher,
    clock: &ManualClock,
    invocations: u64,
) -> WorkloadSummary {
    let mut summary = WorkloadSummary::default();
    for index in 0..invocations {
        clock.advance_ms(INVOCATION_GAP_MS);
        for (key, args) in operations_for(index) {
            summary.calls += 1;
            if let Err(err) = dispatcher.resolve_and_execute(key, &args) {
                summary.failures += 1;
                debug!(key, error = %err, "synthetic call failed");
            }
        }

        let report = dispatcher.optimizer_mut().maintain();
        if report.emergency.is_some() {
            summary.emergencies += 1;
        }
        if !report.due.processed.is_empty() {
            debug!(invocation = index, unloaded = ?report.due.processed, "idle modules unloaded");
        }
    }
    info!(
        invocations,
        calls = summary.calls,
        failures = summary.failures,
        "synthetic workload finished"
    );
    summary
}

fn print_stats(invocations: u64, summary: &WorkloadSummary, stats: &OptimizerStats) {
    println!("{}", "[Workload]".bold());
    println!("{:>22}: {}", "invocations", invocations);
    println!("{:>22}: {}", "calls", summary.calls);
    println!("{:>22}: {}", "failures", summary.failures);

    println!("{}", "[Fast path]".bold());
    let hit_rate = format!("{:.1}%", stats.hit_rate * 100.0);
    println!("{:>22}: {}", "hit rate", hit_rate.green().bold());
    println!("{:>22}: {}/{}", "hits/misses", stats.hits, stats.misses);
    println!(
        "{:>22}: {}/{}",
        "entries/capacity", stats.cache_entries, stats.cache_capacity
    );
    println!("{:>22}: {}", "evictions", stats.evictions);
    println!("{:>22}: {}", "invalidations", stats.invalidations);
    println!(
        "{:>22}: {:.3} ms",
        "time saved (est.)", stats.time_saved_estimate_ms
    );

    println!("{}", "[Heat]".bold());
    let heat = &stats.heat_distribution;
    println!(
        "{:>22}: {} cold, {} warm, {} hot, {} critical",
        "operations",
        heat.cold,
        heat.warm,
        heat.hot.to_string().yellow(),
        heat.critical.to_string().red()
    );

    println!("{}", "[Modules]".bold());
    println!(
        "{:>22}: {} known, {} loaded, {} protected",
        "modules", stats.modules_known, stats.modules_loaded, stats.modules_protected
    );
    println!(
        "{:>22}: {} loads, {} unloads, {} refused",
        "lifecycle", stats.loads, stats.unloads, stats.unload_refusals
    );
    println!("{:>22}: {}", "scheduled unloads", stats.scheduled_unloads);
    let sweeps = stats.emergency_sweeps.to_string();
    let sweeps = if stats.emergency_sweeps > 0 {
        sweeps.red().bold()
    } else {
        sweeps.normal()
    };
    println!("{:>22}: {}", "emergency sweeps", sweeps);
    if let Some(latest) = stats.memory.latest_mb {
        println!(
            "{:>22}: {:.1} MB (peak {:.1} MB)",
            "resident", latest, stats.memory.peak_mb
        );
    }
}

fn print_timings(phases: &[PhaseTiming]) {
    println!("{}", "[Timing]".bold());
    let mut total = Duration::ZERO;
    for PhaseTiming { name, duration } in phases {
        println!("{:>16}: {:>6.2} ms", name, duration.as_secs_f64() * 1000.0);
        total += *duration;
    }
    println!("{:>16}: {:>6.2} ms", "Total", total.as_secs_f64() * 1000.0);
}
