use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};
use warmpath::runtime::ModuleRef;
use warmpath::{
    ExecutionOptimizer, HeatLevel, ManualClock, OptimizerConfig, UnloadPolicy, handler,
    module_ref,
};
use warmpath_host::FixedMemoryProbe;

const IDLE_MS: u64 = 30_000;

fn optimizer(config: OptimizerConfig) -> (ExecutionOptimizer, ManualClock) {
    let clock = ManualClock::at_ms(5_000_000);
    let optimizer =
        ExecutionOptimizer::with_clock(config, Arc::new(clock.clone())).expect("valid config");
    (optimizer, clock)
}

fn loader() -> anyhow::Result<ModuleRef> {
    Ok(module_ref(vec![0_u8; 64]))
}

fn echo(_module: &ModuleRef, args: &Value) -> anyhow::Result<Value> {
    Ok(args.clone())
}

#[test]
fn emergency_unload_spares_protected_modules() -> Result<()> {
    let (mut optimizer, _clock) = optimizer(OptimizerConfig::default());
    optimizer.set_module_policy("m", UnloadPolicy::Immediate);

    // one of m's operations is HOT, so m is heat-protected
    optimizer.register_fast_path("m.hot", handler(|_| Ok(json!("hot"))), Some("m"));
    optimizer.execute("m.other", "m", loader, echo, &json!(null))?;
    assert!(optimizer.is_module_loaded("m"));

    optimizer.execute("n.op", "n", loader, echo, &json!(null))?;
    optimizer.execute("core.op", "core", loader, echo, &json!(null))?;
    optimizer.set_module_policy("core", UnloadPolicy::Core);
    assert!(optimizer.is_module_loaded("n"));

    assert!(optimizer.check_pressure(600.0, 512.0));
    let report = optimizer.emergency_unload();

    assert!(optimizer.is_module_loaded("m"));
    assert!(optimizer.is_module_loaded("core"));
    assert!(!optimizer.is_module_loaded("n"));
    assert_eq!(report.unloaded, ["n"]);
    assert_eq!(report.spared, ["core", "m"]);
    assert!(optimizer.has_fast_path("m.hot"));
    assert_eq!(optimizer.stats().emergency_sweeps, 1);
    Ok(())
}

#[test]
fn pressure_comparison_is_strict() {
    let (optimizer, _clock) = optimizer(OptimizerConfig::default());
    assert!(!optimizer.check_pressure(512.0, 512.0));
    assert!(optimizer.check_pressure(512.5, 512.0));
}

#[test]
fn refreshed_schedule_keeps_module_loaded() -> Result<()> {
    let (mut optimizer, clock) = optimizer(OptimizerConfig::default());
    let start = optimizer.now_ms();

    optimizer.execute("n.op", "n", loader, echo, &json!(null))?;
    assert_eq!(optimizer.scheduled_unload_due("n"), Some(start + IDLE_MS));

    clock.advance_secs(10);
    optimizer.execute("n.op", "n", loader, echo, &json!(null))?;

    let report = optimizer.process_due(start + 31_000);
    assert!(report.processed.is_empty());
    assert!(optimizer.is_module_loaded("n"));
    assert_eq!(optimizer.scheduled_unload_due("n"), Some(start + 10_000 + IDLE_MS));
    Ok(())
}

#[test]
fn use_after_scheduling_re_defers_due_unload() -> Result<()> {
    let (mut optimizer, clock) = optimizer(OptimizerConfig::default());
    let start = optimizer.now_ms();
    optimizer.execute("n.op", "n", loader, echo, &json!(null))?;

    // a preload touches the module without refreshing its schedule
    clock.advance_secs(10);
    optimizer.preload("n", loader)?;

    let report = optimizer.process_due(start + 31_000);
    assert_eq!(report.deferred, ["n"]);
    assert!(report.processed.is_empty());
    assert!(optimizer.is_module_loaded("n"));
    assert_eq!(optimizer.scheduled_unload_due("n"), Some(start + 10_000 + IDLE_MS));

    let report = optimizer.process_due(start + 40_000);
    assert_eq!(report.processed, ["n"]);
    assert!(!optimizer.is_module_loaded("n"));
    Ok(())
}

#[test]
fn idle_module_is_unloaded_when_due() -> Result<()> {
    let (mut optimizer, clock) = optimizer(OptimizerConfig::default());
    optimizer.execute("n.op", "n", loader, echo, &json!(null))?;

    clock.advance_ms(IDLE_MS - 1);
    assert!(optimizer.maintain().due.is_empty());
    assert!(optimizer.is_module_loaded("n"));

    clock.advance_ms(1);
    let report = optimizer.maintain();
    assert_eq!(report.due.processed, ["n"]);
    assert!(!optimizer.is_module_loaded("n"));
    assert_eq!(optimizer.scheduled_unload_due("n"), None);
    Ok(())
}

#[test]
fn protection_is_absolute_until_reset() -> Result<()> {
    let (mut optimizer, clock) = optimizer(OptimizerConfig::default());
    for _ in 0..20 {
        optimizer.track_operation("n.op", Duration::from_millis(1), Some("n"));
    }
    optimizer.preload("n", loader)?;
    optimizer.execute("n.cold", "n", loader, echo, &json!(null))?;

    assert_eq!(optimizer.heat_level("n.op"), HeatLevel::Hot);
    assert!(optimizer.should_protect_module("n"));
    assert!(!optimizer.unload("n"));
    assert_eq!(optimizer.stats().unload_refusals, 1);

    clock.advance_secs(3_600);
    let report = optimizer.process_due(optimizer.now_ms());
    assert!(report.processed.is_empty());
    assert!(optimizer.should_protect_module("n"));
    assert!(optimizer.is_module_loaded("n"));

    optimizer.reset();
    assert!(!optimizer.should_protect_module("n"));
    assert!(!optimizer.is_module_loaded("n"));
    Ok(())
}

#[test]
fn protected_module_due_for_unload_is_skipped() -> Result<()> {
    let (mut optimizer, _clock) = optimizer(OptimizerConfig::default());
    let start = optimizer.now_ms();
    optimizer.execute("n.op", "n", loader, echo, &json!(null))?;

    // heat rises between scheduling and firing
    for _ in 0..20 {
        optimizer.track_operation("n.batch", Duration::from_millis(1), Some("n"));
    }

    let report = optimizer.process_due(start + IDLE_MS);
    assert_eq!(report.skipped_protected, ["n"]);
    assert!(optimizer.is_module_loaded("n"));
    Ok(())
}

#[test]
fn immediate_policy_yields_to_heat_protection() -> Result<()> {
    let config = OptimizerConfig {
        cache_size: 1,
        ..OptimizerConfig::default()
    };
    let (mut optimizer, _clock) = optimizer(config);
    optimizer.set_module_policy("m", UnloadPolicy::Immediate);
    for _ in 0..19 {
        optimizer.track_operation("m.op", Duration::from_millis(1), Some("m"));
    }

    optimizer.execute("m.op", "m", loader, echo, &json!(null))?;
    assert!(optimizer.is_hot("m.op"));
    assert!(optimizer.is_module_loaded("m"));
    Ok(())
}

#[test]
fn unload_of_unprotected_module_releases_reference() -> Result<()> {
    let (mut optimizer, _clock) = optimizer(OptimizerConfig::default());
    optimizer.execute("n.op", "n", loader, echo, &json!(null))?;

    assert!(optimizer.unload("n"));
    assert!(!optimizer.is_module_loaded("n"));
    assert!(!optimizer.unload("n"));
    assert_eq!(optimizer.scheduled_unload_due("n"), None);

    let record = optimizer.module("n").expect("record persists after unload");
    assert_eq!(record.load_count, 1);
    assert_eq!(record.policy, UnloadPolicy::IdleTimeout);
    Ok(())
}

#[test]
fn maintenance_sweeps_under_memory_pressure() -> Result<()> {
    let config = OptimizerConfig {
        memory_threshold_mb: Some(256.0),
        ..OptimizerConfig::default()
    };
    let (mut optimizer, _clock) = optimizer(config);
    let probe = FixedMemoryProbe::from_mb(128);
    optimizer.set_memory_probe(Arc::new(probe.clone()));
    optimizer.set_module_policy("n", UnloadPolicy::Immediate);

    for _ in 0..5 {
        optimizer.execute("n.op", "n", loader, echo, &json!(1))?;
    }
    assert!(optimizer.has_fast_path("n.op"));

    let calm = optimizer.maintain();
    assert!(calm.pressure.is_some_and(|check| !check.triggered));
    assert!(calm.emergency.is_none());

    probe.set_mb(300);
    let report = optimizer.maintain();
    let emergency = report.emergency.expect("threshold crossed");
    assert_eq!(emergency.invalidated, ["n.op"]);
    assert!(!optimizer.has_fast_path("n.op"));
    assert_eq!(optimizer.stats().memory.triggered, 1);

    // admission was revoked, so the next successful call caches it again
    probe.set_mb(128);
    optimizer.execute("n.op", "n", loader, echo, &json!(1))?;
    assert!(optimizer.has_fast_path("n.op"));
    Ok(())
}

#[test]
fn maintenance_without_probe_skips_pressure() {
    let (mut optimizer, _clock) = optimizer(OptimizerConfig {
        memory_threshold_mb: Some(64.0),
        ..OptimizerConfig::default()
    });
    let report = optimizer.maintain();
    assert!(report.pressure.is_none());
    assert!(report.emergency.is_none());
}

#[test]
fn stale_cold_records_are_swept() -> Result<()> {
    let (mut optimizer, clock) = optimizer(OptimizerConfig::default());
    optimizer.track_operation("rare", Duration::from_millis(1), None);
    optimizer.register_fast_path("pinned", handler(|_| Ok(json!(null))), None);
    for _ in 0..5 {
        optimizer.execute("warm", "n", loader, echo, &json!(null))?;
    }

    clock.advance_ms(300_001);
    let report = optimizer.optimize();

    assert_eq!(report.removed, 1);
    assert!(optimizer.operation("rare").is_none());
    assert!(optimizer.operation("pinned").is_some());
    assert!(optimizer.operation("warm").is_some());
    Ok(())
}

#[test]
fn reset_forgets_everything_but_configuration() -> Result<()> {
    let (mut optimizer, _clock) = optimizer(OptimizerConfig {
        cache_size: 8,
        ..OptimizerConfig::default()
    });
    optimizer.set_module_policy("core", UnloadPolicy::Core);
    optimizer.register_fast_path("a", handler(|_| Ok(json!(null))), Some("core"));
    optimizer.execute("b", "n", loader, echo, &json!(null))?;

    optimizer.reset();

    let stats = optimizer.stats();
    assert_eq!(stats.cache_entries, 0);
    assert_eq!(stats.tracked_operations, 0);
    assert_eq!(stats.modules_known, 0);
    assert_eq!(stats.scheduled_unloads, 0);
    assert_eq!(stats.loads, 0);
    assert_eq!(stats.cache_capacity, 8);
    assert_eq!(optimizer.module_policy("core"), UnloadPolicy::Core);
    Ok(())
}

#[test]
fn clear_keeps_heat_and_modules() -> Result<()> {
    let (mut optimizer, _clock) = optimizer(OptimizerConfig::default());
    let loads = Arc::new(AtomicUsize::new(0));
    for _ in 0..5 {
        let loads = Arc::clone(&loads);
        optimizer.execute(
            "op",
            "n",
            move || {
                loads.fetch_add(1, Ordering::SeqCst);
                loader()
            },
            echo,
            &json!(null),
        )?;
    }
    assert!(optimizer.has_fast_path("op"));

    optimizer.clear();

    assert!(!optimizer.has_fast_path("op"));
    assert_eq!(optimizer.heat_level("op"), HeatLevel::Warm);
    assert!(optimizer.is_module_loaded("n"));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    Ok(())
}
