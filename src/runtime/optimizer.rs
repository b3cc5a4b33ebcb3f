//! The coordinating object: cache-first execution, unload dispositions and
//! invocation-boundary maintenance.
//!
//! One [`ExecutionOptimizer`] owns the heat tracker, the fast-path cache, the
//! module registry and the unload scheduler. It is driven from a single
//! thread; the host calls [`ExecutionOptimizer::execute`] for each operation
//! and [`ExecutionOptimizer::maintain`] once per invocation boundary.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};
use warmpath_host::MemoryProbe;

use super::cache::FastPathCache;
use super::heat::{HeatDistribution, HeatLevel, HeatTracker, OperationRecord, SweepReport};
use super::metrics::{MetricsSnapshot, OptimizerMetrics};
use super::module::{ModuleRecord, ModuleRegistry, UnloadPolicy};
use super::pressure::{self, MemoryPressureMonitor, PressureSnapshot};
use super::scheduler::{DueReport, UnloadScheduler};
use super::{Handler, ModuleRef, Payload};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigUpdate, OptimizerConfig};
use crate::error::{OptimizerError, Result};

/// What happened to a module once a call finished with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Retained,
    Unloaded,
    Scheduled,
}

/// Outcome of [`ExecutionOptimizer::emergency_unload`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmergencyReport {
    pub unloaded: Vec<String>,
    /// Loaded modules left in place because they are protected.
    pub spared: Vec<String>,
    /// Fast-path keys dropped because their module is gone.
    pub invalidated: Vec<String>,
}

/// One memory reading compared against the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PressureCheck {
    pub current_mb: f64,
    pub threshold_mb: f64,
    pub triggered: bool,
}

/// Everything done by one [`ExecutionOptimizer::maintain`] pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaintenanceReport {
    pub due: DueReport,
    pub pressure: Option<PressureCheck>,
    pub emergency: Option<EmergencyReport>,
    pub sweep: SweepReport,
}

/// Point-in-time view of the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizerStats {
    pub enabled: bool,
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub cache_entries: usize,
    pub cache_capacity: usize,
    pub heat_distribution: HeatDistribution,
    pub tracked_operations: usize,
    pub modules_known: usize,
    pub modules_loaded: usize,
    pub modules_protected: usize,
    pub scheduled_unloads: usize,
    pub loads: u64,
    pub load_failures: u64,
    pub unloads: u64,
    pub unload_refusals: u64,
    pub execution_failures: u64,
    pub emergency_sweeps: u64,
    pub time_saved_estimate_ms: f64,
    pub memory: PressureSnapshot,
}

pub struct ExecutionOptimizer {
    config: OptimizerConfig,
    memory_threshold_mb: Option<f64>,
    clock: Arc<dyn Clock>,
    heat: HeatTracker,
    cache: FastPathCache,
    modules: ModuleRegistry,
    scheduler: UnloadScheduler,
    pressure: MemoryPressureMonitor,
    probe: Option<Arc<dyn MemoryProbe>>,
    metrics: Arc<OptimizerMetrics>,
}

impl ExecutionOptimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build an optimizer reading time from `clock`.
    pub fn with_clock(config: OptimizerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let metrics = OptimizerMetrics::new();
        let mut modules = ModuleRegistry::new(config.default_policy);
        for (name, policy) in &config.module_policies {
            modules.set_policy(name, *policy);
        }

        Ok(Self {
            memory_threshold_mb: config.effective_memory_threshold_mb(),
            heat: HeatTracker::new(config.thresholds()),
            cache: FastPathCache::new(config.cache_size, Arc::clone(&metrics)),
            modules,
            scheduler: UnloadScheduler::new(),
            pressure: MemoryPressureMonitor::new(),
            probe: None,
            clock,
            metrics,
            config,
        })
    }

    /// Attach the host's memory reading function used by [`Self::maintain`].
    pub fn set_memory_probe(&mut self, probe: Arc<dyn MemoryProbe>) {
        self.probe = Some(probe);
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<OptimizerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // ------------------------------------------------------------------
    // Heat
    // ------------------------------------------------------------------

    /// Record an externally timed call of `key`.
    pub fn track_operation(
        &mut self,
        key: &str,
        duration: Duration,
        module: Option<&str>,
    ) -> HeatLevel {
        let now = self.now_ms();
        self.heat.track(key, duration, module, now).current
    }

    pub fn is_hot(&self, key: &str) -> bool {
        self.heat.is_hot(key)
    }

    pub fn heat_level(&self, key: &str) -> HeatLevel {
        self.heat.heat_level(key)
    }

    pub fn operation(&self, key: &str) -> Option<&OperationRecord> {
        self.heat.record(key)
    }

    // ------------------------------------------------------------------
    // Fast path
    // ------------------------------------------------------------------

    /// Pre-register a handler. The key is treated as HOT from now on, which
    /// also heat-protects `module` when given.
    pub fn register_fast_path(&mut self, key: &str, handler: Handler, module: Option<&str>) {
        let now = self.now_ms();
        self.heat.seed(key, HeatLevel::Hot, module, now);
        self.admit(key, handler, module, now);
    }

    /// Look up a cached handler, counting the hit or miss and refreshing its
    /// LRU position.
    pub fn get_fast_path(&mut self, key: &str) -> Option<Handler> {
        let now = self.now_ms();
        self.cache.get(key, now).map(|entry| entry.handler)
    }

    /// Whether `key` is cached, without counting a lookup.
    pub fn has_fast_path(&self, key: &str) -> bool {
        self.cache.contains(key)
    }

    /// Cached keys from least to most recently used.
    pub fn fast_path_keys(&self) -> Vec<String> {
        self.cache.lru_order()
    }

    fn admit(&mut self, key: &str, handler: Handler, module: Option<&str>, now: u64) {
        if let Some(evicted) = self
            .cache
            .insert(key, handler, module.map(str::to_string), now)
        {
            debug!(key, evicted = evicted.as_str(), "fast path admitted with eviction");
        } else {
            debug!(key, "fast path admitted");
        }
        self.heat.mark_admitted(key);
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    pub fn set_module_policy(&mut self, name: &str, policy: UnloadPolicy) {
        self.modules.set_policy(name, policy);
        if policy != UnloadPolicy::IdleTimeout {
            self.scheduler.cancel(name);
        }
    }

    pub fn module_policy(&self, name: &str) -> UnloadPolicy {
        self.modules.policy_of(name)
    }

    pub fn module(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.record(name)
    }

    pub fn is_module_loaded(&self, name: &str) -> bool {
        self.modules.is_loaded(name)
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        self.modules.loaded_modules()
    }

    pub fn scheduled_unload_due(&self, name: &str) -> Option<u64> {
        self.scheduler.get(name).map(|entry| entry.due_ms)
    }

    /// Protected by policy (NEVER_UNLOAD, CORE) or by heat. Recomputed from
    /// both sources on every call.
    pub fn should_protect_module(&self, name: &str) -> bool {
        self.modules.policy_of(name).is_pinned() || self.heat.protects(name)
    }

    /// Unload `name` unless it is protected. Returns false when refused or
    /// when the module was not loaded.
    pub fn unload(&mut self, name: &str) -> bool {
        if self.should_protect_module(name) {
            self.metrics.record_unload_refused();
            debug!(module = name, "unload refused; module is protected");
            return false;
        }
        self.release(name)
    }

    fn release(&mut self, name: &str) -> bool {
        self.scheduler.cancel(name);
        if self.modules.release(name) {
            self.metrics.record_unload();
            true
        } else {
            false
        }
    }

    /// Load `name` now if it is not loaded, without executing anything.
    pub fn preload<L>(&mut self, name: &str, loader: L) -> Result<ModuleRef>
    where
        L: FnOnce() -> anyhow::Result<ModuleRef>,
    {
        let now = self.now_ms();
        match self.modules.ensure_loaded(name, loader, now) {
            Ok(outcome) => {
                if outcome.loaded_now {
                    self.metrics.record_load();
                }
                self.modules.touch(name, now);
                Ok(outcome.module)
            }
            Err(source) => {
                self.metrics.record_load_failure();
                Err(OptimizerError::LoadFailure {
                    module: name.to_string(),
                    source,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run `key` through the cache-first protocol.
    ///
    /// A cached handler is invoked directly and `loader` is never called.
    /// Otherwise the module is loaded if needed, `executor` runs against it,
    /// heat is recorded (auto-caching the key on its first successful call at
    /// WARM or above), and the module's unload disposition is applied.
    /// Loader and executor errors are returned as [`OptimizerError::LoadFailure`]
    /// and [`OptimizerError::ExecutionFailure`] carrying the caller's error.
    pub fn execute<L, E>(
        &mut self,
        key: &str,
        module_name: &str,
        loader: L,
        executor: E,
        args: &Payload,
    ) -> Result<Payload>
    where
        L: FnOnce() -> anyhow::Result<ModuleRef>,
        E: Fn(&ModuleRef, &Payload) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        let now = self.now_ms();
        let enabled = self.config.enabled;

        if enabled && let Some(entry) = self.cache.get(key, now) {
            let source = entry.source_module.as_deref();
            return self.execute_cached(key, &entry.handler, source, args, now);
        }

        let load_start = Instant::now();
        let outcome = match self.modules.ensure_loaded(module_name, loader, now) {
            Ok(outcome) => outcome,
            Err(source) => {
                self.metrics.record_load_failure();
                if enabled {
                    self.heat
                        .track(key, load_start.elapsed(), Some(module_name), now);
                }
                warn!(key, module = module_name, error = %source, "module load failed");
                return Err(OptimizerError::LoadFailure {
                    module: module_name.to_string(),
                    source,
                });
            }
        };
        if outcome.loaded_now {
            self.metrics.record_load();
        }

        let executor = Arc::new(executor);
        let start = Instant::now();
        let result = executor(&outcome.module, args);
        let elapsed = start.elapsed();
        self.modules.touch(module_name, now);

        if enabled {
            let transition = self.heat.track(key, elapsed, Some(module_name), now);
            let admissible = transition.current >= HeatLevel::Warm
                && !self.heat.is_admitted(key)
                && !self.cache.contains(key);
            if result.is_ok() && admissible {
                let module = outcome.module.clone();
                let bound = Arc::clone(&executor);
                let handler: Handler = Arc::new(move |args: &Payload| bound(&module, args));
                self.admit(key, handler, Some(module_name), now);
            }
        }

        let disposition = self.apply_disposition(module_name, now);
        debug!(
            key,
            module = module_name,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            ?disposition,
            "operation executed"
        );

        result.map_err(|source| {
            self.metrics.record_execution_failure();
            OptimizerError::ExecutionFailure {
                key: key.to_string(),
                source,
            }
        })
    }

    fn execute_cached(
        &mut self,
        key: &str,
        handler: &Handler,
        source_module: Option<&str>,
        args: &Payload,
        now: u64,
    ) -> Result<Payload> {
        let start = Instant::now();
        let result = handler(args);
        let elapsed = start.elapsed();
        self.heat.track(key, elapsed, source_module, now);

        // the hit skipped a load whenever the module is not resident
        if let Some(module) = source_module
            && let Some(record) = self.modules.record(module)
            && !record.is_loaded()
        {
            self.metrics.record_time_saved(record.last_load_duration);
        }

        result.map_err(|source| {
            self.metrics.record_execution_failure();
            OptimizerError::ExecutionFailure {
                key: key.to_string(),
                source,
            }
        })
    }

    fn apply_disposition(&mut self, module: &str, now: u64) -> Disposition {
        if self.should_protect_module(module) {
            self.scheduler.cancel(module);
            return Disposition::Retained;
        }
        match self.modules.policy_of(module) {
            UnloadPolicy::Immediate => {
                self.release(module);
                Disposition::Unloaded
            }
            UnloadPolicy::IdleTimeout => {
                self.scheduler
                    .schedule(module, now, self.config.idle_timeout_ms);
                Disposition::Scheduled
            }
            UnloadPolicy::NeverUnload | UnloadPolicy::Core => Disposition::Retained,
        }
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Drain scheduled unloads due at `now_ms`, re-validating each one.
    ///
    /// A module used since its entry was scheduled and not yet idle for a
    /// full window is re-deferred; a protected module is skipped; anything
    /// else is unloaded.
    pub fn process_due(&mut self, now_ms: u64) -> DueReport {
        let idle_ms = self.config.idle_timeout_ms;
        let mut report = DueReport::default();

        for entry in self.scheduler.take_due(now_ms) {
            let name = entry.module_name;
            let Some(record) = self.modules.record(&name) else {
                continue;
            };
            if !record.is_loaded() {
                continue;
            }

            let last_use = record.last_use_ms;
            let idle_for = now_ms.saturating_sub(last_use);
            if last_use > entry.scheduled_at_ms && idle_for < idle_ms {
                self.scheduler.schedule(&name, last_use, idle_ms);
                debug!(module = name.as_str(), last_use, "scheduled unload deferred");
                report.deferred.push(name);
                continue;
            }

            if self.should_protect_module(&name) {
                debug!(module = name.as_str(), "scheduled unload skipped; module is protected");
                report.skipped_protected.push(name);
                continue;
            }

            if self.release(&name) {
                report.processed.push(name);
            }
        }

        report
    }

    /// `true` when `current_mb` exceeds `threshold_mb`.
    pub fn check_pressure(&self, current_mb: f64, threshold_mb: f64) -> bool {
        pressure::check_pressure(current_mb, threshold_mb)
    }

    /// Unload every loaded module that is not protected and drop fast-path
    /// entries bound from modules that are no longer resident.
    pub fn emergency_unload(&mut self) -> EmergencyReport {
        let mut report = EmergencyReport::default();

        for name in self.modules.loaded_modules() {
            if self.should_protect_module(&name) {
                report.spared.push(name);
            } else if self.release(&name) {
                report.unloaded.push(name);
            }
        }

        for module in self.cache.source_modules() {
            if self.modules.is_loaded(&module) || self.should_protect_module(&module) {
                continue;
            }
            for key in self.cache.remove_sourced_from(&module) {
                self.heat.revoke_admission(&key);
                report.invalidated.push(key);
            }
        }

        self.metrics.record_emergency_sweep();
        warn!(
            unloaded = report.unloaded.len(),
            spared = report.spared.len(),
            invalidated = report.invalidated.len(),
            "emergency unload"
        );
        report
    }

    /// Read the memory probe and compare against the configured threshold.
    /// `None` without a probe, a threshold, or a reading.
    pub fn sample_pressure(&mut self) -> Option<PressureCheck> {
        let threshold_mb = self.memory_threshold_mb?;
        let sample = self.probe.as_ref()?.sample()?;
        let triggered = self.pressure.observe(sample, threshold_mb);
        Some(PressureCheck {
            current_mb: sample.resident_mb(),
            threshold_mb,
            triggered,
        })
    }

    /// Remove stale COLD operation records that have no fast-path entry.
    pub fn optimize(&mut self) -> SweepReport {
        let now = self.now_ms();
        let cache = &self.cache;
        let report = self
            .heat
            .sweep_stale(now, self.config.staleness_window_ms, |key| cache.contains(key));
        if report.removed > 0 {
            debug!(removed = report.removed, "stale operation records swept");
        }
        report
    }

    /// Run every maintenance step for an invocation boundary: due unloads,
    /// memory pressure (with an emergency sweep when triggered), then the
    /// staleness sweep.
    pub fn maintain(&mut self) -> MaintenanceReport {
        let now = self.now_ms();
        let due = self.process_due(now);
        let pressure = self.sample_pressure();
        let emergency = pressure
            .filter(|check| check.triggered)
            .map(|_| self.emergency_unload());
        let sweep = self.optimize();

        MaintenanceReport {
            due,
            pressure,
            emergency,
            sweep,
        }
    }

    // ------------------------------------------------------------------
    // Configuration and lifecycle
    // ------------------------------------------------------------------

    /// Apply `update`. Invalid updates are rejected and the current
    /// configuration is kept.
    pub fn configure(&mut self, update: &ConfigUpdate) -> Result<OptimizerConfig> {
        let next = update.apply_to(&self.config);
        if let Err(err) = next.validate() {
            warn!(error = %err, "configuration rejected; keeping previous");
            return Err(err);
        }

        if next.thresholds() != self.config.thresholds() {
            self.heat.set_thresholds(next.thresholds());
        }
        if next.cache_size != self.config.cache_size {
            let evicted = self.cache.set_capacity(next.cache_size);
            if !evicted.is_empty() {
                debug!(evicted = evicted.len(), "fast path shrunk");
            }
        }
        if next.default_policy != self.config.default_policy {
            self.modules.set_default_policy(next.default_policy);
        }
        if next.memory_threshold_mb != self.config.memory_threshold_mb {
            self.memory_threshold_mb = next.effective_memory_threshold_mb();
        }

        info!(
            enabled = next.enabled,
            cache_size = next.cache_size,
            warm = next.warm_threshold,
            hot = next.hot_threshold,
            critical = next.critical_threshold,
            "optimizer configured"
        );
        self.config = next;
        Ok(self.config.clone())
    }

    /// Empty the fast-path cache. Heat and module state are kept.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Forget all heat, cached handlers, module records, scheduled unloads
    /// and counters. Configuration and declared policies are kept.
    pub fn reset(&mut self) {
        self.heat.clear();
        self.cache.clear();
        self.modules.clear();
        self.scheduler.clear();
        self.pressure.clear();
        self.metrics.reset();
        debug!("optimizer reset");
    }

    pub fn stats(&self) -> OptimizerStats {
        let metrics: MetricsSnapshot = self.metrics.snapshot();
        let candidates: BTreeSet<&str> = self
            .modules
            .known_names()
            .chain(self.heat.protected_modules())
            .collect();
        let modules_protected = candidates
            .into_iter()
            .filter(|name| self.should_protect_module(name))
            .count();

        OptimizerStats {
            enabled: self.config.enabled,
            hit_rate: metrics.hit_rate(),
            hits: metrics.hits,
            misses: metrics.misses,
            evictions: metrics.evictions,
            invalidations: metrics.invalidations,
            cache_entries: self.cache.len(),
            cache_capacity: self.cache.capacity(),
            heat_distribution: self.heat.distribution(),
            tracked_operations: self.heat.len(),
            modules_known: self.modules.len(),
            modules_loaded: self.modules.loaded_count(),
            modules_protected,
            scheduled_unloads: self.scheduler.len(),
            loads: metrics.loads,
            load_failures: metrics.load_failures,
            unloads: metrics.unloads,
            unload_refusals: metrics.unload_refusals,
            execution_failures: metrics.execution_failures,
            emergency_sweeps: metrics.emergency_sweeps,
            time_saved_estimate_ms: metrics.time_saved_ms,
            memory: self.pressure.snapshot(),
        }
    }
}
