use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{OptimizerError, Result};
use crate::runtime::{HeatThresholds, UnloadPolicy};

pub const ENV_ENABLED: &str = "WARMPATH_ENABLED";
pub const ENV_CACHE_SIZE: &str = "WARMPATH_CACHE_SIZE";
pub const ENV_WARM_THRESHOLD: &str = "WARMPATH_WARM_THRESHOLD";
pub const ENV_HOT_THRESHOLD: &str = "WARMPATH_HOT_THRESHOLD";
pub const ENV_CRITICAL_THRESHOLD: &str = "WARMPATH_CRITICAL_THRESHOLD";
pub const ENV_IDLE_TIMEOUT_MS: &str = "WARMPATH_IDLE_TIMEOUT_MS";
pub const ENV_MEMORY_THRESHOLD_MB: &str = "WARMPATH_MEMORY_THRESHOLD_MB";

/// Tunables for the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// When false, calls bypass the fast path and heat tracking entirely.
    pub enabled: bool,
    pub cache_size: usize,
    pub warm_threshold: u64,
    pub hot_threshold: u64,
    pub critical_threshold: u64,
    /// Idle window before an IDLE_TIMEOUT module is unloaded.
    pub idle_timeout_ms: u64,
    /// COLD operation records idle for longer than this are swept.
    pub staleness_window_ms: u64,
    /// Resident memory that forces an emergency sweep. Falls back to a share
    /// of the host allotment when unset.
    pub memory_threshold_mb: Option<f64>,
    pub default_policy: UnloadPolicy,
    pub module_policies: BTreeMap<String, UnloadPolicy>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let thresholds = HeatThresholds::default();
        Self {
            enabled: true,
            cache_size: 100,
            warm_threshold: thresholds.warm,
            hot_threshold: thresholds.hot,
            critical_threshold: thresholds.critical,
            idle_timeout_ms: 30_000,
            staleness_window_ms: 300_000,
            memory_threshold_mb: None,
            default_policy: UnloadPolicy::IdleTimeout,
            module_policies: BTreeMap::new(),
        }
    }
}

impl OptimizerConfig {
    /// Defaults overlaid with `WARMPATH_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_with(|var| env::var(var).ok());
        config
    }

    /// Defaults, then the file at `path` (if any), then the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|var| env::var(var).ok());
        config
            .validate()
            .map_err(|err| anyhow::anyhow!("{err} (after applying environment overrides)"))?;
        Ok(config)
    }

    #[cfg(feature = "toml-config")]
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    #[cfg(not(feature = "toml-config"))]
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        anyhow::bail!(
            "cannot read {}: built without the `toml-config` feature",
            path.display()
        )
    }

    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment values read through `lookup`. Malformed values
    /// are logged and skipped.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_var(&lookup, ENV_ENABLED) {
            self.enabled = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_CACHE_SIZE) {
            self.cache_size = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_WARM_THRESHOLD) {
            self.warm_threshold = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_HOT_THRESHOLD) {
            self.hot_threshold = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_CRITICAL_THRESHOLD) {
            self.critical_threshold = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_IDLE_TIMEOUT_MS) {
            self.idle_timeout_ms = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_MEMORY_THRESHOLD_MB) {
            self.memory_threshold_mb = Some(value);
        }
    }

    pub fn thresholds(&self) -> HeatThresholds {
        HeatThresholds::new(
            self.warm_threshold,
            self.hot_threshold,
            self.critical_threshold,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_size == 0 {
            return Err(OptimizerError::InvalidConfig(
                "cache_size must be greater than zero".into(),
            ));
        }
        if !self.thresholds().is_valid() {
            return Err(OptimizerError::InvalidConfig(format!(
                "heat thresholds must satisfy 0 < warm < hot < critical (got {}/{}/{})",
                self.warm_threshold, self.hot_threshold, self.critical_threshold
            )));
        }
        if let Some(mb) = self.memory_threshold_mb
            && !(mb.is_finite() && mb > 0.0)
        {
            return Err(OptimizerError::InvalidConfig(format!(
                "memory_threshold_mb must be a positive number (got {mb})"
            )));
        }
        Ok(())
    }

    /// Threshold to compare samples against, if one is known.
    pub fn effective_memory_threshold_mb(&self) -> Option<f64> {
        self.memory_threshold_mb.or_else(|| {
            warmpath_host::host_memory_limit_mb().map(warmpath_host::default_threshold_mb)
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(var)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var, value = %raw, "ignoring malformed configuration value");
            None
        }
    }
}

/// Partial configuration change; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub enabled: Option<bool>,
    pub cache_size: Option<usize>,
    pub warm_threshold: Option<u64>,
    pub hot_threshold: Option<u64>,
    pub critical_threshold: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub staleness_window_ms: Option<u64>,
    pub memory_threshold_mb: Option<f64>,
    pub default_policy: Option<UnloadPolicy>,
}

impl ConfigUpdate {
    pub fn apply_to(&self, base: &OptimizerConfig) -> OptimizerConfig {
        let mut next = base.clone();
        if let Some(enabled) = self.enabled {
            next.enabled = enabled;
        }
        if let Some(cache_size) = self.cache_size {
            next.cache_size = cache_size;
        }
        if let Some(warm) = self.warm_threshold {
            next.warm_threshold = warm;
        }
        if let Some(hot) = self.hot_threshold {
            next.hot_threshold = hot;
        }
        if let Some(critical) = self.critical_threshold {
            next.critical_threshold = critical;
        }
        if let Some(idle) = self.idle_timeout_ms {
            next.idle_timeout_ms = idle;
        }
        if let Some(window) = self.staleness_window_ms {
            next.staleness_window_ms = window;
        }
        if let Some(mb) = self.memory_threshold_mb {
            next.memory_threshold_mb = Some(mb);
        }
        if let Some(policy) = self.default_policy {
            next.default_policy = policy;
        }
        next
    }
}
