use std::fmt;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use tracing::debug;

use super::UnloadPolicy;
use crate::runtime::ModuleRef;

/// Lifecycle state of one named module.
///
/// The record outlives unloads so policy and load history survive until a
/// full reset.
pub struct ModuleRecord {
    pub name: String,
    pub policy: UnloadPolicy,
    pub last_use_ms: u64,
    pub loaded_at_ms: Option<u64>,
    pub load_count: u64,
    pub last_load_duration: Duration,
    reference: Option<ModuleRef>,
}

impl ModuleRecord {
    fn new(name: &str, policy: UnloadPolicy, now_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            policy,
            last_use_ms: now_ms,
            loaded_at_ms: None,
            load_count: 0,
            last_load_duration: Duration::ZERO,
            reference: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.reference.is_some()
    }

    pub fn reference(&self) -> Option<&ModuleRef> {
        self.reference.as_ref()
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("is_loaded", &self.is_loaded())
            .field("last_use_ms", &self.last_use_ms)
            .field("load_count", &self.load_count)
            .finish_non_exhaustive()
    }
}

/// Result of asking the registry for a module.
pub struct LoadOutcome {
    pub module: ModuleRef,
    /// The loader ran during this request.
    pub loaded_now: bool,
}

/// Sole owner of module records and loaded references.
#[derive(Default)]
pub struct ModuleRegistry {
    records: AHashMap<String, ModuleRecord>,
    declared: AHashMap<String, UnloadPolicy>,
    default_policy: UnloadPolicy,
}

impl ModuleRegistry {
    pub fn new(default_policy: UnloadPolicy) -> Self {
        Self {
            records: AHashMap::new(),
            declared: AHashMap::new(),
            default_policy,
        }
    }

    /// Applies to modules without a declared policy, including existing
    /// records that were created under the old default.
    pub fn set_default_policy(&mut self, policy: UnloadPolicy) {
        self.default_policy = policy;
        for record in self.records.values_mut() {
            if !self.declared.contains_key(&record.name) {
                record.policy = policy;
            }
        }
    }

    /// Declare the policy for `name`, before or after its first load.
    pub fn set_policy(&mut self, name: &str, policy: UnloadPolicy) {
        self.declared.insert(name.to_string(), policy);
        if let Some(record) = self.records.get_mut(name) {
            record.policy = policy;
        }
    }

    pub fn policy_of(&self, name: &str) -> UnloadPolicy {
        self.declared
            .get(name)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Return the loaded reference for `name`, running `loader` only when the
    /// module is not currently loaded.
    pub fn ensure_loaded<L>(
        &mut self,
        name: &str,
        loader: L,
        now_ms: u64,
    ) -> anyhow::Result<LoadOutcome>
    where
        L: FnOnce() -> anyhow::Result<ModuleRef>,
    {
        if let Some(module) = self.records.get(name).and_then(ModuleRecord::reference) {
            return Ok(LoadOutcome {
                module: module.clone(),
                loaded_now: false,
            });
        }

        let start = Instant::now();
        let module = loader()?;
        let duration = start.elapsed();

        let policy = self.policy_of(name);
        let record = self
            .records
            .entry(name.to_string())
            .or_insert_with(|| ModuleRecord::new(name, policy, now_ms));
        record.reference = Some(module.clone());
        record.loaded_at_ms = Some(now_ms);
        record.last_use_ms = now_ms;
        record.load_count += 1;
        record.last_load_duration = duration;

        debug!(
            module = name,
            load_ms = duration.as_secs_f64() * 1000.0,
            loads = record.load_count,
            "module loaded"
        );

        Ok(LoadOutcome {
            module,
            loaded_now: true,
        })
    }

    pub fn touch(&mut self, name: &str, now_ms: u64) {
        if let Some(record) = self.records.get_mut(name) {
            record.last_use_ms = record.last_use_ms.max(now_ms);
        }
    }

    /// Drop the loaded reference for `name`. Protection is the caller's
    /// concern; returns false when nothing was loaded.
    pub fn release(&mut self, name: &str) -> bool {
        let Some(record) = self.records.get_mut(name) else {
            return false;
        };
        if record.reference.take().is_none() {
            return false;
        }
        record.loaded_at_ms = None;
        debug!(module = name, "module unloaded");
        true
    }

    pub fn record(&self, name: &str) -> Option<&ModuleRecord> {
        self.records.get(name)
    }

    /// Every module with a record or a declared policy. May repeat names.
    pub fn known_names(&self) -> impl Iterator<Item = &str> {
        self.records
            .keys()
            .chain(self.declared.keys())
            .map(String::as_str)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.records.get(name).is_some_and(ModuleRecord::is_loaded)
    }

    /// Names of loaded modules, sorted.
    pub fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .values()
            .filter(|record| record.is_loaded())
            .map(|record| record.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn loaded_count(&self) -> usize {
        self.records.values().filter(|r| r.is_loaded()).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forget every record. Declared policies survive.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
