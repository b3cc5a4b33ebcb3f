use ahash::AHashMap;
use serde::Serialize;

/// A pending, conditional unload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledUnload {
    pub module_name: String,
    pub due_ms: u64,
    /// When the entry was created or last refreshed.
    pub scheduled_at_ms: u64,
}

/// Outcome of one pass over due entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DueReport {
    /// Modules actually unloaded.
    pub processed: Vec<String>,
    /// Modules used since scheduling, pushed back by one idle window.
    pub deferred: Vec<String>,
    /// Modules that were protected when the entry fired.
    pub skipped_protected: Vec<String>,
}

impl DueReport {
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty() && self.deferred.is_empty() && self.skipped_protected.is_empty()
    }
}

/// Queue of idle-timeout unloads, one entry per module.
///
/// Entries are advisory: whoever drains them re-validates idle time and
/// protection before unloading.
#[derive(Debug, Default)]
pub struct UnloadScheduler {
    entries: AHashMap<String, ScheduledUnload>,
}

impl UnloadScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or refresh the entry for `module` at `now_ms + idle_ms`.
    pub fn schedule(&mut self, module: &str, now_ms: u64, idle_ms: u64) {
        let entry = ScheduledUnload {
            module_name: module.to_string(),
            due_ms: now_ms.saturating_add(idle_ms),
            scheduled_at_ms: now_ms,
        };
        self.entries.insert(module.to_string(), entry);
    }

    pub fn cancel(&mut self, module: &str) -> bool {
        self.entries.remove(module).is_some()
    }

    pub fn get(&self, module: &str) -> Option<&ScheduledUnload> {
        self.entries.get(module)
    }

    /// Remove and return every entry due at `now_ms`, earliest first.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<ScheduledUnload> {
        let mut due: Vec<ScheduledUnload> = self
            .entries
            .values()
            .filter(|entry| entry.due_ms <= now_ms)
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.due_ms
                .cmp(&b.due_ms)
                .then_with(|| a.module_name.cmp(&b.module_name))
        });
        for entry in &due {
            self.entries.remove(&entry.module_name);
        }
        due
    }

    /// Earliest pending due time.
    pub fn next_due(&self) -> Option<u64> {
        self.entries.values().map(|entry| entry.due_ms).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
