use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use tracing::{debug, warn};

use super::{HeatLevel, HeatThresholds};

/// Call statistics for a single operation key.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub call_count: u64,
    pub total_duration_ms: f64,
    pub avg_duration_ms: f64,
    pub last_call_ms: u64,
    pub last_access_ms: u64,
    pub heat_level: HeatLevel,
    pub source_module: Option<String>,
    /// Set once the key has been auto-cached; cleared when its entry is
    /// invalidated so a later successful call can re-admit it.
    #[serde(skip)]
    admitted: bool,
}

impl OperationRecord {
    fn new(now_ms: u64) -> Self {
        Self {
            call_count: 0,
            total_duration_ms: 0.0,
            avg_duration_ms: 0.0,
            last_call_ms: now_ms,
            last_access_ms: now_ms,
            heat_level: HeatLevel::Cold,
            source_module: None,
            admitted: false,
        }
    }

    pub fn is_admitted(&self) -> bool {
        self.admitted
    }
}

/// Level change produced by a single `track` or `seed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatTransition {
    pub previous: HeatLevel,
    pub current: HeatLevel,
    /// The source module became heat-protected on this observation.
    pub newly_protected: bool,
}

impl HeatTransition {
    /// True when this observation moved the key from below `level` to at or
    /// above it.
    pub fn crossed(&self, level: HeatLevel) -> bool {
        self.previous < level && self.current >= level
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeatDistribution {
    pub cold: usize,
    pub warm: usize,
    pub hot: usize,
    pub critical: usize,
}

impl HeatDistribution {
    pub fn total(&self) -> usize {
        self.cold + self.warm + self.hot + self.critical
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: usize,
    /// Records whose timestamps were ahead of the sweep clock.
    pub anomalies: usize,
}

/// Owns every [`OperationRecord`] and the set of heat-protected modules.
#[derive(Debug, Default)]
pub struct HeatTracker {
    thresholds: HeatThresholds,
    records: AHashMap<String, OperationRecord>,
    hot_modules: AHashSet<String>,
}

impl HeatTracker {
    pub fn new(thresholds: HeatThresholds) -> Self {
        Self {
            thresholds,
            records: AHashMap::new(),
            hot_modules: AHashSet::new(),
        }
    }

    pub fn thresholds(&self) -> HeatThresholds {
        self.thresholds
    }

    /// Swap thresholds and reclassify every record from its call count.
    pub fn set_thresholds(&mut self, thresholds: HeatThresholds) {
        self.thresholds = thresholds;
        for record in self.records.values_mut() {
            record.heat_level = thresholds.level_for(record.call_count);
            if record.heat_level.is_hot()
                && let Some(module) = &record.source_module
            {
                self.hot_modules.insert(module.clone());
            }
        }
    }

    /// Record one call of `key` and return how its level moved.
    pub fn track(
        &mut self,
        key: &str,
        duration: Duration,
        source_module: Option<&str>,
        now_ms: u64,
    ) -> HeatTransition {
        let record = self
            .records
            .entry(key.to_string())
            .or_insert_with(|| OperationRecord::new(now_ms));

        let previous = record.heat_level;
        let elapsed_ms = duration.as_secs_f64() * 1000.0;
        record.call_count += 1;
        record.total_duration_ms += elapsed_ms;
        record.avg_duration_ms = record.total_duration_ms / record.call_count as f64;
        record.last_call_ms = now_ms;
        record.last_access_ms = now_ms;
        record.heat_level = self.thresholds.level_for(record.call_count);
        if let Some(module) = source_module {
            record.source_module = Some(module.to_string());
        }

        let current = record.heat_level;
        let newly_protected = self.protect_if_hot(current, source_module);
        if current != previous {
            debug!(key, from = %previous, to = %current, "operation heat changed");
        }

        HeatTransition {
            previous,
            current,
            newly_protected,
        }
    }

    /// Raise `key` to at least `level` without recording a call.
    ///
    /// The call count is lifted to the level's floor so the level stays a
    /// function of the count.
    pub fn seed(
        &mut self,
        key: &str,
        level: HeatLevel,
        source_module: Option<&str>,
        now_ms: u64,
    ) -> HeatTransition {
        let floor = self.thresholds.floor_of(level);
        let record = self
            .records
            .entry(key.to_string())
            .or_insert_with(|| OperationRecord::new(now_ms));

        let previous = record.heat_level;
        record.call_count = record.call_count.max(floor);
        record.last_access_ms = now_ms;
        record.heat_level = self.thresholds.level_for(record.call_count);
        if let Some(module) = source_module {
            record.source_module = Some(module.to_string());
        }

        let current = record.heat_level;
        let newly_protected = self.protect_if_hot(current, source_module);
        HeatTransition {
            previous,
            current,
            newly_protected,
        }
    }

    fn protect_if_hot(&mut self, level: HeatLevel, source_module: Option<&str>) -> bool {
        match source_module {
            Some(module) if level.is_hot() && !self.hot_modules.contains(module) => {
                debug!(module, "module heat-protected");
                self.hot_modules.insert(module.to_string())
            }
            _ => false,
        }
    }

    pub fn heat_level(&self, key: &str) -> HeatLevel {
        self.records
            .get(key)
            .map_or(HeatLevel::Cold, |record| record.heat_level)
    }

    pub fn is_hot(&self, key: &str) -> bool {
        self.heat_level(key).is_hot()
    }

    pub fn record(&self, key: &str) -> Option<&OperationRecord> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &OperationRecord)> {
        self.records.iter().map(|(key, record)| (key.as_str(), record))
    }

    /// Whether any operation sourced from `module` has reached HOT.
    pub fn protects(&self, module: &str) -> bool {
        self.hot_modules.contains(module)
    }

    pub fn protected_modules(&self) -> impl Iterator<Item = &str> {
        self.hot_modules.iter().map(String::as_str)
    }

    pub fn is_admitted(&self, key: &str) -> bool {
        self.records.get(key).is_some_and(OperationRecord::is_admitted)
    }

    pub fn mark_admitted(&mut self, key: &str) {
        if let Some(record) = self.records.get_mut(key) {
            record.admitted = true;
        }
    }

    pub fn revoke_admission(&mut self, key: &str) {
        if let Some(record) = self.records.get_mut(key) {
            record.admitted = false;
        }
    }

    /// Drop COLD records idle for longer than `staleness_ms` that have no
    /// fast-path entry.
    pub fn sweep_stale<F>(&mut self, now_ms: u64, staleness_ms: u64, is_cached: F) -> SweepReport
    where
        F: Fn(&str) -> bool,
    {
        let mut report = SweepReport::default();
        self.records.retain(|key, record| {
            if record.heat_level != HeatLevel::Cold || is_cached(key.as_str()) {
                return true;
            }
            if record.last_access_ms > now_ms {
                warn!(
                    key = key.as_str(),
                    last_access_ms = record.last_access_ms,
                    now_ms,
                    "operation record is ahead of the sweep clock; keeping it"
                );
                report.anomalies += 1;
                return true;
            }
            let stale = now_ms - record.last_access_ms > staleness_ms;
            if stale {
                report.removed += 1;
            }
            !stale
        });
        report
    }

    pub fn distribution(&self) -> HeatDistribution {
        let mut distribution = HeatDistribution::default();
        for record in self.records.values() {
            match record.heat_level {
                HeatLevel::Cold => distribution.cold += 1,
                HeatLevel::Warm => distribution.warm += 1,
                HeatLevel::Hot => distribution.hot += 1,
                HeatLevel::Critical => distribution.critical += 1,
            }
        }
        distribution
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.hot_modules.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(2);

    fn tracker() -> HeatTracker {
        HeatTracker::new(HeatThresholds::default())
    }

    #[test]
    fn unknown_keys_are_cold() {
        let tracker = tracker();
        assert_eq!(tracker.heat_level("missing"), HeatLevel::Cold);
        assert!(!tracker.is_hot("missing"));
    }

    #[test]
    fn track_averages_durations() {
        let mut tracker = tracker();
        tracker.track("op", Duration::from_millis(10), None, 1);
        tracker.track("op", Duration::from_millis(30), None, 2);

        let record = tracker.record("op").expect("record exists");
        assert_eq!(record.call_count, 2);
        assert!((record.avg_duration_ms - 20.0).abs() < 1e-9);
        assert_eq!(record.last_call_ms, 2);
    }

    #[test]
    fn crossing_hot_protects_source_module_once() {
        let mut tracker = tracker();
        let mut protections = 0;
        for tick in 0..25 {
            let transition = tracker.track("op", MS, Some("billing"), tick);
            if transition.newly_protected {
                protections += 1;
                assert_eq!(transition.current, HeatLevel::Hot);
                assert!(transition.crossed(HeatLevel::Hot));
            }
        }
        assert_eq!(protections, 1);
        assert!(tracker.protects("billing"));
        assert!(!tracker.protects("reports"));
    }

    #[test]
    fn same_count_same_level_regardless_of_history() {
        let mut tracked = tracker();
        for tick in 0..20 {
            tracked.track("a", MS, None, tick);
        }
        let mut seeded = tracker();
        seeded.seed("a", HeatLevel::Hot, None, 0);

        assert_eq!(tracked.record("a").map(|r| r.call_count), Some(20));
        assert_eq!(seeded.record("a").map(|r| r.call_count), Some(20));
        assert_eq!(tracked.heat_level("a"), seeded.heat_level("a"));
    }

    #[test]
    fn seed_never_lowers_call_count() {
        let mut tracker = tracker();
        for tick in 0..150 {
            tracker.track("op", MS, None, tick);
        }
        tracker.seed("op", HeatLevel::Hot, None, 200);
        assert_eq!(tracker.heat_level("op"), HeatLevel::Critical);
        assert_eq!(tracker.record("op").map(|r| r.call_count), Some(150));
    }

    #[test]
    fn new_thresholds_reclassify_existing_records() {
        let mut tracker = tracker();
        for tick in 0..3 {
            tracker.track("op", MS, Some("search"), tick);
        }
        assert_eq!(tracker.heat_level("op"), HeatLevel::Cold);

        tracker.set_thresholds(HeatThresholds::new(1, 2, 3));
        assert_eq!(tracker.heat_level("op"), HeatLevel::Critical);
        assert!(tracker.protects("search"));
    }

    #[test]
    fn sweep_removes_only_idle_uncached_cold_records() {
        let mut tracker = tracker();
        tracker.track("idle", MS, None, 0);
        tracker.track("cached", MS, None, 0);
        tracker.track("recent", MS, None, 900);
        for tick in 0..5 {
            tracker.track("warm", MS, None, tick);
        }

        let report = tracker.sweep_stale(1_000, 500, |key| key == "cached");
        assert_eq!(report.removed, 1);
        assert!(tracker.record("idle").is_none());
        assert!(tracker.record("cached").is_some());
        assert!(tracker.record("recent").is_some());
        assert!(tracker.record("warm").is_some());
    }

    #[test]
    fn sweep_counts_records_from_the_future() {
        let mut tracker = tracker();
        tracker.track("skewed", MS, None, 5_000);
        let report = tracker.sweep_stale(1_000, 10, |_| false);
        assert_eq!(report, SweepReport { removed: 0, anomalies: 1 });
        assert!(tracker.record("skewed").is_some());
    }

    #[test]
    fn distribution_counts_each_level() {
        let mut tracker = tracker();
        tracker.track("cold", MS, None, 0);
        tracker.seed("warm", HeatLevel::Warm, None, 0);
        tracker.seed("hot", HeatLevel::Hot, None, 0);
        tracker.seed("critical", HeatLevel::Critical, None, 0);

        let distribution = tracker.distribution();
        assert_eq!(
            distribution,
            HeatDistribution {
                cold: 1,
                warm: 1,
                hot: 1,
                critical: 1
            }
        );
        assert_eq!(distribution.total(), tracker.len());
    }
}
