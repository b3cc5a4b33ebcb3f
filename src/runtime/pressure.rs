use std::collections::VecDeque;

use serde::Serialize;
use warmpath_host::MemorySample;

/// Samples kept for reporting.
pub const DEFAULT_HISTORY: usize = 32;

/// `true` when `current_mb` is above `threshold_mb`.
pub fn check_pressure(current_mb: f64, threshold_mb: f64) -> bool {
    current_mb > threshold_mb
}

/// Records memory samples and decides when an emergency sweep is due.
#[derive(Debug)]
pub struct MemoryPressureMonitor {
    history: VecDeque<MemorySample>,
    max_history: usize,
    peak_bytes: u64,
    triggered: u64,
}

impl MemoryPressureMonitor {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    pub fn with_history(max_history: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(max_history),
            max_history: max_history.max(1),
            peak_bytes: 0,
            triggered: 0,
        }
    }

    /// Record `sample` and report whether it crosses `threshold_mb`.
    pub fn observe(&mut self, sample: MemorySample, threshold_mb: f64) -> bool {
        if self.history.len() == self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(sample);
        self.peak_bytes = self.peak_bytes.max(sample.resident_bytes);

        let triggered = check_pressure(sample.resident_mb(), threshold_mb);
        if triggered {
            self.triggered += 1;
        }
        triggered
    }

    pub fn latest(&self) -> Option<&MemorySample> {
        self.history.back()
    }

    pub fn snapshot(&self) -> PressureSnapshot {
        PressureSnapshot {
            latest_mb: self.latest().map(MemorySample::resident_mb),
            peak_mb: self.peak_bytes as f64 / (1024.0 * 1024.0),
            samples: self.history.len(),
            triggered: self.triggered,
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.peak_bytes = 0;
        self.triggered = 0;
    }
}

impl Default for MemoryPressureMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PressureSnapshot {
    pub latest_mb: Option<f64>,
    pub peak_mb: f64,
    pub samples: usize,
    pub triggered: u64,
}
