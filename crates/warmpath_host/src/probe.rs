use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};
use tracing::warn;

use crate::unix_millis;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One reading of process memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySample {
    pub resident_bytes: u64,
    pub captured_at_ms: u64,
}

impl MemorySample {
    pub fn new(resident_bytes: u64, captured_at_ms: u64) -> Self {
        Self {
            resident_bytes,
            captured_at_ms,
        }
    }

    pub fn resident_mb(&self) -> f64 {
        self.resident_bytes as f64 / BYTES_PER_MB
    }
}

/// Source of memory readings used by the pressure monitor.
pub trait MemoryProbe: Send + Sync {
    /// Take a reading, or `None` when the host cannot provide one right now.
    fn sample(&self) -> Option<MemorySample>;
}

/// Reads the resident set size of the current process via `sysinfo`.
pub struct ProcessMemoryProbe {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(reason) => {
                warn!(reason, "current pid unavailable; memory probe disabled");
                None
            }
        };
        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn sample(&self) -> Option<MemorySample> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return None;
        }
        let process = system.process(pid)?;
        Some(MemorySample::new(process.memory(), unix_millis()))
    }
}

/// A probe whose reading is set by the host, for environments that report
/// memory through their own API.
#[derive(Debug, Clone, Default)]
pub struct FixedMemoryProbe {
    resident_bytes: Arc<AtomicU64>,
}

impl FixedMemoryProbe {
    pub fn new(resident_bytes: u64) -> Self {
        Self {
            resident_bytes: Arc::new(AtomicU64::new(resident_bytes)),
        }
    }

    pub fn from_mb(resident_mb: u64) -> Self {
        Self::new(resident_mb.saturating_mul(1024 * 1024))
    }

    pub fn set_bytes(&self, resident_bytes: u64) {
        self.resident_bytes.store(resident_bytes, Ordering::Relaxed);
    }

    pub fn set_mb(&self, resident_mb: u64) {
        self.set_bytes(resident_mb.saturating_mul(1024 * 1024));
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn sample(&self) -> Option<MemorySample> {
        Some(MemorySample::new(
            self.resident_bytes.load(Ordering::Relaxed),
            unix_millis(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_probe_reports_updates_through_clones() {
        let probe = FixedMemoryProbe::from_mb(64);
        let shared = probe.clone();
        shared.set_mb(200);

        let sample = probe.sample().expect("fixed probe always samples");
        assert!((sample.resident_mb() - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn oversized_readings_clamp_to_the_byte_range() {
        let probe = FixedMemoryProbe::from_mb(u64::MAX);
        let sample = probe.sample().expect("fixed probe always samples");
        assert_eq!(sample.resident_bytes, u64::MAX);

        probe.set_mb(u64::MAX / 2);
        let sample = probe.sample().expect("fixed probe always samples");
        assert_eq!(sample.resident_bytes, u64::MAX);
    }

    #[test]
    fn process_probe_sees_this_process() {
        let probe = ProcessMemoryProbe::new();
        if let Some(sample) = probe.sample() {
            assert!(sample.resident_bytes > 0);
            assert!(sample.captured_at_ms > 0);
        }
    }
}
