//! Host-facing memory readings for the warm-path optimizer.
//!
//! The optimizer never inspects the process itself; it asks a
//! [`MemoryProbe`] supplied by the host. [`ProcessMemoryProbe`] reads the
//! resident set size of the current process, [`FixedMemoryProbe`] replays a
//! value the host (or a test) sets explicitly.

mod limits;
mod probe;

pub use limits::{
    DEFAULT_THRESHOLD_RATIO, HOST_MEMORY_ENV, LAMBDA_MEMORY_ENV, default_threshold_mb,
    host_memory_limit_mb,
};
pub use probe::{FixedMemoryProbe, MemoryProbe, MemorySample, ProcessMemoryProbe};

pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
