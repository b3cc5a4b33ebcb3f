use std::env;

use tracing::warn;

/// Memory allotment exported by the AWS Lambda runtime, in megabytes.
pub const LAMBDA_MEMORY_ENV: &str = "AWS_LAMBDA_FUNCTION_MEMORY_SIZE";

/// Explicit override for hosts that do not export a Lambda-style variable.
pub const HOST_MEMORY_ENV: &str = "WARMPATH_HOST_MEMORY_MB";

/// Share of the host allotment at which an emergency sweep is forced.
pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.8;

/// The memory allotment of the current function container, if the host
/// advertises one.
pub fn host_memory_limit_mb() -> Option<u64> {
    for var in [HOST_MEMORY_ENV, LAMBDA_MEMORY_ENV] {
        let Ok(raw) = env::var(var) else {
            continue;
        };
        match raw.trim().parse::<u64>() {
            Ok(mb) if mb > 0 => return Some(mb),
            _ => warn!(var, value = %raw, "ignoring malformed memory limit"),
        }
    }
    None
}

/// Pressure threshold derived from a host allotment.
pub fn default_threshold_mb(limit_mb: u64) -> f64 {
    limit_mb as f64 * DEFAULT_THRESHOLD_RATIO
}
