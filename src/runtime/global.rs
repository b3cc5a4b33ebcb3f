//! Process-wide optimizer instance shared across invocations of a warm
//! container.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

use super::optimizer::ExecutionOptimizer;
use crate::config::OptimizerConfig;
use crate::error::Result;

static OPTIMIZER: OnceCell<Mutex<ExecutionOptimizer>> = OnceCell::new();

/// Create the process instance from `config` on first call. Later calls
/// ignore `config` and return the existing instance.
pub fn init(config: OptimizerConfig) -> Result<&'static Mutex<ExecutionOptimizer>> {
    OPTIMIZER.get_or_try_init(|| {
        debug!(cache_size = config.cache_size, "initialising process optimizer");
        ExecutionOptimizer::new(config).map(Mutex::new)
    })
}

/// [`init`] with defaults overlaid by `WARMPATH_*` environment variables.
pub fn init_from_env() -> Result<&'static Mutex<ExecutionOptimizer>> {
    init(OptimizerConfig::from_env())
}

/// The process instance, if [`init`] has run.
pub fn optimizer() -> Option<&'static Mutex<ExecutionOptimizer>> {
    OPTIMIZER.get()
}
