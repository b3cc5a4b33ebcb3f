//! Fast-path heat cache and module lifecycle management.

pub mod cache;
pub mod global;
pub mod heat;
pub mod metrics;
pub mod module;
pub mod optimizer;
pub mod pressure;
pub mod scheduler;

pub use heat::{HeatLevel, HeatThresholds};
pub use metrics::{MetricsSnapshot, OptimizerMetrics};
pub use module::UnloadPolicy;
pub use optimizer::{ExecutionOptimizer, MaintenanceReport, OptimizerStats};

use std::any::Any;
use std::sync::Arc;

/// Request and response payloads passed through handlers.
pub type Payload = serde_json::Value;

/// A loaded module, as produced by a caller-supplied loader.
pub type ModuleRef = Arc<dyn Any + Send + Sync>;

/// A directly invocable operation.
pub type Handler = Arc<dyn Fn(&Payload) -> anyhow::Result<Payload> + Send + Sync>;

/// Box a closure as a [`Handler`].
pub fn handler<F>(func: F) -> Handler
where
    F: Fn(&Payload) -> anyhow::Result<Payload> + Send + Sync + 'static,
{
    Arc::new(func)
}

/// Box a value as a [`ModuleRef`].
pub fn module_ref<T>(module: T) -> ModuleRef
where
    T: Any + Send + Sync,
{
    Arc::new(module)
}
