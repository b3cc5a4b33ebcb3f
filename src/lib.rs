//! Fast-path heat cache and module lifecycle management for warm function
//! containers.
//!
//! [`ExecutionOptimizer`] routes each operation through a bounded LRU of
//! directly invocable handlers, tracks per-operation heat, and decides when
//! the modules behind those operations are loaded and released.

pub mod cli;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod runtime;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigUpdate, OptimizerConfig};
pub use dispatch::{Dispatcher, Route};
pub use error::{OptimizerError, Result};
pub use runtime::{
    ExecutionOptimizer, HeatLevel, MaintenanceReport, OptimizerStats, UnloadPolicy, global,
    handler, module_ref,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
