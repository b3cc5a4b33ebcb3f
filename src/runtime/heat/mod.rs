//! Per-operation call accounting and heat classification.

mod level;
mod tracker;

pub use level::{HeatLevel, HeatThresholds};
pub use tracker::{HeatDistribution, HeatTracker, HeatTransition, OperationRecord, SweepReport};
