//! Named modules, their unload policies and loaded references.

mod policy;
mod registry;

pub use policy::{ParsePolicyError, UnloadPolicy};
pub use registry::{LoadOutcome, ModuleRecord, ModuleRegistry};
