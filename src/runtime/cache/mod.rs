// Fast-path handler cache
pub mod eviction;
pub mod fast_path_cache;
pub mod metadata;

pub use eviction::{EvictionPolicy, LruEvictionPolicy};
pub use fast_path_cache::FastPathCache;
pub use metadata::CacheMetadata;

use std::fmt;

use super::Handler;

/// Cache entry for a directly invocable operation.
#[derive(Clone)]
pub struct CachedHandler {
    pub handler: Handler,
    /// Module the handler was bound from, if any.
    pub source_module: Option<String>,
    pub metadata: CacheMetadata,
}

impl CachedHandler {
    pub fn new(handler: Handler, source_module: Option<String>, now_ms: u64) -> Self {
        Self {
            handler,
            source_module,
            metadata: CacheMetadata::new(now_ms),
        }
    }

    pub fn is_sourced_from(&self, module: &str) -> bool {
        self.source_module.as_deref() == Some(module)
    }
}

impl fmt::Debug for CachedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedHandler")
            .field("source_module", &self.source_module)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
