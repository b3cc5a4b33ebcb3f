use serde::Serialize;

/// Bookkeeping for a cached handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheMetadata {
    pub inserted_at_ms: u64,
    pub last_accessed_ms: u64,
    pub access_count: u64,
}

impl CacheMetadata {
    pub fn new(now_ms: u64) -> Self {
        Self {
            inserted_at_ms: now_ms,
            last_accessed_ms: now_ms,
            access_count: 0,
        }
    }

    pub fn record_access(&mut self, now_ms: u64) {
        self.last_accessed_ms = self.last_accessed_ms.max(now_ms);
        self.access_count += 1;
    }
}
