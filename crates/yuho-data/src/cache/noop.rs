//! Pass-through store used when caching is disabled.

use super::{CacheEntry, CacheKey, CacheStats, DocumentListStore};
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};

/// Store that keeps nothing; every lookup is a miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

impl DocumentListStore for NoopStore {
    fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(None)
    }

    fn put(&self, _key: &CacheKey, _entry: &CacheEntry) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        Ok(0)
    }

    fn sweep_expired(&self, _ttl: Duration, _now: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }

    fn stats(&self) -> Result<CacheStats> {
        Ok(CacheStats::default())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}
