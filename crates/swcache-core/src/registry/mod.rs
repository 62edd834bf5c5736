//! Cache generation registry.
//!
//! Maps a `GenerationTag` to a named bucket of stored responses. Two
//! backends are provided:
//! - `MemoryStorage`: process-local, used by tests and short-lived runs
//! - `DiskStorage`: persisted under the cache directory, survives restarts
//!
//! Opening a tag is idempotent: the same tag always yields a handle to the
//! same underlying bucket. Buckets live until explicitly deleted.

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GenerationTag;
use crate::error::Result;
use crate::http::{CacheKey, StoredResponse};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// One stored request/response pair with the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub key: CacheKey,
    pub response: StoredResponse,
    pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn new(key: CacheKey, response: StoredResponse) -> Self {
        Self {
            key,
            response,
            cached_at: Utc::now(),
        }
    }
}

/// A single generation's key-value store.
#[async_trait]
pub trait CacheBucket: Send + Sync {
    async fn match_key(&self, key: &CacheKey) -> Result<Option<StoredResponse>>;

    /// Insert or replace the entry for `key`.
    async fn put(&self, key: CacheKey, response: StoredResponse) -> Result<()>;

    /// Returns whether an entry was removed.
    async fn delete(&self, key: &CacheKey) -> Result<bool>;

    async fn keys(&self) -> Result<Vec<CacheKey>>;
}

/// The registry of generation buckets.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open (creating if needed) the bucket for `tag`.
    async fn open(&self, tag: &GenerationTag) -> Result<Arc<dyn CacheBucket>>;

    /// Existing bucket for `tag`, without creating one.
    async fn get(&self, tag: &GenerationTag) -> Result<Option<Arc<dyn CacheBucket>>>;

    async fn keys(&self) -> Result<Vec<GenerationTag>>;

    /// Drop a bucket and everything in it. Returns whether it existed.
    async fn delete(&self, tag: &GenerationTag) -> Result<bool>;

    async fn has(&self, tag: &GenerationTag) -> Result<bool> {
        Ok(self.keys().await?.contains(tag))
    }

    /// First match for `key` across every bucket, in `keys()` order.
    async fn match_any(&self, key: &CacheKey) -> Result<Option<StoredResponse>> {
        for tag in self.keys().await? {
            if let Some(bucket) = self.get(&tag).await? {
                if let Some(found) = bucket.match_key(key).await? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }
}
