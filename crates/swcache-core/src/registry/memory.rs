use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheBucket, CacheStorage, CachedEntry};
use crate::config::GenerationTag;
use crate::error::Result;
use crate::http::{CacheKey, StoredResponse};

#[derive(Default)]
pub struct MemoryBucket {
    entries: RwLock<HashMap<CacheKey, CachedEntry>>,
}

#[async_trait]
impl CacheBucket for MemoryBucket {
    async fn match_key(&self, key: &CacheKey) -> Result<Option<StoredResponse>> {
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.response.clone()))
    }

    async fn put(&self, key: CacheKey, response: StoredResponse) -> Result<()> {
        let entry = CachedEntry::new(key.clone(), response);
        self.entries.write().await.insert(key, entry);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

/// Process-local registry. Buckets are kept in creation order.
#[derive(Default)]
pub struct MemoryStorage {
    buckets: RwLock<Vec<(GenerationTag, Arc<MemoryBucket>)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, tag: &GenerationTag) -> Result<Arc<dyn CacheBucket>> {
        let mut buckets = self.buckets.write().await;
        if let Some((_, bucket)) = buckets.iter().find(|(t, _)| t == tag) {
            return Ok(bucket.clone());
        }
        let bucket = Arc::new(MemoryBucket::default());
        buckets.push((tag.clone(), bucket.clone()));
        Ok(bucket)
    }

    async fn get(&self, tag: &GenerationTag) -> Result<Option<Arc<dyn CacheBucket>>> {
        Ok(self
            .buckets
            .read()
            .await
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, bucket)| bucket.clone() as Arc<dyn CacheBucket>))
    }

    async fn keys(&self) -> Result<Vec<GenerationTag>> {
        Ok(self
            .buckets
            .read()
            .await
            .iter()
            .map(|(tag, _)| tag.clone())
            .collect())
    }

    async fn delete(&self, tag: &GenerationTag) -> Result<bool> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|(t, _)| t != tag);
        Ok(buckets.len() != before)
    }
}
