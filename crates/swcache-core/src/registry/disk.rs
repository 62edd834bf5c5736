//! Persistent registry backed by the filesystem.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<hex(tag)>/<sha256(key)>.json
//! ```
//!
//! Bucket directories are named by the hex-encoded tag so any tag string
//! round-trips through `keys()`. Each entry file holds a `CachedEntry`.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CacheBucket, CacheStorage, CachedEntry};
use crate::config::GenerationTag;
use crate::error::{CacheError, Result};
use crate::http::{CacheKey, StoredResponse};

const ENTRY_EXTENSION: &str = "json";

pub struct DiskBucket {
    dir: PathBuf,
    deleted: AtomicBool,
}

impl DiskBucket {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            deleted: AtomicBool::new(false),
        }
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let digest = Sha256::digest(key.to_string().as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    async fn load(&self, path: &Path) -> Result<Option<CachedEntry>> {
        match fs::read(path).await {
            Ok(contents) => Ok(Some(serde_json::from_slice(&contents)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Write to a private temp file in the bucket directory, then rename it
    /// over `path`. Readers never see a partial entry and concurrent writers
    /// of one key never share a temp file; the last rename wins.
    async fn write_atomic(&self, path: PathBuf, contents: Vec<u8>) -> Result<()> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&contents)?;
            tmp.persist(&path).map_err(|e| CacheError::Storage(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Storage(std::io::Error::other(e)))?
    }

    /// Remove a just-written entry, and the directory once it is empty.
    async fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to discard late cache entry");
            }
        }
        // Fails harmlessly while other writes are still landing.
        let _ = fs::remove_dir(&self.dir).await;
    }
}

#[async_trait]
impl CacheBucket for DiskBucket {
    async fn match_key(&self, key: &CacheKey) -> Result<Option<StoredResponse>> {
        let Some(entry) = self.load(&self.entry_path(key)).await? else {
            return Ok(None);
        };
        // Guard against digest collisions.
        if entry.key != *key {
            return Ok(None);
        }
        Ok(Some(entry.response))
    }

    async fn put(&self, key: CacheKey, response: StoredResponse) -> Result<()> {
        // A handle outliving its bucket must not recreate the directory.
        if self.is_deleted() {
            debug!(key = %key, "Dropping write to deleted bucket");
            return Ok(());
        }

        fs::create_dir_all(&self.dir).await?;
        let path = self.entry_path(&key);
        let contents = serde_json::to_vec_pretty(&CachedEntry::new(key.clone(), response))?;
        self.write_atomic(path.clone(), contents).await?;

        // The bucket may have been collected while this write was in flight.
        if self.is_deleted() {
            debug!(key = %key, "Bucket deleted during write, discarding entry");
            self.discard(&path).await;
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match self.load(&path).await {
                Ok(Some(entry)) => keys.push(entry.key),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Filesystem registry. Handles are memoized per tag so `open` returns the
/// same `Arc` for the lifetime of this storage.
pub struct DiskStorage {
    root: PathBuf,
    handles: Mutex<HashMap<GenerationTag, Arc<DiskBucket>>>,
}

impl DiskStorage {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            handles: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, tag: &GenerationTag) -> PathBuf {
        self.root.join(hex::encode(tag.as_str()))
    }

    fn tag_from_dir_name(name: &str) -> Option<GenerationTag> {
        let bytes = hex::decode(name).ok()?;
        String::from_utf8(bytes).ok().map(GenerationTag::new)
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, tag: &GenerationTag) -> Result<Arc<dyn CacheBucket>> {
        let mut handles = self.handles.lock().await;
        if let Some(bucket) = handles.get(tag) {
            return Ok(bucket.clone());
        }
        let dir = self.bucket_dir(tag);
        fs::create_dir_all(&dir).await?;
        let bucket = Arc::new(DiskBucket::new(dir));
        handles.insert(tag.clone(), bucket.clone());
        Ok(bucket)
    }

    async fn get(&self, tag: &GenerationTag) -> Result<Option<Arc<dyn CacheBucket>>> {
        let mut handles = self.handles.lock().await;
        if let Some(bucket) = handles.get(tag) {
            return Ok(Some(bucket.clone() as Arc<dyn CacheBucket>));
        }
        let dir = self.bucket_dir(tag);
        if !fs::try_exists(&dir).await? {
            return Ok(None);
        }
        // Bucket persisted by an earlier process.
        let bucket = Arc::new(DiskBucket::new(dir));
        handles.insert(tag.clone(), bucket.clone());
        Ok(Some(bucket as Arc<dyn CacheBucket>))
    }

    async fn keys(&self) -> Result<Vec<GenerationTag>> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut tags = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            let name = item.file_name();
            match name.to_str().and_then(Self::tag_from_dir_name) {
                Some(tag) => tags.push(tag),
                None => debug!(dir = ?name, "Ignoring foreign directory in cache root"),
            }
        }
        tags.sort();
        Ok(tags)
    }

    async fn delete(&self, tag: &GenerationTag) -> Result<bool> {
        let mut handles = self.handles.lock().await;
        if let Some(bucket) = handles.remove(tag) {
            bucket.deleted.store(true, Ordering::SeqCst);
        }
        match fs::remove_dir_all(self.bucket_dir(tag)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Storage(e)),
        }
    }
}
