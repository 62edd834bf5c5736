use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use super::{LifecycleState, ServiceWorker};
use crate::error::{CacheError, Result};
use crate::http::{CacheKey, Credentials, Request, RequestMode};
use crate::registry::CacheBucket;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallFailure {
    pub url: String,
    pub error: String,
}

/// What the install pass managed to pre-cache.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<InstallFailure>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl ServiceWorker {
    /// Pre-cache the asset manifest into this generation's bucket.
    ///
    /// Every entry is attempted concurrently and independently: a failed
    /// asset is logged and recorded in the report, never aborting the rest.
    /// Only failing to open the bucket at all fails the install, which makes
    /// this worker redundant.
    pub async fn install(&self) -> Result<InstallReport> {
        self.advance(LifecycleState::Parsed).await?;

        let bucket = match self.storage.open(self.generation()).await {
            Ok(bucket) => bucket,
            Err(e) => {
                warn!(generation = %self.generation(), error = %e, "Failed to open cache");
                self.supersede().await;
                return Err(e);
            }
        };
        info!(generation = %self.generation(), "Opened cache");

        let results = join_all(
            self.config
                .manifest
                .iter()
                .map(|path| self.install_asset(&bucket, path)),
        )
        .await;

        let mut report = InstallReport::default();
        for result in results {
            match result {
                Ok(url) => report.cached.push(url),
                Err((url, e)) => {
                    warn!(url = %url, error = %e, "Failed to cache");
                    report.failed.push(InstallFailure {
                        url,
                        error: e.to_string(),
                    });
                }
            }
        }

        // Activate as soon as installed instead of waiting for old clients
        // to close.
        self.skip_waiting.store(true, Ordering::SeqCst);
        self.advance(LifecycleState::Installing).await?;

        info!(
            generation = %self.generation(),
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Install complete"
        );
        Ok(report)
    }

    async fn install_asset(
        &self,
        bucket: &Arc<dyn CacheBucket>,
        logical_path: &str,
    ) -> std::result::Result<String, (String, CacheError)> {
        let full_path = self.resolver.resolve(logical_path);
        let url = self
            .resolver
            .resolve_url(logical_path)
            .map_err(|e| (full_path.clone(), e))?;
        let display = url.to_string();

        let request = Request::get(url.clone())
            .with_credentials(Credentials::SameOrigin)
            .with_mode(RequestMode::NoCors);

        let response = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| (display.clone(), e))?;
        if !response.ok() {
            return Err((display, CacheError::HttpStatus(response.status)));
        }

        let stored = response.into_stored().map_err(|e| (display.clone(), e))?;
        bucket
            .put(CacheKey::get(&url), stored)
            .await
            .map_err(|e| (display.clone(), e))?;
        Ok(display)
    }
}
