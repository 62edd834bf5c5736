use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{BackgroundEvent, ServiceWorker};
use crate::config::GenerationTag;
use crate::error::{CacheError, Result};
use crate::http::{CacheKey, Request, Response, ResponseType, StoredResponse};
use crate::registry::CacheStorage;

/// Status code eligible for opportunistic caching.
const CACHEABLE_STATUS: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs its default network behavior
    /// with the untouched request.
    PassThrough(Request),
    Responded {
        response: Response,
        source: ResponseSource,
    },
}

impl FetchOutcome {
    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::PassThrough(_) => None,
            FetchOutcome::Responded { source, .. } => Some(*source),
        }
    }
}

impl ServiceWorker {
    /// Cache-first handling of one outgoing request.
    ///
    /// Non-GET and cross-origin requests, and any request arriving while
    /// this generation is not serving, are handed back untouched. Otherwise
    /// a cache hit is returned with no network round-trip; a miss goes to
    /// the network and, for a 200 `Basic` response, one duplicate is written
    /// to the bucket in the background while the other goes to the caller.
    ///
    /// Transport errors on a miss are returned to the caller unchanged.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchOutcome> {
        if !request.method.is_read() {
            debug!(method = %request.method, "Skipping non-GET request");
            return Ok(FetchOutcome::PassThrough(request));
        }
        if !request.is_same_origin(&self.config.origin) {
            debug!(url = %CacheError::truncate_url(request.url.as_str()), "Skipping cross-origin request");
            return Ok(FetchOutcome::PassThrough(request));
        }
        if !self.state().await.is_serving() {
            return Ok(FetchOutcome::PassThrough(request));
        }

        let key = request.cache_key();
        if let Some(response) = self.lookup(&key).await {
            debug!(key = %key, "Cache hit");
            return Ok(FetchOutcome::Responded {
                response,
                source: ResponseSource::Cache,
            });
        }
        debug!(key = %key, "Cache miss");

        // The caller keeps its request; the network gets a copy.
        let network_request = request.duplicate()?;
        let response = self.fetcher.fetch(network_request).await?;

        if !Self::is_cacheable(&response) {
            debug!(key = %key, status = response.status, kind = ?response.kind, redirected = response.redirected, "Not caching response");
            return Ok(FetchOutcome::Responded {
                response,
                source: ResponseSource::Network,
            });
        }

        let to_cache = response.duplicate()?;
        self.spawn_cache_write(key, to_cache);

        Ok(FetchOutcome::Responded {
            response,
            source: ResponseSource::Network,
        })
    }

    /// Only a direct 200 `Basic` body may be stored under the request's key.
    /// A redirected response belongs to a different URL.
    pub fn is_cacheable(response: &Response) -> bool {
        response.status == CACHEABLE_STATUS
            && response.kind == ResponseType::Basic
            && !response.redirected
    }

    /// Look `key` up in the current generation's bucket. Storage errors and
    /// unreadable entries count as misses.
    async fn lookup(&self, key: &CacheKey) -> Option<Response> {
        let stored = match self.storage.get(self.generation()).await {
            Ok(Some(bucket)) => bucket.match_key(key).await,
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match stored.and_then(|found| found.map(|s| s.to_response()).transpose()) {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed, falling back to network");
                None
            }
        }
    }

    /// Detach the write so the caller's response never waits on storage.
    fn spawn_cache_write(&self, key: CacheKey, response: Response) {
        let storage = Arc::clone(&self.storage);
        let tag = self.generation().clone();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let event = match write_entry(storage, &tag, key.clone(), response).await {
                Ok(()) => {
                    debug!(key = %key, generation = %tag, "Cached response");
                    BackgroundEvent::CacheWriteSucceeded { key }
                }
                Err(e) => {
                    error!(key = %key, generation = %tag, error = %e, "Background cache write failed");
                    BackgroundEvent::CacheWriteFailed {
                        key,
                        error: e.to_string(),
                    }
                }
            };
            send_event(&tx, event);
        });
    }
}

async fn write_entry(
    storage: Arc<dyn CacheStorage>,
    tag: &GenerationTag,
    key: CacheKey,
    response: Response,
) -> Result<()> {
    let stored: StoredResponse = response.into_stored()?;
    // Never resurrect a generation that has been garbage collected.
    let bucket = storage
        .get(tag)
        .await?
        .ok_or_else(|| CacheError::BucketMissing(tag.to_string()))?;
    bucket.put(key, stored).await
}

/// Helper to report background results, logging instead of blocking when
/// nobody is listening.
fn send_event(tx: &mpsc::Sender<BackgroundEvent>, event: BackgroundEvent) {
    if let Err(e) = tx.try_send(event) {
        debug!(error = %e, "Background event not delivered");
    }
}
