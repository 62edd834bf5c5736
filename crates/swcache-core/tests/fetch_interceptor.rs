mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{active_worker, url, worker, ScriptedFetcher};
use swcache_core::config::GenerationTag;
use swcache_core::error::{CacheError, Result};
use swcache_core::http::{CacheKey, Method, Request, ResponseType, StoredResponse};
use swcache_core::registry::{CacheBucket, CacheStorage, MemoryStorage};
use swcache_core::worker::{BackgroundEvent, FetchOutcome, ResponseSource};

const MANIFEST: &[&str] = &["/index.html"];

fn site() -> Arc<ScriptedFetcher> {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.ok(url("/index.html").as_str(), "<html>shell</html>");
    fetcher
}

async fn next_event(rx: &mut tokio::sync::mpsc::Receiver<BackgroundEvent>) -> BackgroundEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("background write did not report")
        .expect("event channel closed")
}

#[tokio::test]
async fn non_get_requests_pass_through_untouched() {
    let fetcher = site();
    let worker = active_worker("c4wc-v4", MANIFEST, Arc::new(MemoryStorage::new()), fetcher.clone()).await;
    fetcher.reset_calls();

    let request = Request::new(Method::Post, url("/contact"))
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"name":"x"}"#);
    match worker.handle_fetch(request).await.unwrap() {
        FetchOutcome::PassThrough(mut request) => {
            assert_eq!(request.method, Method::Post);
            assert_eq!(request.take_body().unwrap(), br#"{"name":"x"}"#.to_vec());
        }
        other => panic!("expected pass-through, got {:?}", other),
    }
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn head_requests_are_not_intercepted() {
    let worker = active_worker("c4wc-v4", MANIFEST, Arc::new(MemoryStorage::new()), site()).await;
    let outcome = worker
        .handle_fetch(Request::new(Method::Head, url("/index.html")))
        .await
        .unwrap();
    assert!(outcome.source().is_none());
}

#[tokio::test]
async fn cross_origin_requests_are_neither_fetched_nor_stored() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = site();
    let worker = active_worker("c4wc-v4", MANIFEST, storage.clone(), fetcher.clone()).await;
    fetcher.reset_calls();

    let cdn = url::Url::parse("https://fonts.example.com/inter.woff2").unwrap();
    let outcome = worker.handle_fetch(Request::get(cdn.clone())).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::PassThrough(_)));
    assert!(fetcher.calls().is_empty());

    let bucket = storage.get(&"c4wc-v4".into()).await.unwrap().unwrap();
    assert!(bucket.match_key(&CacheKey::get(&cdn)).await.unwrap().is_none());
}

#[tokio::test]
async fn first_load_caches_then_second_load_skips_network() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = site();
    fetcher.ok(url("/about.html").as_str(), "<html>about</html>");
    let worker = active_worker("c4wc-v4", MANIFEST, storage, fetcher.clone()).await;
    let mut events = worker.take_background_events().unwrap();

    let first = worker.handle_fetch(Request::get(url("/about.html"))).await.unwrap();
    match first {
        FetchOutcome::Responded { mut response, source } => {
            assert_eq!(source, ResponseSource::Network);
            assert_eq!(response.text().unwrap(), "<html>about</html>");
        }
        other => panic!("expected network response, got {:?}", other),
    }
    assert_eq!(
        next_event(&mut events).await,
        BackgroundEvent::CacheWriteSucceeded {
            key: CacheKey::get(&url("/about.html"))
        }
    );

    fetcher.reset_calls();
    let second = worker.handle_fetch(Request::get(url("/about.html"))).await.unwrap();
    match second {
        FetchOutcome::Responded { mut response, source } => {
            assert_eq!(source, ResponseSource::Cache);
            assert_eq!(response.text().unwrap(), "<html>about</html>");
        }
        other => panic!("expected cached response, got {:?}", other),
    }
    assert_eq!(fetcher.calls_to(url("/about.html").as_str()), 0);
}

#[tokio::test]
async fn non_200_responses_are_returned_but_not_cached() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = site();
    fetcher.respond(url("/moved").as_str(), 404, ResponseType::Basic, "gone");
    let worker = active_worker("c4wc-v4", MANIFEST, storage.clone(), fetcher.clone()).await;

    let outcome = worker.handle_fetch(Request::get(url("/moved"))).await.unwrap();
    match outcome {
        FetchOutcome::Responded { response, source } => {
            assert_eq!(source, ResponseSource::Network);
            assert_eq!(response.status, 404);
        }
        other => panic!("expected network response, got {:?}", other),
    }

    // A second request goes to the network again.
    worker.handle_fetch(Request::get(url("/moved"))).await.unwrap();
    assert_eq!(fetcher.calls_to(url("/moved").as_str()), 2);
    let bucket = storage.get(&"c4wc-v4".into()).await.unwrap().unwrap();
    assert!(bucket.match_key(&CacheKey::get(&url("/moved"))).await.unwrap().is_none());
}

#[tokio::test]
async fn non_basic_responses_are_not_cached() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = site();
    fetcher.respond(url("/api/feed").as_str(), 200, ResponseType::Cors, "[]");
    let worker = active_worker("c4wc-v4", MANIFEST, storage.clone(), fetcher.clone()).await;

    let outcome = worker.handle_fetch(Request::get(url("/api/feed"))).await.unwrap();
    assert_eq!(outcome.source(), Some(ResponseSource::Network));

    let bucket = storage.get(&"c4wc-v4".into()).await.unwrap().unwrap();
    assert!(bucket.match_key(&CacheKey::get(&url("/api/feed"))).await.unwrap().is_none());
}

#[tokio::test]
async fn redirected_responses_are_not_cached_under_the_request_key() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = site();
    fetcher.redirected(url("/old-news").as_str(), "<html>news</html>");
    let worker = active_worker("c4wc-v4", MANIFEST, storage.clone(), fetcher.clone()).await;

    let outcome = worker.handle_fetch(Request::get(url("/old-news"))).await.unwrap();
    match outcome {
        FetchOutcome::Responded { mut response, source } => {
            assert_eq!(source, ResponseSource::Network);
            assert!(response.redirected);
            assert_eq!(response.text().unwrap(), "<html>news</html>");
        }
        other => panic!("expected network response, got {:?}", other),
    }

    worker.handle_fetch(Request::get(url("/old-news"))).await.unwrap();
    assert_eq!(fetcher.calls_to(url("/old-news").as_str()), 2);
    let bucket = storage.get(&"c4wc-v4".into()).await.unwrap().unwrap();
    assert!(bucket.match_key(&CacheKey::get(&url("/old-news"))).await.unwrap().is_none());
}

#[tokio::test]
async fn network_errors_on_miss_reach_the_caller() {
    let fetcher = site();
    fetcher.fail(url("/offline.html").as_str());
    let worker = active_worker("c4wc-v4", MANIFEST, Arc::new(MemoryStorage::new()), fetcher).await;

    let err = worker
        .handle_fetch(Request::get(url("/offline.html")))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("connection reset"));
}

#[tokio::test]
async fn fetch_before_activation_passes_through() {
    let fetcher = site();
    let worker = worker("c4wc-v4", MANIFEST, Arc::new(MemoryStorage::new()), fetcher.clone());
    worker.install().await.unwrap();
    fetcher.reset_calls();

    let outcome = worker.handle_fetch(Request::get(url("/index.html"))).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::PassThrough(_)));
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn superseded_worker_passes_through() {
    let worker = active_worker("c4wc-v4", MANIFEST, Arc::new(MemoryStorage::new()), site()).await;
    worker.supersede().await;
    let outcome = worker.handle_fetch(Request::get(url("/index.html"))).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::PassThrough(_)));
}

#[tokio::test]
async fn fragment_does_not_split_cache_entries() {
    let fetcher = site();
    let worker = active_worker("c4wc-v4", MANIFEST, Arc::new(MemoryStorage::new()), fetcher.clone()).await;
    fetcher.reset_calls();

    let outcome = worker
        .handle_fetch(Request::get(url("/index.html#donate")))
        .await
        .unwrap();
    assert_eq!(outcome.source(), Some(ResponseSource::Cache));
    assert!(fetcher.calls().is_empty());
}

// ============================================================================
// Storage that accepts installs but rejects writes made on the fetch path
// ============================================================================

struct FlakyBucket {
    inner: Arc<dyn CacheBucket>,
    reject_writes: Arc<std::sync::atomic::AtomicBool>,
    rejected: Arc<AtomicUsize>,
}

#[async_trait]
impl CacheBucket for FlakyBucket {
    async fn match_key(&self, key: &CacheKey) -> Result<Option<StoredResponse>> {
        self.inner.match_key(key).await
    }

    async fn put(&self, key: CacheKey, response: StoredResponse) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(CacheError::Storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                "quota exceeded",
            )));
        }
        self.inner.put(key, response).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        self.inner.keys().await
    }
}

struct FlakyStorage {
    inner: MemoryStorage,
    reject_writes: Arc<std::sync::atomic::AtomicBool>,
    rejected: Arc<AtomicUsize>,
}

impl FlakyStorage {
    fn wrap(&self, inner: Arc<dyn CacheBucket>) -> Arc<dyn CacheBucket> {
        Arc::new(FlakyBucket {
            inner,
            reject_writes: Arc::clone(&self.reject_writes),
            rejected: Arc::clone(&self.rejected),
        })
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, tag: &GenerationTag) -> Result<Arc<dyn CacheBucket>> {
        Ok(self.wrap(self.inner.open(tag).await?))
    }

    async fn get(&self, tag: &GenerationTag) -> Result<Option<Arc<dyn CacheBucket>>> {
        Ok(self.inner.get(tag).await?.map(|b| self.wrap(b)))
    }

    async fn keys(&self) -> Result<Vec<GenerationTag>> {
        self.inner.keys().await
    }

    async fn delete(&self, tag: &GenerationTag) -> Result<bool> {
        self.inner.delete(tag).await
    }
}

#[tokio::test]
async fn failed_background_write_does_not_affect_the_response() {
    let storage = Arc::new(FlakyStorage {
        inner: MemoryStorage::new(),
        reject_writes: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        rejected: Arc::new(AtomicUsize::new(0)),
    });
    let fetcher = site();
    fetcher.ok(url("/gallery.html").as_str(), "<html>gallery</html>");
    let worker = active_worker("c4wc-v4", MANIFEST, storage.clone(), fetcher).await;
    let mut events = worker.take_background_events().unwrap();

    storage.reject_writes.store(true, Ordering::SeqCst);
    let outcome = worker.handle_fetch(Request::get(url("/gallery.html"))).await.unwrap();
    match outcome {
        FetchOutcome::Responded { mut response, source } => {
            assert_eq!(source, ResponseSource::Network);
            assert_eq!(response.status, 200);
            assert_eq!(response.text().unwrap(), "<html>gallery</html>");
        }
        other => panic!("expected network response, got {:?}", other),
    }

    match next_event(&mut events).await {
        BackgroundEvent::CacheWriteFailed { key, error } => {
            assert_eq!(key, CacheKey::get(&url("/gallery.html")));
            assert!(error.contains("quota exceeded"));
        }
        other => panic!("expected failed write, got {:?}", other),
    }
    assert_eq!(storage.rejected.load(Ordering::SeqCst), 1);
}
