#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use swcache_core::config::{AssetManifest, WorkerConfig};
use swcache_core::error::{CacheError, Result};
use swcache_core::http::{Request, Response, ResponseType};
use swcache_core::network::Fetcher;
use swcache_core::registry::CacheStorage;
use swcache_core::worker::{Clients, ServiceWorker};
use url::Url;

pub const ORIGIN: &str = "https://children4worldchildren.org/";

#[derive(Clone)]
enum Route {
    Respond {
        status: u16,
        kind: ResponseType,
        body: Vec<u8>,
        redirected: bool,
    },
    Fail,
}

/// In-memory network: routes by absolute URL and records every call.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, kind: ResponseType, body: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route::Respond {
                status,
                kind,
                body: body.as_bytes().to_vec(),
                redirected: false,
            },
        );
    }

    /// A same-origin 200 that was reached through a redirect.
    pub fn redirected(&self, url: &str, body: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route::Respond {
                status: 200,
                kind: ResponseType::Basic,
                body: body.as_bytes().to_vec(),
                redirected: true,
            },
        );
    }

    pub fn ok(&self, url: &str, body: &str) {
        self.respond(url, 200, ResponseType::Basic, body);
    }

    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Fail);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == url).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: Request) -> Result<Response> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());
        let route = self.routes.lock().unwrap().get(&url).cloned();
        match route {
            Some(Route::Respond {
                status,
                kind,
                body,
                redirected,
            }) => {
                let mut response = Response::new(status, kind, body).with_url(request.url.clone());
                response.redirected = redirected;
                Ok(response)
            }
            Some(Route::Fail) => Err(CacheError::InvalidRequest(format!("connection reset: {}", url))),
            None => Ok(Response::new(404, ResponseType::Basic, "not found")),
        }
    }
}

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn config(tag: &str, manifest: &[&str]) -> WorkerConfig {
    WorkerConfig::new(
        tag,
        AssetManifest::new(manifest.iter().copied()),
        Url::parse(ORIGIN).unwrap(),
    )
}

pub fn worker(
    tag: &str,
    manifest: &[&str],
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<ScriptedFetcher>,
) -> ServiceWorker {
    ServiceWorker::new(config(tag, manifest), storage, fetcher, Arc::new(Clients::new())).unwrap()
}

/// Install then activate, returning the worker ready to serve.
pub async fn active_worker(
    tag: &str,
    manifest: &[&str],
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<ScriptedFetcher>,
) -> ServiceWorker {
    let worker = worker(tag, manifest, storage, fetcher);
    worker.install().await.unwrap();
    worker.activate().await.unwrap();
    worker
}
