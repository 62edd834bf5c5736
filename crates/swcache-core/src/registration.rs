//! Host-page side of the worker: registration and periodic update checks.
//!
//! The page registers the worker only when its public URL shares the
//! page's origin, at the script path matching the deployment (root or
//! sub-path). Afterwards it polls for a newer deployment every
//! `update_interval`; a different generation tag triggers a fresh
//! install/activate cycle. Update-check failures are logged and otherwise
//! ignored, and the current generation keeps serving.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use url::Url;

use crate::config::{GenerationTag, WorkerConfig};
use crate::error::{CacheError, Result};
use crate::http::Request;
use crate::network::Fetcher;
use crate::registry::CacheStorage;
use crate::resolver::PathResolver;
use crate::worker::{Clients, InstallReport, ServiceWorker, WorkerHost};

/// Only register when the deployment's public URL is on the page's origin.
pub fn should_register(public_url: &Url, page_url: &Url) -> bool {
    public_url.origin() == page_url.origin()
}

/// Source of "is there a newer deployment?" answers.
#[async_trait]
pub trait UpdateCheck: Send + Sync {
    /// Configuration of a deployment newer than `current`, if there is one.
    async fn check(&self, current: &GenerationTag) -> Result<Option<WorkerConfig>>;
}

/// Polls a JSON `WorkerConfig` published alongside the worker script.
pub struct RemoteConfigCheck {
    fetcher: Arc<dyn Fetcher>,
    url: Url,
}

impl RemoteConfigCheck {
    pub fn new(fetcher: Arc<dyn Fetcher>, url: Url) -> Self {
        Self { fetcher, url }
    }
}

#[async_trait]
impl UpdateCheck for RemoteConfigCheck {
    async fn check(&self, current: &GenerationTag) -> Result<Option<WorkerConfig>> {
        let request = Request::get(self.url.clone()).with_header("cache-control", "no-cache");
        let mut response = self.fetcher.fetch(request).await?;
        if !response.ok() {
            return Err(CacheError::HttpStatus(response.status));
        }
        let config: WorkerConfig = serde_json::from_slice(&response.bytes()?)?;
        config.validate()?;

        if config.generation == *current {
            Ok(None)
        } else {
            Ok(Some(config))
        }
    }
}

pub struct Registration {
    script_path: String,
    config: RwLock<WorkerConfig>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    clients: Arc<Clients>,
    host: Arc<WorkerHost>,
}

impl Registration {
    /// Register and install the worker described by `config` for the page
    /// at `page_url`. Returns `None` when the origins differ.
    pub async fn register(
        config: WorkerConfig,
        page_url: &Url,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        clients: Arc<Clients>,
    ) -> Result<Option<Self>> {
        let resolver = PathResolver::from_config(&config);
        let public_url = resolver.resolve_url("/")?;
        if !should_register(&public_url, page_url) {
            info!(public = %public_url, page = %page_url, "Not registering worker for foreign origin");
            return Ok(None);
        }

        let registration = Self {
            script_path: resolver.script_path(),
            config: RwLock::new(config.clone()),
            host: Arc::new(WorkerHost::new(Arc::clone(&fetcher))),
            storage,
            fetcher,
            clients,
        };

        let report = registration.install(config).await?;
        info!(
            scope = %registration.script_path,
            cached = report.cached.len(),
            "ServiceWorker registration successful"
        );
        Ok(Some(registration))
    }

    pub fn script_path(&self) -> &str {
        &self.script_path
    }

    pub fn host(&self) -> &Arc<WorkerHost> {
        &self.host
    }

    pub fn clients(&self) -> &Arc<Clients> {
        &self.clients
    }

    pub async fn generation(&self) -> GenerationTag {
        self.config.read().await.generation.clone()
    }

    async fn install(&self, config: WorkerConfig) -> Result<InstallReport> {
        let worker = ServiceWorker::new(
            config,
            Arc::clone(&self.storage),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.clients),
        )?;
        self.host.install(worker).await
    }

    /// Ask `check` for a newer deployment and, if one exists, install and
    /// activate it. Returns the new generation tag when an update happened.
    pub async fn update(&self, check: &dyn UpdateCheck) -> Result<Option<GenerationTag>> {
        let current = self.generation().await;
        let Some(config) = check.check(&current).await? else {
            return Ok(None);
        };

        let tag = config.generation.clone();
        info!(from = %current, to = %tag, "Newer worker version found");
        self.install(config.clone()).await?;
        *self.config.write().await = config;
        Ok(Some(tag))
    }

    /// Poll for updates every `interval` until the returned handle is
    /// stopped. The first check happens one interval after spawning.
    pub fn spawn_update_loop(
        self: &Arc<Self>,
        check: Arc<dyn UpdateCheck>,
        interval: Duration,
    ) -> UpdateHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let registration = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // interval() fires immediately; the page waits a full period first.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match registration.update(check.as_ref()).await {
                            Ok(Some(tag)) => info!(generation = %tag, "Worker updated"),
                            Ok(None) => debug!("No worker update available"),
                            Err(e) => info!(error = %e, "ServiceWorker update check failed"),
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Update loop stopped");
        });

        UpdateHandle {
            stop: stop_tx,
            task,
        }
    }
}

pub struct UpdateHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl UpdateHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Update loop panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
