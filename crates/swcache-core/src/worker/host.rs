//! Adapter between the platform's event model and the worker handlers.
//!
//! The host tracks at most one installing/waiting worker and one active
//! worker, delivers lifecycle events to the right one, and performs the
//! default network behavior for requests the active worker passes through
//! (or when no worker is active yet).

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{
    ActivationReport, FetchOutcome, InstallReport, LifecycleState, ResponseSource, ServiceWorker,
};
use crate::config::GenerationTag;
use crate::error::Result;
use crate::http::{Request, Response};
use crate::network::Fetcher;

pub enum LifecycleEvent {
    Install(ServiceWorker),
    Activate,
    Fetch(Request),
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    /// `None` when there was no installed worker to activate.
    Activated(Option<ActivationReport>),
    Fetched {
        response: Response,
        source: Option<ResponseSource>,
    },
}

pub struct WorkerHost {
    network: Arc<dyn Fetcher>,
    waiting: RwLock<Option<Arc<ServiceWorker>>>,
    active: RwLock<Option<Arc<ServiceWorker>>>,
}

impl WorkerHost {
    pub fn new(network: Arc<dyn Fetcher>) -> Self {
        Self {
            network,
            waiting: RwLock::new(None),
            active: RwLock::new(None),
        }
    }

    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<EventOutcome> {
        match event {
            LifecycleEvent::Install(worker) => Ok(EventOutcome::Installed(self.install(worker).await?)),
            LifecycleEvent::Activate => Ok(EventOutcome::Activated(self.activate_waiting().await?)),
            LifecycleEvent::Fetch(request) => {
                let (response, source) = self.fetch(request).await?;
                Ok(EventOutcome::Fetched { response, source })
            }
        }
    }

    /// Run install on a new generation. When install asks to skip waiting,
    /// or nothing is active yet, activation follows immediately.
    pub async fn install(&self, worker: ServiceWorker) -> Result<InstallReport> {
        let worker = Arc::new(worker);
        let report = worker.install().await?;

        let activate_now = worker.skips_waiting() || self.active.read().await.is_none();
        if let Some(previous) = self.waiting.write().await.replace(worker) {
            previous.supersede().await;
        }
        if activate_now {
            self.activate_waiting().await?;
        }
        Ok(report)
    }

    /// Promote the waiting worker, superseding whatever was active.
    pub async fn activate_waiting(&self) -> Result<Option<ActivationReport>> {
        let Some(worker) = self.waiting.write().await.take() else {
            return Ok(None);
        };
        if worker.state().await != LifecycleState::Installed {
            warn!(generation = %worker.generation(), "Waiting worker is not installed, discarding");
            return Ok(None);
        }

        let report = worker.activate().await?;
        if let Some(previous) = self.active.write().await.replace(Arc::clone(&worker)) {
            previous.supersede().await;
        }
        info!(generation = %worker.generation(), "Worker now controlling clients");
        Ok(Some(report))
    }

    /// Deliver a fetch event. Returns the response and where it came from;
    /// `None` means default network behavior handled it.
    pub async fn fetch(&self, request: Request) -> Result<(Response, Option<ResponseSource>)> {
        let active = self.active.read().await.clone();
        let outcome = match active {
            Some(worker) => worker.handle_fetch(request).await?,
            None => FetchOutcome::PassThrough(request),
        };

        match outcome {
            FetchOutcome::Responded { response, source } => Ok((response, Some(source))),
            FetchOutcome::PassThrough(request) => Ok((self.network.fetch(request).await?, None)),
        }
    }

    pub async fn active_generation(&self) -> Option<GenerationTag> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|w| w.generation().clone())
    }

    pub async fn active(&self) -> Option<Arc<ServiceWorker>> {
        self.active.read().await.clone()
    }

    pub async fn waiting_generation(&self) -> Option<GenerationTag> {
        self.waiting
            .read()
            .await
            .as_ref()
            .map(|w| w.generation().clone())
    }
}
