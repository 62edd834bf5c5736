//! The offline worker: one generation's install, activate and fetch
//! handlers plus the lifecycle state machine that sequences them.
//!
//! A `ServiceWorker` is built from an explicit `WorkerConfig`, so the
//! generation tag and asset manifest travel with the instance rather than
//! living in process-wide constants. Event delivery (which worker gets
//! which event, when) belongs to `WorkerHost`.
//!
//! Opportunistic cache writes from the fetch path run as detached tasks.
//! Their outcomes are logged and reported as `BackgroundEvent`s on an
//! optional channel; the response path never waits on them.

pub mod activate;
pub mod clients;
pub mod fetch;
pub mod host;
pub mod install;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::config::{GenerationTag, WorkerConfig};
use crate::error::Result;
use crate::http::CacheKey;
use crate::network::Fetcher;
use crate::registry::CacheStorage;
use crate::resolver::PathResolver;

pub use activate::ActivationReport;
pub use clients::{ClientId, Clients};
pub use fetch::{FetchOutcome, ResponseSource};
pub use host::{EventOutcome, LifecycleEvent, WorkerHost};
pub use install::{InstallFailure, InstallReport};
pub use state::LifecycleState;

/// Buffer size for the background event channel.
/// Events beyond this are dropped (and logged) rather than stalling writers.
const BACKGROUND_CHANNEL_SIZE: usize = 64;

/// Outcome of a detached cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundEvent {
    CacheWriteSucceeded { key: CacheKey },
    CacheWriteFailed { key: CacheKey, error: String },
}

pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    resolver: PathResolver,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    clients: Arc<Clients>,
    state: Mutex<LifecycleState>,
    skip_waiting: AtomicBool,
    events_tx: mpsc::Sender<BackgroundEvent>,
    events_rx: std::sync::Mutex<Option<mpsc::Receiver<BackgroundEvent>>>,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        clients: Arc<Clients>,
    ) -> Result<Self> {
        config.validate()?;
        let resolver = PathResolver::from_config(&config);
        let (events_tx, events_rx) = mpsc::channel(BACKGROUND_CHANNEL_SIZE);

        debug!(
            generation = %config.generation,
            mode = ?resolver.mode(),
            assets = config.manifest.len(),
            "Worker created"
        );

        Ok(Self {
            config: Arc::new(config),
            resolver,
            storage,
            fetcher,
            clients,
            state: Mutex::new(LifecycleState::Parsed),
            skip_waiting: AtomicBool::new(false),
            events_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
        })
    }

    pub fn generation(&self) -> &GenerationTag {
        &self.config.generation
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn clients(&self) -> &Arc<Clients> {
        &self.clients
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.lock().await
    }

    /// Set once install has asked to activate without waiting for old clients.
    pub fn skips_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Take the receiving end of the background event channel. Only the
    /// first caller gets it.
    pub fn take_background_events(&self) -> Option<mpsc::Receiver<BackgroundEvent>> {
        self.events_rx
            .lock()
            .map(|mut rx| rx.take())
            .unwrap_or(None)
    }

    /// Mark this generation as replaced. Fetches pass through from now on.
    pub async fn supersede(&self) {
        let mut state = self.state.lock().await;
        if *state != LifecycleState::Redundant {
            info!(generation = %self.config.generation, from = ?*state, "Worker superseded");
            *state = LifecycleState::Redundant;
        }
    }

    async fn advance(&self, from: LifecycleState) -> Result<LifecycleState> {
        let next = self.state.lock().await.advance(from)?;
        debug!(generation = %self.config.generation, state = ?next, "Lifecycle transition");
        Ok(next)
    }
}
