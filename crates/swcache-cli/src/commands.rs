use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use swcache_core::worker::{BackgroundEvent, Clients};
use swcache_core::{
    CacheStorage, DiskStorage, Fetcher, GenerationTag, HttpFetcher, Method, PathResolver,
    Registration, RemoteConfigCheck, Request, ServiceWorker, WorkerConfig, WorkerHost,
};

/// Path of the published config polled by `watch`, relative to the site root.
const REMOTE_CONFIG_PATH: &str = "/swcache.json";

/// How long `fetch` waits for the detached cache write before exiting.
const WRITE_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Install,
    Activate,
    Fetch(String),
    Tags,
    Purge(Option<String>),
    Watch,
}

/// Everything a command needs, built once from the loaded config.
struct CommandContext {
    config: WorkerConfig,
    storage: Arc<DiskStorage>,
    fetcher: Arc<HttpFetcher>,
}

impl CommandContext {
    fn new(config: WorkerConfig) -> Result<Self> {
        let root = config.cache_dir().context("Could not determine cache directory")?;
        let storage = DiskStorage::new(root.clone())
            .with_context(|| format!("Failed to open cache at {}", root.display()))?;
        let fetcher = HttpFetcher::new(config.origin.clone()).context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            storage: Arc::new(storage),
            fetcher: Arc::new(fetcher),
        })
    }

    fn worker(&self) -> Result<ServiceWorker> {
        Ok(ServiceWorker::new(
            self.config.clone(),
            self.storage.clone(),
            self.fetcher.clone(),
            Arc::new(Clients::new()),
        )?)
    }
}

pub async fn run(command: Command, config: WorkerConfig) -> Result<()> {
    let ctx = CommandContext::new(config)?;
    match command {
        Command::Install => install(&ctx).await,
        Command::Activate => activate(&ctx).await,
        Command::Fetch(url) => fetch(&ctx, &url).await,
        Command::Tags => tags(&ctx).await,
        Command::Purge(tag) => purge(&ctx, tag).await,
        Command::Watch => watch(ctx).await,
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Pre-cache only. Older generations stay until the next `activate`.
async fn install(ctx: &CommandContext) -> Result<()> {
    let worker = ctx.worker()?;
    let report = worker.install().await.context("Install failed")?;
    print_json(&json!({
        "generation": worker.generation(),
        "install": report,
    }))
}

async fn activate(ctx: &CommandContext) -> Result<()> {
    let worker = ctx.worker()?;
    let install = worker.install().await.context("Install failed")?;
    let activation = worker.activate().await.context("Activation failed")?;
    print_json(&json!({
        "generation": worker.generation(),
        "install": install,
        "activation": activation,
    }))
}

/// Bring a worker up through the host, then deliver one fetch event.
async fn fetch(ctx: &CommandContext, url: &str) -> Result<()> {
    let request = Request::parse(Method::Get, url).with_context(|| format!("Bad URL: {}", url))?;

    let host = WorkerHost::new(ctx.fetcher.clone() as Arc<dyn Fetcher>);
    let worker = ctx.worker()?;
    let mut events = worker.take_background_events();
    host.install(worker).await.context("Install failed")?;

    let (mut response, source) = host.fetch(request).await.context("Fetch failed")?;
    let body = response.bytes()?;
    let source = match source {
        Some(s) => format!("{:?}", s).to_lowercase(),
        None => "passthrough".to_string(),
    };

    // Let a detached cache write land before the process exits.
    if let Some(rx) = events.as_mut() {
        match tokio::time::timeout(WRITE_WAIT, rx.recv()).await {
            Ok(Some(BackgroundEvent::CacheWriteFailed { key, error })) => {
                warn!(key = %key, error = %error, "Response not cached")
            }
            Ok(Some(BackgroundEvent::CacheWriteSucceeded { key })) => info!(key = %key, "Response cached"),
            // No write was scheduled, or it is still running.
            Ok(None) | Err(_) => {}
        }
    }

    print_json(&json!({
        "url": url,
        "status": response.status,
        "type": response.kind,
        "source": source,
        "bytes": body.len(),
    }))
}

async fn tags(ctx: &CommandContext) -> Result<()> {
    let current = &ctx.config.generation;
    let mut rows = Vec::new();
    for tag in ctx.storage.keys().await? {
        let entries = match ctx.storage.get(&tag).await? {
            Some(bucket) => bucket.keys().await?.len(),
            None => 0,
        };
        rows.push(json!({
            "tag": tag,
            "entries": entries,
            "current": &tag == current,
        }));
    }
    print_json(&json!({
        "root": ctx.storage.root(),
        "generations": rows,
    }))
}

async fn purge(ctx: &CommandContext, tag: Option<String>) -> Result<()> {
    let targets = match tag {
        Some(t) => vec![GenerationTag::new(t)],
        None => ctx.storage.keys().await?,
    };

    let mut deleted = Vec::new();
    for tag in targets {
        if ctx.storage.delete(&tag).await? {
            info!(generation = %tag, "Purged generation");
            deleted.push(tag);
        } else {
            warn!(generation = %tag, "No such generation");
        }
    }
    print_json(&json!({ "deleted": deleted }))
}

/// Register for the configured origin and poll for newer deployments
/// until interrupted.
async fn watch(ctx: CommandContext) -> Result<()> {
    let resolver = PathResolver::from_config(&ctx.config);
    let page_url = resolver.resolve_url("/")?;
    let check_url = resolver.resolve_url(REMOTE_CONFIG_PATH)?;
    let interval = ctx.config.update_interval();

    let registration = Registration::register(
        ctx.config.clone(),
        &page_url,
        ctx.storage.clone(),
        ctx.fetcher.clone(),
        Arc::new(Clients::new()),
    )
    .await
    .context("Registration failed")?
    .context("Configured origin does not serve this worker")?;
    let registration = Arc::new(registration);

    let check = Arc::new(RemoteConfigCheck::new(ctx.fetcher.clone(), check_url.clone()));
    let handle = registration.spawn_update_loop(check, interval);
    eprintln!(
        "Watching {} every {}s (Ctrl-C to stop)",
        check_url,
        interval.as_secs()
    );

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    handle.stop().await;
    eprintln!("Serving generation {}", registration.generation().await);
    Ok(())
}
