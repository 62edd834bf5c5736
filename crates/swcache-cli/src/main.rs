//! swcache - drive the offline cache lifecycle from the terminal.
//!
//! Each command loads the worker configuration (file, then environment
//! overrides), opens the on-disk generation registry and talks to the real
//! origin over HTTP.

mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Command;
use swcache_core::WorkerConfig;

const USAGE: &str = "\
usage: swcache [--config PATH] [--log-file PATH] <command>

commands:
  install         pre-cache the manifest into the configured generation
  activate        install, then make the generation current and delete the others
  fetch <url>     answer one GET the way the worker would
  tags            list stored generations
  purge [tag]     delete one generation, or all of them
  watch           register, then check for a newer deployment every interval";

/// Parsed command line.
struct Args {
    config: Option<PathBuf>,
    log_file: Option<PathBuf>,
    command: Command,
}

fn parse_args(raw: Vec<String>) -> Result<Args> {
    let mut config = None;
    let mut log_file = None;
    let mut rest = Vec::new();

    let mut iter = raw.into_iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(iter.next().context("--config needs a path")?)),
            "--log-file" => {
                log_file = Some(PathBuf::from(iter.next().context("--log-file needs a path")?))
            }
            "-h" | "--help" => bail!("{}", USAGE),
            _ => rest.push(arg),
        }
    }

    let command = match rest.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["install"] => Command::Install,
        ["activate"] => Command::Activate,
        ["fetch", url] => Command::Fetch(url.to_string()),
        ["tags"] => Command::Tags,
        ["purge"] => Command::Purge(None),
        ["purge", tag] => Command::Purge(Some(tag.to_string())),
        ["watch"] => Command::Watch,
        _ => bail!("{}", USAGE),
    };

    Ok(Args {
        config,
        log_file,
        command,
    })
}

/// Initialize the tracing subscriber for logging.
///
/// RUST_LOG controls the level (default "warn"). With a log file the same
/// events also go to a daily-rotated file; keep the guard alive until exit
/// so buffered lines are flushed.
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(filter)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .context("--log-file must name a file")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(filter)
        .init();
    Ok(Some(guard))
}

fn load_config(path: Option<PathBuf>) -> Result<WorkerConfig> {
    let path = match path {
        Some(p) => p,
        None => WorkerConfig::default_path().context("Could not determine config directory")?,
    };
    let mut config = WorkerConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config
        .apply_env()
        .context("Invalid SWCACHE_* environment override")?;
    config.validate().context("Invalid worker configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = parse_args(std::env::args().collect())?;
    let _guard = init_tracing(args.log_file.as_ref())?;

    let config = load_config(args.config)?;
    info!(generation = %config.generation, origin = %config.origin, "swcache starting");

    commands::run(args.command, config).await
}
