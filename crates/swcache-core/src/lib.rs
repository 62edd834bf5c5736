//! swcache core - offline caching layer for a statically hosted site.
//!
//! A worker generation pre-caches a fixed asset manifest on install,
//! garbage-collects every other generation on activation, and then answers
//! same-origin GET requests cache-first, filling the cache from the network
//! on misses.
//!
//! Modules:
//! - `config`: explicit worker configuration (generation tag, manifest, origin)
//! - `http`: request/response model with single-use bodies
//! - `resolver`: logical asset path to deployment URL mapping
//! - `registry`: generation registry with memory and disk backends
//! - `network`: `Fetcher` trait and the reqwest implementation
//! - `worker`: lifecycle state machine, handlers, and the event host
//! - `registration`: host-page registration and hourly update checks

pub mod config;
pub mod error;
pub mod http;
pub mod network;
pub mod registration;
pub mod registry;
pub mod resolver;
pub mod worker;

pub use config::{AssetManifest, GenerationTag, WorkerConfig};
pub use error::{CacheError, Result};
pub use http::{CacheKey, Method, Request, Response, ResponseType};
pub use network::{Fetcher, HttpFetcher};
pub use registration::{Registration, RemoteConfigCheck, UpdateCheck};
pub use registry::{CacheBucket, CacheStorage, DiskStorage, MemoryStorage};
pub use resolver::PathResolver;
pub use worker::{FetchOutcome, LifecycleState, ServiceWorker, WorkerHost};
