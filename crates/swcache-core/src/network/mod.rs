//! Network access for the caching layer.
//!
//! The worker only ever talks to the network through the `Fetcher` trait,
//! so tests can substitute a scripted fetcher and count round-trips.

pub mod client;

use async_trait::async_trait;

use crate::error::Result;
use crate::http::{Request, Response};

pub use client::HttpFetcher;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue `request`. Transport failures are errors; HTTP error statuses
    /// are ordinary responses.
    async fn fetch(&self, request: Request) -> Result<Response>;
}
