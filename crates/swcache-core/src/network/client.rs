//! `Fetcher` implementation over `reqwest`.
//!
//! Responses are classified the way a browser would classify them for the
//! page at `origin`: same-origin responses are `Basic` unless a redirect
//! was followed, cross-origin ones are `Cors`, or `Opaque` (status 0, no
//! headers, empty body) when the request was made in `no-cors` mode.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::Fetcher;
use crate::error::{CacheError, Result};
use crate::http::{Method, Request, RequestMode, Response, ResponseType};

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: Url,
}

impl HttpFetcher {
    /// No request timeout is set here; a hung request stalls only its own
    /// caller, as with the platform transport.
    pub fn new(origin: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("swcache/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn to_reqwest_method(method: &Method) -> Result<reqwest::Method> {
        reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|_| CacheError::InvalidRequest(format!("unsupported method: {}", method)))
    }

    /// `Basic` only for a same-origin response that was not redirected.
    fn classify(&self, mode: RequestMode, final_url: &Url, redirected: bool) -> ResponseType {
        let same_origin = final_url.origin() == self.origin.origin();
        if same_origin && !redirected {
            ResponseType::Basic
        } else if same_origin {
            ResponseType::Cors
        } else if mode == RequestMode::NoCors {
            ResponseType::Opaque
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, mut request: Request) -> Result<Response> {
        let method = Self::to_reqwest_method(&request.method)?;
        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !matches!(request.method, Method::Get | Method::Head) {
            builder = builder.body(request.take_body()?);
        }

        let response = builder.send().await?;
        let final_url = response.url().clone();
        let redirected = final_url != request.url;
        let kind = self.classify(request.mode, &final_url, redirected);

        debug!(
            url = %CacheError::truncate_url(request.url.as_str()),
            status = response.status().as_u16(),
            kind = ?kind,
            "Network response"
        );

        if kind == ResponseType::Opaque {
            return Ok(Response::new(0, ResponseType::Opaque, Vec::new()));
        }

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        let mut out = Response::new(status, kind, body).with_url(final_url.clone());
        for (name, value) in headers {
            out = out.with_header(&name, value);
        }
        out.redirected = redirected;
        Ok(out)
    }
}
