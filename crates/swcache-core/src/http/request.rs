use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{Body, CacheKey, Method};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Credentials {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestMode {
    SameOrigin,
    NoCors,
    #[default]
    Cors,
    Navigate,
}

/// An outgoing request. The body is single-use, so re-issuing a request
/// requires `duplicate()`.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub credentials: Credentials,
    pub mode: RequestMode,
    body: Body,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
            credentials: Credentials::default(),
            mode: RequestMode::default(),
            body: Body::empty(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn parse(method: Method, url: &str) -> Result<Self> {
        Ok(Self::new(method, Url::parse(url)?))
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::new(body);
        self
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.method.clone(), &self.url)
    }

    /// Whether this request targets the given origin (scheme, host and port).
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }

    pub fn take_body(&mut self) -> Result<Vec<u8>> {
        self.body.take()
    }

    pub fn duplicate(&self) -> Result<Request> {
        Ok(Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            credentials: self.credentials,
            mode: self.mode,
            body: self.body.duplicate()?,
        })
    }
}
