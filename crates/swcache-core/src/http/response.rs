use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use url::Url;

use super::Body;
use crate::error::{CacheError, Result};

/// Classification of a response relative to the requesting origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    /// Same-origin, not redirected, body readable.
    Basic,
    /// Cross-origin, returned under CORS.
    Cors,
    /// Cross-origin fetched with `no-cors`; status and body are hidden.
    Opaque,
    /// Redirect returned with manual redirect handling.
    OpaqueRedirect,
    /// Network failure surfaced as a response.
    Error,
}

#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub kind: ResponseType,
    pub url: Option<Url>,
    pub redirected: bool,
    body: Body,
}

impl Response {
    pub fn new(status: u16, kind: ResponseType, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            kind,
            url: None,
            redirected: false,
            body: Body::new(body),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// HTTP-OK in the fetch sense: any 2xx status.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_used(&self) -> bool {
        self.body.is_used()
    }

    /// Consume the body.
    pub fn bytes(&mut self) -> Result<Vec<u8>> {
        self.body.take()
    }

    pub fn text(&mut self) -> Result<String> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Explicit copy for the "return one, store the other" pattern.
    pub fn duplicate(&self) -> Result<Response> {
        Ok(Self {
            status: self.status,
            headers: self.headers.clone(),
            kind: self.kind,
            url: self.url.clone(),
            redirected: self.redirected,
            body: self.body.duplicate()?,
        })
    }

    /// Consume this response into its persisted form.
    pub fn into_stored(mut self) -> Result<StoredResponse> {
        let body = self.body.take()?;
        Ok(StoredResponse {
            status: self.status,
            headers: self.headers,
            kind: self.kind,
            url: self.url.map(|u| u.to_string()),
            body,
        })
    }
}

/// Persisted response. The body is base64 in the serialized form so entries
/// stay valid JSON for binary assets such as icons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub kind: ResponseType,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
}

impl StoredResponse {
    /// Rebuild a fresh, unread response.
    pub fn to_response(&self) -> Result<Response> {
        let url = match &self.url {
            Some(u) => Some(Url::parse(u).map_err(|_| {
                CacheError::CorruptEntry(format!("bad stored url: {}", CacheError::truncate_url(u)))
            })?),
            None => None,
        };
        Ok(Response {
            status: self.status,
            headers: self.headers.clone(),
            kind: self.kind,
            url,
            redirected: false,
            body: Body::new(self.body.clone()),
        })
    }
}

mod base64_body {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
