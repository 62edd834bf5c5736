//! Origin/base-path resolution for logical asset paths.
//!
//! The site is deployed either at the root of its own domain or under a
//! project sub-path on a shared static host. Logical manifest paths are
//! root-relative; this module maps them onto the effective URL path.

use url::Url;

use crate::config::WorkerConfig;
use crate::error::Result;

/// Service worker script name, relative to the deployment root.
const SCRIPT_NAME: &str = "sw.js";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostingMode {
    Root,
    SubPath(String),
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    origin: Url,
    mode: HostingMode,
}

impl PathResolver {
    /// Derive the hosting mode from the origin's hostname.
    pub fn new(origin: Url, base_path: &str, subpath_host_marker: &str) -> Self {
        let is_subpath = !subpath_host_marker.is_empty()
            && origin
                .host_str()
                .map(|h| h.contains(subpath_host_marker))
                .unwrap_or(false);

        let mode = if is_subpath {
            HostingMode::SubPath(normalize_prefix(base_path))
        } else {
            HostingMode::Root
        };

        Self { origin, mode }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            config.origin.clone(),
            &config.base_path,
            &config.subpath_host_marker,
        )
    }

    pub fn mode(&self) -> &HostingMode {
        &self.mode
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Map a logical root-relative path onto the deployment's path.
    pub fn resolve(&self, logical_path: &str) -> String {
        match &self.mode {
            HostingMode::Root => logical_path.to_string(),
            HostingMode::SubPath(prefix) => format!("{}{}", prefix, logical_path),
        }
    }

    /// Absolute URL for a logical path on this origin.
    pub fn resolve_url(&self, logical_path: &str) -> Result<Url> {
        Ok(self.origin.join(&self.resolve(logical_path))?)
    }

    /// Path the host page registers the worker script at.
    pub fn script_path(&self) -> String {
        self.resolve(&format!("/{}", SCRIPT_NAME))
    }
}

/// `children4worldchildren/` and `/children4worldchildren` both become
/// `/children4worldchildren`.
fn normalize_prefix(base_path: &str) -> String {
    let trimmed = base_path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
