//! Worker configuration.
//!
//! The generation tag and asset manifest are passed in explicitly rather
//! than living in module-level constants, so each worker instance (and each
//! test) carries its own version. Configuration is stored as JSON at
//! `~/.config/swcache/config.json`; a missing file means defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CacheError, Result};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "swcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_GENERATION: &str = "c4wc-v4";
const DEFAULT_ORIGIN: &str = "https://children4worldchildren.org/";
const DEFAULT_BASE_PATH: &str = "/children4worldchildren";
const DEFAULT_SUBPATH_HOST_MARKER: &str = "github.io";

/// How often the host page asks for a newer worker version.
const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 60 * 60;

const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/favicon.ico",
    "/android-chrome-192x192.png",
    "/android-chrome-512x512.png",
    "/favicon-16x16.png",
    "/favicon-32x32.png",
    "/favicon-48x48.png",
    "/site.webmanifest",
];

const ENV_ORIGIN: &str = "SWCACHE_ORIGIN";
const ENV_GENERATION: &str = "SWCACHE_GENERATION";
const ENV_CACHE_DIR: &str = "SWCACHE_CACHE_DIR";

/// Identifies one deployed version of the cache contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationTag(String);

impl GenerationTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GenerationTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Ordered list of root-relative asset paths to pre-cache on install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest(Vec<String>);

impl AssetManifest {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(paths.into_iter().map(Into::into).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::new(DEFAULT_MANIFEST.iter().copied())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub generation: GenerationTag,
    pub manifest: AssetManifest,
    pub origin: Url,
    pub base_path: String,
    pub subpath_host_marker: String,
    pub update_interval_secs: u64,
    pub cache_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            generation: GenerationTag::new(DEFAULT_GENERATION),
            manifest: AssetManifest::default(),
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            base_path: DEFAULT_BASE_PATH.to_string(),
            subpath_host_marker: DEFAULT_SUBPATH_HOST_MARKER.to_string(),
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            cache_dir: None,
        }
    }
}

impl WorkerConfig {
    pub fn new(generation: impl Into<String>, manifest: AssetManifest, origin: Url) -> Self {
        Self {
            generation: GenerationTag::new(generation),
            manifest,
            origin,
            ..Self::default()
        }
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CacheError::InvalidConfig("Could not find config directory".into()))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Root directory for persisted buckets.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| CacheError::InvalidConfig("Could not find cache directory".into()))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Apply `SWCACHE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(origin) = lookup(ENV_ORIGIN) {
            self.origin = Url::parse(&origin)?;
        }
        if let Some(tag) = lookup(ENV_GENERATION) {
            self.generation = GenerationTag::new(tag);
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.generation.as_str().trim().is_empty() {
            return Err(CacheError::InvalidConfig("generation tag is empty".into()));
        }
        if let Some(bad) = self.manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(CacheError::InvalidConfig(format!(
                "manifest entry is not root-relative: {}",
                bad
            )));
        }
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(CacheError::InvalidConfig(format!(
                "origin must be http(s): {}",
                self.origin
            )));
        }
        if self.update_interval_secs == 0 {
            return Err(CacheError::InvalidConfig("update interval must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_matches_deployment() {
        let config = WorkerConfig::default();
        assert_eq!(config.generation.as_str(), "c4wc-v4");
        assert_eq!(config.manifest.len(), 9);
        assert_eq!(config.manifest.iter().next(), Some("/"));
        assert_eq!(config.update_interval(), Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.generation.as_str(), "c4wc-v4");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let mut config = WorkerConfig::default();
        config.generation = GenerationTag::new("c4wc-v5");
        config.save(&path).unwrap();

        let loaded = WorkerConfig::load(&path).unwrap();
        assert_eq!(loaded.generation.as_str(), "c4wc-v5");
        assert_eq!(loaded.manifest, config.manifest);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: WorkerConfig = serde_json::from_str(r#"{"generation": "c4wc-v9"}"#).unwrap();
        assert_eq!(config.generation.as_str(), "c4wc-v9");
        assert_eq!(config.base_path, DEFAULT_BASE_PATH);
        assert_eq!(config.manifest.len(), 9);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_ORIGIN, "http://localhost:5173/"),
            (ENV_GENERATION, "dev"),
            (ENV_CACHE_DIR, "/tmp/swcache"),
        ]
        .into_iter()
        .collect();

        let mut config = WorkerConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.origin.as_str(), "http://localhost:5173/");
        assert_eq!(config.generation.as_str(), "dev");
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/swcache"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = WorkerConfig::default();
        config.generation = GenerationTag::new("  ");
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.manifest = AssetManifest::new(["index.html"]);
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.origin = Url::parse("ftp://example.org/").unwrap();
        assert!(config.validate().is_err());
    }
}
