// src/config/mod.rs
//! Sites file + service settings.
//!
//! The sites file is TOML or JSON (picked by extension, then by sniffing) and
//! holds a `[defaults]` table plus an ordered `[[sites]]` array.

pub mod launch;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_SITES_CONFIG_PATH: &str = "SITES_CONFIG_PATH";
pub const ENV_SCRAPE_TIMEOUT_SECS: &str = "SCRAPE_TIMEOUT_SECS";
pub const DEFAULT_SITES_TOML: &str = "config/sites.toml";
pub const DEFAULT_SITES_JSON: &str = "config/sites.json";

/// Raw on-disk shape; validated into a `SiteRegistry` by the registry module.
#[derive(Debug, Clone, Deserialize)]
pub struct SitesFile {
    #[serde(default)]
    pub defaults: Settings,
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    pub id: String,
    pub base_url: String,
    #[serde(default)]
    pub search_path: String,
    #[serde(default)]
    pub default_params: BTreeMap<String, String>,
    #[serde(default)]
    pub selectors: BTreeMap<String, SelectorList>,
    #[serde(default)]
    pub stable_threshold: Option<u32>,
}

/// A selector chain may be written as one string or as a list.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SelectorList {
    One(String),
    Many(Vec<String>),
}

impl SelectorList {
    pub fn into_vec(self) -> Vec<String> {
        let v = match self {
            SelectorList::One(s) => vec![s],
            SelectorList::Many(v) => v,
        };
        v.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn default_navigation_timeout_secs() -> u64 {
    30
}
fn default_settle_ms() -> u64 {
    2_000
}
fn default_card_threshold() -> u32 {
    4
}
fn default_generic_threshold() -> u32 {
    5
}
fn default_scrape_timeout_secs() -> u64 {
    300
}
fn default_viewport_width() -> u32 {
    1280
}
fn default_viewport_height() -> u32 {
    800
}

/// Service-wide knobs from the `[defaults]` table.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    /// Wait after each scroll before re-measuring.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Wait after network idle, for client-side rendering.
    #[serde(default = "default_settle_ms")]
    pub post_navigation_settle_ms: u64,
    /// Wait after clicking a load-more control.
    #[serde(default = "default_settle_ms")]
    pub click_settle_ms: u64,
    #[serde(default = "default_card_threshold")]
    pub card_stable_threshold: u32,
    #[serde(default = "default_generic_threshold")]
    pub generic_stable_threshold: u32,
    /// External deadline wrapped around the whole strategy run.
    #[serde(default = "default_scrape_timeout_secs")]
    pub scrape_timeout_secs: u64,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    /// Accepted for compatibility with older files; never applied.
    #[serde(default)]
    pub retry_count: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: default_navigation_timeout_secs(),
            settle_ms: default_settle_ms(),
            post_navigation_settle_ms: default_settle_ms(),
            click_settle_ms: default_settle_ms(),
            card_stable_threshold: default_card_threshold(),
            generic_stable_threshold: default_generic_threshold(),
            scrape_timeout_secs: default_scrape_timeout_secs(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            retry_count: None,
        }
    }
}

impl Settings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn post_navigation_settle(&self) -> Duration {
        Duration::from_millis(self.post_navigation_settle_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn scrape_deadline(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs)
    }

    /// Zero thresholds would end the loader before a single reading.
    fn sanitize(mut self) -> Self {
        self.card_stable_threshold = self.card_stable_threshold.max(1);
        self.generic_stable_threshold = self.generic_stable_threshold.max(1);
        if self.scrape_timeout_secs == 0 {
            self.scrape_timeout_secs = default_scrape_timeout_secs();
        }
        if self.retry_count.is_some() {
            tracing::warn!(
                target: "config",
                retry_count = ?self.retry_count,
                "retry_count is ignored; callers retry on retryable errors"
            );
        }
        self
    }

    /// Apply `SCRAPE_TIMEOUT_SECS` when it holds a positive integer.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = parse_positive_env(std::env::var(ENV_SCRAPE_TIMEOUT_SECS).ok()) {
            self.scrape_timeout_secs = secs;
        }
        self
    }
}

fn parse_positive_env(raw: Option<String>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
}

/// Load a sites file from an explicit path. Supports TOML or JSON.
pub fn load_sites_from(path: &Path) -> Result<SitesFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sites config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sites(&content, ext.as_str())
        .with_context(|| format!("parsing sites config {}", path.display()))
}

/// Resolve the sites file:
/// 1) $SITES_CONFIG_PATH
/// 2) config/sites.toml
/// 3) config/sites.json
pub fn default_sites_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(ENV_SITES_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(pb);
        }
        return Err(anyhow!(
            "{ENV_SITES_CONFIG_PATH} points to non-existent path {}",
            pb.display()
        ));
    }
    for candidate in [DEFAULT_SITES_TOML, DEFAULT_SITES_JSON] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return Ok(pb);
        }
    }
    Err(anyhow!(
        "no sites config found (set {ENV_SITES_CONFIG_PATH} or create {DEFAULT_SITES_TOML})"
    ))
}

pub fn load_sites_default() -> Result<SitesFile> {
    load_sites_from(&default_sites_path()?)
}

pub fn parse_sites(s: &str, hint_ext: &str) -> Result<SitesFile> {
    let parsed = match hint_ext {
        "toml" => parse_toml(s)?,
        "json" => parse_json(s)?,
        _ => {
            // Unknown extension: a JSON document starts with `{`.
            if s.trim_start().starts_with('{') {
                parse_json(s)?
            } else {
                parse_toml(s)?
            }
        }
    };
    Ok(SitesFile {
        defaults: parsed.defaults.sanitize(),
        sites: parsed.sites,
    })
}

fn parse_toml(s: &str) -> Result<SitesFile> {
    toml::from_str(s).map_err(|e| anyhow!("invalid TOML: {e}"))
}

fn parse_json(s: &str) -> Result<SitesFile> {
    serde_json::from_str(s).map_err(|e| anyhow!("invalid JSON: {e}"))
}
