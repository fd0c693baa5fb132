// src/registry.rs
//! Site registry: site id -> immutable `SiteConfig`, in load order.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use url::Url;

use crate::config::{self, Settings, SiteEntry, SitesFile};
use crate::error::{Result, ScrapeError};

pub const FIELD_CARD: &str = "card";
pub const FIELD_LINK: &str = "link";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_TIME: &str = "time";
pub const FIELD_LOCATION: &str = "location";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub site_id: String,
    pub base_url: String,
    pub search_path: String,
    pub default_params: BTreeMap<String, String>,
    pub selectors: BTreeMap<String, Vec<String>>,
    pub stable_threshold: Option<u32>,
}

impl SiteConfig {
    /// Ordered candidates for `field`; empty when the site defines none.
    pub fn selectors(&self, field: &str) -> &[String] {
        self.selectors
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// base_url + search_path, with default params overlaid by `params`.
    pub fn search_url(&self, params: Option<&BTreeMap<String, String>>) -> Result<Url> {
        let base = parse_absolute(&self.base_url)?;
        let mut url = base
            .join(self.search_path.trim_start_matches('/'))
            .map_err(|e| ScrapeError::InvalidUrl {
                url: format!("{}{}", self.base_url, self.search_path),
                reason: e.to_string(),
            })?;

        let mut merged = self.default_params.clone();
        if let Some(p) = params {
            merged.extend(p.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        append_query(&mut url, &merged);
        Ok(url)
    }
}

/// Parse `raw` and require an absolute http(s) URL.
pub fn parse_absolute(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| ScrapeError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ScrapeError::InvalidUrl {
            url: raw.to_string(),
            reason: "expected an absolute http(s) URL".to_string(),
        });
    }
    Ok(url)
}

/// Explicit caller URL plus optional params appended to its query.
pub fn explicit_url(raw: &str, params: Option<&BTreeMap<String, String>>) -> Result<Url> {
    let mut url = parse_absolute(raw)?;
    if let Some(p) = params {
        append_query(&mut url, p);
    }
    Ok(url)
}

fn append_query(url: &mut Url, params: &BTreeMap<String, String>) {
    if params.is_empty() {
        return;
    }
    url.query_pairs_mut()
        .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
}

/// Read-only after construction; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<SiteConfig>,
    index: HashMap<String, usize>,
    settings: Settings,
}

impl SiteRegistry {
    /// Load from $SITES_CONFIG_PATH / config/sites.{toml,json}.
    pub fn load_default() -> Result<Self> {
        let file = config::load_sites_default().map_err(config_error)?;
        Self::from_file(file)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let file = config::load_sites_from(path).map_err(config_error)?;
        Self::from_file(file)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file = config::parse_sites(s, "toml").map_err(config_error)?;
        Self::from_file(file)
    }

    pub fn from_file(file: SitesFile) -> Result<Self> {
        let mut reg = SiteRegistry {
            sites: Vec::with_capacity(file.sites.len()),
            index: HashMap::with_capacity(file.sites.len()),
            settings: file.defaults,
        };
        for entry in file.sites {
            reg.insert(entry)?;
        }
        Ok(reg)
    }

    fn insert(&mut self, entry: SiteEntry) -> Result<()> {
        let id = entry.id.trim().to_string();
        if id.is_empty() {
            return Err(ScrapeError::Config("site with empty id".to_string()));
        }
        if self.index.contains_key(&id) {
            return Err(ScrapeError::Config(format!("duplicate site id `{id}`")));
        }
        parse_absolute(&entry.base_url)
            .map_err(|e| ScrapeError::Config(format!("site `{id}`: {e}")))?;

        let selectors = entry
            .selectors
            .into_iter()
            .map(|(field, list)| (field, list.into_vec()))
            .collect();

        self.index.insert(id.clone(), self.sites.len());
        self.sites.push(SiteConfig {
            site_id: id,
            base_url: entry.base_url.trim().to_string(),
            search_path: entry.search_path,
            default_params: entry.default_params,
            selectors,
            stable_threshold: entry.stable_threshold.map(|t| t.max(1)),
        });
        Ok(())
    }

    pub fn resolve(&self, site_id: &str) -> Result<&SiteConfig> {
        self.get(site_id).ok_or_else(|| ScrapeError::UnknownSite {
            site: site_id.to_string(),
            suggestion: self.closest(site_id),
        })
    }

    pub fn get(&self, site_id: &str) -> Option<&SiteConfig> {
        self.index.get(site_id).map(|&i| &self.sites[i])
    }

    /// Site ids in load order.
    pub fn list_sites(&self) -> Vec<&str> {
        self.sites.iter().map(|s| s.site_id.as_str()).collect()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the service settings, e.g. after env overrides.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    fn closest(&self, needle: &str) -> Option<String> {
        let needle = needle.to_ascii_lowercase();
        self.sites
            .iter()
            .map(|s| (strsim::normalized_levenshtein(&needle, &s.site_id), s))
            .filter(|(score, _)| *score >= 0.6)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, s)| s.site_id.clone())
    }
}

fn config_error(e: anyhow::Error) -> ScrapeError {
    ScrapeError::Config(format!("{e:#}"))
}
