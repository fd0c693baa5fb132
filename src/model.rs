// src/model.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const UNKNOWN_TITLE: &str = "unknown title";
pub const UNKNOWN_TIME: &str = "unknown time";
pub const UNKNOWN_LOCATION: &str = "unknown location";

/// One event card extracted by a site-specific strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    pub title: String,
    pub link: String,
    pub time: String,
    pub location: String,
}

/// Whole-page capture produced by the generic strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub html: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapeRequest {
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub params: Option<BTreeMap<String, String>>,
}

impl ScrapeRequest {
    pub fn for_site(site_id: impl Into<String>) -> Self {
        Self {
            site_id: Some(site_id.into()),
            ..Self::default()
        }
    }

    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// What a strategy hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ScrapeOutput {
    Events(Vec<EventRecord>),
    Pages(Vec<PageRecord>),
}

impl ScrapeOutput {
    pub fn len(&self) -> usize {
        match self {
            ScrapeOutput::Events(v) => v.len(),
            ScrapeOutput::Pages(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
