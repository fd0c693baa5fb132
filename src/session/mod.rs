// src/session/mod.rs
//! Page session capability: the only boundary the extraction engine has with
//! a browser. Chromium drives real pages; `snapshot` replays saved HTML.

pub mod chromium;
pub mod snapshot;

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::Settings;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// Per-open knobs, derived from `Settings`.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub viewport: Viewport,
    pub navigation_timeout: Duration,
    /// Fixed wait after network idle for client-side rendering.
    pub post_navigation_settle: Duration,
}

impl SessionOptions {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            viewport: Viewport {
                width: s.viewport_width,
                height: s.viewport_height,
            },
            navigation_timeout: s.navigation_timeout(),
            post_navigation_settle: s.post_navigation_settle(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// A located DOM element.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    /// First descendant matching `selector`, if any.
    async fn query_first(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>>;
    async fn attribute(&self, name: &str) -> Result<Option<String>>;
    /// Rendered text, trimmed.
    async fn inner_text(&self) -> Result<String>;
    async fn click(&self) -> Result<()>;
}

/// One open tab. Operations after `close()` fail with `SessionClosed`.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Try `candidates` in order; return the first selector that matches
    /// anything together with its first element.
    async fn query_selector_first(
        &self,
        candidates: &[String],
    ) -> Result<Option<(String, Box<dyn ElementHandle>)>>;

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn scroll_to_bottom(&self) -> Result<()>;

    /// `document.body.scrollHeight`.
    async fn scroll_height(&self) -> Result<u64>;

    /// Number of elements matching `selector`.
    async fn count_matches(&self, selector: &str) -> Result<u64>;

    /// Click the first button/link whose visible text equals one of `labels`.
    async fn click_text(&self, labels: &[&str]) -> Result<bool>;

    async fn content(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    /// Release the tab and its browser. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Opens sessions; one per scrape call, never shared.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, url: &Url, opts: &SessionOptions) -> Result<Box<dyn PageSession>>;
}
