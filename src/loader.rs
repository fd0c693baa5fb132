// src/loader.rs
//! Incremental loader: scroll until the page stops growing.
//!
//! Each reading either starts a new plateau (the measurement went up) or
//! extends the current one. The run ends once the current plateau is
//! `threshold` readings long. There is no iteration cap; callers bound the
//! run with the scrape deadline.

use std::time::Duration;

use metrics::histogram;
use tracing::{debug, info, Instrument, Span};

use crate::config::Settings;
use crate::error::Result;
use crate::metrics::LOADER_ITERATIONS;
use crate::session::PageSession;

const LOAD_MORE_SELECTORS: &[&str] = &[
    "button.load-more",
    ".btn-load-more",
    "a.more",
    "[class*=\"load-more\"]",
    "[class*=\"loadMore\"]",
];

const LOAD_MORE_LABELS: &[&str] = &["載入更多", "加載更多", "Load more", "Show more"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    pub settle: Duration,
    pub click_settle: Duration,
    pub threshold: u32,
}

impl LoaderConfig {
    /// Item-count loading; a per-site threshold wins over the default.
    pub fn card(settings: &Settings, site_threshold: Option<u32>) -> Self {
        Self {
            settle: settings.settle(),
            click_settle: settings.click_settle(),
            threshold: site_threshold.unwrap_or(settings.card_stable_threshold).max(1),
        }
    }

    pub fn generic(settings: &Settings) -> Self {
        Self {
            settle: settings.settle(),
            click_settle: settings.click_settle(),
            threshold: settings.generic_stable_threshold.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Measurement {
    /// Elements matching the card selector.
    ItemCount(String),
    /// `document.body.scrollHeight`.
    DocumentHeight,
}

impl Measurement {
    async fn read(&self, session: &dyn PageSession) -> Result<u64> {
        match self {
            Measurement::ItemCount(selector) => session.count_matches(selector).await,
            Measurement::DocumentHeight => session.scroll_height().await,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Measurement::ItemCount(_) => "item_count",
            Measurement::DocumentHeight => "document_height",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadState {
    pub last_measurement: u64,
    pub stable_readings: u32,
    pub scroll_iterations: u32,
}

impl LoadState {
    pub fn new(baseline: u64) -> Self {
        Self {
            last_measurement: baseline,
            stable_readings: 0,
            scroll_iterations: 0,
        }
    }

    /// Fold one reading in. Returns `true` when the reading grew the page.
    pub fn observe(&mut self, current: u64) -> bool {
        self.scroll_iterations += 1;
        let grew = current > self.last_measurement;
        if grew {
            self.stable_readings = 1;
        } else {
            self.stable_readings += 1;
        }
        self.last_measurement = current;
        grew
    }

    pub fn is_settled(&self, threshold: u32) -> bool {
        self.stable_readings >= threshold
    }
}

pub struct IncrementalLoader {
    config: LoaderConfig,
    span: Span,
}

impl IncrementalLoader {
    pub fn new(config: LoaderConfig, span: Span) -> Self {
        Self { config, span }
    }

    pub async fn load(&self, session: &dyn PageSession, measurement: &Measurement) -> Result<LoadState> {
        self.run(session, measurement)
            .instrument(self.span.clone())
            .await
    }

    async fn run(&self, session: &dyn PageSession, measurement: &Measurement) -> Result<LoadState> {
        let mut state = LoadState::new(measurement.read(session).await?);
        debug!(target: "loader", measure = measurement.label(), baseline = state.last_measurement, "loading started");

        loop {
            session.scroll_to_bottom().await?;
            tokio::time::sleep(self.config.settle).await;
            let current = measurement.read(session).await?;
            let grew = state.observe(current);
            debug!(
                target: "loader",
                iteration = state.scroll_iterations,
                current,
                stable = state.stable_readings,
                "reading"
            );
            if state.is_settled(self.config.threshold) {
                break;
            }
            if !grew {
                self.probe_load_more(session).await;
            }
        }

        histogram!(LOADER_ITERATIONS, "measure" => measurement.label())
            .record(f64::from(state.scroll_iterations));
        info!(
            target: "loader",
            iterations = state.scroll_iterations,
            final_measurement = state.last_measurement,
            "page stopped growing"
        );
        Ok(state)
    }

    /// Click a load-more control if one is visible. Never fails the run.
    async fn probe_load_more(&self, session: &dyn PageSession) {
        match try_load_more(session).await {
            Ok(true) => {
                debug!(target: "loader", "load-more clicked");
                tokio::time::sleep(self.config.click_settle).await;
            }
            Ok(false) => {}
            Err(e) => debug!(target: "loader", error = %e, "load-more probe failed"),
        }
    }
}

async fn try_load_more(session: &dyn PageSession) -> Result<bool> {
    let selectors: Vec<String> = LOAD_MORE_SELECTORS.iter().map(|s| s.to_string()).collect();
    if let Some((_, control)) = session.query_selector_first(&selectors).await? {
        control.click().await?;
        return Ok(true);
    }
    session.click_text(LOAD_MORE_LABELS).await
}
