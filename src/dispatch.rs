// src/dispatch.rs
//! Request routing and the scrape lifecycle.
//!
//! `plan` decides the target URL and strategy before anything is opened.
//! `execute` owns the session: open, run under the deadline, close on every
//! path, report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{info, info_span, warn, Instrument, Span};
use url::Url;

use crate::error::{Result, ScrapeError};
use crate::metrics::{
    ensure_metrics_described, SCRAPE_DURATION_MS, SCRAPE_FAILURES, SCRAPE_RECORDS,
    SCRAPE_REQUESTS,
};
use crate::model::{ScrapeOutput, ScrapeRequest};
use crate::registry::{explicit_url, SiteRegistry};
use crate::session::{SessionFactory, SessionOptions};
use crate::strategy::{self, ExtractionStrategy, GenericStrategy};

/// A resolved request: where to go and how to read it.
pub struct ScrapePlan {
    pub site_id: Option<String>,
    pub target: Url,
    pub strategy: Box<dyn ExtractionStrategy>,
    span: Span,
}

impl ScrapePlan {
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}

impl std::fmt::Debug for ScrapePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapePlan")
            .field("site_id", &self.site_id)
            .field("target", &self.target.as_str())
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

pub struct Dispatcher {
    registry: Arc<SiteRegistry>,
    factory: Arc<dyn SessionFactory>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new(registry: Arc<SiteRegistry>, factory: Arc<dyn SessionFactory>) -> Self {
        ensure_metrics_described();
        Self {
            registry,
            factory,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// 1. registered site with a dedicated strategy -> that strategy;
    /// 2. any resolvable URL (explicit, or the site's search page) -> generic;
    /// 3. otherwise `UnresolvedTarget`.
    ///
    /// An unregistered `site_id` is `UnknownSite` even when a URL is given.
    pub fn plan(&self, request: &ScrapeRequest) -> Result<ScrapePlan> {
        let params = request.params.as_ref();
        let explicit = request
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        // A present id must resolve, even when blank.
        let site = match request.site_id.as_deref() {
            Some(id) => Some(self.registry.resolve(id.trim())?),
            None => None,
        };

        let target = match (explicit, site) {
            (Some(raw), _) => explicit_url(raw, params)?,
            (None, Some(site)) => site.search_url(params)?,
            (None, None) => {
                return Err(ScrapeError::UnresolvedTarget(
                    "request names neither a registered site nor a url".to_string(),
                ))
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let settings = self.registry.settings();
        let dedicated = site.and_then(|s| strategy::lookup(&s.site_id).map(|ctor| (s, ctor)));
        let strategy_name = if dedicated.is_some() { "card" } else { "generic" };
        let span = info_span!(
            "scrape",
            id,
            site = site.map(|s| s.site_id.as_str()).unwrap_or("-"),
            strategy = strategy_name,
            url = %target,
        );

        let strategy: Box<dyn ExtractionStrategy> = match dedicated {
            Some((site, ctor)) => ctor(site, settings, span.clone()),
            None => Box::new(GenericStrategy::new(settings, span.clone())),
        };

        Ok(ScrapePlan {
            site_id: site.map(|s| s.site_id.clone()),
            target,
            strategy,
            span,
        })
    }

    pub async fn execute(&self, plan: ScrapePlan) -> Result<ScrapeOutput> {
        let ScrapePlan {
            target,
            strategy,
            span,
            ..
        } = plan;
        let name = strategy.name();
        let settings = self.registry.settings();
        let deadline = settings.scrape_deadline();
        let opts = SessionOptions::from_settings(settings);
        let started = Instant::now();
        counter!(SCRAPE_REQUESTS, "strategy" => name).increment(1);

        let result = async {
            info!(target: "scrape", "navigating");
            let mut session = self.factory.open(&target, &opts).await?;

            let outcome = tokio::time::timeout(deadline, strategy.run(session.as_ref())).await;

            if let Err(e) = session.close().await {
                warn!(target: "scrape", error = %e, "session close failed");
            }
            match outcome {
                Ok(r) => r,
                Err(_) => Err(ScrapeError::Timeout(deadline.as_secs())),
            }
        }
        .instrument(span.clone())
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        histogram!(SCRAPE_DURATION_MS, "strategy" => name).record(elapsed_ms as f64);

        span.in_scope(|| match &result {
            Ok(out) => {
                counter!(SCRAPE_RECORDS, "strategy" => name).increment(out.len() as u64);
                info!(target: "scrape", records = out.len(), elapsed_ms, "scrape finished");
            }
            Err(e) => {
                counter!(SCRAPE_FAILURES, "kind" => e.kind()).increment(1);
                warn!(target: "scrape", error = %e, kind = e.kind(), elapsed_ms, "scrape failed");
            }
        });
        result
    }

    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeOutput> {
        let plan = self.plan(request).inspect_err(|e| {
            warn!(target: "scrape", error = %e, "request rejected");
            counter!(SCRAPE_FAILURES, "kind" => e.kind()).increment(1);
        })?;
        self.execute(plan).await
    }
}
