// src/session/chromium.rs
//! Chromium-backed sessions over CDP (chromiumoxide). One browser process per
//! session, torn down by `close()` or, on unexpected paths, by `Drop`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::{ElementHandle, PageSession, SessionFactory, SessionOptions};
use crate::config::launch::LaunchProfile;
use crate::error::{Result, ScrapeError};

const IDLE_WINDOW: Duration = Duration::from_millis(500);
const IDLE_POLL: Duration = Duration::from_millis(250);

const NETWORK_PROBE: &str = "({ ready: document.readyState === 'complete', \
     resources: performance.getEntriesByType('resource').length })";

/// Kept as a plain expression: chromiumoxide treats sources that start like a
/// function declaration as something to call, not evaluate.
fn click_text_script(labels_json: &str) -> String {
    format!(
        "Array.from(document.querySelectorAll('button, a, [role=\"button\"]')).some(function (el) {{ \
           if (el.offsetParent === null) return false; \
           var text = (el.innerText || el.textContent || '').trim().toLowerCase(); \
           var hit = !!text && {labels_json}.some(function (l) {{ return text.indexOf(l.toLowerCase()) !== -1; }}); \
           if (hit) el.click(); \
           return hit; }})"
    )
}

#[derive(Debug, Deserialize)]
struct NetworkProbe {
    ready: bool,
    resources: u64,
}

/// Launches a fresh headless Chromium for every `open`.
#[derive(Debug, Clone)]
pub struct ChromiumFactory {
    profile: LaunchProfile,
}

impl ChromiumFactory {
    pub fn new(profile: LaunchProfile) -> Self {
        Self { profile }
    }

    pub fn from_env() -> Self {
        Self::new(LaunchProfile::from_env())
    }

    fn browser_config(&self, opts: &SessionOptions) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(opts.viewport.width, opts.viewport.height)
            .request_timeout(opts.navigation_timeout)
            .args(self.profile.args());
        if let Some(exe) = &self.profile.executable {
            builder = builder.chrome_executable(exe);
        }
        if self.profile.restricted {
            builder = builder.no_sandbox();
        }
        builder.build().map_err(ScrapeError::Browser)
    }
}

#[async_trait]
impl SessionFactory for ChromiumFactory {
    async fn open(&self, url: &Url, opts: &SessionOptions) -> Result<Box<dyn PageSession>> {
        let config = self.browser_config(opts)?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(ScrapeError::browser)?;

        // The CDP handler must be polled for the browser to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(target: "session", error = %e, "cdp handler event error");
                }
            }
        });

        match navigate(&browser, url, opts).await {
            Ok(page) => Ok(Box::new(ChromiumSession {
                live: Some(Live {
                    browser,
                    page,
                    handler_task,
                }),
                url: url.to_string(),
                runtime: tokio::runtime::Handle::current(),
            })),
            Err(e) => {
                shutdown_browser(&mut browser, handler_task, url.as_str()).await;
                Err(e)
            }
        }
    }
}

/// New tab, viewport, goto, network idle, then the fixed settle delay.
async fn navigate(browser: &Browser, url: &Url, opts: &SessionOptions) -> Result<Page> {
    let nav_err = |reason: String| ScrapeError::Navigation {
        url: url.to_string(),
        reason,
    };
    let started = Instant::now();

    let page = tokio::time::timeout(opts.navigation_timeout, async {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| nav_err(e.to_string()))?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(opts.viewport.width),
            i64::from(opts.viewport.height),
            1.0,
            false,
        ))
        .await
        .map_err(|e| nav_err(format!("viewport: {e}")))?;
        page.goto(url.as_str())
            .await
            .map_err(|e| nav_err(e.to_string()))?;
        Ok::<_, ScrapeError>(page)
    })
    .await
    .map_err(|_| nav_err(format!("timed out after {}s", opts.navigation_timeout.as_secs())))??;

    let budget = opts.navigation_timeout.saturating_sub(started.elapsed());
    wait_for_network_idle(&page, budget)
        .await
        .map_err(nav_err)?;

    tokio::time::sleep(opts.post_navigation_settle).await;
    Ok(page)
}

/// Quiet once the document is complete and no new resource entries appear
/// for `IDLE_WINDOW`.
async fn wait_for_network_idle(page: &Page, budget: Duration) -> std::result::Result<(), String> {
    let started = Instant::now();
    let mut last: Option<u64> = None;
    let mut quiet_since = Instant::now();

    loop {
        let probe: NetworkProbe = page
            .evaluate(NETWORK_PROBE)
            .await
            .map_err(|e| e.to_string())?
            .into_value()
            .map_err(|e| e.to_string())?;

        if last != Some(probe.resources) {
            last = Some(probe.resources);
            quiet_since = Instant::now();
        } else if probe.ready && quiet_since.elapsed() >= IDLE_WINDOW {
            return Ok(());
        }

        if started.elapsed() >= budget {
            return Err("timed out waiting for network idle".to_string());
        }
        tokio::time::sleep(IDLE_POLL).await;
    }
}

async fn shutdown_browser(browser: &mut Browser, handler_task: JoinHandle<()>, url: &str) {
    if let Err(e) = browser.close().await {
        warn!(target: "session", %url, error = %e, "browser close failed");
    }
    if let Err(e) = browser.wait().await {
        debug!(target: "session", %url, error = %e, "browser wait failed");
    }
    handler_task.abort();
}

struct Live {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

pub struct ChromiumSession {
    live: Option<Live>,
    url: String,
    runtime: tokio::runtime::Handle,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page> {
        self.live
            .as_ref()
            .map(|l| &l.page)
            .ok_or(ScrapeError::SessionClosed)
    }

    async fn eval_number(&self, script: &str) -> Result<u64> {
        let v = self.evaluate(script).await?;
        v.as_f64()
            .map(|n| n.max(0.0) as u64)
            .ok_or_else(|| ScrapeError::Browser(format!("`{script}` returned {v}")))
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn query_selector_first(
        &self,
        candidates: &[String],
    ) -> Result<Option<(String, Box<dyn ElementHandle>)>> {
        let page = self.page()?;
        for selector in candidates {
            match page.find_elements(selector.as_str()).await {
                Ok(found) => {
                    if let Some(el) = found.into_iter().next() {
                        return Ok(Some((
                            selector.clone(),
                            Box::new(ChromiumElement(el)) as Box<dyn ElementHandle>,
                        )));
                    }
                }
                // An unsupported selector is a miss, not a failure of the chain.
                Err(e) => debug!(target: "session", %selector, error = %e, "selector rejected"),
            }
        }
        Ok(None)
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        let found = self
            .page()?
            .find_elements(selector)
            .await
            .map_err(ScrapeError::browser)?;
        Ok(found
            .into_iter()
            .map(|el| Box::new(ChromiumElement(el)) as Box<dyn ElementHandle>)
            .collect())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(ScrapeError::browser)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map(|_| ())
    }

    async fn scroll_height(&self) -> Result<u64> {
        self.eval_number("document.body.scrollHeight").await
    }

    async fn count_matches(&self, selector: &str) -> Result<u64> {
        let quoted = serde_json::to_string(selector)
            .map_err(|e| ScrapeError::Extraction(e.to_string()))?;
        self.eval_number(&format!("document.querySelectorAll({quoted}).length"))
            .await
    }

    async fn click_text(&self, labels: &[&str]) -> Result<bool> {
        let quoted = serde_json::to_string(labels)
            .map_err(|e| ScrapeError::Extraction(e.to_string()))?;
        let v = self.evaluate(&click_text_script(&quoted)).await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    async fn content(&self) -> Result<String> {
        self.page()?.content().await.map_err(ScrapeError::browser)
    }

    async fn title(&self) -> Result<String> {
        Ok(self
            .page()?
            .get_title()
            .await
            .map_err(ScrapeError::browser)?
            .unwrap_or_default())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .page()?
            .url()
            .await
            .map_err(ScrapeError::browser)?
            .unwrap_or_else(|| self.url.clone()))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(Live {
            mut browser,
            page,
            handler_task,
        }) = self.live.take()
        else {
            return Ok(());
        };
        if let Err(e) = page.close().await {
            debug!(target: "session", url = %self.url, error = %e, "page close failed");
        }
        shutdown_browser(&mut browser, handler_task, &self.url).await;
        debug!(target: "session", url = %self.url, "session closed");
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(Live {
            mut browser,
            page,
            handler_task,
        }) = self.live.take()
        {
            let url = std::mem::take(&mut self.url);
            warn!(target: "session", %url, "session dropped without close; cleaning up in background");
            self.runtime.spawn(async move {
                let _ = page.close().await;
                shutdown_browser(&mut browser, handler_task, &url).await;
            });
        }
    }
}

struct ChromiumElement(Element);

#[async_trait]
impl ElementHandle for ChromiumElement {
    async fn query_first(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>> {
        let found = self
            .0
            .find_elements(selector)
            .await
            .map_err(ScrapeError::browser)?;
        Ok(found
            .into_iter()
            .next()
            .map(|el| Box::new(ChromiumElement(el)) as Box<dyn ElementHandle>))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.0.attribute(name).await.map_err(ScrapeError::browser)
    }

    async fn inner_text(&self) -> Result<String> {
        Ok(self
            .0
            .inner_text()
            .await
            .map_err(ScrapeError::browser)?
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    async fn click(&self) -> Result<()> {
        self.0.click().await.map_err(ScrapeError::browser)?;
        Ok(())
    }
}
