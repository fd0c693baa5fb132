// src/session/snapshot.rs
//! Offline sessions over saved HTML.
//!
//! A snapshot page is a list of frames; scrolling (or clicking) advances to
//! the next frame, which is how lazily-loaded listings are replayed. Scripts
//! cannot run, so `evaluate` is unsupported and `scroll_height` is the byte
//! length of the current frame.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{ElementHandle, PageSession, SessionFactory, SessionOptions};
use crate::error::{Result, ScrapeError};

#[derive(Debug, Default)]
struct Counters {
    opened: Mutex<Vec<String>>,
    closed: AtomicUsize,
}

/// Serves snapshot sessions by exact URL, with an optional catch-all page.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFactory {
    pages: HashMap<String, Vec<String>>,
    fallback: Option<Vec<String>>,
    counters: Arc<Counters>,
}

impl SnapshotFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, frames: Vec<String>) -> Self {
        self.pages.insert(url.into(), frames);
        self
    }

    /// Frames served for any URL without an exact entry.
    pub fn with_fallback(mut self, frames: Vec<String>) -> Self {
        self.fallback = Some(frames);
        self
    }

    /// URLs opened so far, in order.
    pub fn opened_urls(&self) -> Vec<String> {
        match self.counters.opened.lock() {
            Ok(v) => v.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn closed_sessions(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for SnapshotFactory {
    async fn open(&self, url: &Url, _opts: &SessionOptions) -> Result<Box<dyn PageSession>> {
        if let Ok(mut v) = self.counters.opened.lock() {
            v.push(url.to_string());
        }
        let frames = self
            .pages
            .get(url.as_str())
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| ScrapeError::Navigation {
                url: url.to_string(),
                reason: "no snapshot recorded for this url".to_string(),
            })?;
        let mut session = SnapshotSession::new(url.as_str(), frames);
        session.counters = Some(self.counters.clone());
        Ok(Box::new(session))
    }
}

pub struct SnapshotSession {
    url: String,
    frames: Arc<Vec<String>>,
    cursor: Arc<AtomicUsize>,
    closed: bool,
    counters: Option<Arc<Counters>>,
}

impl SnapshotSession {
    pub fn new(url: impl Into<String>, frames: Vec<String>) -> Self {
        let frames = if frames.is_empty() {
            vec![String::new()]
        } else {
            frames
        };
        Self {
            url: url.into(),
            frames: Arc::new(frames),
            cursor: Arc::new(AtomicUsize::new(0)),
            closed: false,
            counters: None,
        }
    }

    pub fn single(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self::new(url, vec![html.into()])
    }

    fn frame(&self) -> Result<&str> {
        if self.closed {
            return Err(ScrapeError::SessionClosed);
        }
        let i = self.cursor.load(Ordering::SeqCst);
        Ok(self.frames[i.min(self.frames.len() - 1)].as_str())
    }

    fn element(&self, html: String) -> Box<dyn ElementHandle> {
        Box::new(SnapshotElement {
            html,
            cursor: self.cursor.clone(),
            frames: self.frames.len(),
        })
    }
}

fn advance(cursor: &AtomicUsize, frames: usize) {
    let _ = cursor.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| {
        (i + 1 < frames).then_some(i + 1)
    });
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::Extraction(format!("invalid selector `{selector}`: {e}")))
}

fn select_outer_html(doc: &str, selector: &Selector) -> Vec<String> {
    let html = Html::parse_document(doc);
    html.select(selector).map(|el| el.html()).collect()
}

/// The element a fragment was cut from: the first element under the root.
fn fragment_root(frag: &Html) -> Option<ElementRef<'_>> {
    frag.root_element().children().find_map(ElementRef::wrap)
}

fn normalize_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let joined: String = parts.collect();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl PageSession for SnapshotSession {
    async fn query_selector_first(
        &self,
        candidates: &[String],
    ) -> Result<Option<(String, Box<dyn ElementHandle>)>> {
        let doc = self.frame()?;
        for candidate in candidates {
            let Ok(selector) = parse_selector(candidate) else {
                tracing::debug!(target: "session", %candidate, "selector rejected");
                continue;
            };
            if let Some(first) = select_outer_html(doc, &selector).into_iter().next() {
                return Ok(Some((candidate.clone(), self.element(first))));
            }
        }
        Ok(None)
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        let doc = self.frame()?;
        let selector = parse_selector(selector)?;
        Ok(select_outer_html(doc, &selector)
            .into_iter()
            .map(|h| self.element(h))
            .collect())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value> {
        self.frame()?;
        Err(ScrapeError::Browser(
            "snapshot sessions cannot evaluate scripts".to_string(),
        ))
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.frame()?;
        advance(&self.cursor, self.frames.len());
        Ok(())
    }

    async fn scroll_height(&self) -> Result<u64> {
        Ok(self.frame()?.len() as u64)
    }

    async fn count_matches(&self, selector: &str) -> Result<u64> {
        let doc = self.frame()?;
        let selector = parse_selector(selector)?;
        Ok(Html::parse_document(doc).select(&selector).count() as u64)
    }

    async fn click_text(&self, labels: &[&str]) -> Result<bool> {
        let doc = self.frame()?;
        let wanted: Vec<String> = labels.iter().map(|l| l.to_lowercase()).collect();
        let controls = parse_selector("button, a, [role=\"button\"]")?;
        let hit = Html::parse_document(doc).select(&controls).any(|el| {
            let text = normalize_text(el.text()).to_lowercase();
            !text.is_empty() && wanted.iter().any(|l| text.contains(l.as_str()))
        });
        if hit {
            advance(&self.cursor, self.frames.len());
        }
        Ok(hit)
    }

    async fn content(&self) -> Result<String> {
        Ok(self.frame()?.to_string())
    }

    async fn title(&self) -> Result<String> {
        let doc = self.frame()?;
        let selector = parse_selector("title")?;
        Ok(Html::parse_document(doc)
            .select(&selector)
            .next()
            .map(|t| normalize_text(t.text()))
            .unwrap_or_default())
    }

    async fn current_url(&self) -> Result<String> {
        self.frame()?;
        Ok(self.url.clone())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            if let Some(c) = &self.counters {
                c.closed.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

struct SnapshotElement {
    html: String,
    cursor: Arc<AtomicUsize>,
    frames: usize,
}

impl SnapshotElement {
    fn first_descendant(&self, selector: &Selector) -> Option<String> {
        let frag = Html::parse_fragment(&self.html);
        let root = fragment_root(&frag)?;
        let root_id = root.id();
        root.select(selector)
            .find(|el| el.id() != root_id)
            .map(|el| el.html())
    }

    fn with_root<T>(&self, f: impl FnOnce(ElementRef<'_>) -> T) -> Option<T> {
        let frag = Html::parse_fragment(&self.html);
        fragment_root(&frag).map(f)
    }
}

#[async_trait]
impl ElementHandle for SnapshotElement {
    async fn query_first(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>> {
        let selector = parse_selector(selector)?;
        Ok(self.first_descendant(&selector).map(|html| {
            Box::new(SnapshotElement {
                html,
                cursor: self.cursor.clone(),
                frames: self.frames,
            }) as Box<dyn ElementHandle>
        }))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .with_root(|el| el.value().attr(name).map(str::to_string))
            .flatten())
    }

    async fn inner_text(&self) -> Result<String> {
        Ok(self
            .with_root(|el| normalize_text(el.text()))
            .unwrap_or_default())
    }

    async fn click(&self) -> Result<()> {
        advance(&self.cursor, self.frames);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title> Events </title></head><body>
        <div class="card"><a class="go" href="/e/1"><h3>First</h3></a></div>
        <div class="card"><a class="go" href="/e/2"><h3>Second</h3></a></div>
        </body></html>"#;

    #[tokio::test]
    async fn first_matching_candidate_wins() {
        let s = SnapshotSession::single("https://x.test", PAGE);
        let cands = vec![".missing".to_string(), "div:has(".to_string(), ".card".to_string()];
        let (sel, el) = s.query_selector_first(&cands).await.unwrap().unwrap();
        assert_eq!(sel, ".card");
        let link = el.query_first("a.go").await.unwrap().unwrap();
        assert_eq!(link.attribute("href").await.unwrap().as_deref(), Some("/e/1"));
        assert_eq!(link.inner_text().await.unwrap(), "First");
    }

    #[tokio::test]
    async fn query_first_skips_the_element_itself() {
        let s = SnapshotSession::single("https://x.test", PAGE);
        let cards = s.query_all(".card").await.unwrap();
        assert_eq!(cards.len(), 2);
        assert!(cards[0].query_first(".card").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scrolling_advances_frames_and_saturates() {
        let s = SnapshotSession::new(
            "https://x.test",
            vec!["<p>a</p>".into(), "<p>a</p><p>b</p>".into()],
        );
        assert_eq!(s.count_matches("p").await.unwrap(), 1);
        s.scroll_to_bottom().await.unwrap();
        assert_eq!(s.count_matches("p").await.unwrap(), 2);
        s.scroll_to_bottom().await.unwrap();
        assert_eq!(s.count_matches("p").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn click_text_matches_case_insensitively() {
        let s = SnapshotSession::new(
            "https://x.test",
            vec![
                "<p>1</p><button> LOAD MORE </button>".into(),
                "<p>1</p><p>2</p>".into(),
            ],
        );
        assert!(s.click_text(&["Load more"]).await.unwrap());
        assert_eq!(s.count_matches("p").await.unwrap(), 2);
        assert!(!s.click_text(&["Load more"]).await.unwrap());
    }

    #[tokio::test]
    async fn operations_after_close_fail() {
        let mut s = SnapshotSession::single("https://x.test", PAGE);
        assert_eq!(s.title().await.unwrap(), "Events");
        s.close().await.unwrap();
        s.close().await.unwrap();
        assert!(matches!(s.content().await, Err(ScrapeError::SessionClosed)));
        assert!(matches!(
            s.query_all(".card").await,
            Err(ScrapeError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn factory_records_opens_and_closes() {
        let f = SnapshotFactory::new().with_page("https://x.test/", vec![PAGE.to_string()]);
        let url = Url::parse("https://x.test").unwrap();
        let mut s = f.open(&url, &SessionOptions::default()).await.unwrap();
        s.close().await.unwrap();
        assert_eq!(f.opened_urls(), vec!["https://x.test/".to_string()]);
        assert_eq!(f.closed_sessions(), 1);

        let other = Url::parse("https://y.test").unwrap();
        assert!(matches!(
            f.open(&other, &SessionOptions::default()).await,
            Err(ScrapeError::Navigation { .. })
        ));
    }
}
