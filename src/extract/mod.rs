// src/extract/mod.rs
//! Field extraction from located items.
//!
//! Every field has an ordered selector chain. The first selector that matches
//! inside the item wins; later ones are never consulted or merged. Missing
//! text fields get the `UNKNOWN_*` sentinels, a missing link is `""`.

pub mod metadata;

pub use metadata::extract_metadata;

use metrics::counter;
use tracing::{debug, warn, Instrument, Span};
use url::Url;

use crate::error::Result;
use crate::metrics::SCRAPE_ITEM_ERRORS;
use crate::model::{EventRecord, UNKNOWN_LOCATION, UNKNOWN_TIME, UNKNOWN_TITLE};
use crate::registry::{SiteConfig, FIELD_LINK, FIELD_LOCATION, FIELD_TIME, FIELD_TITLE};
use crate::session::ElementHandle;

/// Selector chains for the four record fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelectors {
    pub link: Vec<String>,
    pub title: Vec<String>,
    pub time: Vec<String>,
    pub location: Vec<String>,
}

impl FieldSelectors {
    pub fn from_site(site: &SiteConfig) -> Self {
        Self {
            link: site.selectors(FIELD_LINK).to_vec(),
            title: site.selectors(FIELD_TITLE).to_vec(),
            time: site.selectors(FIELD_TIME).to_vec(),
            location: site.selectors(FIELD_LOCATION).to_vec(),
        }
    }
}

/// Make `href` absolute. Absolute URLs come back untouched.
pub fn absolutize_link(href: &str, base_url: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if Url::parse(href).is_ok() {
        return href.to_string();
    }
    match Url::parse(base_url).and_then(|b| b.join(href)) {
        Ok(u) => u.to_string(),
        Err(_) => format!("{base_url}{href}"),
    }
}

async fn first_match(
    item: &dyn ElementHandle,
    candidates: &[String],
) -> Result<Option<Box<dyn ElementHandle>>> {
    for selector in candidates {
        if let Some(el) = item.query_first(selector).await? {
            return Ok(Some(el));
        }
    }
    Ok(None)
}

async fn text_or(item: &dyn ElementHandle, candidates: &[String], sentinel: &str) -> Result<String> {
    match first_match(item, candidates).await? {
        Some(el) => el.inner_text().await,
        None => Ok(sentinel.to_string()),
    }
}

/// Read one record out of `item`. Any DOM error fails the whole item.
pub async fn extract_record(
    item: &dyn ElementHandle,
    fields: &FieldSelectors,
    base_url: &str,
) -> Result<EventRecord> {
    let link = match first_match(item, &fields.link).await? {
        Some(el) => el
            .attribute("href")
            .await?
            .map(|href| absolutize_link(&href, base_url))
            .unwrap_or_default(),
        None => String::new(),
    };

    Ok(EventRecord {
        title: text_or(item, &fields.title, UNKNOWN_TITLE).await?,
        link,
        time: text_or(item, &fields.time, UNKNOWN_TIME).await?,
        location: text_or(item, &fields.location, UNKNOWN_LOCATION).await?,
    })
}

/// Records in item order plus the number of items that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub records: Vec<EventRecord>,
    pub skipped: usize,
}

pub struct FieldExtractor {
    fields: FieldSelectors,
    base_url: String,
    span: Span,
}

impl FieldExtractor {
    pub fn new(fields: FieldSelectors, base_url: impl Into<String>, span: Span) -> Self {
        Self {
            fields,
            base_url: base_url.into(),
            span,
        }
    }

    pub fn for_site(site: &SiteConfig, span: Span) -> Self {
        Self::new(FieldSelectors::from_site(site), site.base_url.clone(), span)
    }

    pub async fn extract_record(&self, item: &dyn ElementHandle) -> Result<EventRecord> {
        extract_record(item, &self.fields, &self.base_url).await
    }

    /// A failing item is logged, counted and left out; the rest keep their order.
    pub async fn extract_records(&self, items: &[Box<dyn ElementHandle>]) -> Extracted {
        async {
            let mut out = Extracted {
                records: Vec::with_capacity(items.len()),
                skipped: 0,
            };
            for (index, item) in items.iter().enumerate() {
                match self.extract_record(item.as_ref()).await {
                    Ok(rec) => out.records.push(rec),
                    Err(e) => {
                        out.skipped += 1;
                        counter!(SCRAPE_ITEM_ERRORS).increment(1);
                        warn!(target: "extract", index, error = %e, "item skipped");
                    }
                }
            }
            debug!(
                target: "extract",
                records = out.records.len(),
                skipped = out.skipped,
                "items extracted"
            );
            out
        }
        .instrument(self.span.clone())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::session::snapshot::SnapshotSession;
    use crate::session::PageSession;
    use async_trait::async_trait;

    fn fields() -> FieldSelectors {
        FieldSelectors {
            link: vec!["a.go".into()],
            title: vec![".t1".into(), ".t2".into()],
            time: vec![".when".into()],
            location: vec![".where".into()],
        }
    }

    const CARDS: &str = r#"<html><body>
      <div class="card"><a class="go" href="/e/1">x</a>
        <span class="t2">Second choice</span><span class="t1"> First choice </span>
        <span class="when">Sat 10:00</span><span class="where">Taipei</span></div>
      <div class="card"><a class="go" href="https://other.test/e/2">x</a>
        <span class="t2">Only B</span><span class="when">Sun</span></div>
    </body></html>"#;

    #[test]
    fn absolutize_examples() {
        assert_eq!(absolutize_link("/e/123", "https://x.test"), "https://x.test/e/123");
        assert_eq!(
            absolutize_link("https://cdn.test/a?b=1", "https://x.test"),
            "https://cdn.test/a?b=1"
        );
        assert_eq!(absolutize_link("e/5", "https://x.test/list/"), "https://x.test/list/e/5");
        assert_eq!(absolutize_link("/e/1", "not-a-base"), "not-a-base/e/1");
        assert_eq!(absolutize_link("   ", "https://x.test"), "");
    }

    #[tokio::test]
    async fn first_match_wins_and_sentinels_fill_gaps() {
        let s = SnapshotSession::single("https://x.test", CARDS);
        let cards = s.query_all(".card").await.unwrap();
        let ex = FieldExtractor::new(fields(), "https://x.test", Span::none());

        let first = ex.extract_record(cards[0].as_ref()).await.unwrap();
        assert_eq!(first.title, "First choice");
        assert_eq!(first.link, "https://x.test/e/1");
        assert_eq!(first.location, "Taipei");

        let second = ex.extract_record(cards[1].as_ref()).await.unwrap();
        assert_eq!(second.title, "Only B");
        assert_eq!(second.link, "https://other.test/e/2");
        assert_eq!(second.location, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn no_link_selector_gives_empty_link() {
        let s = SnapshotSession::single("https://x.test", CARDS);
        let cards = s.query_all(".card").await.unwrap();
        let rec = extract_record(cards[0].as_ref(), &FieldSelectors::default(), "https://x.test")
            .await
            .unwrap();
        assert_eq!(rec.link, "");
        assert_eq!(rec.title, UNKNOWN_TITLE);
        assert_eq!(rec.time, UNKNOWN_TIME);
    }

    #[tokio::test]
    async fn re_extraction_is_idempotent() {
        let s = SnapshotSession::single("https://x.test", CARDS);
        let ex = FieldExtractor::new(fields(), "https://x.test", Span::none());
        let a = ex.extract_records(&s.query_all(".card").await.unwrap()).await;
        let b = ex.extract_records(&s.query_all(".card").await.unwrap()).await;
        assert_eq!(a, b);
        assert_eq!(a.records.len(), 2);
    }

    struct Item {
        title: &'static str,
        broken: bool,
    }

    struct Text(&'static str);

    #[async_trait]
    impl ElementHandle for Text {
        async fn query_first(&self, _s: &str) -> Result<Option<Box<dyn ElementHandle>>> {
            Ok(None)
        }
        async fn attribute(&self, _n: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn inner_text(&self) -> Result<String> {
            Ok(self.0.to_string())
        }
        async fn click(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ElementHandle for Item {
        async fn query_first(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>> {
            if self.broken {
                return Err(ScrapeError::Extraction("node detached".into()));
            }
            Ok((selector == ".t1").then(|| Box::new(Text(self.title)) as Box<dyn ElementHandle>))
        }
        async fn attribute(&self, _n: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn inner_text(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn click(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_item_is_isolated_and_order_kept() {
        let items: Vec<Box<dyn ElementHandle>> = vec![
            Box::new(Item { title: "one", broken: false }),
            Box::new(Item { title: "two", broken: true }),
            Box::new(Item { title: "three", broken: false }),
        ];
        let ex = FieldExtractor::new(fields(), "https://x.test", Span::none());
        let out = ex.extract_records(&items).await;
        assert_eq!(out.skipped, 1);
        let titles: Vec<_> = out.records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["one", "three"]);
    }
}
