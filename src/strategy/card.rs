// src/strategy/card.rs
//! Listing pages made of repeated event cards.

use async_trait::async_trait;
use tracing::{info, Span};

use super::{ExtractionStrategy, Located};
use crate::config::Settings;
use crate::error::{Result, ScrapeError};
use crate::extract::FieldExtractor;
use crate::loader::{IncrementalLoader, LoaderConfig, Measurement};
use crate::model::ScrapeOutput;
use crate::registry::{SiteConfig, FIELD_CARD};
use crate::session::PageSession;

pub struct CardStrategy {
    card_selectors: Vec<String>,
    loader: IncrementalLoader,
    extractor: FieldExtractor,
    span: Span,
}

impl CardStrategy {
    pub fn new(site: SiteConfig, settings: &Settings, span: Span) -> Self {
        Self {
            card_selectors: site.selectors(FIELD_CARD).to_vec(),
            loader: IncrementalLoader::new(
                LoaderConfig::card(settings, site.stable_threshold),
                span.clone(),
            ),
            extractor: FieldExtractor::for_site(&site, span.clone()),
            span,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for CardStrategy {
    fn name(&self) -> &'static str {
        "card"
    }

    async fn locate_items(&self, session: &dyn PageSession) -> Result<Located> {
        match session.query_selector_first(&self.card_selectors).await? {
            Some((selector, _)) => {
                self.span
                    .in_scope(|| info!(target: "scrape", %selector, "card selector chosen"));
                Ok(Located::Items(selector))
            }
            None => Err(ScrapeError::SelectorNotFound {
                field: FIELD_CARD.to_string(),
                candidates: self.card_selectors.clone(),
            }),
        }
    }

    async fn extract(&self, session: &dyn PageSession, located: Located) -> Result<ScrapeOutput> {
        let Located::Items(selector) = located else {
            return Err(ScrapeError::Extraction(
                "card strategy needs a located item selector".to_string(),
            ));
        };
        self.loader
            .load(session, &Measurement::ItemCount(selector.clone()))
            .await?;

        let cards = session.query_all(&selector).await?;
        self.span
            .in_scope(|| info!(target: "scrape", cards = cards.len(), "cards found"));

        let extracted = self.extractor.extract_records(&cards).await;
        Ok(ScrapeOutput::Events(extracted.records))
    }
}
