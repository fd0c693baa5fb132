// src/strategy/generic.rs
use async_trait::async_trait;
use tracing::{info, Span};

use super::{ExtractionStrategy, Located};
use crate::config::Settings;
use crate::error::Result;
use crate::extract::extract_metadata;
use crate::loader::{IncrementalLoader, LoaderConfig, Measurement};
use crate::model::{PageRecord, ScrapeOutput};
use crate::session::PageSession;

/// Any page: load it fully, then capture it whole.
pub struct GenericStrategy {
    loader: IncrementalLoader,
    span: Span,
}

impl GenericStrategy {
    pub fn new(settings: &Settings, span: Span) -> Self {
        Self {
            loader: IncrementalLoader::new(LoaderConfig::generic(settings), span.clone()),
            span,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for GenericStrategy {
    fn name(&self) -> &'static str {
        "generic"
    }

    async fn locate_items(&self, _session: &dyn PageSession) -> Result<Located> {
        Ok(Located::Page)
    }

    async fn extract(&self, session: &dyn PageSession, _located: Located) -> Result<ScrapeOutput> {
        self.loader.load(session, &Measurement::DocumentHeight).await?;

        let html = session.content().await?;
        let title = session.title().await?;
        let url = session.current_url().await?;
        let metas = session.query_all("meta").await?;
        let metadata = extract_metadata(&metas).await;

        self.span.in_scope(|| {
            info!(
                target: "scrape",
                %url,
                html_bytes = html.len(),
                meta = metadata.len(),
                "page captured"
            )
        });
        Ok(ScrapeOutput::Pages(vec![PageRecord {
            url,
            title,
            html,
            metadata,
        }]))
    }
}
