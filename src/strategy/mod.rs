// src/strategy/mod.rs
//! Extraction strategies and the table of sites that have a dedicated one.

pub mod card;
pub mod generic;

pub use card::CardStrategy;
pub use generic::GenericStrategy;

use async_trait::async_trait;
use tracing::Span;

use crate::config::Settings;
use crate::error::Result;
use crate::model::ScrapeOutput;
use crate::registry::SiteConfig;
use crate::session::PageSession;

/// What `locate_items` found on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// Repeated items matched by this selector.
    Items(String),
    /// The whole document.
    Page,
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn locate_items(&self, session: &dyn PageSession) -> Result<Located>;

    async fn extract(&self, session: &dyn PageSession, located: Located) -> Result<ScrapeOutput>;

    async fn run(&self, session: &dyn PageSession) -> Result<ScrapeOutput> {
        let located = self.locate_items(session).await?;
        self.extract(session, located).await
    }
}

pub type StrategyCtor = fn(&SiteConfig, &Settings, Span) -> Box<dyn ExtractionStrategy>;

fn card_strategy(site: &SiteConfig, settings: &Settings, span: Span) -> Box<dyn ExtractionStrategy> {
    Box::new(CardStrategy::new(site.clone(), settings, span))
}

/// Sites with a dedicated strategy. Any other registered site is scraped
/// with the generic strategy.
pub static REGISTERED: &[(&str, StrategyCtor)] = &[("accupass", card_strategy)];

pub fn lookup(site_id: &str) -> Option<StrategyCtor> {
    REGISTERED
        .iter()
        .find(|(id, _)| *id == site_id)
        .map(|(_, ctor)| *ctor)
}

pub fn has_dedicated(site_id: &str) -> bool {
    lookup(site_id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lookup() {
        assert!(has_dedicated("accupass"));
        assert!(!has_dedicated("kktix"));
        assert!(!has_dedicated("Accupass"));
    }
}
