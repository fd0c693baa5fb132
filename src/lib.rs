// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod loader;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod session;
pub mod strategy;

pub use crate::api::{router, AppState};
pub use crate::dispatch::{Dispatcher, ScrapePlan};
pub use crate::error::{Result, ScrapeError};
pub use crate::model::{EventRecord, PageRecord, ScrapeOutput, ScrapeRequest};
pub use crate::registry::{SiteConfig, SiteRegistry};
