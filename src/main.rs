//! Event listing scraper: binary entrypoint.
//! Loads the site registry, wires the browser-backed dispatcher into the Axum
//! router and serves it on HOST:PORT.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use event_listing_scraper::api::{self, AppState};
use event_listing_scraper::config::Settings;
use event_listing_scraper::metrics::Metrics;
use event_listing_scraper::session::chromium::ChromiumFactory;
use event_listing_scraper::{Dispatcher, SiteRegistry};

const DEFAULT_FILTER: &str = "event_listing_scraper=info,warn";

/// Install the global subscriber once. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn bind_addr() -> anyhow::Result<SocketAddr> {
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = match std::env::var("PORT") {
        Ok(p) => p.trim().parse().with_context(|| format!("invalid PORT `{p}`"))?,
        Err(_) => 8000,
    };
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let registry = SiteRegistry::load_default().context("loading site registry")?;
    let settings: Settings = registry.settings().clone().with_env_overrides();
    info!(
        sites = registry.len(),
        scrape_timeout_secs = settings.scrape_timeout_secs,
        "site registry loaded"
    );
    let registry = registry.with_settings(settings);

    // Recorder first, so metric descriptions land in it.
    let metrics = Metrics::init()?;
    let factory = ChromiumFactory::from_env();
    let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(factory));
    let app = api::router_with_metrics(AppState::new(dispatcher), &metrics);

    let addr = bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
