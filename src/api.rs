// src/api.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::dispatch::Dispatcher;
use crate::error::ScrapeError;
use crate::metrics::Metrics;
use crate::model::{ScrapeOutput, ScrapeRequest};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { "ok" }))
        .route("/sites", get(sites))
        .route("/scrape", post(scrape))
        .route("/scrape_url", post(scrape_url))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Same routes plus `/metrics`.
pub fn router_with_metrics(state: AppState, metrics: &Metrics) -> Router {
    router(state).merge(metrics.router())
}

#[derive(Serialize)]
struct Welcome {
    message: &'static str,
}

async fn root() -> Json<Welcome> {
    Json(Welcome {
        message: "event listing scraper: POST /scrape or /scrape_url, GET /sites",
    })
}

#[derive(Serialize)]
struct SitesOut {
    sites: Vec<String>,
}

async fn sites(State(state): State<AppState>) -> Json<SitesOut> {
    let sites = state
        .dispatcher
        .registry()
        .list_sites()
        .into_iter()
        .map(str::to_string)
        .collect();
    Json(SitesOut { sites })
}

#[derive(Deserialize)]
struct ScrapeReq {
    site: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    params: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
struct ScrapeUrlReq {
    url: String,
    #[serde(default)]
    params: Option<BTreeMap<String, String>>,
}

#[derive(Serialize)]
struct ScrapeResp {
    status: &'static str,
    data: ScrapeOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retryable: Option<bool>,
}

fn success(out: ScrapeOutput, source: &str) -> Response {
    let message = format!("scraped {} records from {source}", out.len());
    Json(ScrapeResp {
        status: "success",
        data: out,
        message: Some(message),
        retryable: None,
    })
    .into_response()
}

fn failure(e: &ScrapeError) -> Response {
    let code = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let body = ScrapeResp {
        status: "error",
        data: ScrapeOutput::Events(Vec::new()),
        message: Some(e.to_string()),
        retryable: e.is_retryable().then_some(true),
    };
    (code, Json(body)).into_response()
}

/// Body rejections get the same error envelope as scrape failures.
fn rejected(e: JsonRejection) -> Response {
    failure(&ScrapeError::InvalidRequest(e.body_text()))
}

async fn scrape(
    State(state): State<AppState>,
    body: Result<Json<ScrapeReq>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return rejected(e),
    };
    let req = ScrapeRequest {
        site_id: Some(body.site.clone()),
        url: body.url,
        params: body.params,
    };
    match state.dispatcher.scrape(&req).await {
        Ok(out) => success(out, &body.site),
        Err(e) => failure(&e),
    }
}

async fn scrape_url(
    State(state): State<AppState>,
    body: Result<Json<ScrapeUrlReq>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return rejected(e),
    };
    let mut req = ScrapeRequest::for_url(body.url.clone());
    req.params = body.params;
    match state.dispatcher.scrape(&req).await {
        Ok(out) => success(out, &body.url),
        Err(e) => failure(&e),
    }
}
