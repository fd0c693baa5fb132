// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot, with the
// snapshot session factory standing in for Chromium.
//
// Covered:
// - GET /, /health, /sites
// - POST /scrape (card strategy, generic fallback, 400s, 500 with retryable)
// - missing or malformed JSON bodies
// - POST /scrape_url

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use event_listing_scraper::api::{self, AppState};
use event_listing_scraper::session::snapshot::SnapshotFactory;
use event_listing_scraper::{Dispatcher, SiteRegistry};

const BODY_LIMIT: usize = 1024 * 1024;

const SITES: &str = r#"
[defaults]
settle_ms = 0
click_settle_ms = 0
post_navigation_settle_ms = 0
card_stable_threshold = 1
generic_stable_threshold = 1

[[sites]]
id = "accupass"
base_url = "https://www.accupass.com"
search_path = "/search"
[sites.default_params]
p = "free"
[sites.selectors]
card = [".missing", "div[class*='EventCard-module__card']"]
link = ["a[href^='/event/']", "a"]
title = "p[class*='EventCard-module__title']"
time = "p[class*='EventCard-module__date']"
location = "p[class*='EventCard-module__location']"

[[sites]]
id = "kktix"
base_url = "https://kktix.com"
search_path = "/events"
"#;

const LISTING: &str = include_str!("fixtures/accupass_listing.html");

const KKTIX: &str = r#"<html><head><title>KKTIX events</title>
<meta property="og:site_name" content="KKTIX"></head><body><ul><li>a</li></ul></body></html>"#;

fn factory() -> SnapshotFactory {
    SnapshotFactory::new()
        .with_page("https://www.accupass.com/search?p=free", vec![LISTING.to_string()])
        .with_page("https://kktix.com/events", vec![KKTIX.to_string()])
        .with_page("https://www.accupass.com/empty", vec!["<p>nothing</p>".to_string()])
}

/// Build the same Router the binary uses, minus `/metrics`.
fn test_router(factory: SnapshotFactory) -> Router {
    let registry = SiteRegistry::from_toml_str(SITES).expect("sites parse");
    let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(factory));
    api::router(AppState::new(dispatcher))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

fn as_json(bytes: &[u8]) -> Json {
    serde_json::from_slice(bytes).expect("json body")
}

#[tokio::test]
async fn health_and_root() {
    let (status, body) = send(test_router(factory()), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap().trim(), "ok");

    let (status, body) = send(test_router(factory()), "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(as_json(&body)["message"].is_string());
}

#[tokio::test]
async fn sites_lists_in_config_order() {
    let (status, body) = send(test_router(factory()), "GET", "/sites", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), json!({ "sites": ["accupass", "kktix"] }));
}

#[tokio::test]
async fn scrape_registered_card_site() {
    let f = factory();
    let (status, body) = send(
        test_router(f.clone()),
        "POST",
        "/scrape",
        Some(json!({ "site": "accupass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v = as_json(&body);
    assert_eq!(v["status"], "success");

    let data = v["data"].as_array().expect("data array");
    assert_eq!(data.len(), 3);
    assert_eq!(data[0]["title"], "Rust 讀書會");
    assert_eq!(data[0]["link"], "https://www.accupass.com/event/2401011200001");
    assert_eq!(data[0]["location"], "台北市中正區");
    assert_eq!(data[1]["link"], "https://www.accupass.com/event/2401011200002");
    assert_eq!(data[1]["location"], "unknown location");
    assert_eq!(data[2]["title"], "unknown title");
    assert_eq!(data[2]["link"], "");
    assert!(v["message"].as_str().unwrap().contains('3'));

    assert_eq!(f.opened_urls(), vec!["https://www.accupass.com/search?p=free"]);
    assert_eq!(f.closed_sessions(), 1);
}

#[tokio::test]
async fn registered_site_without_module_returns_page_record() {
    let (status, body) = send(
        test_router(factory()),
        "POST",
        "/scrape",
        Some(json!({ "site": "kktix" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v = as_json(&body);
    let page = &v["data"][0];
    assert_eq!(page["url"], "https://kktix.com/events");
    assert_eq!(page["title"], "KKTIX events");
    assert_eq!(page["metadata"]["og:site_name"], "KKTIX");
    assert!(page["html"].as_str().unwrap().contains("<li>a</li>"));
}

#[tokio::test]
async fn unknown_site_is_400_with_suggestion() {
    let (status, body) = send(
        test_router(factory()),
        "POST",
        "/scrape",
        Some(json!({ "site": "acupass" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let v = as_json(&body);
    assert_eq!(v["status"], "error");
    assert_eq!(v["data"], json!([]));
    assert!(v["message"].as_str().unwrap().contains("accupass"));
}

#[tokio::test]
async fn extraction_failure_is_500_error_body() {
    let f = factory();
    let (status, body) = send(
        test_router(f.clone()),
        "POST",
        "/scrape",
        Some(json!({ "site": "accupass", "url": "https://www.accupass.com/empty" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let v = as_json(&body);
    assert_eq!(v["status"], "error");
    assert_eq!(v["data"], json!([]));
    assert!(v.get("retryable").is_none());
    assert_eq!(f.closed_sessions(), 1);
}

#[tokio::test]
async fn navigation_failure_is_retryable() {
    let (status, body) = send(
        test_router(factory()),
        "POST",
        "/scrape_url",
        Some(json!({ "url": "https://unreachable.test/" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(as_json(&body)["retryable"], true);
}

#[tokio::test]
async fn scrape_url_uses_generic_capture_and_params() {
    let f = SnapshotFactory::new().with_page(
        "https://blog.test/list?page=2",
        vec!["<html><head><title>Blog</title></head><body>x</body></html>".to_string()],
    );
    let (status, body) = send(
        test_router(f),
        "POST",
        "/scrape_url",
        Some(json!({ "url": "https://blog.test/list", "params": { "page": "2" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v = as_json(&body);
    assert_eq!(v["data"][0]["title"], "Blog");
    assert_eq!(v["data"][0]["url"], "https://blog.test/list?page=2");
}

#[tokio::test]
async fn scrape_url_with_blank_url_is_400() {
    let (status, _) = send(
        test_router(factory()),
        "POST",
        "/scrape_url",
        Some(json!({ "url": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn blank_site_is_400_even_with_url() {
    for site in ["", "  "] {
        let (status, body) = send(
            test_router(factory()),
            "POST",
            "/scrape",
            Some(json!({ "site": site, "url": "https://kktix.com/events" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "site {site:?}");
        let v = as_json(&body);
        assert_eq!(v["status"], "error");
        assert!(v["message"].as_str().unwrap().contains("unsupported site"));
    }
}

#[tokio::test]
async fn missing_site_field_is_400_error_body() {
    let (status, body) = send(
        test_router(factory()),
        "POST",
        "/scrape",
        Some(json!({ "url": "https://kktix.com/events" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let v = as_json(&body);
    assert_eq!(v["status"], "error");
    assert_eq!(v["data"], json!([]));
    assert!(v["message"].as_str().unwrap().starts_with("invalid request"));
}

#[tokio::test]
async fn malformed_json_is_400_error_body() {
    let req = Request::post("/scrape_url")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"url": "#))
        .unwrap();
    let resp = test_router(factory()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let v = as_json(&bytes);
    assert_eq!(v["status"], "error");
    assert_eq!(v["data"], json!([]));
    assert!(v.get("retryable").is_none());
}
