// src/error.rs
//! Error taxonomy shared by every stage of a scrape call.

use thiserror::Error;

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Registry could not be built. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported site: {site}{}", suggestion_suffix(.suggestion))]
    UnknownSite {
        site: String,
        suggestion: Option<String>,
    },

    /// Request body missing, malformed, or of the wrong shape.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Neither a site id nor an explicit URL produced a navigable target.
    #[error("cannot resolve a target URL: {0}")]
    UnresolvedTarget(String),

    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("page session already closed")]
    SessionClosed,

    /// Per-item failure; caught at the extractor boundary.
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("no `{field}` selector matched (tried: {})", .candidates.join(", "))]
    SelectorNotFound {
        field: String,
        candidates: Vec<String>,
    },

    #[error("scrape exceeded deadline of {0}s")]
    Timeout(u64),

    #[error("browser error: {0}")]
    Browser(String),
}

fn suggestion_suffix(s: &Option<String>) -> String {
    match s {
        Some(s) => format!(" (did you mean `{s}`?)"),
        None => String::new(),
    }
}

impl ScrapeError {
    /// Bad input from the caller rather than a failure on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ScrapeError::UnknownSite { .. }
                | ScrapeError::InvalidRequest(_)
                | ScrapeError::UnresolvedTarget(_)
                | ScrapeError::InvalidUrl { .. }
        )
    }

    /// The caller may retry the same request; nothing here retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScrapeError::Navigation { .. } | ScrapeError::Timeout(_))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Config(_) => "config",
            ScrapeError::UnknownSite { .. } => "unknown_site",
            ScrapeError::InvalidRequest(_) => "invalid_request",
            ScrapeError::UnresolvedTarget(_) => "unresolved_target",
            ScrapeError::InvalidUrl { .. } => "invalid_url",
            ScrapeError::Navigation { .. } => "navigation",
            ScrapeError::SessionClosed => "session_closed",
            ScrapeError::Extraction(_) => "extraction",
            ScrapeError::SelectorNotFound { .. } => "selector_not_found",
            ScrapeError::Timeout(_) => "timeout",
            ScrapeError::Browser(_) => "browser",
        }
    }

    pub(crate) fn browser(e: impl std::fmt::Display) -> Self {
        ScrapeError::Browser(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_site_message_carries_suggestion() {
        let e = ScrapeError::UnknownSite {
            site: "acupass".into(),
            suggestion: Some("accupass".into()),
        };
        assert_eq!(
            e.to_string(),
            "unsupported site: acupass (did you mean `accupass`?)"
        );
        assert!(e.is_client_error());
        assert!(!e.is_retryable());
    }

    #[test]
    fn navigation_and_timeout_are_retryable_server_errors() {
        let nav = ScrapeError::Navigation {
            url: "https://x.test".into(),
            reason: "timed out".into(),
        };
        assert!(nav.is_retryable());
        assert!(!nav.is_client_error());
        assert!(ScrapeError::Timeout(30).is_retryable());
        assert!(!ScrapeError::SessionClosed.is_retryable());
    }

    #[test]
    fn invalid_request_is_a_client_error() {
        let e = ScrapeError::InvalidRequest("missing field `site`".into());
        assert!(e.is_client_error());
        assert!(!e.is_retryable());
        assert_eq!(e.kind(), "invalid_request");
    }

    #[test]
    fn selector_not_found_lists_candidates() {
        let e = ScrapeError::SelectorNotFound {
            field: "card".into(),
            candidates: vec![".a".into(), ".b".into()],
        };
        assert_eq!(e.to_string(), "no `card` selector matched (tried: .a, .b)");
    }
}
