// src/extract/metadata.rs
use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::session::ElementHandle;

async fn meta_entry(meta: &dyn ElementHandle) -> Result<Option<(String, String)>> {
    let key = match meta.attribute("name").await?.filter(|k| !k.is_empty()) {
        Some(k) => Some(k),
        None => meta.attribute("property").await?.filter(|k| !k.is_empty()),
    };
    let content = meta.attribute("content").await?.filter(|c| !c.is_empty());
    Ok(key.zip(content))
}

/// `<meta>` name/property -> content, in document order. Later duplicates
/// overwrite earlier ones; unreadable tags are skipped.
pub async fn extract_metadata(metas: &[Box<dyn ElementHandle>]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for meta in metas {
        match meta_entry(meta.as_ref()).await {
            Ok(Some((k, v))) => {
                out.insert(k, v);
            }
            Ok(None) => {}
            Err(e) => debug!(target: "extract", error = %e, "meta tag skipped"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::snapshot::SnapshotSession;
    use crate::session::PageSession;

    #[tokio::test]
    async fn name_beats_property_and_last_write_wins() {
        let html = r#"<html><head>
            <meta charset="utf-8">
            <meta name="description" content="first">
            <meta property="og:title" content="Hello">
            <meta name="kw" property="ignored" content="a,b">
            <meta name="empty" content="">
            <meta name="description" content="second">
        </head><body></body></html>"#;
        let s = SnapshotSession::single("https://x.test", html);
        let metas = s.query_all("meta").await.unwrap();
        let m = extract_metadata(&metas).await;

        assert_eq!(m.get("description").map(String::as_str), Some("second"));
        assert_eq!(m.get("og:title").map(String::as_str), Some("Hello"));
        assert_eq!(m.get("kw").map(String::as_str), Some("a,b"));
        assert!(!m.contains_key("ignored"));
        assert!(!m.contains_key("empty"));
        assert_eq!(m.len(), 3);
    }
}
