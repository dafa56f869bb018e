//! Best-effort HTML cleaning: strips scripts, styles, chrome and ad
//! containers before content extraction. Never fails the pipeline; a
//! degenerate parse falls back to the input.

use ego_tree::NodeId;
use scraper::{Html, Selector};
use tracing::warn;

/// Removed in one pass, together with any domain-provided selectors.
const REMOVE_SELECTORS: &[&str] = &[
    "script",
    "style",
    "noscript",
    "iframe",
    "nav",
    "header",
    "footer",
    "aside",
    "[role=\"navigation\"]",
    "[role=\"banner\"]",
    "[role=\"contentinfo\"]",
    "[role=\"complementary\"]",
    "[role=\"search\"]",
    ".navbar",
    ".nav-menu",
    ".main-menu",
    ".menu",
    ".sidebar",
    ".side-bar",
    ".widget-area",
    ".ad",
    ".ads",
    ".advert",
    ".advertisement",
    ".ad-container",
    ".banner",
    ".cookie-banner",
    ".cookie-notice",
    ".modal",
    ".popup",
    ".newsletter-signup",
    ".social-share",
    ".share-buttons",
    ".comments",
    "#comments",
    ".comment-list",
    ".comment-respond",
];

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Returns the cleaned body's inner HTML.
pub fn clean_html(html: &str, extra_remove: &[String]) -> String {
    let mut document = Html::parse_document(html);
    let mut doomed: Vec<NodeId> = Vec::new();

    for sel_str in REMOVE_SELECTORS
        .iter()
        .copied()
        .chain(extra_remove.iter().map(String::as_str))
    {
        match selector(sel_str) {
            Some(sel) => doomed.extend(document.select(&sel).map(|el| el.id())),
            None => warn!(selector = sel_str, "skipping unparseable removal selector"),
        }
    }

    for node in document.tree.nodes() {
        if node.value().is_comment() {
            doomed.push(node.id());
        }
    }

    // Anchors with no text and no image descendant carry nothing
    if let (Some(a_sel), Some(img_sel)) = (selector("a"), selector("img")) {
        for a in document.select(&a_sel) {
            let text_empty = a.text().all(|t| t.trim().is_empty());
            if text_empty && a.select(&img_sel).next().is_none() {
                doomed.push(a.id());
            }
        }
    }

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    match selector("body").and_then(|sel| document.select(&sel).next()) {
        Some(body) => body.inner_html(),
        None => {
            warn!("no body element after parse, returning input unmodified");
            html.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_styles_and_chrome() {
        let html = r#"<html><head><style>.x{}</style></head><body>
            <nav><a href="/">Home</a></nav>
            <script>var x = 1;</script>
            <p>Kept paragraph.</p>
            <footer>footer text</footer>
        </body></html>"#;
        let cleaned = clean_html(html, &[]);
        assert!(cleaned.contains("Kept paragraph."));
        assert!(!cleaned.contains("var x"));
        assert!(!cleaned.contains("Home"));
        assert!(!cleaned.contains("footer text"));
    }

    #[test]
    fn strips_comments_and_empty_anchors() {
        let html = r#"<body><!-- hidden --><p>Text <a href="/x"></a><a href="/y">link</a></p></body>"#;
        let cleaned = clean_html(html, &[]);
        assert!(!cleaned.contains("hidden"));
        assert!(!cleaned.contains("/x"));
        assert!(cleaned.contains("link"));
    }

    #[test]
    fn keeps_image_only_anchors() {
        let html = r#"<body><a href="/img"><img src="/a.png" alt="a"></a></body>"#;
        let cleaned = clean_html(html, &[]);
        assert!(cleaned.contains("/a.png"));
    }

    #[test]
    fn applies_domain_removal_selectors() {
        let html = r#"<body><div class="promo-rail">buy now</div><p>content</p></body>"#;
        let cleaned = clean_html(html, &[".promo-rail".to_string()]);
        assert!(!cleaned.contains("buy now"));
        assert!(cleaned.contains("content"));
    }
}
