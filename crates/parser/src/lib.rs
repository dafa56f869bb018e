pub mod clean;
pub mod content;
pub mod hash;
pub mod markdown;
pub mod meta;
pub mod nav;
pub mod structure;

use scraper::Html;
use url::Url;

use siteloom_core::{DomainOverride, ExtractionMethod, NavStructure, StructuralStats};

use crate::meta::PageMeta;
use crate::structure::StructuralElement;

/// Max bytes to parse (5 MB). Larger pages are truncated before parsing.
const MAX_PARSE_SIZE: usize = 5 * 1024 * 1024;

/// Everything the pipeline derives from one fetched HTML document.
pub struct ParsedPage {
    pub meta: PageMeta,
    pub clean_html: String,
    pub word_count: usize,
    pub extraction_method: ExtractionMethod,
    pub junk_score: f64,
    pub structural: Vec<StructuralElement>,
    pub structural_stats: StructuralStats,
    pub nav: NavStructure,
    pub markdown: String,
    pub markdown_enhanced: String,
    /// None iff no content was extracted.
    pub content_hash: Option<String>,
    pub h1_issue: Option<String>,
    /// Text of the extracted content, for soft-404 phrase checks.
    pub body_text: String,
}

pub fn process_page(
    raw_html: &str,
    page_url: &Url,
    override_cfg: Option<&DomainOverride>,
) -> ParsedPage {
    let raw_html = if raw_html.len() > MAX_PARSE_SIZE {
        let mut end = MAX_PARSE_SIZE;
        while !raw_html.is_char_boundary(end) {
            end -= 1;
        }
        &raw_html[..end]
    } else {
        raw_html
    };

    let document = Html::parse_document(raw_html);
    let page_meta = meta::extract_metadata(&document, page_url);

    let active_override = override_cfg.filter(|o| o.enabled);
    let extra_remove: &[String] = active_override
        .map(|o| o.remove_selectors.as_slice())
        .unwrap_or(&[]);
    let override_selectors: &[String] = active_override
        .map(|o| o.main_content_selectors.as_slice())
        .unwrap_or(&[]);

    let cleaned = clean::clean_html(raw_html, extra_remove);
    let extracted = content::extract_content(&document, &cleaned, override_selectors);

    // Offsets index the raw string; detection must run on the same HTML
    // the Markdown builder receives.
    let structural = structure::detect_structural_elements(raw_html);
    let structural_stats = structure::aggregate_stats(&structural);
    let nav = nav::extract_navigation(&document, raw_html, page_url, &structural);

    let md = markdown::build_markdown(raw_html, &structural, page_url, page_meta.h1.as_deref());

    let content_hash = if extracted.clean_html.trim().is_empty() {
        None
    } else {
        Some(hash::content_hash(&extracted.clean_html))
    };

    let body_text = Html::parse_fragment(&extracted.clean_html)
        .root_element()
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    ParsedPage {
        meta: page_meta,
        junk_score: content::junk_score(&extracted.clean_html),
        word_count: extracted.word_count,
        extraction_method: extracted.method,
        clean_html: extracted.clean_html,
        structural,
        structural_stats,
        nav,
        markdown: md.plain,
        markdown_enhanced: md.enhanced,
        content_hash,
        h1_issue: md.h1_issue,
        body_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_page() -> String {
        let paragraphs: String = (0..6)
            .map(|i| {
                format!(
                    "<p>Paragraph {i} carries enough prose to count toward the word threshold, \
                     with several additional words so the density scorer has something real.</p>"
                )
            })
            .collect();
        format!(
            r#"<html lang="en"><head>
                <title>Fixture Page</title>
                <meta name="description" content="A fixture.">
            </head><body>
                <nav class="main-nav"><ul>
                    <li><a href="/a">A</a></li>
                    <li><a href="/b">B</a></li>
                    <li><a href="/c">C</a></li>
                </ul></nav>
                <main>
                    <h1>Fixture Heading</h1>
                    <article>{paragraphs}
                    <p>Read <a href="/more">more here</a>.</p></article>
                </main>
            </body></html>"#
        )
    }

    #[test]
    fn process_page_assembles_all_products() {
        let html = fixture_page();
        let url = Url::parse("https://ex.com/fixture").unwrap();
        let parsed = process_page(&html, &url, None);

        assert_eq!(parsed.meta.title.as_deref(), Some("Fixture Page"));
        assert_eq!(parsed.meta.language.as_deref(), Some("en"));
        assert!(parsed.word_count >= 100);
        assert!(parsed.content_hash.is_some());
        assert!(parsed.markdown.starts_with("# Fixture Heading"));
        assert_eq!(parsed.nav.primary_nav.len(), 3);
        assert!(parsed
            .nav
            .content_links
            .iter()
            .any(|l| l.url == "https://ex.com/more"));
        assert!(parsed.junk_score < 0.5);
    }

    #[test]
    fn content_hash_null_only_without_content() {
        let url = Url::parse("https://ex.com/empty").unwrap();
        let parsed = process_page("<html><body></body></html>", &url, None);
        assert!(parsed.content_hash.is_none());
        assert_eq!(parsed.word_count, 0);
    }

    #[test]
    fn disabled_override_is_ignored() {
        let html = fixture_page();
        let url = Url::parse("https://ex.com/fixture").unwrap();
        let disabled = DomainOverride {
            domain: "ex.com".to_string(),
            enabled: false,
            main_content_selectors: vec![".does-not-exist".to_string()],
            remove_selectors: vec![],
            force_fetch_mode: None,
            notes: None,
        };
        let parsed = process_page(&html, &url, Some(&disabled));
        assert_ne!(parsed.extraction_method, ExtractionMethod::DomainOverride);
        assert!(parsed.word_count >= 100);
    }
}
