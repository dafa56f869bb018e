//! Main-content isolation: a strategy cascade where each pass is a pure
//! function over a DOM. A strategy succeeds only when it yields non-empty
//! HTML with at least `READABILITY_MIN_WORDS` words of text; the fallback
//! (cleaned body) never fails.

use std::cmp::Ordering;
use std::collections::HashMap;

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};

use siteloom_core::ExtractionMethod;

pub const READABILITY_MIN_WORDS: usize = 100;

/// Paragraphs shorter than this contribute nothing to container scores.
const MIN_PARAGRAPH_CHARS: usize = 25;

const SEMANTIC_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    "[itemprop=\"articleBody\"]",
];

const CMS_SELECTORS: &[&str] = &[
    ".entry-content",
    ".post-content",
    ".article-content",
    ".content-area",
    "#content",
    ".main-content",
    "[itemprop=\"articleBody\"]",
];

#[derive(Debug, Clone)]
pub struct Extracted {
    pub clean_html: String,
    pub word_count: usize,
    pub method: ExtractionMethod,
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Whitespace-split token count of a fragment's text body.
pub fn word_count(html_fragment: &str) -> usize {
    let fragment = Html::parse_fragment(html_fragment);
    fragment
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .count()
}

/// Ratio of characters inside `<a>` elements to total text characters,
/// clamped to [0, 1]. A crude navigation-density estimator.
pub fn junk_score(html_fragment: &str) -> f64 {
    let fragment = Html::parse_fragment(html_fragment);
    let total: usize = fragment.root_element().text().map(str::len).sum();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = selector("a")
        .map(|sel| {
            fragment
                .select(&sel)
                .map(|a| a.text().map(str::len).sum::<usize>())
                .sum()
        })
        .unwrap_or(0);
    (linked as f64 / total as f64).clamp(0.0, 1.0)
}

fn gated(html: String, method: ExtractionMethod) -> Option<Extracted> {
    if html.trim().is_empty() {
        return None;
    }
    let words = word_count(&html);
    if words < READABILITY_MIN_WORDS {
        return None;
    }
    Some(Extracted {
        clean_html: html,
        word_count: words,
        method,
    })
}

fn first_match_html(document: &Html, selectors: &[&str]) -> Option<String> {
    for sel_str in selectors {
        if let Some(el) = selector(sel_str).and_then(|s| document.select(&s).next()) {
            let html = el.inner_html();
            if !html.trim().is_empty() {
                return Some(html);
            }
        }
    }
    None
}

fn strategy_domain_override(document: &Html, override_selectors: &[String]) -> Option<Extracted> {
    for sel_str in override_selectors {
        let Some(sel) = selector(sel_str) else { continue };
        if let Some(el) = document.select(&sel).next() {
            let html = el.inner_html();
            if !html.trim().is_empty() {
                if let Some(extracted) = gated(html, ExtractionMethod::DomainOverride) {
                    return Some(extracted);
                }
            }
        }
    }
    None
}

/// Text-density scorer over the cleaned DOM: each paragraph's non-link
/// text length accrues to its parent (and half to its grandparent); the
/// highest-scoring container wins.
fn strategy_readability(document: &Html) -> Option<Extracted> {
    let p_sel = selector("p")?;
    let a_sel = selector("a")?;

    let mut scores: HashMap<NodeId, f64> = HashMap::new();
    for p in document.select(&p_sel) {
        let text: String = p.text().collect();
        let text_len = text.trim().len();
        if text_len < MIN_PARAGRAPH_CHARS {
            continue;
        }
        let link_len: usize = p
            .select(&a_sel)
            .map(|a| a.text().map(str::len).sum::<usize>())
            .sum();
        let score = text_len.saturating_sub(link_len) as f64;

        if let Some(parent) = p.parent().and_then(ElementRef::wrap) {
            *scores.entry(parent.id()).or_default() += score;
            if let Some(grandparent) = parent.parent().and_then(ElementRef::wrap) {
                *scores.entry(grandparent.id()).or_default() += score / 2.0;
            }
        }
    }

    let (best_id, _) = scores
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))?;
    let best = document.tree.get(best_id).and_then(ElementRef::wrap)?;
    gated(best.inner_html(), ExtractionMethod::Readability)
}

fn strategy_semantic(document: &Html) -> Option<Extracted> {
    first_match_html(document, SEMANTIC_SELECTORS)
        .and_then(|html| gated(html, ExtractionMethod::Semantic))
}

fn strategy_cms(document: &Html) -> Option<Extracted> {
    first_match_html(document, CMS_SELECTORS)
        .and_then(|html| gated(html, ExtractionMethod::CmsPattern))
}

/// Run the cascade. `raw_document` is consulted for domain overrides (their
/// selectors may target regions the cleaner removes); everything else runs
/// over the cleaned body.
pub fn extract_content(
    raw_document: &Html,
    cleaned_html: &str,
    override_selectors: &[String],
) -> Extracted {
    let cleaned_document = Html::parse_document(cleaned_html);

    if let Some(e) = strategy_domain_override(raw_document, override_selectors) {
        return e;
    }
    if let Some(e) = strategy_readability(&cleaned_document) {
        return e;
    }
    if let Some(e) = strategy_semantic(&cleaned_document) {
        return e;
    }
    if let Some(e) = strategy_cms(&cleaned_document) {
        return e;
    }

    Extracted {
        word_count: word_count(cleaned_html),
        clean_html: cleaned_html.to_string(),
        method: ExtractionMethod::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn readability_picks_dense_container() {
        let body = format!(
            r#"<body><div class="wrap">
                <div class="junk"><p>{}</p></div>
                <div class="article"><p>{}</p><p>{}</p></div>
            </div></body>"#,
            words(10),
            words(80),
            words(80)
        );
        let raw = Html::parse_document(&body);
        let extracted = extract_content(&raw, &body, &[]);
        assert_eq!(extracted.method, ExtractionMethod::Readability);
        assert!(extracted.word_count >= 160);
        assert!(extracted.clean_html.contains("word79"));
    }

    #[test]
    fn semantic_used_when_paragraphs_sparse() {
        // Text sits directly in <article> with no <p>, so the readability
        // scorer has nothing to grade.
        let body = format!("<body><article>{}</article></body>", words(150));
        let raw = Html::parse_document(&body);
        let extracted = extract_content(&raw, &body, &[]);
        assert_eq!(extracted.method, ExtractionMethod::Semantic);
    }

    #[test]
    fn cms_pattern_after_semantic_misses() {
        let body = format!(
            r#"<body><div class="entry-content">{}</div></body>"#,
            words(150)
        );
        let raw = Html::parse_document(&body);
        let extracted = extract_content(&raw, &body, &[]);
        assert_eq!(extracted.method, ExtractionMethod::CmsPattern);
    }

    #[test]
    fn fallback_when_everything_below_threshold() {
        let body = format!("<body><article>{}</article></body>", words(40));
        let raw = Html::parse_document(&body);
        let extracted = extract_content(&raw, &body, &[]);
        assert_eq!(extracted.method, ExtractionMethod::Fallback);
        assert_eq!(extracted.word_count, 40);
    }

    #[test]
    fn boundary_99_words_falls_through_100_succeeds() {
        let just_under = format!("<body><article>{}</article></body>", words(99));
        let raw = Html::parse_document(&just_under);
        assert_eq!(
            extract_content(&raw, &just_under, &[]).method,
            ExtractionMethod::Fallback
        );

        let at_threshold = format!("<body><article>{}</article></body>", words(100));
        let raw = Html::parse_document(&at_threshold);
        assert_eq!(
            extract_content(&raw, &at_threshold, &[]).method,
            ExtractionMethod::Semantic
        );
    }

    #[test]
    fn domain_override_wins_over_everything() {
        let body = format!(
            r#"<body><div class="client-article">{}</div><article>{}</article></body>"#,
            words(120),
            words(200)
        );
        let raw = Html::parse_document(&body);
        let extracted = extract_content(&raw, &body, &[".client-article".to_string()]);
        assert_eq!(extracted.method, ExtractionMethod::DomainOverride);
        assert!(extracted.word_count >= 120);
    }

    #[test]
    fn junk_score_measures_link_density() {
        let all_links = r#"<div><a href="/a">aaaa</a><a href="/b">bbbb</a></div>"#;
        assert!((junk_score(all_links) - 1.0).abs() < f64::EPSILON);

        let no_links = "<div>plain text only</div>";
        assert!((junk_score(no_links) - 0.0).abs() < f64::EPSILON);

        let half = r#"<div>aaaa<a href="/x">bbbb</a></div>"#;
        let score = junk_score(half);
        assert!(score > 0.4 && score < 0.6);
    }
}
