//! Structural region detection over the raw HTML string. Elements carry
//! byte offsets into that exact string so downstream consumers (content
//! link classification, marker injection) can address regions positionally.
//! Offsets are found by scanning opening tags and balancing close tags;
//! region innards are re-parsed as fragments when selector queries are
//! needed.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use siteloom_core::StructuralStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralType {
    FaqModule,
    TocOrJump,
    Breadcrumb,
    TemplateCta,
    Accordion,
    Testimonial,
    AuthorBio,
    RelatedPosts,
}

impl StructuralType {
    /// Stable marker code used in `<!-- STRUCT:<TYPE>:<ROLE> -->` comments.
    pub fn marker_code(&self) -> &'static str {
        match self {
            StructuralType::FaqModule => "FAQ",
            StructuralType::TocOrJump => "TOC",
            StructuralType::Breadcrumb => "BREADCRUMB",
            StructuralType::TemplateCta => "CTA",
            StructuralType::Accordion => "ACCORDION",
            StructuralType::Testimonial => "TESTIMONIAL",
            StructuralType::AuthorBio => "AUTHOR",
            StructuralType::RelatedPosts => "RELATED",
        }
    }
}

/// Per-variant detection detail.
#[derive(Debug, Clone)]
pub enum StructuralMeta {
    Faq {
        has_schema: bool,
        questions: Vec<String>,
    },
    Toc {
        link_count: usize,
        anchor_links: usize,
    },
    None,
}

#[derive(Debug, Clone)]
pub struct StructuralElement {
    pub kind: StructuralType,
    /// Byte offsets into the raw HTML string, start inclusive, end exclusive.
    pub start: usize,
    pub end: usize,
    pub selector: String,
    pub meta: StructuralMeta,
}

static JSONLD_SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>"#).unwrap()
});

static OPEN_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([a-z][a-z0-9]*)((?:\s[^>]*)?)>").unwrap());

static CLASS_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"class\s*=\s*["']([^"']*)["']"#).unwrap());
static ID_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"id\s*=\s*["']([^"']*)["']"#).unwrap());
static ARIA_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"aria-label\s*=\s*["']([^"']*)["']"#).unwrap());

/// Container tags eligible for region detection.
const REGION_TAGS: &[&str] = &[
    "div", "section", "nav", "ul", "ol", "dl", "aside", "blockquote", "p",
];

const FAQ_QUESTION_SELECTORS: &[&str] = &[
    ".faq-question",
    ".question",
    ".accordion-title",
    ".accordion-header",
    ".accordion__title",
    "dt",
    "summary",
];

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Token-level class/id matching keeps "toc" from firing on "stockist".
fn has_token(tokens: &[String], word: &str) -> bool {
    tokens.iter().any(|t| {
        t == word || t.starts_with(&format!("{word}-")) || t.ends_with(&format!("-{word}"))
    })
}

fn has_substring(tokens: &[String], needle: &str) -> bool {
    tokens.iter().any(|t| t.contains(needle))
}

fn classify_tag(
    tag: &str,
    tokens: &[String],
    aria_label: &str,
) -> Option<(StructuralType, String)> {
    if !REGION_TAGS.contains(&tag) {
        return None;
    }
    if has_substring(tokens, "faq") {
        return Some((StructuralType::FaqModule, "class*=faq".to_string()));
    }
    if has_token(tokens, "toc")
        || has_substring(tokens, "table-of-contents")
        || has_substring(tokens, "jump-link")
    {
        return Some((StructuralType::TocOrJump, "class*=toc".to_string()));
    }
    if has_substring(tokens, "breadcrumb") || aria_label.contains("breadcrumb") {
        return Some((StructuralType::Breadcrumb, "class*=breadcrumb".to_string()));
    }
    if has_token(tokens, "cta") || has_substring(tokens, "call-to-action") {
        return Some((StructuralType::TemplateCta, "class*=cta".to_string()));
    }
    if has_substring(tokens, "accordion") {
        return Some((StructuralType::Accordion, "class*=accordion".to_string()));
    }
    if has_substring(tokens, "testimonial") {
        return Some((StructuralType::Testimonial, "class*=testimonial".to_string()));
    }
    if has_substring(tokens, "author-bio")
        || has_substring(tokens, "author-box")
        || has_substring(tokens, "about-author")
        || has_substring(tokens, "author-info")
    {
        return Some((StructuralType::AuthorBio, "class*=author".to_string()));
    }
    if has_token(tokens, "related")
        || has_substring(tokens, "related-posts")
        || has_substring(tokens, "related-articles")
        || has_substring(tokens, "you-may-also-like")
    {
        return Some((StructuralType::RelatedPosts, "class*=related".to_string()));
    }
    None
}

/// Find the matching close tag for the element opening at `open_start`,
/// returning the offset just past `</tag>`. Unclosed regions extend to the
/// end of the document.
fn region_end(lower: &str, open_start: usize, tag: &str) -> usize {
    let open_pat = format!("<{tag}");
    let close_pat = format!("</{tag}>");
    let mut depth = 0usize;
    let mut cursor = open_start;

    loop {
        let next_open = find_open_tag(lower, &open_pat, cursor);
        let next_close = lower[cursor..].find(&close_pat).map(|i| i + cursor);
        match (next_open, next_close) {
            (Some(o), Some(c)) if o < c => {
                depth += 1;
                cursor = o + open_pat.len();
            }
            (_, Some(c)) => {
                depth = depth.saturating_sub(1);
                let end = c + close_pat.len();
                if depth == 0 {
                    return end;
                }
                cursor = end;
            }
            (Some(o), None) => {
                depth += 1;
                cursor = o + open_pat.len();
            }
            (None, None) => break,
        }
    }
    lower.len()
}

fn find_open_tag(lower: &str, open_pat: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(i) = lower.get(pos..)?.find(open_pat) {
        let idx = pos + i;
        match lower.as_bytes().get(idx + open_pat.len()) {
            Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'>') | Some(b'/') => {
                return Some(idx)
            }
            _ => pos = idx + open_pat.len(),
        }
    }
    None
}

fn jsonld_is_faq_page(value: &Value) -> bool {
    let type_is_faq = |v: &Value| {
        v.get("@type")
            .and_then(Value::as_str)
            .map(|t| t.eq_ignore_ascii_case("FAQPage"))
            .unwrap_or(false)
    };
    if type_is_faq(value) {
        return true;
    }
    value
        .get("@graph")
        .and_then(Value::as_array)
        .map(|items| items.iter().any(type_is_faq))
        .unwrap_or(false)
}

fn jsonld_questions(value: &Value) -> Vec<String> {
    let from_entity = |v: &Value| -> Vec<String> {
        v.get("mainEntity")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|q| q.get("name").and_then(Value::as_str))
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    };
    let mut questions = from_entity(value);
    if questions.is_empty() {
        if let Some(items) = value.get("@graph").and_then(Value::as_array) {
            for item in items {
                questions.extend(from_entity(item));
            }
        }
    }
    questions
}

fn detect_jsonld_faq(raw: &str, lower: &str, out: &mut Vec<StructuralElement>) {
    for m in JSONLD_SCRIPT_RE.find_iter(raw) {
        let content_start = m.end();
        let Some(rel_close) = lower[content_start..].find("</script>") else {
            continue;
        };
        let close_start = content_start + rel_close;
        let inner = &raw[content_start..close_start];
        let Ok(value) = serde_json::from_str::<Value>(inner.trim()) else {
            continue;
        };
        if !jsonld_is_faq_page(&value) {
            continue;
        }
        out.push(StructuralElement {
            kind: StructuralType::FaqModule,
            start: m.start(),
            end: close_start + "</script>".len(),
            selector: "script[type=\"application/ld+json\"]".to_string(),
            meta: StructuralMeta::Faq {
                has_schema: true,
                questions: jsonld_questions(&value),
            },
        });
    }
}

fn harvest_faq_questions(region_html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(region_html);
    let mut questions: Vec<String> = Vec::new();
    for sel_str in FAQ_QUESTION_SELECTORS {
        let Some(sel) = selector(sel_str) else { continue };
        for el in fragment.select(&sel) {
            let text = el
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() && !questions.contains(&text) {
                questions.push(text);
            }
        }
    }
    questions.truncate(50);
    questions
}

fn toc_meta(region_html: &str) -> Option<StructuralMeta> {
    let fragment = Html::parse_fragment(region_html);
    let sel = selector("a[href]")?;
    let mut link_count = 0usize;
    let mut anchor_links = 0usize;
    for a in fragment.select(&sel) {
        link_count += 1;
        if a.value().attr("href").is_some_and(|h| h.starts_with('#')) {
            anchor_links += 1;
        }
    }
    // TOC only when at least half the links are anchor links
    if link_count == 0 || anchor_links * 2 < link_count {
        return None;
    }
    Some(StructuralMeta::Toc {
        link_count,
        anchor_links,
    })
}

fn detect_pattern_regions(raw: &str, lower: &str, out: &mut Vec<StructuralElement>) {
    for cap in OPEN_TAG_RE.captures_iter(lower) {
        let Some(m) = cap.get(0) else { continue };
        let tag = cap.get(1).map(|t| t.as_str()).unwrap_or_default();
        let attrs = cap.get(2).map(|a| a.as_str()).unwrap_or_default();

        let mut tokens: Vec<String> = CLASS_ATTR_RE
            .captures(attrs)
            .map(|c| c[1].split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        if let Some(c) = ID_ATTR_RE.captures(attrs) {
            tokens.push(c[1].to_string());
        }
        let aria_label = ARIA_LABEL_RE
            .captures(attrs)
            .map(|c| c[1].to_string())
            .unwrap_or_default();

        let Some((kind, selector_label)) = classify_tag(tag, &tokens, &aria_label) else {
            continue;
        };

        let start = m.start();
        let end = region_end(lower, start, tag);
        let region_html = &raw[start..end];

        let meta = match kind {
            StructuralType::FaqModule => StructuralMeta::Faq {
                has_schema: false,
                questions: harvest_faq_questions(region_html),
            },
            StructuralType::TocOrJump => match toc_meta(region_html) {
                Some(meta) => meta,
                None => continue,
            },
            _ => StructuralMeta::None,
        };

        out.push(StructuralElement {
            kind,
            start,
            end,
            selector: selector_label,
            meta,
        });
    }
}

/// A region nested inside a same-kind region is part of the outer widget
/// (e.g. `.faq-question` rows inside a `.faq-list`); only the outermost
/// survives.
fn suppress_nested_same_kind(elements: &mut Vec<StructuralElement>) {
    let spans: Vec<(StructuralType, usize, usize)> = elements
        .iter()
        .map(|e| (e.kind, e.start, e.end))
        .collect();
    elements.retain(|e| {
        !spans.iter().any(|&(kind, start, end)| {
            kind == e.kind
                && start <= e.start
                && e.end <= end
                && (start, end) != (e.start, e.end)
        })
    });
}

/// An accordion that coincides with a FAQ region is the same widget; the
/// FAQ classification wins.
fn suppress_faq_accordions(elements: &mut Vec<StructuralElement>) {
    let faq_ranges: Vec<(usize, usize)> = elements
        .iter()
        .filter(|e| e.kind == StructuralType::FaqModule)
        .map(|e| (e.start, e.end))
        .collect();
    elements.retain(|e| {
        e.kind != StructuralType::Accordion
            || !faq_ranges
                .iter()
                .any(|&(s, end)| e.start < end && s < e.end)
    });
}

pub fn detect_structural_elements(raw_html: &str) -> Vec<StructuralElement> {
    let lower = raw_html.to_ascii_lowercase();
    let mut elements = Vec::new();
    detect_jsonld_faq(raw_html, &lower, &mut elements);
    detect_pattern_regions(raw_html, &lower, &mut elements);

    elements.sort_by_key(|e| e.start);
    elements.dedup_by_key(|e| e.start);
    suppress_nested_same_kind(&mut elements);
    suppress_faq_accordions(&mut elements);
    elements
}

/// Innermost element containing `offset`, by linear scan.
pub fn structural_at(offset: usize, elements: &[StructuralElement]) -> Option<&StructuralElement> {
    elements
        .iter()
        .filter(|e| e.start <= offset && offset < e.end)
        .min_by_key(|e| e.end - e.start)
}

pub fn aggregate_stats(elements: &[StructuralElement]) -> StructuralStats {
    let mut stats = StructuralStats::default();
    for el in elements {
        match el.kind {
            StructuralType::FaqModule => stats.faq_modules += 1,
            StructuralType::TocOrJump => stats.toc_sections += 1,
            StructuralType::Breadcrumb => stats.breadcrumbs += 1,
            StructuralType::TemplateCta => stats.template_ctas += 1,
            StructuralType::Accordion => stats.accordions += 1,
            StructuralType::Testimonial => stats.testimonials += 1,
            StructuralType::AuthorBio => stats.author_bios += 1,
            StructuralType::RelatedPosts => stats.related_posts += 1,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonld_faq_page_detected_with_questions() {
        let html = r#"<html><body>
            <script type="application/ld+json">
            {"@type":"FAQPage","mainEntity":[
                {"@type":"Question","name":"What is it?"},
                {"@type":"Question","name":"How much?"}
            ]}
            </script>
        </body></html>"#;
        let elements = detect_structural_elements(html);
        assert_eq!(elements.len(), 1);
        let el = &elements[0];
        assert_eq!(el.kind, StructuralType::FaqModule);
        assert!(html[el.start..el.end].starts_with("<script"));
        assert!(html[el.start..el.end].ends_with("</script>"));
        match &el.meta {
            StructuralMeta::Faq {
                has_schema,
                questions,
            } => {
                assert!(*has_schema);
                assert_eq!(questions, &["What is it?", "How much?"]);
            }
            other => panic!("unexpected meta {other:?}"),
        }
    }

    #[test]
    fn non_faq_jsonld_ignored() {
        let html = r#"<script type="application/ld+json">{"@type":"Article"}</script>"#;
        assert!(detect_structural_elements(html).is_empty());
    }

    #[test]
    fn faq_section_questions_harvested_from_selectors() {
        let html = r#"<body><section class="faq-block">
            <div class="faq-question">First question?</div>
            <div class="faq-answer">First answer.</div>
            <div class="faq-question">Second question?</div>
        </section></body>"#;
        let elements = detect_structural_elements(html);
        assert_eq!(elements.len(), 1);
        match &elements[0].meta {
            StructuralMeta::Faq {
                has_schema,
                questions,
            } => {
                assert!(!*has_schema);
                assert_eq!(questions.len(), 2);
            }
            other => panic!("unexpected meta {other:?}"),
        }
    }

    #[test]
    fn toc_requires_half_anchor_links() {
        let real_toc = r##"<div class="toc">
            <a href="#intro">Intro</a><a href="#setup">Setup</a><a href="/other">Other</a>
        </div>"##;
        let elements = detect_structural_elements(real_toc);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].kind, StructuralType::TocOrJump);

        let fake_toc = r##"<div class="toc">
            <a href="/a">A</a><a href="/b">B</a><a href="#c">C</a>
        </div>"##;
        assert!(detect_structural_elements(fake_toc).is_empty());
    }

    #[test]
    fn accordion_inside_faq_suppressed() {
        let html = r#"<body><div class="faq-wrap">
            <div class="accordion">
                <div class="accordion-title">Q?</div>
                <div class="accordion-content">A.</div>
            </div>
        </div></body>"#;
        let elements = detect_structural_elements(html);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].kind, StructuralType::FaqModule);

        let standalone = r#"<div class="accordion"><div class="accordion-title">T</div></div>"#;
        let elements = detect_structural_elements(standalone);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].kind, StructuralType::Accordion);
    }

    #[test]
    fn offsets_bound_the_region_in_raw_html() {
        let html = r#"<p>before</p><div class="testimonial"><p>Great product!</p></div><p>after</p>"#;
        let elements = detect_structural_elements(html);
        assert_eq!(elements.len(), 1);
        let region = &html[elements[0].start..elements[0].end];
        assert!(region.starts_with("<div"));
        assert!(region.ends_with("</div>"));
        assert!(region.contains("Great product!"));
    }

    #[test]
    fn token_matching_avoids_substring_false_positives() {
        let html = r#"<div class="stockist"><a href="/x">x</a></div>"#;
        assert!(detect_structural_elements(html).is_empty());
    }

    #[test]
    fn structural_at_returns_innermost() {
        let html = r#"<div class="faq-outer"><div class="cta-box"><a href="/go">go</a></div></div>"#;
        let elements = detect_structural_elements(html);
        assert_eq!(elements.len(), 2);
        let link_offset = html.find("<a href").unwrap();
        let hit = structural_at(link_offset, &elements).unwrap();
        assert_eq!(hit.kind, StructuralType::TemplateCta);
        assert!(structural_at(html.len() + 10, &elements).is_none());
    }

    #[test]
    fn stats_aggregate_per_type() {
        let html = r#"
            <div class="faq-list"><div class="faq-question">Q</div></div>
            <div class="testimonial">t</div>
            <div class="testimonial-grid">t2</div>
            <div class="related-posts"><a href="/a">a</a></div>
        "#;
        let stats = aggregate_stats(&detect_structural_elements(html));
        assert_eq!(stats.faq_modules, 1);
        assert_eq!(stats.testimonials, 2);
        assert_eq!(stats.related_posts, 1);
        assert_eq!(stats.breadcrumbs, 0);
    }
}
