//! Page metadata extraction with fixed priority chains.

use scraper::{ElementRef, Html, Selector};
use url::Url;

const H1_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct PageMeta {
    pub title: Option<String>,
    pub h1: Option<String>,
    pub meta_description: Option<String>,
    pub canonical: Option<String>,
    pub og_image: Option<String>,
    pub language: Option<String>,
    pub has_multiple_h1: bool,
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn text_of(el: ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, sel: &str) -> Option<String> {
    selector(sel)
        .and_then(|s| document.select(&s).next())
        .map(text_of)
        .filter(|t| !t.is_empty())
}

fn meta_content(document: &Html, sel: &str) -> Option<String> {
    selector(sel)
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn extract_metadata(document: &Html, base: &Url) -> PageMeta {
    let h1_texts: Vec<String> = selector("h1")
        .map(|s| {
            document
                .select(&s)
                .map(text_of)
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let h1 = h1_texts
        .first()
        .map(|t| t.chars().take(H1_MAX_CHARS).collect::<String>());

    let title = first_text(document, "title")
        .or_else(|| meta_content(document, "meta[property=\"og:title\"]"))
        .or_else(|| h1.clone());

    let meta_description = meta_content(document, "meta[name=\"description\"]")
        .or_else(|| meta_content(document, "meta[property=\"og:description\"]"));

    let canonical = selector("link[rel=\"canonical\"]")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| base.join(href).ok())
        .map(|u| u.to_string());

    let og_image = meta_content(document, "meta[property=\"og:image\"]")
        .and_then(|src| base.join(&src).ok())
        .map(|u| u.to_string());

    let language = selector("html")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("lang").map(|s| s.to_string()))
        .or_else(|| meta_content(document, "meta[http-equiv=\"content-language\"]"))
        .and_then(|lang| normalize_lang(&lang));

    PageMeta {
        title,
        h1,
        meta_description,
        canonical,
        og_image,
        language,
        has_multiple_h1: h1_texts.len() > 1,
    }
}

/// "en-US" / "EN_gb" → "en". Two-letter lowercase or nothing.
fn normalize_lang(raw: &str) -> Option<String> {
    let primary = raw
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if primary.len() >= 2 && primary.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(primary.chars().take(2).collect())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Html {
        Html::parse_document(html)
    }

    fn base() -> Url {
        Url::parse("https://ex.com/post").unwrap()
    }

    #[test]
    fn title_priority_chain() {
        let with_title = doc("<head><title>From Title</title><meta property=\"og:title\" content=\"From OG\"></head><body><h1>From H1</h1></body>");
        assert_eq!(
            extract_metadata(&with_title, &base()).title.as_deref(),
            Some("From Title")
        );

        let og_only =
            doc("<head><meta property=\"og:title\" content=\"From OG\"></head><body><h1>From H1</h1></body>");
        assert_eq!(
            extract_metadata(&og_only, &base()).title.as_deref(),
            Some("From OG")
        );

        let h1_only = doc("<body><h1>From H1</h1></body>");
        assert_eq!(
            extract_metadata(&h1_only, &base()).title.as_deref(),
            Some("From H1")
        );
    }

    #[test]
    fn h1_truncated_and_multiplicity_flagged() {
        let long = "x".repeat(600);
        let html = format!("<body><h1>{long}</h1><h1>second</h1></body>");
        let meta = extract_metadata(&doc(&html), &base());
        assert_eq!(meta.h1.as_ref().map(String::len), Some(500));
        assert!(meta.has_multiple_h1);
    }

    #[test]
    fn canonical_and_og_image_resolved_absolute() {
        let html = r#"<head>
            <link rel="canonical" href="/canonical-path">
            <meta property="og:image" content="img/cover.png">
        </head>"#;
        let meta = extract_metadata(&doc(html), &base());
        assert_eq!(
            meta.canonical.as_deref(),
            Some("https://ex.com/canonical-path")
        );
        assert_eq!(meta.og_image.as_deref(), Some("https://ex.com/img/cover.png"));
    }

    #[test]
    fn language_normalized_two_letter() {
        let html = r#"<html lang="en-US"><body></body></html>"#;
        assert_eq!(
            extract_metadata(&doc(html), &base()).language.as_deref(),
            Some("en")
        );

        let http_equiv =
            r#"<head><meta http-equiv="content-language" content="DE"></head>"#;
        assert_eq!(
            extract_metadata(&doc(http_equiv), &base()).language.as_deref(),
            Some("de")
        );
    }
}
