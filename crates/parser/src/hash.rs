//! Content hashing and soft-404 heuristics. The hash is MD5 over
//! whitespace-normalized clean HTML and gates content overwrites in the
//! persistence layer.

use md5::{Digest, Md5};

/// Soft-404 fires only below this word count.
pub const SOFT_404_MAX_WORDS: usize = 150;

const SOFT_404_PHRASES: &[&str] = &[
    "page not found",
    "404 not found",
    "error 404",
    "nothing was found",
    "page doesn't exist",
    "page does not exist",
    "page cannot be found",
    "page you requested could not be found",
    "no longer available",
];

/// Stable across runs for identical whitespace-normalized clean HTML.
pub fn content_hash(clean_html: &str) -> String {
    let normalized = clean_html.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Md5::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First 16 hex chars of MD5; used for nav-cluster fingerprints.
pub fn short_fingerprint(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

/// A 200 that reads like a 404: known phrase in the title or the start of
/// the body, and a thin page.
pub fn is_soft_404(title: Option<&str>, body_text: &str, word_count: usize) -> bool {
    if word_count >= SOFT_404_MAX_WORDS {
        return false;
    }
    let title_lower = title.unwrap_or("").to_lowercase();
    let body_head: String = body_text.chars().take(600).collect::<String>().to_lowercase();
    SOFT_404_PHRASES
        .iter()
        .any(|phrase| title_lower.contains(phrase) || body_head.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ignores_whitespace_differences() {
        let a = "<p>hello   world</p>";
        let b = "<p>hello\n\tworld</p>";
        assert_eq!(content_hash(a), content_hash(b));
        assert_ne!(content_hash(a), content_hash("<p>hello there</p>"));
    }

    #[test]
    fn hash_stable_across_calls() {
        let html = "<div><p>same content</p></div>";
        assert_eq!(content_hash(html), content_hash(html));
    }

    #[test]
    fn short_fingerprint_is_16_hex() {
        let fp = short_fingerprint("https://ex.com/a|https://ex.com/b");
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn soft_404_needs_phrase_and_thin_body() {
        assert!(is_soft_404(Some("Page Not Found"), "some short body", 40));
        assert!(is_soft_404(None, "Sorry, error 404. Try the homepage.", 10));
        // Phrase but plenty of content: real page discussing 404s
        assert!(!is_soft_404(Some("Page Not Found"), "long article", 400));
        // Thin but no phrase
        assert!(!is_soft_404(Some("Stub"), "tiny page", 5));
    }
}
