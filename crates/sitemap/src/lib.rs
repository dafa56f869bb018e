//! Sitemap intake: resolves sitemap indexes one level deep, extracts
//! `<url><loc>` entries, annotates each URL with a type hint derived from
//! the sitemap filename, and emits a stream deduplicated by raw URL.
//! A failing sitemap is logged and skipped; it never aborts the others.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};
use url::Url;

use siteloom_core::{canonical, CrawlError, FetchConfig, PageFetcher, SitemapEntry};

static LOC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<loc>\s*([^<]+?)\s*</loc>").unwrap());

/// Filename-pattern rules, checked in order; first match wins.
static TYPE_HINT_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)^post-sitemap", "post"),
        (r"(?i)^page-sitemap", "page"),
        (r"(?i)product", "product"),
        (r"(?i)event", "event"),
        (r"(?i)portfolio", "portfolio"),
        (r"(?i)category|tag|author", "pagination"),
        (r"(?i)blog|news|article", "post"),
    ]
    .into_iter()
    .map(|(re, hint)| (Regex::new(re).unwrap(), hint))
    .collect()
});

/// True when the XML root is a `<sitemapindex>` rather than a `<urlset>`.
pub fn is_sitemap_index(xml: &str) -> bool {
    xml.contains("<sitemapindex")
}

/// Extract `<loc>` values in document order. Works for both url sets and
/// sitemap indexes.
pub fn extract_locs(xml: &str) -> Vec<String> {
    LOC_RE
        .captures_iter(xml)
        .map(|cap| cap[1].trim().to_string())
        .collect()
}

/// Type hint from a sitemap URL's filename, e.g. `post-sitemap2.xml` → post.
pub fn type_hint_for(sitemap_url: &str) -> Option<&'static str> {
    let filename = sitemap_url
        .rsplit('/')
        .next()
        .unwrap_or(sitemap_url)
        .split('?')
        .next()
        .unwrap_or_default();
    TYPE_HINT_RULES
        .iter()
        .find(|(re, _)| re.is_match(filename))
        .map(|(_, hint)| *hint)
}

pub struct SitemapIntake<'a> {
    fetcher: &'a dyn PageFetcher,
    fetch_config: &'a FetchConfig,
}

impl<'a> SitemapIntake<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, fetch_config: &'a FetchConfig) -> Self {
        Self {
            fetcher,
            fetch_config,
        }
    }

    /// Resolve every seed and collect URL entries. Duplicate raw URLs across
    /// sitemaps are dropped (first-seen source preserved); canonical-level
    /// dedup is the orchestrator's job, which also records aliases.
    pub async fn collect(&self, seeds: &[String]) -> Vec<SitemapEntry> {
        let mut entries: Vec<SitemapEntry> = Vec::new();
        let mut seen_raw: HashSet<String> = HashSet::new();

        for seed in seeds {
            match self.collect_seed(seed, &mut seen_raw, &mut entries).await {
                Ok(count) => info!(sitemap = %seed, urls = count, "sitemap resolved"),
                Err(e) => warn!(sitemap = %seed, "sitemap intake failed: {e}"),
            }
        }
        entries
    }

    async fn collect_seed(
        &self,
        seed: &str,
        seen_raw: &mut HashSet<String>,
        entries: &mut Vec<SitemapEntry>,
    ) -> Result<usize, CrawlError> {
        let xml = self.fetch_xml(seed).await?;

        let child_sitemaps = if is_sitemap_index(&xml) {
            extract_locs(&xml)
        } else {
            vec![seed.to_string()]
        };

        let mut count = 0usize;
        for child in &child_sitemaps {
            // Indexes expand one level only; the child body is fetched
            // unless it is the seed itself.
            let child_xml = if child == seed {
                xml.clone()
            } else {
                match self.fetch_xml(child).await {
                    Ok(x) => x,
                    Err(e) => {
                        warn!(sitemap = %child, "child sitemap failed: {e}");
                        continue;
                    }
                }
            };

            let hint = type_hint_for(child);
            for loc in extract_locs(&child_xml) {
                if !seen_raw.insert(loc.clone()) {
                    continue;
                }
                let canonical = match canonical::normalize(&loc) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(url = %loc, "dropping invalid sitemap URL: {e}");
                        continue;
                    }
                };
                entries.push(SitemapEntry {
                    raw: loc,
                    canonical,
                    sitemap_source: child.clone(),
                    type_hint: hint.map(|h| h.to_string()),
                });
                count += 1;
            }
        }
        Ok(count)
    }

    async fn fetch_xml(&self, sitemap_url: &str) -> Result<String, CrawlError> {
        let url = Url::parse(sitemap_url)
            .map_err(|e| CrawlError::Sitemap(format!("{sitemap_url}: {e}")))?;
        let response = self.fetcher.fetch(&url, self.fetch_config).await?;
        if response.status >= 400 {
            return Err(CrawlError::Sitemap(format!(
                "{sitemap_url}: HTTP {}",
                response.status
            )));
        }
        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_index_root() {
        let index = r#"<?xml version="1.0"?>
            <sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <sitemap><loc>https://ex.com/post-sitemap.xml</loc></sitemap>
            </sitemapindex>"#;
        let urlset = r#"<urlset><url><loc>https://ex.com/a</loc></url></urlset>"#;
        assert!(is_sitemap_index(index));
        assert!(!is_sitemap_index(urlset));
    }

    #[test]
    fn extracts_locs_in_order() {
        let xml = r#"<urlset>
            <url><loc> https://ex.com/a </loc></url>
            <url><loc>https://ex.com/b</loc></url>
        </urlset>"#;
        assert_eq!(
            extract_locs(xml),
            vec!["https://ex.com/a".to_string(), "https://ex.com/b".to_string()]
        );
    }

    #[test]
    fn filename_type_hints() {
        assert_eq!(
            type_hint_for("https://ex.com/post-sitemap.xml"),
            Some("post")
        );
        assert_eq!(
            type_hint_for("https://ex.com/post-sitemap2.xml"),
            Some("post")
        );
        assert_eq!(
            type_hint_for("https://ex.com/page-sitemap.xml"),
            Some("page")
        );
        assert_eq!(
            type_hint_for("https://ex.com/product-sitemap.xml"),
            Some("product")
        );
        assert_eq!(
            type_hint_for("https://ex.com/category-sitemap.xml"),
            Some("pagination")
        );
        assert_eq!(
            type_hint_for("https://ex.com/news-sitemap.xml"),
            Some("post")
        );
        assert_eq!(type_hint_for("https://ex.com/sitemap.xml"), None);
    }

    #[test]
    fn page_sitemap_prefix_is_anchored() {
        // "page" only counts when the filename starts with page-sitemap;
        // a "homepage-sitemap.xml" must not match.
        assert_eq!(type_hint_for("https://ex.com/homepage-sitemap.xml"), None);
    }
}

#[cfg(test)]
mod intake_tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use url::Url;

    use siteloom_core::{FetchMode, FetchResponse, PageFetcher};

    use super::*;

    struct StubFetcher {
        responses: HashMap<String, (u16, String)>,
    }

    impl StubFetcher {
        fn new(pages: &[(&str, u16, &str)]) -> Self {
            Self {
                responses: pages
                    .iter()
                    .map(|(url, status, body)| {
                        (url.to_string(), (*status, body.to_string()))
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        fn mode(&self) -> FetchMode {
            FetchMode::Static
        }

        async fn fetch(
            &self,
            url: &Url,
            _config: &FetchConfig,
        ) -> Result<FetchResponse, CrawlError> {
            match self.responses.get(url.as_str()) {
                Some((status, body)) => Ok(FetchResponse {
                    requested_url: url.clone(),
                    final_url: url.clone(),
                    status: *status,
                    body: body.clone().into_bytes(),
                    content_type: Some("application/xml".to_string()),
                    fetched_at: chrono::Utc::now(),
                }),
                None => Err(CrawlError::Fetch(format!("no stub for {url}"))),
            }
        }
    }

    fn urlset(urls: &[&str]) -> String {
        let entries: String = urls
            .iter()
            .map(|u| format!("<url><loc>{u}</loc></url>"))
            .collect();
        format!("<urlset>{entries}</urlset>")
    }

    #[tokio::test]
    async fn index_expanded_one_level_with_child_hints() {
        let index = r#"<sitemapindex>
            <sitemap><loc>https://ex.com/post-sitemap.xml</loc></sitemap>
            <sitemap><loc>https://ex.com/page-sitemap.xml</loc></sitemap>
        </sitemapindex>"#;
        let fetcher = StubFetcher::new(&[
            ("https://ex.com/sitemap_index.xml", 200, index),
            (
                "https://ex.com/post-sitemap.xml",
                200,
                &urlset(&["https://ex.com/post-1", "https://ex.com/post-2"]),
            ),
            (
                "https://ex.com/page-sitemap.xml",
                200,
                &urlset(&["https://ex.com/about"]),
            ),
        ]);
        let config = FetchConfig::default();
        let intake = SitemapIntake::new(&fetcher, &config);

        let entries = intake
            .collect(&["https://ex.com/sitemap_index.xml".to_string()])
            .await;
        assert_eq!(entries.len(), 3);
        assert!(entries
            .iter()
            .filter(|e| e.type_hint.as_deref() == Some("post"))
            .count()
            == 2);
        let about = entries
            .iter()
            .find(|e| e.canonical == "https://ex.com/about")
            .unwrap();
        assert_eq!(about.type_hint.as_deref(), Some("page"));
        assert_eq!(about.sitemap_source, "https://ex.com/page-sitemap.xml");
    }

    #[tokio::test]
    async fn one_failing_sitemap_does_not_abort_the_others() {
        let fetcher = StubFetcher::new(&[(
            "https://ex.com/good-sitemap.xml",
            200,
            &urlset(&["https://ex.com/a"]),
        )]);
        let config = FetchConfig::default();
        let intake = SitemapIntake::new(&fetcher, &config);

        let entries = intake
            .collect(&[
                "https://ex.com/missing-sitemap.xml".to_string(),
                "https://ex.com/good-sitemap.xml".to_string(),
            ])
            .await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].canonical, "https://ex.com/a");
    }

    #[tokio::test]
    async fn http_error_sitemap_is_skipped() {
        let fetcher = StubFetcher::new(&[
            ("https://ex.com/gone-sitemap.xml", 404, ""),
            (
                "https://ex.com/live-sitemap.xml",
                200,
                &urlset(&["https://ex.com/x"]),
            ),
        ]);
        let config = FetchConfig::default();
        let intake = SitemapIntake::new(&fetcher, &config);

        let entries = intake
            .collect(&[
                "https://ex.com/gone-sitemap.xml".to_string(),
                "https://ex.com/live-sitemap.xml".to_string(),
            ])
            .await;
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_raw_urls_keep_first_seen_source() {
        let fetcher = StubFetcher::new(&[
            (
                "https://ex.com/post-sitemap.xml",
                200,
                &urlset(&["https://ex.com/shared", "https://ex.com/only-post"]),
            ),
            (
                "https://ex.com/page-sitemap.xml",
                200,
                &urlset(&["https://ex.com/shared", "https://ex.com/only-page"]),
            ),
        ]);
        let config = FetchConfig::default();
        let intake = SitemapIntake::new(&fetcher, &config);

        let entries = intake
            .collect(&[
                "https://ex.com/post-sitemap.xml".to_string(),
                "https://ex.com/page-sitemap.xml".to_string(),
            ])
            .await;
        assert_eq!(entries.len(), 3);
        let shared = entries
            .iter()
            .find(|e| e.canonical == "https://ex.com/shared")
            .unwrap();
        assert_eq!(shared.sitemap_source, "https://ex.com/post-sitemap.xml");
    }

    #[tokio::test]
    async fn invalid_locs_are_dropped_not_fatal() {
        let fetcher = StubFetcher::new(&[(
            "https://ex.com/sitemap.xml",
            200,
            &urlset(&["mailto:nope@ex.com", "https://ex.com/kept"]),
        )]);
        let config = FetchConfig::default();
        let intake = SitemapIntake::new(&fetcher, &config);

        let entries = intake
            .collect(&["https://ex.com/sitemap.xml".to_string()])
            .await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].canonical, "https://ex.com/kept");
    }
}
