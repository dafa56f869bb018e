use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::CrawlError;

/// Terminal classification of a single crawl attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlStatus {
    Ok,
    RedirectAlias,
    NotFound,
    Soft404,
    Error,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStatus::Ok => "OK",
            CrawlStatus::RedirectAlias => "REDIRECT_ALIAS",
            CrawlStatus::NotFound => "NOT_FOUND",
            CrawlStatus::Soft404 => "SOFT_404",
            CrawlStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    Static,
    Browser,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::Static => "static",
            FetchMode::Browser => "browser",
        }
    }
}

/// Which cascade strategy produced the stored clean HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Readability,
    Semantic,
    CmsPattern,
    DomainOverride,
    Fallback,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Readability => "readability",
            ExtractionMethod::Semantic => "semantic",
            ExtractionMethod::CmsPattern => "cms_pattern",
            ExtractionMethod::DomainOverride => "domain_override",
            ExtractionMethod::Fallback => "fallback",
        }
    }
}

/// The canonical page record, keyed by `final_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub final_url: String,
    pub requested_url_original: String,
    pub status_code: Option<i32>,
    pub crawl_status: CrawlStatus,
    /// Ordered canonical URLs, first request to terminal. Empty when no redirect.
    pub redirect_chain: Vec<String>,
    pub fetch_mode: FetchMode,
    pub run_id: Uuid,
    pub sitemap_type_hint: Option<String>,
    pub html_content: Option<String>,
    pub clean_html: Option<String>,
    pub markdown: Option<String>,
    pub markdown_enhanced: Option<String>,
    pub content_hash: Option<String>,
    pub title: Option<String>,
    pub h1: Option<String>,
    pub meta_description: Option<String>,
    pub word_count: Option<i32>,
    pub nav_structure: Option<NavStructure>,
    pub structural_stats: Option<StructuralStats>,
    pub extraction_method: Option<ExtractionMethod>,
    pub junk_score: Option<f64>,
    pub last_crawled_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// Mapping from a requested URL to its canonical terminal URL.
/// Written for every requested URL, even when the page itself is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlAlias {
    pub requested_url: String,
    pub final_url: String,
    pub status_code: Option<i32>,
    pub redirect_chain: Vec<String>,
    pub run_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRun {
    pub run_id: Uuid,
    pub seed_sitemaps: Vec<String>,
    pub max_pages: i64,
    pub fetch_mode: FetchMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub urls_discovered: i64,
    pub pages_crawled: i64,
    pub pages_skipped: i64,
    pub redirects: i64,
    pub errors: i64,
}

/// Per-host selector configuration, read-only during a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainOverride {
    pub domain: String,
    pub enabled: bool,
    pub main_content_selectors: Vec<String>,
    pub remove_selectors: Vec<String>,
    pub force_fetch_mode: Option<FetchMode>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Text,
    Image,
    Icon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavItem {
    pub url: String,
    pub label: String,
    pub depth: u8,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_labels: Vec<String>,
    pub is_external: bool,
    pub link_type: LinkType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreadcrumbItem {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Structural context a content link appears in. Feeds downstream
/// internal-link weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSourceType {
    ContextualBody,
    FaqModule,
    TocOrJump,
    Breadcrumb,
    PrimaryNav,
    Footer,
    TemplateCta,
    RepeatedBlock,
    RelatedPosts,
    AuthorBio,
    Testimonial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentLink {
    pub url: String,
    pub label: String,
    pub source_type: LinkSourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest_heading: Option<String>,
    pub body_position_pct: u8,
    pub is_external: bool,
}

/// Counts per structural type, persisted as JSON.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StructuralStats {
    pub faq_modules: u32,
    pub toc_sections: u32,
    pub breadcrumbs: u32,
    pub template_ctas: u32,
    pub accordions: u32,
    pub testimonials: u32,
    pub author_bios: u32,
    pub related_posts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionMeta {
    pub selectors_matched: Vec<String>,
    pub cluster_count: u32,
    pub has_mega_menu: bool,
    pub extraction_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nav_fingerprint: Option<String>,
}

/// Navigation clusters + classified content links for one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavStructure {
    pub primary_nav: Vec<NavItem>,
    pub footer_nav: Vec<NavItem>,
    pub utility_header: Vec<NavItem>,
    pub language_switcher: Vec<NavItem>,
    pub breadcrumb: Vec<BreadcrumbItem>,
    pub content_links: Vec<ContentLink>,
    pub structural_stats: StructuralStats,
    pub extraction_meta: ExtractionMeta,
}

/// One URL discovered from a sitemap seed.
#[derive(Debug, Clone)]
pub struct SitemapEntry {
    pub raw: String,
    pub canonical: String,
    pub sitemap_source: String,
    pub type_hint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_body_size: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_body_size: 10 * 1024 * 1024,
            user_agent: String::new(),
        }
    }
}

/// Terminal response from the fetch layer. Redirects are followed
/// internally; only the terminal URL is surfaced.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub requested_url: Url,
    pub final_url: Url,
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// The fetch-layer seam. The MVP ships a static reqwest implementation;
/// a browser driver would implement the same contract.
#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    fn mode(&self) -> FetchMode;
    async fn fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError>;
}
