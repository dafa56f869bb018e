//! Navigation-cluster extraction and content-link classification. Each
//! cluster tries a priority-ordered selector list and accepts the first
//! container that meets the cluster's predicate; menu trees are walked to
//! depth 3 with dense zero-based order per depth.

use std::collections::HashSet;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use siteloom_core::{
    canonical, BreadcrumbItem, ContentLink, ExtractionMeta, LinkSourceType, LinkType, NavItem,
    NavStructure,
};

use crate::hash;
use crate::structure::{self, StructuralElement, StructuralType};

const MAX_MENU_DEPTH: u8 = 3;
const PRIMARY_MIN_INTERNAL: usize = 3;
const FOOTER_MIN_LINKS: usize = 2;
const FOOTER_FALLBACK_CAP: usize = 20;
const LANGUAGE_MIN: usize = 2;
const LANGUAGE_MAX: usize = 10;
const LANGUAGE_LABEL_MAX: usize = 12;
const BREADCRUMB_LABEL_MAX: usize = 100;

const PRIMARY_SELECTORS: &[&str] = &[
    "nav.main-nav",
    "nav.primary-nav",
    "nav.main-navigation",
    ".main-navigation",
    "nav.navbar",
    "#primary-menu",
    ".primary-menu",
    "#main-menu",
    ".main-menu",
    "header nav",
    "nav[role=\"navigation\"]",
    "nav",
];

const FOOTER_SELECTORS: &[&str] = &[
    "footer nav",
    ".footer-nav",
    ".footer-menu",
    ".footer-links",
    "footer .menu",
    "footer ul",
];

const FOOTER_FALLBACK_CONTAINERS: &[&str] = &["footer", "#footer", ".footer", ".site-footer"];

const UTILITY_CONTAINERS: &[&str] = &[
    ".utility-nav",
    ".top-bar",
    ".topbar",
    ".header-top",
    ".pre-header",
    ".eyebrow",
    ".secondary-nav",
];

const LANGUAGE_SELECTORS: &[&str] = &[
    ".language-switcher",
    ".lang-switcher",
    ".language-selector",
    ".wpml-ls",
    ".polylang-switcher",
    ".lang-menu",
    "#language-switcher",
];

const BREADCRUMB_SELECTORS: &[&str] = &[
    ".breadcrumb",
    ".breadcrumbs",
    "nav[aria-label=\"breadcrumb\"]",
    "nav[aria-label=\"Breadcrumb\"]",
    "#breadcrumb",
    "#breadcrumbs",
    ".yoast-breadcrumb",
    "[itemtype*=\"BreadcrumbList\"]",
];

const CONTENT_REGION_SELECTORS: &[&str] = &[
    "main",
    "#main-content",
    "#content",
    ".content",
    "article",
    ".entry-content",
    ".post-content",
    ".page-content",
    "[role=\"main\"]",
];

const UTILITY_PREFIXES: &[&str] = &["tel:", "mailto:", "sms:", "whatsapp:"];

const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "pinterest.com",
    "tiktok.com",
];

const BREADCRUMB_SEPARATORS: &[&str] = &[">", "/", "»", "›", "|", "::", "·", "•", "→"];

static LANG_CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^lang(?:uage)?-([a-z]{2})$").unwrap());

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

struct ClusterCtx<'a> {
    base: &'a Url,
    base_host: String,
}

pub fn is_utility_href(href: &str) -> bool {
    let lower = href.trim().to_ascii_lowercase();
    UTILITY_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn is_social_url(url: &str) -> bool {
    canonical::domain(url)
        .map(|host| {
            SOCIAL_DOMAINS
                .iter()
                .any(|s| host == *s || host.ends_with(&format!(".{s}")))
        })
        .unwrap_or(false)
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn anchor_label(a: ElementRef) -> String {
    let text = collapse_ws(&a.text().collect::<String>());
    if !text.is_empty() {
        return text;
    }
    selector("img")
        .and_then(|s| a.select(&s).next())
        .and_then(|img| img.value().attr("alt"))
        .map(|alt| alt.trim().to_string())
        .unwrap_or_default()
}

fn link_type_of(a: ElementRef) -> LinkType {
    if selector("img").is_some_and(|s| a.select(&s).next().is_some()) {
        return LinkType::Image;
    }
    let icon = selector("i, svg, [class*=\"icon\"], [class*=\"fa-\"]")
        .is_some_and(|s| a.select(&s).next().is_some());
    if icon {
        LinkType::Icon
    } else {
        LinkType::Text
    }
}

fn is_internal(url: &str, base_host: &str) -> bool {
    canonical::domain(url).as_deref() == Some(base_host)
}

/// First anchor of a menu item that is not inside a nested list.
fn item_anchor(li: ElementRef) -> Option<ElementRef> {
    let a_sel = selector("a[href]")?;
    for a in li.select(&a_sel) {
        let mut node = a.parent();
        let mut nested = false;
        while let Some(n) = node {
            if n.id() == li.id() {
                break;
            }
            if let Some(el) = ElementRef::wrap(n) {
                let name = el.value().name();
                if name == "ul" || name == "ol" {
                    nested = true;
                    break;
                }
            }
            node = n.parent();
        }
        if !nested {
            return Some(a);
        }
    }
    None
}

/// Submenu list of a menu item: `ul.sub-menu` / `ul.dropdown-menu`
/// preferred, any direct list (possibly one wrapper deep) otherwise.
fn find_submenu(li: ElementRef) -> Option<ElementRef> {
    let mut candidates: Vec<ElementRef> = Vec::new();
    for child in li.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "ul" | "ol" => candidates.push(child),
            "div" => {
                for inner in child.children().filter_map(ElementRef::wrap) {
                    if inner.value().name() == "ul" {
                        candidates.push(inner);
                    }
                }
            }
            _ => {}
        }
    }
    candidates
        .iter()
        .find(|el| {
            el.value()
                .attr("class")
                .map(|c| c.contains("sub-menu") || c.contains("dropdown-menu"))
                .unwrap_or(false)
        })
        .copied()
        .or_else(|| candidates.first().copied())
}

fn walk_menu_list(
    list: ElementRef,
    depth: u8,
    parent_labels: &[String],
    ctx: &ClusterCtx,
    counters: &mut [u32; 4],
    out: &mut Vec<NavItem>,
) {
    if depth > MAX_MENU_DEPTH {
        return;
    }
    for li in list
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "li")
    {
        let submenu = find_submenu(li);
        let Some(a) = item_anchor(li) else { continue };
        let href = a.value().attr("href").unwrap_or("").trim();
        if href.is_empty() || is_utility_href(href) {
            continue;
        }

        // Placeholder parents survive only at the top level, and only when
        // they actually open a submenu.
        let is_placeholder = href == "#";
        if is_placeholder && (depth != 0 || submenu.is_none()) {
            continue;
        }

        let label = anchor_label(a);
        if label.is_empty() {
            continue;
        }

        let url = if is_placeholder {
            match canonical::normalize(ctx.base.as_str()) {
                Ok(u) => u,
                Err(_) => ctx.base.to_string(),
            }
        } else {
            match canonical::resolve(href, ctx.base) {
                Ok(u) => u,
                Err(_) => continue,
            }
        };
        if is_social_url(&url) {
            continue;
        }

        let order = counters[depth as usize];
        counters[depth as usize] += 1;

        out.push(NavItem {
            is_external: !is_internal(&url, &ctx.base_host),
            link_type: link_type_of(a),
            url,
            label: label.clone(),
            depth,
            order,
            parent_labels: parent_labels.to_vec(),
        });

        if let Some(sub) = submenu {
            if depth < MAX_MENU_DEPTH {
                let mut labels = parent_labels.to_vec();
                labels.push(label);
                walk_menu_list(sub, depth + 1, &labels, ctx, counters, out);
            }
        }
    }
}

/// Items from a container: tree walk when it holds a list, flat anchors
/// otherwise.
fn menu_items(container: ElementRef, ctx: &ClusterCtx) -> Vec<NavItem> {
    let mut items = Vec::new();
    let mut counters = [0u32; 4];

    let list = if matches!(container.value().name(), "ul" | "ol") {
        Some(container)
    } else {
        selector("ul, ol").and_then(|s| container.select(&s).next())
    };

    match list {
        Some(list) => walk_menu_list(list, 0, &[], ctx, &mut counters, &mut items),
        None => flat_anchor_items(container, ctx, None, &mut counters, &mut items),
    }
    items
}

fn flat_anchor_items(
    container: ElementRef,
    ctx: &ClusterCtx,
    cap: Option<usize>,
    counters: &mut [u32; 4],
    out: &mut Vec<NavItem>,
) {
    let Some(a_sel) = selector("a[href]") else { return };
    for a in container.select(&a_sel) {
        if cap.is_some_and(|c| out.len() >= c) {
            break;
        }
        let href = a.value().attr("href").unwrap_or("").trim();
        if href.is_empty() || href == "#" || is_utility_href(href) {
            continue;
        }
        let label = anchor_label(a);
        if label.is_empty() {
            continue;
        }
        let Ok(url) = canonical::resolve(href, ctx.base) else {
            continue;
        };
        if is_social_url(&url) {
            continue;
        }
        let order = counters[0];
        counters[0] += 1;
        out.push(NavItem {
            is_external: !is_internal(&url, &ctx.base_host),
            link_type: link_type_of(a),
            url,
            label,
            depth: 0,
            order,
            parent_labels: Vec::new(),
        });
    }
}

fn extract_primary(document: &Html, ctx: &ClusterCtx) -> (Vec<NavItem>, Option<String>) {
    for sel_str in PRIMARY_SELECTORS {
        let Some(container) = selector(sel_str).and_then(|s| document.select(&s).next()) else {
            continue;
        };
        let items = menu_items(container, ctx);
        let internal = items.iter().filter(|i| !i.is_external).count();
        if internal >= PRIMARY_MIN_INTERNAL {
            return (items, Some(sel_str.to_string()));
        }
    }

    // Broad fallback over the header region
    if let Some(header) = selector("header").and_then(|s| document.select(&s).next()) {
        let mut items = Vec::new();
        let mut counters = [0u32; 4];
        flat_anchor_items(header, ctx, None, &mut counters, &mut items);
        let internal = items.iter().filter(|i| !i.is_external).count();
        if internal >= PRIMARY_MIN_INTERNAL {
            return (items, Some("header a".to_string()));
        }
    }
    (Vec::new(), None)
}

fn extract_footer(document: &Html, ctx: &ClusterCtx) -> (Vec<NavItem>, Option<String>) {
    for sel_str in FOOTER_SELECTORS {
        let Some(container) = selector(sel_str).and_then(|s| document.select(&s).next()) else {
            continue;
        };
        let items = menu_items(container, ctx);
        if items.len() >= FOOTER_MIN_LINKS {
            return (items, Some(sel_str.to_string()));
        }
    }

    for sel_str in FOOTER_FALLBACK_CONTAINERS {
        let Some(container) = selector(sel_str).and_then(|s| document.select(&s).next()) else {
            continue;
        };
        let mut items = Vec::new();
        let mut counters = [0u32; 4];
        flat_anchor_items(container, ctx, Some(FOOTER_FALLBACK_CAP), &mut counters, &mut items);
        items.retain(|i| !i.is_external);
        if !items.is_empty() {
            for (order, item) in items.iter_mut().enumerate() {
                item.order = order as u32;
            }
            return (items, Some(sel_str.to_string()));
        }
    }
    (Vec::new(), None)
}

fn extract_utility(document: &Html, ctx: &ClusterCtx) -> Vec<NavItem> {
    let mut items: Vec<NavItem> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut order = 0u32;

    let mut push = |a: ElementRef, items: &mut Vec<NavItem>, seen: &mut HashSet<String>| {
        let href = a.value().attr("href").unwrap_or("").trim();
        if href.is_empty() || href == "#" {
            return;
        }
        let url = if is_utility_href(href) {
            href.to_string()
        } else {
            match canonical::resolve(href, ctx.base) {
                Ok(u) => u,
                Err(_) => return,
            }
        };
        if !seen.insert(url.clone()) {
            return;
        }
        let label = anchor_label(a);
        let label = if label.is_empty() {
            href.to_string()
        } else {
            label
        };
        items.push(NavItem {
            is_external: !is_internal(&url, &ctx.base_host),
            link_type: link_type_of(a),
            url,
            label,
            depth: 0,
            order,
            parent_labels: Vec::new(),
        });
        order += 1;
    };

    for sel_str in UTILITY_CONTAINERS {
        let Some(sel) = selector(sel_str) else { continue };
        for container in document.select(&sel) {
            let Some(a_sel) = selector("a[href]") else { continue };
            for a in container.select(&a_sel) {
                push(a, &mut items, &mut seen);
            }
        }
    }
    for sel_str in ["header a[href^=\"tel:\"]", "header a[href^=\"mailto:\"]"] {
        let Some(sel) = selector(sel_str) else { continue };
        for a in document.select(&sel) {
            push(a, &mut items, &mut seen);
        }
    }
    items
}

fn language_label(a: ElementRef) -> String {
    let label = anchor_label(a);
    if !label.is_empty() {
        return label;
    }
    if let Some(hreflang) = a.value().attr("hreflang") {
        return hreflang.trim().to_string();
    }
    a.value()
        .attr("class")
        .and_then(|classes| {
            classes
                .split_whitespace()
                .find_map(|t| LANG_CLASS_RE.captures(t).map(|c| c[1].to_string()))
        })
        .unwrap_or_default()
}

fn extract_language(document: &Html, ctx: &ClusterCtx) -> Vec<NavItem> {
    for sel_str in LANGUAGE_SELECTORS {
        let Some(container) = selector(sel_str).and_then(|s| document.select(&s).next()) else {
            continue;
        };
        let Some(a_sel) = selector("a[href]") else { continue };
        let mut items = Vec::new();
        let mut order = 0u32;
        for a in container.select(&a_sel) {
            let href = a.value().attr("href").unwrap_or("").trim();
            if href.is_empty() || is_utility_href(href) {
                continue;
            }
            let label = language_label(a);
            if label.is_empty() || label.chars().count() > LANGUAGE_LABEL_MAX {
                continue;
            }
            let Ok(url) = canonical::resolve(href, ctx.base) else {
                continue;
            };
            items.push(NavItem {
                is_external: !is_internal(&url, &ctx.base_host),
                link_type: link_type_of(a),
                url,
                label,
                depth: 0,
                order,
                parent_labels: Vec::new(),
            });
            order += 1;
        }
        if (LANGUAGE_MIN..=LANGUAGE_MAX).contains(&items.len()) {
            return items;
        }
    }
    Vec::new()
}

fn is_breadcrumb_separator(text: &str) -> bool {
    BREADCRUMB_SEPARATORS.contains(&text)
}

fn extract_breadcrumb(document: &Html, base: &Url) -> Vec<BreadcrumbItem> {
    let Some(container) = BREADCRUMB_SELECTORS
        .iter()
        .find_map(|s| selector(s).and_then(|sel| document.select(&sel).next()))
    else {
        return Vec::new();
    };

    let mut items: Vec<BreadcrumbItem> = Vec::new();
    if let Some(sel) = selector("a, span") {
        for el in container.select(&sel) {
            let is_anchor = el.value().name() == "a";
            // A span wrapping the anchor would repeat its text
            if !is_anchor
                && selector("a").is_some_and(|a_sel| el.select(&a_sel).next().is_some())
            {
                continue;
            }
            let label = collapse_ws(&el.text().collect::<String>());
            if label.is_empty()
                || is_breadcrumb_separator(&label)
                || label.chars().count() > BREADCRUMB_LABEL_MAX
            {
                continue;
            }
            if items.last().map(|i| i.label.as_str()) == Some(label.as_str()) {
                continue;
            }
            let url = if is_anchor {
                el.value()
                    .attr("href")
                    .and_then(|href| canonical::resolve(href, base).ok())
            } else {
                None
            };
            items.push(BreadcrumbItem { label, url });
        }
    }
    if items.len() >= 2 {
        return items;
    }

    // Structured pass came up short: split the container text instead
    let text = collapse_ws(&container.text().collect::<String>());
    let fallback: Vec<BreadcrumbItem> = text
        .split(['>', '»', '›', '|', '/'])
        .map(str::trim)
        .filter(|t| !t.is_empty() && t.chars().count() <= BREADCRUMB_LABEL_MAX)
        .map(|t| BreadcrumbItem {
            label: t.to_string(),
            url: None,
        })
        .collect();
    if fallback.len() >= 2 {
        fallback
    } else {
        items
    }
}

fn map_structural_source(kind: StructuralType) -> LinkSourceType {
    match kind {
        StructuralType::FaqModule | StructuralType::Accordion => LinkSourceType::FaqModule,
        StructuralType::TocOrJump => LinkSourceType::TocOrJump,
        StructuralType::Breadcrumb => LinkSourceType::Breadcrumb,
        StructuralType::TemplateCta => LinkSourceType::TemplateCta,
        StructuralType::Testimonial => LinkSourceType::Testimonial,
        StructuralType::AuthorBio => LinkSourceType::AuthorBio,
        StructuralType::RelatedPosts => LinkSourceType::RelatedPosts,
    }
}

fn in_excluded_ancestor(a: ElementRef, region: ElementRef) -> bool {
    let mut node = a.parent();
    while let Some(n) = node {
        if n.id() == region.id() {
            return false;
        }
        if let Some(el) = ElementRef::wrap(n) {
            let name = el.value().name();
            if matches!(name, "nav" | "header" | "footer" | "aside") {
                return true;
            }
            let classish = format!(
                "{} {}",
                el.value().attr("class").unwrap_or(""),
                el.value().attr("id").unwrap_or("")
            )
            .to_ascii_lowercase();
            if ["nav", "menu", "sidebar", "breadcrumb", "footer"]
                .iter()
                .any(|k| classish.contains(k))
            {
                return true;
            }
        }
        node = n.parent();
    }
    false
}

fn nearest_heading(a: ElementRef) -> Option<String> {
    let heading_sel = selector("h1, h2, h3, h4, h5, h6")?;
    let is_heading =
        |el: ElementRef| matches!(el.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6");

    let mut node = *a;
    loop {
        for sibling in node.prev_siblings() {
            if let Some(el) = ElementRef::wrap(sibling) {
                if is_heading(el) {
                    return Some(collapse_ws(&el.text().collect::<String>()));
                }
                // Closest preceding heading inside the sibling is its last one
                if let Some(h) = el.select(&heading_sel).last() {
                    return Some(collapse_ws(&h.text().collect::<String>()));
                }
            }
        }
        node = node.parent()?;
    }
}

/// Incremental search of the raw HTML for this link's href, so repeated
/// hrefs map to successive occurrences in document order.
fn locate_href(raw: &str, href: &str, cursor: &mut usize) -> Option<usize> {
    if href.is_empty() {
        return None;
    }
    let double = format!("href=\"{href}\"");
    let single = format!("href='{href}'");
    for pat in [double.as_str(), single.as_str(), href] {
        if let Some(i) = raw.get(*cursor..).and_then(|s| s.find(pat)) {
            let pos = *cursor + i;
            *cursor = pos + 1;
            return Some(pos);
        }
    }
    for pat in [double.as_str(), single.as_str()] {
        if let Some(i) = raw.find(pat) {
            return Some(i);
        }
    }
    None
}

fn extract_content_links(
    document: &Html,
    raw_html: &str,
    base: &Url,
    ctx: &ClusterCtx,
    structural: &[StructuralElement],
) -> Vec<ContentLink> {
    let region = CONTENT_REGION_SELECTORS
        .iter()
        .find_map(|s| selector(s).and_then(|sel| document.select(&sel).next()))
        .or_else(|| selector("body").and_then(|sel| document.select(&sel).next()));
    let Some(region) = region else {
        return Vec::new();
    };
    let Some(a_sel) = selector("a[href]") else {
        return Vec::new();
    };

    let page_canonical = canonical::normalize(base.as_str()).ok();

    struct Raw {
        url: String,
        label: String,
        source_type: LinkSourceType,
        nearest_heading: Option<String>,
        is_external: bool,
    }

    let mut cursor = 0usize;
    let mut collected: Vec<Raw> = Vec::new();
    for a in region.select(&a_sel) {
        if in_excluded_ancestor(a, region) {
            continue;
        }
        let href = a.value().attr("href").unwrap_or("").trim();
        if href.is_empty()
            || href.starts_with("javascript:")
            || href.starts_with("data:")
            || is_utility_href(href)
        {
            continue;
        }

        let offset = locate_href(raw_html, href, &mut cursor);

        let is_pure_anchor = href.starts_with('#');
        let url = if is_pure_anchor {
            match page_canonical.clone() {
                Some(u) => u,
                None => continue,
            }
        } else {
            match canonical::resolve(href, base) {
                Ok(u) => u,
                Err(_) => continue,
            }
        };

        let same_page_fragment = href.contains('#')
            && page_canonical.as_deref() == Some(url.as_str());

        let source_type = if is_pure_anchor || same_page_fragment {
            LinkSourceType::TocOrJump
        } else {
            offset
                .and_then(|o| structure::structural_at(o, structural))
                .map(|el| map_structural_source(el.kind))
                .unwrap_or(LinkSourceType::ContextualBody)
        };

        let label = anchor_label(a);
        let label = if label.is_empty() { url.clone() } else { label };

        collected.push(Raw {
            is_external: !is_internal(&url, &ctx.base_host),
            nearest_heading: nearest_heading(a),
            source_type,
            url,
            label,
        });
    }

    let total = collected.len();
    collected
        .into_iter()
        .enumerate()
        .map(|(index, raw)| ContentLink {
            url: raw.url,
            label: raw.label,
            source_type: raw.source_type,
            nearest_heading: raw.nearest_heading,
            body_position_pct: ((100 * index) as f64 / total.max(1) as f64).round() as u8,
            is_external: raw.is_external,
        })
        .collect()
}

/// MD5 of sorted internal URLs joined by `|`, truncated to 16 hex chars.
/// Lets downstream consumers spot the same nav across pages.
pub fn nav_fingerprint(items: &[NavItem]) -> Option<String> {
    let mut urls: Vec<&str> = items
        .iter()
        .filter(|i| !i.is_external)
        .map(|i| i.url.as_str())
        .collect();
    if urls.is_empty() {
        return None;
    }
    urls.sort_unstable();
    Some(hash::short_fingerprint(&urls.join("|")))
}

pub fn extract_navigation(
    document: &Html,
    raw_html: &str,
    base: &Url,
    structural: &[StructuralElement],
) -> NavStructure {
    let started = Instant::now();
    let ctx = ClusterCtx {
        base,
        base_host: canonical::domain(base.as_str()).unwrap_or_default(),
    };

    let (primary_nav, primary_sel) = extract_primary(document, &ctx);
    let (footer_nav, footer_sel) = extract_footer(document, &ctx);
    let utility_header = extract_utility(document, &ctx);
    let language_switcher = extract_language(document, &ctx);
    let breadcrumb = extract_breadcrumb(document, base);
    let content_links = extract_content_links(document, raw_html, base, &ctx, structural);

    let selectors_matched: Vec<String> =
        [primary_sel, footer_sel].into_iter().flatten().collect();
    let cluster_count = [
        !primary_nav.is_empty(),
        !footer_nav.is_empty(),
        !utility_header.is_empty(),
        !language_switcher.is_empty(),
        !breadcrumb.is_empty(),
    ]
    .iter()
    .filter(|present| **present)
    .count() as u32;

    NavStructure {
        structural_stats: structure::aggregate_stats(structural),
        extraction_meta: ExtractionMeta {
            selectors_matched,
            cluster_count,
            has_mega_menu: primary_nav.iter().any(|i| i.depth >= 2),
            extraction_time_ms: started.elapsed().as_millis() as u64,
            nav_fingerprint: nav_fingerprint(&primary_nav),
        },
        primary_nav,
        footer_nav,
        utility_header,
        language_switcher,
        breadcrumb,
        content_links,
    }
}
