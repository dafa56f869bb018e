//! HTML → Markdown with structural markers. Marker comments are injected
//! into the raw HTML at the detector's byte offsets, survive the DOM walk
//! as comments, and are stripped (with newline collapse) to derive the
//! plain variant — so the two products can never drift apart.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::structure::StructuralElement;

#[derive(Debug, Clone)]
pub struct MarkdownOutput {
    pub enhanced: String,
    pub plain: String,
    /// Set when the source document had an h1 that was not the first block.
    pub h1_issue: Option<String>,
}

/// Consumers parse this exact shape; see the marker contract.
static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!-- STRUCT:[A-Z_]+:[A-Z_]+ -->").unwrap());
static MARKER_FULL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<!-- STRUCT:[A-Z_]+:[A-Z_]+ -->$").unwrap());
static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static BOILERPLATE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^Home\s*(?:>|»|/)",
        r"(?i)^posted on .+ by .+$",
        r"(?i)^(?:©|\(c\)\s|copyright\b).*$",
        r"(?i)^last updated\b.*$",
        r"(?i)^all rights reserved\.?$",
    ]
    .into_iter()
    .map(|re| Regex::new(re).unwrap())
    .collect()
});

const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "svg", "form", "button", "input", "select",
    "textarea", "nav", "header", "footer", "aside",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "ul", "ol", "li", "table", "blockquote", "pre",
    "h1", "h2", "h3", "h4", "h5", "h6", "figure", "dl", "dt", "dd", "header", "footer", "aside",
    "nav", "form",
];

/// Share of link-only items at which a list is treated as navigation and
/// dropped from the Markdown.
const NAV_LIST_LINK_RATIO: f64 = 0.8;

const MIN_BASE64_CHARS: usize = 50;

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Insert START/END marker comments at the structural offsets, deepest
/// offset first so earlier positions stay valid.
fn inject_markers(raw: &str, elements: &[StructuralElement]) -> String {
    let mut inserts: Vec<(usize, String)> = Vec::with_capacity(elements.len() * 2);
    for el in elements {
        let code = el.kind.marker_code();
        inserts.push((el.start, format!("<!-- STRUCT:{code}:START -->")));
        inserts.push((el.end, format!("<!-- STRUCT:{code}:END -->")));
    }
    inserts.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = raw.to_string();
    for (pos, marker) in inserts {
        if pos <= out.len() && out.is_char_boundary(pos) {
            out.insert_str(pos, &marker);
        }
    }
    out
}

struct Walker<'a> {
    base: &'a Url,
    blocks: Vec<String>,
    faq_depth: u32,
    last_heading: Option<usize>,
}

impl<'a> Walker<'a> {
    fn new(base: &'a Url) -> Self {
        Self {
            base,
            blocks: Vec::new(),
            faq_depth: 0,
            last_heading: None,
        }
    }

    fn walk_block(&mut self, node: ego_tree::NodeRef<'_, scraper::Node>) {
        if let Some(comment) = node.value().as_comment() {
            let full = format!("<!--{}-->", &**comment);
            if MARKER_FULL_RE.is_match(&full) {
                if full.contains(":FAQ:START") {
                    self.faq_depth += 1;
                } else if full.contains(":FAQ:END") {
                    self.faq_depth = self.faq_depth.saturating_sub(1);
                }
                self.blocks.push(full);
            }
            return;
        }

        if let Some(text) = node.value().as_text() {
            let collapsed = collapse_ws(text);
            if !collapsed.is_empty() {
                self.blocks.push(collapsed);
            }
            return;
        }

        let Some(el) = ElementRef::wrap(node) else {
            return;
        };
        let name = el.value().name();
        if SKIP_TAGS.contains(&name) {
            return;
        }
        if matches!(
            el.value().attr("role"),
            Some("navigation") | Some("banner") | Some("contentinfo") | Some("complementary")
        ) {
            return;
        }

        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => self.push_heading(el, name),
            "p" => {
                let text = self.inline(el);
                if !text.is_empty() {
                    self.blocks.push(text);
                }
            }
            "ul" | "ol" => {
                let lines = self.render_list(el, 0, name == "ol");
                if !lines.is_empty() {
                    self.blocks.push(lines.join("\n"));
                }
            }
            "blockquote" => {
                let text = self.inline(el);
                if !text.is_empty() {
                    let quoted: Vec<String> =
                        text.lines().map(|l| format!("> {l}")).collect();
                    self.blocks.push(quoted.join("\n"));
                }
            }
            "pre" => {
                let code: String = el.text().collect();
                let code = code.trim_matches('\n');
                if !code.trim().is_empty() {
                    self.blocks.push(format!("```\n{code}\n```"));
                }
            }
            "table" => self.push_table(el),
            "img" => {
                let image = self.image_markdown(el);
                if !image.is_empty() {
                    self.blocks.push(image);
                }
            }
            "hr" => self.blocks.push("---".to_string()),
            "br" => {}
            _ => {
                if self.faq_depth > 0 {
                    if is_faq_question(el) {
                        self.blocks.push("<!-- STRUCT:FAQ:Q -->".to_string());
                    } else if is_faq_answer(el) {
                        self.blocks.push("<!-- STRUCT:FAQ:A -->".to_string());
                    }
                }
                if has_block_children(el) {
                    for child in node.children() {
                        self.walk_block(child);
                    }
                } else {
                    let text = self.inline(el);
                    if !text.is_empty() {
                        self.blocks.push(text);
                    }
                }
            }
        }
    }

    /// ATX heading with hierarchy normalization: a heading never drops more
    /// than one level below the previous one, and never exceeds h6.
    fn push_heading(&mut self, el: ElementRef, name: &str) {
        let level = name[1..].parse::<usize>().unwrap_or(6);
        let effective = match self.last_heading {
            Some(prev) => level.min(prev + 1).min(6),
            None => level.min(6),
        };
        let text = self.inline(el);
        if text.is_empty() {
            return;
        }
        self.last_heading = Some(effective);
        self.blocks.push(format!("{} {}", "#".repeat(effective), text));
    }

    fn push_table(&mut self, el: ElementRef) {
        let Some(tr_sel) = selector("tr") else { return };
        let Some(cell_sel) = selector("th, td") else { return };
        let mut lines: Vec<String> = Vec::new();
        for (i, row) in el.select(&tr_sel).enumerate() {
            let cells: Vec<String> = row
                .select(&cell_sel)
                .map(|c| collapse_ws(&c.text().collect::<String>()))
                .collect();
            if cells.is_empty() {
                continue;
            }
            lines.push(format!("| {} |", cells.join(" | ")));
            if i == 0 {
                lines.push(format!("|{}|", " --- |".repeat(cells.len())));
            }
        }
        if !lines.is_empty() {
            self.blocks.push(lines.join("\n"));
        }
    }

    fn render_list(&mut self, el: ElementRef, indent: usize, ordered: bool) -> Vec<String> {
        let items: Vec<ElementRef> = el
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| c.value().name() == "li")
            .collect();
        if items.is_empty() {
            return Vec::new();
        }

        // Link farms are navigation, not content
        let link_items = items.iter().filter(|li| li_is_pure_link(**li)).count();
        if link_items as f64 >= items.len() as f64 * NAV_LIST_LINK_RATIO {
            return Vec::new();
        }

        let mut lines = Vec::new();
        for (i, li) in items.iter().enumerate() {
            let text = self.inline_excluding_lists(*li);
            let marker = if ordered {
                format!("{}.", i + 1)
            } else {
                "-".to_string()
            };
            if !text.is_empty() {
                lines.push(format!("{}{} {}", "  ".repeat(indent), marker, text));
            }
            for child in li.children().filter_map(ElementRef::wrap) {
                let child_name = child.value().name();
                if matches!(child_name, "ul" | "ol") {
                    lines.extend(self.render_list(child, indent + 1, child_name == "ol"));
                }
            }
        }
        lines
    }

    fn inline(&self, el: ElementRef) -> String {
        let mut out = String::new();
        for child in el.children() {
            self.inline_node(child, &mut out);
        }
        out.trim().to_string()
    }

    fn inline_excluding_lists(&self, el: ElementRef) -> String {
        let mut out = String::new();
        for child in el.children() {
            if let Some(child_el) = ElementRef::wrap(child) {
                if matches!(child_el.value().name(), "ul" | "ol") {
                    continue;
                }
            }
            self.inline_node(child, &mut out);
        }
        out.trim().to_string()
    }

    fn inline_node(&self, node: ego_tree::NodeRef<'_, scraper::Node>, out: &mut String) {
        if let Some(text) = node.value().as_text() {
            let collapsed = collapse_ws(text);
            if !collapsed.is_empty() {
                if !out.is_empty() && !out.ends_with(|c: char| c.is_whitespace() || c == '\n') {
                    out.push(' ');
                }
                out.push_str(&collapsed);
            }
            return;
        }
        let Some(el) = ElementRef::wrap(node) else { return };
        let name = el.value().name();
        if SKIP_TAGS.contains(&name) {
            return;
        }
        match name {
            "a" => {
                let label = self.inline(el);
                let has_image = selector("img").is_some_and(|s| el.select(&s).next().is_some());
                if label.is_empty() && !has_image {
                    return;
                }
                let href = el.value().attr("href").unwrap_or("").trim();
                let resolved = self
                    .base
                    .join(href)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| href.to_string());
                if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
                if resolved.is_empty() {
                    out.push_str(&label);
                } else {
                    out.push_str(&format!("[{label}]({resolved})"));
                }
            }
            "img" => {
                let image = self.image_markdown(el);
                if !image.is_empty() {
                    if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                        out.push(' ');
                    }
                    out.push_str(&image);
                }
            }
            "strong" | "b" => {
                let inner = self.inline(el);
                if !inner.is_empty() {
                    if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                        out.push(' ');
                    }
                    out.push_str(&format!("**{inner}**"));
                }
            }
            "em" | "i" => {
                let inner = self.inline(el);
                if !inner.is_empty() {
                    if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                        out.push(' ');
                    }
                    out.push_str(&format!("*{inner}*"));
                }
            }
            "code" => {
                let inner: String = el.text().collect();
                let inner = inner.trim();
                if !inner.is_empty() {
                    if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                        out.push(' ');
                    }
                    out.push_str(&format!("`{inner}`"));
                }
            }
            "br" => out.push('\n'),
            _ => {
                for child in node.children() {
                    self.inline_node(child, out);
                }
            }
        }
    }

    fn image_markdown(&self, el: ElementRef) -> String {
        let alt = el.value().attr("alt").unwrap_or("").trim();
        let src = el
            .value()
            .attr("src")
            .or_else(|| el.value().attr("data-src"))
            .unwrap_or("")
            .trim();
        if src.is_empty() {
            return String::new();
        }
        let src = sanitize_image_src(src, self.base);
        format!("![{alt}]({src})")
    }
}

/// Base64 data URLs are replaced with a truncated placeholder; everything
/// else is resolved to absolute.
fn sanitize_image_src(src: &str, base: &Url) -> String {
    if let Some(idx) = src.find(";base64,") {
        let payload = &src[idx + ";base64,".len()..];
        if payload.len() >= MIN_BASE64_CHARS {
            let image_type = src
                .strip_prefix("data:image/")
                .and_then(|rest| rest.split(';').next())
                .unwrap_or("unknown");
            return format!("data:image/{image_type};base64,...");
        }
        return src.to_string();
    }
    base.join(src)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| src.to_string())
}

fn is_faq_question(el: ElementRef) -> bool {
    if matches!(el.value().name(), "dt" | "summary") {
        return true;
    }
    let class = el.value().attr("class").unwrap_or("");
    class.contains("question")
        || class.contains("accordion-title")
        || class.contains("accordion-header")
        || class.contains("accordion__title")
}

fn is_faq_answer(el: ElementRef) -> bool {
    if el.value().name() == "dd" {
        return true;
    }
    let class = el.value().attr("class").unwrap_or("");
    class.contains("answer")
        || class.contains("accordion-content")
        || class.contains("accordion-body")
        || class.contains("accordion__panel")
}

fn has_block_children(el: ElementRef) -> bool {
    el.children()
        .filter_map(ElementRef::wrap)
        .any(|c| BLOCK_TAGS.contains(&c.value().name()))
}

fn li_is_pure_link(li: ElementRef) -> bool {
    let Some(a_sel) = selector("a") else {
        return false;
    };
    let Some(a) = li.select(&a_sel).next() else {
        return false;
    };
    let li_text = collapse_ws(&li.text().collect::<String>());
    let a_text = collapse_ws(&a.text().collect::<String>());
    !a_text.is_empty() && li_text == a_text
}

/// Collapse consecutive duplicate non-empty lines and drop boilerplate.
fn strip_boilerplate(md: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut prev_content: Option<String> = None;
    for line in md.lines() {
        let content = line.trim();
        if !content.is_empty() {
            if prev_content.as_deref() == Some(content) {
                continue;
            }
            if BOILERPLATE_RES.iter().any(|re| re.is_match(content)) {
                prev_content = Some(content.to_string());
                continue;
            }
            prev_content = Some(content.to_string());
        }
        out.push(line);
    }
    out.join("\n")
}

fn is_h1_line(line: &str) -> bool {
    line.trim_start().starts_with("# ")
}

/// Ensure the provided h1 leads the document. Reports an SEO issue when an
/// h1 existed but was not the first block.
fn hoist_h1(md: String, h1: Option<&str>) -> (String, Option<String>) {
    let Some(h1) = h1.map(str::trim).filter(|s| !s.is_empty()) else {
        return (md, None);
    };
    let target = format!("# {h1}");

    let lines: Vec<&str> = md.lines().collect();
    let first_h1 = lines.iter().position(|l| is_h1_line(l));
    let first_nonblank = lines.iter().position(|l| !l.trim().is_empty());

    match first_h1 {
        Some(idx) if lines[idx].trim() == target && Some(idx) == first_nonblank => (md, None),
        _ => {
            let issue = first_h1.and_then(|idx| {
                (Some(idx) != first_nonblank)
                    .then(|| "h1 present but not at document start".to_string())
            });
            let kept: Vec<&str> = lines.into_iter().filter(|l| !is_h1_line(l)).collect();
            (format!("{target}\n\n{}", kept.join("\n")), issue)
        }
    }
}

fn collapse_blank_lines(md: &str) -> String {
    BLANK_RUN_RE.replace_all(md, "\n\n").trim().to_string()
}

/// Strip the marker comments and re-collapse newlines: exactly how the
/// plain variant is derived from the enhanced one.
pub fn strip_markers(enhanced: &str) -> String {
    let stripped = MARKER_RE.replace_all(enhanced, "");
    collapse_blank_lines(&stripped)
}

pub fn build_markdown(
    raw_html: &str,
    structural: &[StructuralElement],
    base: &Url,
    h1: Option<&str>,
) -> MarkdownOutput {
    let injected = inject_markers(raw_html, structural);
    let document = Html::parse_document(&injected);

    let mut walker = Walker::new(base);
    if let Some(body) = selector("body").and_then(|s| document.select(&s).next()) {
        for child in body.children() {
            walker.walk_block(child);
        }
    }

    let joined = walker.blocks.join("\n\n");
    let stripped = strip_boilerplate(&joined);
    let (hoisted, h1_issue) = hoist_h1(stripped, h1);
    let enhanced = collapse_blank_lines(&hoisted);
    let plain = strip_markers(&enhanced);

    MarkdownOutput {
        enhanced,
        plain,
        h1_issue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::detect_structural_elements;

    fn base() -> Url {
        Url::parse("https://ex.com/post").unwrap()
    }

    fn build(html: &str) -> MarkdownOutput {
        let structural = detect_structural_elements(html);
        build_markdown(html, &structural, &base(), None)
    }

    #[test]
    fn heading_hierarchy_never_skips_levels() {
        let html = "<body><h1>Top</h1><h3>Jumped</h3><h3>Stays</h3></body>";
        let md = build(html);
        assert!(md.plain.contains("# Top"));
        assert!(md.plain.contains("## Jumped"), "{}", md.plain);
        assert!(!md.plain.contains("### Jumped"));
    }

    #[test]
    fn links_resolved_absolute_and_empty_anchors_dropped() {
        let html = r#"<body><p>See <a href="/guide">the guide</a> and <a href="/ghost"></a>.</p></body>"#;
        let md = build(html);
        assert!(md.plain.contains("[the guide](https://ex.com/guide)"));
        assert!(!md.plain.contains("ghost"));
    }

    #[test]
    fn base64_images_truncated() {
        let payload = "A".repeat(100);
        let html = format!(r#"<body><img src="data:image/png;base64,{payload}" alt="chart"></body>"#);
        let md = build(&html);
        assert!(md.plain.contains("![chart](data:image/png;base64,...)"));
        assert!(!md.plain.contains(&payload));
    }

    #[test]
    fn short_base64_left_alone_and_relative_src_resolved() {
        let html = r#"<body><img src="img/photo.jpg" alt="p"><img src="data:image/gif;base64,AAAA" alt="tiny"></body>"#;
        let md = build(html);
        assert!(md.plain.contains("![p](https://ex.com/img/photo.jpg)"));
        assert!(md.plain.contains("data:image/gif;base64,AAAA"));
    }

    #[test]
    fn nav_lists_suppressed_content_lists_kept() {
        let nav_items: String = (0..10)
            .map(|i| format!(r#"<li><a href="/p{i}">Page {i}</a></li>"#))
            .collect();
        let html = format!(
            r#"<body><ul>{nav_items}</ul><ul><li>Real point one</li><li>Real point two</li></ul></body>"#
        );
        let md = build(&html);
        assert!(!md.plain.contains("Page 3"));
        assert!(md.plain.contains("- Real point one"));
    }

    #[test]
    fn marker_balance_and_strip_round_trip() {
        let html = r#"<body>
            <p>Intro text.</p>
            <div class="faq-list">
                <div class="faq-question">Q one?</div>
                <div class="faq-answer">A one.</div>
            </div>
            <div class="testimonial"><p>Loved it.</p></div>
        </body>"#;
        let md = build(html);

        for code in ["FAQ", "TESTIMONIAL"] {
            let starts = md
                .enhanced
                .matches(&format!("<!-- STRUCT:{code}:START -->"))
                .count();
            let ends = md
                .enhanced
                .matches(&format!("<!-- STRUCT:{code}:END -->"))
                .count();
            assert_eq!(starts, ends, "unbalanced {code} markers");
            assert!(starts > 0);
        }
        assert!(md.enhanced.contains("<!-- STRUCT:FAQ:Q -->"));
        assert!(md.enhanced.contains("<!-- STRUCT:FAQ:A -->"));

        // Plain is exactly enhanced minus markers plus newline collapse
        assert_eq!(md.plain, strip_markers(&md.enhanced));
        assert!(!md.plain.contains("STRUCT:"));
        assert!(md.plain.contains("Q one?"));
    }

    #[test]
    fn jsonld_faq_markers_survive_script_skipping() {
        let html = r#"<body><p>Before.</p>
            <script type="application/ld+json">{"@type":"FAQPage","mainEntity":[{"@type":"Question","name":"Q1"}]}</script>
            <p>After.</p></body>"#;
        let md = build(html);
        assert!(md.enhanced.contains("<!-- STRUCT:FAQ:START -->"));
        assert!(md.enhanced.contains("<!-- STRUCT:FAQ:END -->"));
        assert!(!md.enhanced.contains("mainEntity"), "script body must not leak");
    }

    #[test]
    fn h1_hoisting_prepends_and_replaces() {
        let html = "<body><p>Lead text.</p><h1>Wrong Title</h1></body>";
        let structural = detect_structural_elements(html);
        let md = build_markdown(html, &structural, &base(), Some("Right Title"));
        let first_line = md.plain.lines().find(|l| !l.trim().is_empty()).unwrap();
        assert_eq!(first_line, "# Right Title");
        assert!(!md.plain.contains("# Wrong Title"));
        assert!(md.h1_issue.is_some());
    }

    #[test]
    fn h1_already_leading_untouched() {
        let html = "<body><h1>Right Title</h1><p>Body.</p></body>";
        let structural = detect_structural_elements(html);
        let md = build_markdown(html, &structural, &base(), Some("Right Title"));
        assert!(md.plain.starts_with("# Right Title"));
        assert!(md.h1_issue.is_none());
        assert_eq!(md.plain.matches("# Right Title").count(), 1);
    }

    #[test]
    fn boilerplate_lines_removed() {
        let html = r#"<body>
            <p>Home > Blog > Post</p>
            <p>Posted on May 1, 2025 by Jane</p>
            <p>Real content stays.</p>
            <p>© 2025 Example Inc.</p>
        </body>"#;
        let md = build(html);
        assert!(md.plain.contains("Real content stays."));
        assert!(!md.plain.contains("Posted on"));
        assert!(!md.plain.contains("© 2025"));
        assert!(!md.plain.contains("Home >"));
    }

    #[test]
    fn duplicate_consecutive_lines_collapsed() {
        let html = "<body><p>Repeated line</p><p>Repeated line</p><p>Other</p></body>";
        let md = build(html);
        assert_eq!(md.plain.matches("Repeated line").count(), 1);
    }

    #[test]
    fn blank_runs_collapse_to_two_newlines() {
        let html = "<body><div><div><p>A</p></div></div><div></div><p>B</p></body>";
        let md = build(html);
        assert!(!md.plain.contains("\n\n\n"));
    }
}
