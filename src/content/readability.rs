//! Main-content extraction.
//!
//! Paragraph-like elements are scored by text length and comma count, and the
//! score bubbles up to their ancestors. The best ancestor (after a link-density
//! penalty) becomes the article body, joined by siblings that look like they
//! belong to it. The result is re-serialised through a tag whitelist so the
//! stored HTML never carries scripts, handlers or relative links.

use super::document::{element_text, Document, ExtractError};
use super::types::{ReadableArticle, UNTITLED};
use crate::cache::{get_json, set_json, CacheError, CacheKind, CacheStore};
use crate::config::ReadabilityConfig;
use crate::util::{clean_text, collapse_whitespace, truncate_chars};
use scraper::{ElementRef, Node};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

// ============================================================================
// Heuristic Tables
// ============================================================================

/// Elements dropped together with their subtree.
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "aside", "footer", "header", "form",
    "iframe", "button", "input", "select", "textarea", "svg", "canvas", "object", "embed",
    "link", "meta", "dialog",
];

/// Elements whose text feeds the scoring pass.
const SCORED_TAGS: &[&str] = &["p", "pre", "td"];

/// Elements re-emitted with their tag. Anything else is unwrapped.
const KEPT_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "dl", "dt", "dd", "blockquote",
    "pre", "code", "em", "strong", "b", "i", "u", "s", "q", "cite", "abbr", "mark", "small",
    "sub", "sup", "del", "ins", "time", "a", "img", "figure", "figcaption", "table", "caption",
    "thead", "tbody", "tfoot", "tr", "th", "td", "br", "hr",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// Class/id fragments typical of navigation, ads and comment threads.
const UNLIKELY_NAMES: &[&str] = &[
    "-ad-", "ad-break", "agegate", "banner", "breadcrumbs", "combx", "comment", "community",
    "cover-wrap", "disqus", "extra", "gdpr", "legends", "menu", "newsletter", "pager",
    "pagination", "popup", "related", "remark", "replies", "rss", "share", "shoutbox",
    "sidebar", "skyscraper", "social", "sponsor", "subscribe", "supplemental",
];

/// Fragments that keep an element even when it also matches [`UNLIKELY_NAMES`].
const MAYBE_NAMES: &[&str] = &["and", "article", "body", "column", "content", "main", "shadow"];

const POSITIVE_NAMES: &[&str] = &[
    "article", "blog", "body", "content", "entry", "hentry", "h-entry", "main", "page", "post",
    "story", "text",
];

const NEGATIVE_NAMES: &[&str] = &[
    "-ad-", "banner", "byline", "combx", "comment", "contact", "foot", "footnote", "gdpr",
    "hidden", "masthead", "media", "meta", "outbrain", "promo", "related", "scroll", "share",
    "shopping", "shoutbox", "sidebar", "skyscraper", "sponsor", "tags", "tool", "widget",
];

/// Separators between an article title and the site name in `<title>`.
const TITLE_SEPARATORS: &[&str] = &[" | ", " - ", " – ", " — ", " :: ", " » ", " / "];

/// Paragraphs shorter than this are ignored when scoring.
const MIN_PARAGRAPH_CHARS: usize = 25;

/// Ancestor levels that receive a share of a paragraph's score.
const SCORE_DEPTH: usize = 3;

const MAX_BYLINE_CHARS: usize = 100;

// ============================================================================
// Element Classification
// ============================================================================

fn ancestors<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    (*el).ancestors().filter_map(ElementRef::wrap)
}

fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    (*el).children().filter_map(ElementRef::wrap)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn class_and_id(el: ElementRef<'_>) -> String {
    let attrs = el.value();
    let mut names = String::new();
    if let Some(class) = attrs.attr("class") {
        names.push_str(class);
    }
    if let Some(id) = attrs.attr("id") {
        names.push(' ');
        names.push_str(id);
    }
    names.to_ascii_lowercase()
}

fn is_unlikely(el: ElementRef<'_>) -> bool {
    if matches!(el.value().name(), "html" | "body" | "article" | "main") {
        return false;
    }
    let names = class_and_id(el);
    contains_any(&names, UNLIKELY_NAMES) && !contains_any(&names, MAYBE_NAMES)
}

fn is_hidden(el: ElementRef<'_>) -> bool {
    let attrs = el.value();
    if attrs.attr("hidden").is_some() || attrs.attr("aria-hidden") == Some("true") {
        return true;
    }
    attrs.attr("style").is_some_and(|style| {
        let style: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        style.contains("display:none") || style.contains("visibility:hidden")
    })
}

fn is_discarded(el: ElementRef<'_>) -> bool {
    STRIPPED_TAGS.contains(&el.value().name()) || is_hidden(el) || is_unlikely(el)
}

fn in_discarded_subtree(el: ElementRef<'_>) -> bool {
    is_discarded(el) || ancestors(el).any(is_discarded)
}

/// Share of an element's text that sits inside links, in `0.0..=1.0`.
fn link_density(el: ElementRef<'_>) -> f64 {
    let total = element_text(el).chars().count();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = (*el)
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "a")
        .map(|a| element_text(a).chars().count())
        .sum();
    (linked as f64 / total as f64).min(1.0)
}

fn class_weight(el: ElementRef<'_>) -> f64 {
    let attrs = el.value();
    let mut weight = 0.0;
    for value in [attrs.attr("class"), attrs.attr("id")].into_iter().flatten() {
        let value = value.to_ascii_lowercase();
        if contains_any(&value, NEGATIVE_NAMES) {
            weight -= 25.0;
        }
        if contains_any(&value, POSITIVE_NAMES) {
            weight += 25.0;
        }
    }
    weight
}

fn initial_score(el: ElementRef<'_>) -> f64 {
    let base = match el.value().name() {
        "div" | "article" => 5.0,
        "pre" | "td" | "blockquote" => 3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" => -5.0,
        _ => 0.0,
    };
    base + class_weight(el)
}

// ============================================================================
// Scoring
// ============================================================================

struct Candidate<'a> {
    element: ElementRef<'a>,
    score: f64,
}

fn score_candidates(body: ElementRef<'_>) -> Vec<Candidate<'_>> {
    let mut candidates: Vec<Candidate<'_>> = Vec::new();
    let mut slots = HashMap::new();

    for el in (*body).descendants().filter_map(ElementRef::wrap) {
        if !SCORED_TAGS.contains(&el.value().name()) || in_discarded_subtree(el) {
            continue;
        }

        let text = element_text(el);
        let len = text.chars().count();
        if len < MIN_PARAGRAPH_CHARS {
            continue;
        }
        let score = 1.0 + text.matches(',').count() as f64 + (len / 100).min(3) as f64;

        let lineage = ancestors(el)
            .take_while(|a| a.value().name() != "html")
            .take(SCORE_DEPTH);
        for (level, ancestor) in lineage.enumerate() {
            let divider = match level {
                0 => 1.0,
                1 => 2.0,
                n => n as f64 * 3.0,
            };
            let slot = *slots.entry((*ancestor).id()).or_insert_with(|| {
                candidates.push(Candidate {
                    element: ancestor,
                    score: initial_score(ancestor),
                });
                candidates.len() - 1
            });
            candidates[slot].score += score / divider;
        }
    }

    for candidate in &mut candidates {
        candidate.score *= 1.0 - link_density(candidate.element);
    }
    candidates
}

/// The top candidate plus any siblings that appear to continue the article.
fn gather_content<'a>(top: &Candidate<'a>, candidates: &[Candidate<'a>]) -> Vec<ElementRef<'a>> {
    let Some(parent) = (*top.element).parent().and_then(ElementRef::wrap) else {
        return vec![top.element];
    };

    let threshold = (top.score * 0.2).max(10.0);
    let scores: HashMap<_, f64> = candidates
        .iter()
        .map(|c| ((*c.element).id(), c.score))
        .collect();
    let top_id = (*top.element).id();

    child_elements(parent)
        .filter(|sibling| {
            let id = (**sibling).id();
            if id == top_id {
                return true;
            }
            if is_discarded(*sibling) {
                return false;
            }
            if scores.get(&id).is_some_and(|score| *score >= threshold) {
                return true;
            }
            if sibling.value().name() != "p" {
                return false;
            }
            let text = element_text(*sibling);
            let len = text.chars().count();
            let density = link_density(*sibling);
            (len > 80 && density < 0.25) || (len > 0 && density == 0.0 && text.ends_with('.'))
        })
        .collect()
}

// ============================================================================
// Rendering
// ============================================================================

/// Serialises the kept subtree through the tag whitelist.
struct Renderer<'u> {
    base: Option<&'u Url>,
    html: String,
    text: String,
    first_paragraph: Option<String>,
}

impl<'u> Renderer<'u> {
    fn new(base: Option<&'u Url>) -> Self {
        Self {
            base,
            html: String::new(),
            text: String::new(),
            first_paragraph: None,
        }
    }

    fn children(&mut self, el: ElementRef<'_>) {
        for child in (*el).children() {
            match child.value() {
                Node::Text(text) => {
                    push_escaped(&mut self.html, text, false);
                    self.text.push_str(text);
                }
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        if is_discarded(el) {
            return;
        }
        let name = el.value().name();
        if !KEPT_TAGS.contains(&name) {
            self.text.push(' ');
            self.children(el);
            self.text.push(' ');
            return;
        }
        // Link farms inside the article (tag clouds, "more stories")
        if matches!(name, "ul" | "ol" | "dl" | "table") && link_density(el) > 0.5 {
            return;
        }

        let attrs = el.value();
        let mut rendered_attrs = String::new();
        match name {
            "a" => {
                if let Some(href) = attrs.attr("href").and_then(|h| self.absolute(h)) {
                    push_attr(&mut rendered_attrs, "href", &href);
                }
            }
            "img" => {
                let Some(src) = attrs
                    .attr("src")
                    .or_else(|| attrs.attr("data-src"))
                    .and_then(|s| self.absolute(s))
                else {
                    return;
                };
                push_attr(&mut rendered_attrs, "src", &src);
                if let Some(alt) = attrs.attr("alt") {
                    push_attr(&mut rendered_attrs, "alt", alt);
                }
            }
            "td" | "th" => {
                for span in ["colspan", "rowspan"] {
                    if let Some(value) = attrs
                        .attr(span)
                        .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
                    {
                        push_attr(&mut rendered_attrs, span, value);
                    }
                }
            }
            "time" => {
                if let Some(datetime) = attrs.attr("datetime") {
                    push_attr(&mut rendered_attrs, "datetime", datetime);
                }
            }
            _ => {}
        }

        self.html.push('<');
        self.html.push_str(name);
        self.html.push_str(&rendered_attrs);
        self.html.push('>');
        if VOID_TAGS.contains(&name) {
            return;
        }

        self.text.push(' ');
        let start = self.text.len();
        self.children(el);
        if name == "p" && self.first_paragraph.is_none() {
            let paragraph = collapse_whitespace(&self.text[start..]);
            if paragraph.chars().count() >= MIN_PARAGRAPH_CHARS {
                self.first_paragraph = Some(paragraph);
            }
        }
        self.text.push(' ');

        self.html.push_str("</");
        self.html.push_str(name);
        self.html.push('>');
    }

    /// Resolves against the page URL. Only http(s) targets survive.
    fn absolute(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            return None;
        }
        let resolved = match self.base {
            Some(base) => base.join(raw).ok()?,
            None => Url::parse(raw).ok()?,
        };
        matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
    }
}

fn push_escaped(out: &mut String, text: &str, in_attr: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attr => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    push_escaped(out, value, true);
    out.push('"');
}

// ============================================================================
// Title, Byline, Excerpt
// ============================================================================

/// Drops a trailing " | Site Name" when the remaining head is a plausible title.
pub(crate) fn strip_site_suffix(title: &str) -> &str {
    for separator in TITLE_SEPARATORS {
        if let Some(idx) = title.rfind(separator) {
            let head = title[..idx].trim();
            if head.split_whitespace().count() >= 3 {
                return head;
            }
        }
    }
    title
}

fn article_title(doc: &Document) -> Option<String> {
    let from_title_tag = doc
        .first("title")
        .and_then(|t| clean_text(&element_text(t)))
        .map(|t| strip_site_suffix(&t).to_owned());
    from_title_tag.or_else(|| doc.first("h1").and_then(|h| clean_text(&element_text(h))))
}

fn byline(doc: &Document, meta: &HashMap<String, String>) -> Option<String> {
    if let Some(author) = meta.get("author").filter(|a| !a.starts_with("http")) {
        return Some(author.clone());
    }
    let body = doc.body();
    (*body)
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| !in_discarded_subtree(*el))
        .find_map(|el| {
            let attrs = el.value();
            let marked = attrs.attr("rel") == Some("author")
                || attrs.attr("itemprop").is_some_and(|p| p.contains("author"))
                || class_and_id(el).contains("byline");
            if !marked {
                return None;
            }
            clean_text(&element_text(el)).filter(|t| t.chars().count() <= MAX_BYLINE_CHARS)
        })
}

fn base_url(doc: &Document, link: &str) -> Option<Url> {
    let page = Url::parse(link.trim()).ok()?;
    match doc.first("base").and_then(|b| b.value().attr("href")) {
        Some(href) => Some(page.join(href.trim()).unwrap_or(page)),
        None => Some(page),
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Distils the main content of `doc`.
///
/// Returns `None` when no block holds at least
/// [`ReadabilityConfig::min_text_length`] characters of text.
pub fn extract_readable(
    doc: &Document,
    link: &str,
    config: &ReadabilityConfig,
) -> Option<ReadableArticle> {
    let base = base_url(doc, link);
    let candidates = score_candidates(doc.body());
    let top = candidates
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))?;

    let mut renderer = Renderer::new(base.as_ref());
    for block in gather_content(top, &candidates) {
        renderer.element(block);
    }

    let text = collapse_whitespace(&renderer.text);
    let length = text.chars().count();
    if length < config.min_text_length {
        tracing::debug!(
            link = %link,
            length,
            min = config.min_text_length,
            "Main content too short to be an article"
        );
        return None;
    }

    let meta = doc.meta_map();
    let excerpt = ["og:description", "description", "twitter:description"]
        .iter()
        .find_map(|key| meta.get(*key).cloned())
        .or(renderer.first_paragraph)
        .map(|e| truncate_chars(&e, config.max_excerpt_chars).into_owned());

    Some(ReadableArticle {
        title: article_title(doc).unwrap_or_else(|| UNTITLED.to_owned()),
        content: format!("<div>{}</div>", renderer.html),
        excerpt,
        byline: byline(doc, &meta),
        length,
    })
}

// ============================================================================
// Cached Service
// ============================================================================

/// Readability extraction backed by the readable cache.
#[derive(Clone)]
pub struct ReadableArticleService {
    cache: Arc<dyn CacheStore>,
    config: ReadabilityConfig,
}

impl ReadableArticleService {
    pub fn new(cache: Arc<dyn CacheStore>, config: ReadabilityConfig) -> Self {
        Self { cache, config }
    }

    /// Cached rendition for `link`. Cache read failures count as a miss.
    pub async fn cached_readable_article(&self, link: &str) -> Option<ReadableArticle> {
        match get_json(self.cache.as_ref(), CacheKind::Readable, link).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(link = %link, error = %e, "Readable cache read failed");
                None
            }
        }
    }

    /// Runs the heuristic on an already-parsed document, bypassing the cache.
    pub fn extract(&self, doc: &Document, link: &str) -> Option<ReadableArticle> {
        extract_readable(doc, link, &self.config)
    }

    /// Cached rendition if present, otherwise a fresh extraction from `body`.
    ///
    /// `Ok(None)` means the page parsed but has no recognisable article.
    pub async fn retrieve_readable_article(
        &self,
        link: &str,
        body: &[u8],
    ) -> Result<Option<ReadableArticle>, ExtractError> {
        if let Some(hit) = self.cached_readable_article(link).await {
            tracing::debug!(link = %link, "Readable cache hit");
            return Ok(Some(hit));
        }
        let doc = Document::parse(body)?;
        Ok(self.extract(&doc, link))
    }

    /// Stores `article` so later readers find it under `link`.
    pub async fn create_readable_article_cache(
        &self,
        link: &str,
        article: &ReadableArticle,
    ) -> Result<(), CacheError> {
        set_json(self.cache.as_ref(), CacheKind::Readable, link, article).await
    }
}
