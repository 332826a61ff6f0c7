//! PDF link heuristics over fetched HTML.
//!
//! Candidates are ranked by how strongly they signal a PDF: an explicit
//! `download` attribute, then an `href` ending in `.pdf`, then the
//! `citation_pdf_url` meta tag publishers embed for indexers, then anchors or
//! buttons whose text, `title` or `aria-label` mentions a PDF or download.
//! Within one rank, document order is kept.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

/// Why a link was considered a PDF candidate, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkHeuristic {
    DownloadAttribute,
    PdfHref,
    CitationMeta,
    /// Supplied by a bibliographic API record rather than found on the page.
    ApiRecord,
    KeywordText,
}

/// A clickable PDF candidate on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkHandle {
    /// Absolute URL.
    pub url: String,
    /// Visible text (or attribute) the link was recognised by.
    pub label: String,
    pub heuristic: LinkHeuristic,
}

impl LinkHandle {
    pub fn new(url: impl Into<String>, label: impl Into<String>, heuristic: LinkHeuristic) -> Self {
        Self {
            url: url.into(),
            label: label.into(),
            heuristic,
        }
    }

    /// Whether the URL itself names a PDF (used to pick what the manual pass opens).
    pub fn looks_like_pdf(&self) -> bool {
        url_path_is_pdf(&self.url)
    }
}

/// Link texts that mark a PDF, most specific first.
const PDF_KEYWORDS: &[&str] = &[
    "full text pdf",
    "download pdf",
    "view pdf",
    "article pdf",
    "get pdf",
    "pdf",
];
const WEAK_KEYWORDS: &[&str] = &["full text", "download"];

static ANCHOR_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static BUTTON_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("button[formaction], button[data-href]").unwrap());
static CITATION_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="citation_pdf_url"]"#).unwrap());
static RESULT_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3.gs_rt a[href], h3 a[href], a.result__a[href]").unwrap());

/// Whether a URL's path ends in `.pdf` (query and fragment ignored).
pub fn url_path_is_pdf(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_lowercase().ends_with(".pdf")
}

/// Resolve `href` against the page URL. Script and fragment-only links yield `None`.
pub fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    let lower = href.to_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
    {
        return None;
    }
    match reqwest::Url::parse(base) {
        Ok(base) => base.join(href).ok().map(|u| u.to_string()),
        Err(_) => reqwest::Url::parse(href).ok().map(|u| u.to_string()),
    }
}

fn is_hidden(el: &ElementRef<'_>) -> bool {
    let v = el.value();
    if v.attr("hidden").is_some() || v.attr("aria-hidden") == Some("true") {
        return true;
    }
    if let Some(style) = v.attr("style") {
        let style: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        let style = style.to_lowercase();
        if style.contains("display:none") || style.contains("visibility:hidden") {
            return true;
        }
    }
    false
}

fn is_visible(el: &ElementRef<'_>) -> bool {
    !is_hidden(el)
        && !el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| is_hidden(&a))
}

fn element_label(el: &ElementRef<'_>) -> String {
    let text: String = el.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if !text.is_empty() {
        return text;
    }
    el.value()
        .attr("title")
        .or_else(|| el.value().attr("aria-label"))
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Rank of the keyword match (lower is stronger), or `None` when nothing matches.
fn keyword_rank(el: &ElementRef<'_>, label: &str) -> Option<usize> {
    let mut haystacks = vec![label.to_lowercase()];
    for attr in ["title", "aria-label"] {
        if let Some(v) = el.value().attr(attr) {
            haystacks.push(v.to_lowercase());
        }
    }
    PDF_KEYWORDS
        .iter()
        .chain(WEAK_KEYWORDS)
        .position(|kw| haystacks.iter().any(|h| h.contains(kw)))
}

/// All PDF candidates on a page, strongest first, deduplicated by URL.
pub fn find_pdf_candidates(html: &str, page_url: &str) -> Vec<LinkHandle> {
    let document = Html::parse_document(html);
    // (heuristic, keyword rank, document order, handle)
    let mut ranked: Vec<(LinkHeuristic, usize, usize, LinkHandle)> = Vec::new();
    let mut order = 0usize;

    for el in document.select(&ANCHOR_SEL) {
        order += 1;
        if !is_visible(&el) {
            continue;
        }
        let Some(url) = el.value().attr("href").and_then(|h| resolve_href(page_url, h)) else {
            continue;
        };
        let label = element_label(&el);

        let (heuristic, rank) = if el.value().attr("download").is_some() {
            (LinkHeuristic::DownloadAttribute, 0)
        } else if url_path_is_pdf(&url) {
            (LinkHeuristic::PdfHref, 0)
        } else if let Some(rank) = keyword_rank(&el, &label) {
            (LinkHeuristic::KeywordText, rank)
        } else {
            continue;
        };
        ranked.push((heuristic, rank, order, LinkHandle::new(url, label, heuristic)));
    }

    for el in document.select(&BUTTON_SEL) {
        order += 1;
        if !is_visible(&el) {
            continue;
        }
        let target = el
            .value()
            .attr("formaction")
            .or_else(|| el.value().attr("data-href"));
        let Some(url) = target.and_then(|h| resolve_href(page_url, h)) else {
            continue;
        };
        let label = element_label(&el);
        if let Some(rank) = keyword_rank(&el, &label) {
            let handle = LinkHandle::new(url, label, LinkHeuristic::KeywordText);
            ranked.push((LinkHeuristic::KeywordText, rank, order, handle));
        }
    }

    for el in document.select(&CITATION_SEL) {
        order += 1;
        if let Some(url) = el.value().attr("content").and_then(|h| resolve_href(page_url, h)) {
            let handle = LinkHandle::new(url, "citation_pdf_url", LinkHeuristic::CitationMeta);
            ranked.push((LinkHeuristic::CitationMeta, 0, order, handle));
        }
    }

    ranked.sort_by_key(|(heuristic, rank, order, _)| (*heuristic, *rank, *order));

    let mut seen = std::collections::HashSet::new();
    ranked
        .into_iter()
        .map(|(_, _, _, handle)| handle)
        .filter(|h| seen.insert(h.url.clone()))
        .collect()
}

/// The top organic result on a search results page.
pub fn first_result_link(html: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&RESULT_SEL)
        .filter(|el| is_visible(el))
        .find_map(|el| el.value().attr("href").and_then(|h| resolve_href(page_url, h)))
}
