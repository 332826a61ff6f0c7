//! Turning a reference into something a retrieval strategy can act on.
//!
//! A DOI always wins, then an explicit URL. Everything else becomes a
//! free-text query assembled from the normalized text plus whatever
//! structured hints the heuristics below can pull out. The heuristics are
//! best effort: a wrong guess only makes the query noisier.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::identifiers::{extract_doi, extract_page_range, extract_url, extract_year};
use crate::{ReferenceRecord, ResolutionTarget, StrategyHint};

/// Build the resolution target for a reference. Never fails.
pub fn build_target(record: &ReferenceRecord) -> ResolutionTarget {
    let text = source_text(record);
    let derived_title = derive_title(&text);

    if let Some(doi) = extract_doi(&text) {
        return ResolutionTarget {
            query_or_url: format!("https://doi.org/{}", doi),
            strategy_hint: StrategyHint::DirectUrl,
            derived_title,
        };
    }

    if let Some(url) = extract_url(&text) {
        return ResolutionTarget {
            query_or_url: url,
            strategy_hint: StrategyHint::DirectUrl,
            derived_title,
        };
    }

    ResolutionTarget {
        query_or_url: build_query(&text, derived_title.as_deref()),
        strategy_hint: StrategyHint::SearchQuery,
        derived_title,
    }
}

/// Stripped text with whitespace collapsed, falling back to the raw text.
fn source_text(record: &ReferenceRecord) -> String {
    let stripped = collapse_whitespace(&record.stripped_text);
    if stripped.is_empty() {
        collapse_whitespace(&record.raw_text)
    } else {
        stripped
    }
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn build_query(text: &str, title: Option<&str>) -> String {
    let mut parts: Vec<String> = vec![text.to_string()];
    parts.extend(title.map(str::to_string));
    parts.extend(journal_fragment(text));
    parts.extend(extract_year(text));
    parts.extend(extract_page_range(text));
    parts.extend(first_author_surname(text));

    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::with_capacity(parts.len());
    for part in parts {
        let part = part.trim().to_string();
        if part.is_empty() {
            continue;
        }
        if seen.insert(part.to_lowercase()) {
            unique.push(part);
        }
    }
    unique.join(" ")
}

/// Matches a bare author token such as `Surname, F.` or `Surname, F. M.`
static AUTHOR_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\p{Lu}[\p{L}'\-]+,\s*(?:\p{Lu}\.\s*)+$").unwrap());

fn acceptable_title(candidate: &str) -> Option<String> {
    let candidate = candidate
        .trim()
        .trim_end_matches(['.', ',', ';', ':'])
        .trim();
    if candidate.chars().count() < 8 || candidate.contains(',') {
        return None;
    }
    if AUTHOR_TOKEN_RE.is_match(candidate) {
        return None;
    }
    Some(candidate.to_string())
}

/// Best-effort title guess.
///
/// Tries, in order: a quoted string, the sentence after an APA-style
/// `(2020).`, then the first sentence after the author block (skipping
/// segments that are only initials).
pub fn derive_title(text: &str) -> Option<String> {
    static QUOTED_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"["“”]([^"“”]{8,})["“”]"#).unwrap());
    static APA_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\((?:19|20)\d{2}[a-z]?\)\.\s*([^.?!]+)").unwrap());

    if let Some(caps) = QUOTED_RE.captures(text)
        && let Some(title) = acceptable_title(&caps[1])
    {
        return Some(title);
    }

    if let Some(caps) = APA_RE.captures(text) {
        return acceptable_title(&caps[1]);
    }

    text.split(". ")
        .skip(1)
        .map(str::trim)
        .find(|seg| seg.chars().count() > 3)
        .and_then(acceptable_title)
}

/// The segment that ends right before the first year: `Nature Methods` in
/// `Title. Nature Methods, 2020;1:2`.
///
/// Separators directly in front of the year are skipped, then the fragment
/// runs back to the previous comma, semicolon or sentence break.
pub fn journal_fragment(text: &str) -> Option<String> {
    static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").unwrap());

    let year = YEAR_RE.find(text)?;
    let before = text[..year.start()].trim_end_matches(|c: char| !c.is_alphanumeric());
    let cut = [
        before.rfind(',').map(|i| i + 1),
        before.rfind(';').map(|i| i + 1),
        before.rfind(". ").map(|i| i + 2),
    ]
    .into_iter()
    .flatten()
    .max()?;
    let fragment = before[cut..]
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .trim();
    if fragment.chars().count() >= 3 && fragment.chars().any(char::is_alphabetic) {
        Some(fragment.to_string())
    } else {
        None
    }
}

/// Leading surname of the first author (`Smith` in `Smith J.` or `Smith, J.`).
pub fn first_author_surname(text: &str) -> Option<String> {
    static SURNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\p{Lu}[\p{L}'\-]+)[\s,]").unwrap());
    SURNAME_RE
        .captures(text.trim_start())
        .map(|caps| caps[1].to_string())
}
