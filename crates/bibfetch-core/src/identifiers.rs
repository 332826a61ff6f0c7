use once_cell::sync::Lazy;
use regex::Regex;

/// Strip trailing punctuation and unbalanced closing brackets from a DOI.
fn clean_doi(doi: &str) -> String {
    let mut doi = doi.trim_end_matches(['.', ',', ';', ':']);

    for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
        loop {
            if doi.ends_with(close) && doi.matches(close).count() > doi.matches(open).count() {
                doi = &doi[..doi.len() - 1];
                doi = doi.trim_end_matches(['.', ',', ';', ':']);
            } else {
                break;
            }
        }
    }

    doi.to_string()
}

/// Extract a DOI from reference text.
///
/// Handles formats like:
/// - `10.1234/example`
/// - `doi:10.1234/example`
/// - `https://doi.org/10.1234/example`
/// - `http://dx.doi.org/10.1234/example`
///
/// DOIs containing parentheses (e.g. `10.1016/0021-9681(87)90171-8`) keep
/// their balanced brackets.
pub fn extract_doi(text: &str) -> Option<String> {
    // Priority 1: resolver URL form (most reliable)
    static URL_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)https?://(?:dx\.)?doi\.org/(10\.\d+(?:\.\d+)*/[^\s\]>}",;]+)"#).unwrap()
    });
    if let Some(caps) = URL_RE.captures(text) {
        let doi = urlencoding::decode(&caps[1])
            .map(|d| d.into_owned())
            .unwrap_or_else(|_| caps[1].to_string());
        return Some(clean_doi(&doi));
    }

    // Priority 2: bare DOI, optionally prefixed with "doi:"
    static DOI_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"\b10\.\d+(?:\.\d+)*/[^\s\]>}",;]+"#).unwrap());
    DOI_RE.find(text).map(|m| clean_doi(m.as_str()))
}

/// Extract the first http(s) URL from reference text, trimmed of trailing punctuation.
pub fn extract_url(text: &str) -> Option<String> {
    static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)https?://[^\s)<>\]"]+"#).unwrap());
    URL_RE
        .find(text)
        .map(|m| trim_url(m.as_str()))
        .filter(|u| u.len() > "https://".len())
}

/// Trim punctuation that belongs to the surrounding sentence rather than the URL.
pub fn trim_url(url: &str) -> String {
    url.trim()
        .trim_end_matches(['.', ',', ';', ':', '\'', '"'])
        .to_string()
}

/// Remove URLs and DOIs so numeric heuristics don't match inside them.
pub fn strip_identifiers(text: &str) -> String {
    static ID_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)(?:https?://[^\s)<>\]"]+|(?:doi:\s*)?\b10\.\d+(?:\.\d+)*/\S+)"#).unwrap()
    });
    ID_RE.replace_all(text, " ").into_owned()
}

/// First plausible publication year (1900-2099) in the text.
pub fn extract_year(text: &str) -> Option<String> {
    static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})[a-z]?\b").unwrap());
    let cleaned = strip_identifiers(text);
    YEAR_RE
        .captures(&cleaned)
        .map(|caps| caps[1].to_string())
}

/// Page range normalized to `start-end` (en/em dashes and spaces removed).
///
/// Ranges introduced by `pp.`/`p.` or a volume colon (`12:1-5`) win over bare
/// number pairs; year spans like `2019-2020` are ignored.
pub fn extract_page_range(text: &str) -> Option<String> {
    static MARKED_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?:\bpp?\.\s*|:\s*)([A-Za-z]?\d+)\s*[-–—]+\s*([A-Za-z]?\d+)\b").unwrap()
    });
    static BARE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b(\d{1,5})\s*[-–—]+\s*(\d{1,5})\b").unwrap());

    let cleaned = strip_identifiers(text);
    if let Some(caps) = MARKED_RE.captures(&cleaned) {
        return Some(format!("{}-{}", &caps[1], &caps[2]));
    }
    BARE_RE
        .captures_iter(&cleaned)
        .find(|caps| !(is_year(&caps[1]) && is_year(&caps[2])))
        .map(|caps| format!("{}-{}", &caps[1], &caps[2]))
}

fn is_year(s: &str) -> bool {
    s.len() == 4 && (s.starts_with("19") || s.starts_with("20"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doi_from_resolver_url() {
        assert_eq!(
            extract_doi("Smith J. Title. 2020. https://doi.org/10.1/abc."),
            Some("10.1/abc".into())
        );
        assert_eq!(
            extract_doi("see http://dx.doi.org/10.1145/3319535.3354200"),
            Some("10.1145/3319535.3354200".into())
        );
    }

    #[test]
    fn bare_doi_with_prefix() {
        assert_eq!(
            extract_doi("J Sci. 2020;12:1-5. doi:10.1038/nature12373;"),
            Some("10.1038/nature12373".into())
        );
    }

    #[test]
    fn doi_keeps_balanced_parentheses() {
        assert_eq!(
            extract_doi("(10.1016/0021-9681(87)90171-8)"),
            Some("10.1016/0021-9681(87)90171-8".into())
        );
    }

    #[test]
    fn no_doi() {
        assert_eq!(extract_doi("Smith J. A title without identifiers. 2020."), None);
    }

    #[test]
    fn url_trimmed() {
        assert_eq!(
            extract_url("Available at https://example.org/paper.pdf. Accessed 2021."),
            Some("https://example.org/paper.pdf".into())
        );
        assert_eq!(
            extract_url("(https://example.org/x)"),
            Some("https://example.org/x".into())
        );
    }

    #[test]
    fn year_ignores_doi_digits() {
        assert_eq!(extract_year("10.2019/abc Smith 2018; 4:1-9"), Some("2018".into()));
    }

    #[test]
    fn page_range_forms() {
        assert_eq!(extract_page_range("J Sci. 2020;12:1-5."), Some("1-5".into()));
        assert_eq!(extract_page_range("Proc. X, pp. 100 – 112, 2019"), Some("100-112".into()));
        assert_eq!(extract_page_range("data from 2019-2020 only"), None);
    }
}
