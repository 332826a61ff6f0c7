use unicode_normalization::UnicodeNormalization;

use super::{AttemptContext, Landing, RetrievalStrategy, StrategyFuture};
use crate::error::FetchError;
use crate::links::{LinkHandle, LinkHeuristic, url_path_is_pdf};
use crate::session::ContentSnapshot;
use crate::{ResolutionTarget, StrategyHint};

/// Looks a free-text reference up in a CrossRef-compatible works API, then
/// opens the matched DOI. PDF links listed in the record become extra
/// candidates.
pub struct BibliographicApiLookup {
    base_url: String,
    mailto: Option<String>,
}

impl BibliographicApiLookup {
    pub fn new(base_url: String, mailto: Option<String>) -> Self {
        Self { base_url, mailto }
    }

    pub fn query_url(&self, query: &str) -> String {
        let mut url = format!(
            "{}?query.bibliographic={}&rows=5",
            self.base_url,
            urlencoding::encode(query)
        );
        if let Some(ref email) = self.mailto {
            url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
        }
        url
    }
}

fn normalize_title(title: &str) -> String {
    title
        .nfkd()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn titles_match(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_title(a), normalize_title(b));
    if a.is_empty() || b.is_empty() {
        return false;
    }
    rapidfuzz::fuzz::ratio(a.chars(), b.chars()) >= 0.90
}

/// The matched record's DOI and the PDF links it lists.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkMatch {
    doi: String,
    pdf_links: Vec<String>,
}

/// Pick the record for `title` from a works response.
///
/// With a derived title the first fuzzy title match wins. Without one, the
/// top-ranked record is trusted.
fn pick_work(data: &serde_json::Value, title: Option<&str>) -> Option<WorkMatch> {
    let items = data["message"]["items"].as_array()?;

    let item = match title {
        Some(title) => items.iter().find(|item| {
            item["title"]
                .as_array()
                .and_then(|a| a.first())
                .and_then(|v| v.as_str())
                .is_some_and(|found| titles_match(title, found))
        })?,
        None => items.first()?,
    };

    let doi = item["DOI"].as_str()?.to_string();
    let pdf_links = item["link"]
        .as_array()
        .map(|links| {
            links
                .iter()
                .filter_map(|l| {
                    let url = l["URL"].as_str()?;
                    let is_pdf = l["content-type"]
                        .as_str()
                        .is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"))
                        || url_path_is_pdf(url);
                    is_pdf.then(|| url.to_string())
                })
                .collect()
        })
        .unwrap_or_default();

    Some(WorkMatch { doi, pdf_links })
}

impl RetrievalStrategy for BibliographicApiLookup {
    fn name(&self) -> &str {
        "CrossRef"
    }

    fn applies_to(&self, target: &ResolutionTarget) -> bool {
        target.strategy_hint == StrategyHint::SearchQuery
    }

    fn navigate<'a>(
        &'a self,
        ctx: &'a mut AttemptContext<'_>,
        target: &'a ResolutionTarget,
    ) -> StrategyFuture<'a> {
        Box::pin(async move {
            let api_url = self.query_url(&target.query_or_url);
            let response = ctx.fetch(&api_url).await?;

            if response.status == 429 {
                return Err(FetchError::NavigationFailed("Rate limited (429)".into()));
            }
            if !(200..300).contains(&response.status) {
                return Err(FetchError::NavigationFailed(format!("HTTP {}", response.status)));
            }
            let data: serde_json::Value = response
                .as_text()
                .and_then(|body| serde_json::from_str(body).ok())
                .ok_or_else(|| {
                    FetchError::NavigationFailed("bibliographic API returned an unreadable response".into())
                })?;

            let Some(work) = pick_work(&data, target.derived_title.as_deref()) else {
                tracing::debug!(index = ctx.index, "no matching bibliographic record");
                return Err(FetchError::NoCandidateFound);
            };
            tracing::debug!(index = ctx.index, doi = %work.doi, links = work.pdf_links.len(), "bibliographic record matched");
            ctx.ui.status(ctx.index, format!("Matched DOI {}", work.doi));

            let extra_candidates: Vec<LinkHandle> = work
                .pdf_links
                .iter()
                .map(|url| LinkHandle::new(url.as_str(), "bibliographic record", LinkHeuristic::ApiRecord))
                .collect();

            let doi_url = format!("https://doi.org/{}", work.doi);
            let page = match ctx.visit(&doi_url).await {
                Ok(page) => page,
                // The record's own links can still be tried without the landing page.
                Err(e) if !extra_candidates.is_empty() && e != FetchError::UserSkipped => {
                    tracing::debug!(index = ctx.index, error = %e, "landing page failed, using record links");
                    ContentSnapshot::text(doi_url, "")
                }
                Err(e) => return Err(e),
            };

            Ok(Landing {
                page,
                extra_candidates,
            })
        })
    }
}
