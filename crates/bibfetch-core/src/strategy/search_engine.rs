use super::{AttemptContext, Landing, RetrievalStrategy, StrategyFuture};
use crate::links::{find_pdf_candidates, first_result_link};
use crate::{ResolutionTarget, StrategyHint};

/// Submits the query to a scholarly search engine.
///
/// Result pages often list a `[PDF]` link next to a hit; when they don't, the
/// top result is opened and searched for a PDF link instead.
pub struct SearchEngineLookup {
    /// Search URL; the encoded query is appended.
    search_url: String,
}

impl SearchEngineLookup {
    pub fn new(search_url: String) -> Self {
        Self { search_url }
    }

    pub fn query_url(&self, query: &str) -> String {
        format!("{}{}", self.search_url, urlencoding::encode(query))
    }
}

impl RetrievalStrategy for SearchEngineLookup {
    fn name(&self) -> &str {
        "Search engine"
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
            let results = ctx.visit(&self.query_url(&target.query_or_url)).await?;

            let Some(html) = results.as_text().map(str::to_string) else {
                return Ok(Landing::page(results));
            };
            if !find_pdf_candidates(&html, &results.location).is_empty() {
                return Ok(Landing::page(results));
            }

            match first_result_link(&html, &results.location) {
                Some(article) => {
                    tracing::debug!(index = ctx.index, url = %article, "opening top search result");
                    ctx.ui.status(ctx.index, format!("Opening top result {}", article));
                    let page = ctx.visit(&article).await?;
                    Ok(Landing::page(page))
                }
                None => Ok(Landing::page(results)),
            }
        })
    }
}
