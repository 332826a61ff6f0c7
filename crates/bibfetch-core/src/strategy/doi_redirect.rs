use super::{AttemptContext, Landing, RetrievalStrategy, StrategyFuture};
use crate::{ResolutionTarget, StrategyHint};

/// Opens a direct target (`https://doi.org/...` or an explicit URL) and lets
/// the resolver redirect to the publisher's landing page.
pub struct DirectDoiRedirect;

impl RetrievalStrategy for DirectDoiRedirect {
    fn name(&self) -> &str {
        "DOI redirect"
    }

    fn applies_to(&self, target: &ResolutionTarget) -> bool {
        target.strategy_hint == StrategyHint::DirectUrl
    }

    fn navigate<'a>(
        &'a self,
        ctx: &'a mut AttemptContext<'_>,
        target: &'a ResolutionTarget,
    ) -> StrategyFuture<'a> {
        Box::pin(async move {
            let page = ctx.visit(&target.query_or_url).await?;
            if page.location != target.query_or_url {
                tracing::debug!(from = %target.query_or_url, to = %page.location, "redirected");
            }
            Ok(Landing::page(page))
        })
    }
}
