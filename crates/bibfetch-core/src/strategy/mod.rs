//! Retrieval strategies and the single-attempt state machine.
//!
//! A strategy only knows how to get from a [`ResolutionTarget`] to a landing
//! page (plus any PDF links it learned on the way). Everything after that,
//! locating candidates, triggering, and waiting for the file, is shared and
//! lives in [`run_attempt`].

pub mod crossref;
pub mod doi_redirect;
pub mod search_engine;

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::challenge::ChallengeGate;
use crate::detector::{CompletionDetector, DirectoryWatcher, snapshot_paths};
use crate::error::{FetchError, SessionError};
use crate::files::write_payload;
use crate::interaction::UiHandle;
use crate::links::LinkHandle;
use crate::session::{ContentSnapshot, PageBody, RetrievalSession, TriggerOutcome};
use crate::{Config, ResolutionTarget};

pub use crossref::BibliographicApiLookup;
pub use doi_redirect::DirectDoiRedirect;
pub use search_engine::SearchEngineLookup;

/// Boxed future returned by [`RetrievalStrategy::navigate`].
pub type StrategyFuture<'a> = Pin<Box<dyn Future<Output = Result<Landing, FetchError>> + Send + 'a>>;

/// Where a strategy ended up.
#[derive(Debug, Clone)]
pub struct Landing {
    pub page: ContentSnapshot,
    /// PDF links known without looking at the page (e.g. from an API record).
    pub extra_candidates: Vec<LinkHandle>,
}

impl Landing {
    pub fn page(page: ContentSnapshot) -> Self {
        Self {
            page,
            extra_candidates: Vec::new(),
        }
    }
}

/// States of one retrieval attempt, logged as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Navigating,
    AwaitingResult,
    LocatingLink,
    Triggering,
    AwaitingFile,
    Succeeded,
    Failed,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything one attempt on one reference needs, borrowed from the coordinator.
pub struct AttemptContext<'a> {
    pub index: usize,
    pub session: &'a mut dyn RetrievalSession,
    pub gate: &'a ChallengeGate,
    pub detector: &'a CompletionDetector,
    pub watcher: &'a dyn DirectoryWatcher,
    pub ui: &'a UiHandle,
    /// Skip token for this reference.
    pub cancel: &'a CancellationToken,
    pub download_dir: &'a Path,
    pub page_timeout: Duration,
}

impl AttemptContext<'_> {
    fn enter(&self, strategy: &str, state: AttemptState) {
        tracing::debug!(index = self.index, strategy, state = %state, "attempt state");
    }

    /// Navigate without the challenge gate (API calls).
    pub async fn fetch(&mut self, url: &str) -> Result<ContentSnapshot, FetchError> {
        let timeout = self.page_timeout;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::UserSkipped),
            res = self.session.navigate(url, timeout) => res.map_err(FetchError::from),
        }
    }

    /// Navigate to a human-facing page and wait out any verification challenge.
    pub async fn visit(&mut self, url: &str) -> Result<ContentSnapshot, FetchError> {
        let page = self.fetch(url).await?;
        self.gate
            .pass(&mut *self.session, page, self.index, self.ui, self.cancel)
            .await
    }
}

/// One way of turning a target into a landing page.
pub trait RetrievalStrategy: Send + Sync {
    /// Name used in logs, progress and `disabled_strategies`.
    fn name(&self) -> &str;

    fn applies_to(&self, target: &ResolutionTarget) -> bool;

    fn navigate<'a>(
        &'a self,
        ctx: &'a mut AttemptContext<'_>,
        target: &'a ResolutionTarget,
    ) -> StrategyFuture<'a>;
}

/// The default strategy set, in the order they are tried, minus disabled ones.
///
/// Direct URLs go through the DOI/URL redirect. Free-text queries try the
/// bibliographic API first, then the search engine.
pub fn build_strategies(config: &Config) -> Vec<Box<dyn RetrievalStrategy>> {
    let all: Vec<Box<dyn RetrievalStrategy>> = vec![
        Box::new(DirectDoiRedirect),
        Box::new(BibliographicApiLookup::new(
            config.bibliographic_api_url.clone(),
            config.crossref_mailto.clone(),
        )),
        Box::new(SearchEngineLookup::new(config.search_engine_url.clone())),
    ];
    all.into_iter()
        .filter(|s| {
            let enabled = config.strategy_enabled(s.name());
            if !enabled {
                tracing::info!(strategy = s.name(), "strategy disabled by configuration");
            }
            enabled
        })
        .collect()
}

/// Try each applicable strategy in order until one produces a file.
///
/// A skip stops immediately. When every strategy fails, the last failure is
/// returned; earlier ones are logged.
pub async fn acquire(
    strategies: &[Box<dyn RetrievalStrategy>],
    ctx: &mut AttemptContext<'_>,
    target: &ResolutionTarget,
) -> Result<PathBuf, FetchError> {
    let mut last_err = None;

    for strategy in strategies.iter().filter(|s| s.applies_to(target)) {
        ctx.ui.status(ctx.index, format!("Trying {}", strategy.name()));
        match run_attempt(strategy.as_ref(), ctx, target).await {
            Ok(path) => return Ok(path),
            Err(FetchError::UserSkipped) => return Err(FetchError::UserSkipped),
            Err(e) => {
                tracing::info!(index = ctx.index, strategy = strategy.name(), error = %e, "strategy failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or(FetchError::NoCandidateFound))
}

/// Run one strategy through the attempt state machine.
pub async fn run_attempt(
    strategy: &dyn RetrievalStrategy,
    ctx: &mut AttemptContext<'_>,
    target: &ResolutionTarget,
) -> Result<PathBuf, FetchError> {
    let name = strategy.name().to_string();
    ctx.enter(&name, AttemptState::Idle);

    let result = attempt_inner(strategy, &name, ctx, target).await;
    match &result {
        Ok(path) => {
            ctx.enter(&name, AttemptState::Succeeded);
            tracing::info!(index = ctx.index, path = %path.display(), "PDF saved");
        }
        Err(_) => ctx.enter(&name, AttemptState::Failed),
    }
    result
}

async fn attempt_inner(
    strategy: &dyn RetrievalStrategy,
    name: &str,
    ctx: &mut AttemptContext<'_>,
    target: &ResolutionTarget,
) -> Result<PathBuf, FetchError> {
    ctx.enter(name, AttemptState::Navigating);
    let landing = strategy.navigate(ctx, target).await?;
    ctx.enter(name, AttemptState::AwaitingResult);

    if let PageBody::Pdf(bytes) = &landing.page.body {
        ctx.enter(name, AttemptState::Triggering);
        let file_name = landing
            .page
            .suggested_filename
            .clone()
            .unwrap_or_else(|| crate::files::derive_filename(&landing.page.location, None));
        return save_payload(ctx.download_dir, &file_name, bytes);
    }

    ctx.enter(name, AttemptState::LocatingLink);
    let mut candidates = ctx.session.locate_pdf_candidates(&landing.page);
    candidates.extend(landing.extra_candidates);
    candidates.sort_by_key(|c| c.heuristic);
    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.url.clone()));

    if candidates.is_empty() {
        return Err(FetchError::NoCandidateFound);
    }
    tracing::debug!(index = ctx.index, count = candidates.len(), "PDF candidates found");

    let mut last_trigger_error = String::new();
    for link in &candidates {
        if ctx.cancel.is_cancelled() {
            return Err(FetchError::UserSkipped);
        }
        ctx.enter(name, AttemptState::Triggering);
        ctx.ui.status(ctx.index, format!("Downloading from {}", link.url));

        let before = snapshot_paths(ctx.watcher, ctx.download_dir)?;
        let outcome = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(FetchError::UserSkipped),
            res = ctx.session.trigger(link, ctx.download_dir) => res,
        };

        match outcome {
            Ok(TriggerOutcome::Payload { bytes, filename }) => {
                return save_payload(ctx.download_dir, &filename, &bytes);
            }
            Ok(TriggerOutcome::Started) => {
                ctx.enter(name, AttemptState::AwaitingFile);
                return ctx
                    .detector
                    .wait_for_file(ctx.watcher, ctx.download_dir, &before, ctx.cancel)
                    .await;
            }
            Err(e) => {
                tracing::warn!(index = ctx.index, url = %link.url, error = %e, "trigger failed, trying next candidate");
                last_trigger_error = match e {
                    SessionError::Trigger(msg) => msg,
                    other => other.to_string(),
                };
            }
        }
    }

    Err(FetchError::TriggerFailed(last_trigger_error))
}

fn save_payload(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, FetchError> {
    if bytes.is_empty() {
        return Err(FetchError::EmptyDownload);
    }
    Ok(write_payload(dir, file_name, bytes)?)
}
