//! The three-phase run: first pass, one automated retry, optional manual fallback.
//!
//! Every reference owns one pre-indexed result slot. Phases only ever fill or
//! replace slots of unique references; duplicates inherit their original's
//! slot once all phases are done.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::challenge::ChallengeGate;
use crate::dedup::DedupPlan;
use crate::detector::{CompletionDetector, DirectoryWatcher, FsWatcher, snapshot_paths};
use crate::error::FetchError;
use crate::files::{move_and_rename, safe_slug};
use crate::interaction::UiHandle;
use crate::manual::{LinkOpener, SystemOpener};
use crate::parser::parse_references;
use crate::query::build_target;
use crate::report;
use crate::session::{RetrievalSession, SessionProvider};
use crate::strategy::{AttemptContext, RetrievalStrategy, acquire, build_strategies};
use crate::{
    Config, DownloadAttemptResult, ProgressEvent, ReferenceRecord, ResolutionTarget, RunControl,
    RunPhase, RunSummary, StrategyHint,
};

/// Outcome held in a reference's slot between phases.
#[derive(Debug, Clone)]
struct Slot {
    outcome: Result<PathBuf, FetchError>,
    message: String,
}

impl Slot {
    fn done(path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            outcome: Ok(path),
            message: message.into(),
        }
    }

    fn failed(err: FetchError) -> Self {
        let message = err.to_string();
        Self {
            outcome: Err(err),
            message,
        }
    }

    fn failed_with(err: FetchError, message: String) -> Self {
        Self {
            outcome: Err(err),
            message,
        }
    }

    fn error(&self) -> Option<&FetchError> {
        self.outcome.as_ref().err()
    }

    fn to_result(&self, index: usize) -> DownloadAttemptResult {
        match &self.outcome {
            Ok(path) => DownloadAttemptResult::succeeded(index, self.message.clone(), path.clone()),
            Err(_) => DownloadAttemptResult::failed(index, self.message.clone()),
        }
    }
}

/// Drives one bibliography from pasted text to a [`RunSummary`].
pub struct Orchestrator {
    config: Config,
    provider: Arc<dyn SessionProvider>,
    ui: UiHandle,
    control: RunControl,
    watcher: Arc<dyn DirectoryWatcher>,
    opener: Arc<dyn LinkOpener>,
    strategies: Vec<Box<dyn RetrievalStrategy>>,
    gate: ChallengeGate,
    detector: CompletionDetector,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        provider: Arc<dyn SessionProvider>,
        ui: UiHandle,
        control: RunControl,
    ) -> Self {
        let strategies = build_strategies(&config);
        let gate = ChallengeGate::new(config.challenge_wait());
        let detector = CompletionDetector::new(config.poll_interval(), config.download_timeout())
            .with_extension("pdf");
        Self {
            config,
            provider,
            ui,
            control,
            watcher: Arc::new(FsWatcher),
            opener: Arc::new(SystemOpener),
            strategies,
            gate,
            detector,
        }
    }

    pub fn with_watcher(mut self, watcher: Arc<dyn DirectoryWatcher>) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn with_opener(mut self, opener: Arc<dyn LinkOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn RetrievalStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Run the whole pipeline. Never fails: every problem ends up in a result slot.
    pub async fn run(&self, text: &str) -> RunSummary {
        let records = parse_references(text);
        let plan = DedupPlan::build(&records);
        let targets: Vec<ResolutionTarget> = records.iter().map(build_target).collect();
        let total = records.len();

        tracing::info!(total, unique = plan.unique_count(), "references parsed");
        self.ui.report_progress(ProgressEvent::Parsed {
            total,
            unique: plan.unique_count(),
        });
        for record in &records {
            if let Some(of) = plan.original_of(record.index) {
                self.ui.report_progress(ProgressEvent::Duplicate {
                    index: record.index,
                    of,
                });
            }
        }

        let mut slots: Vec<Option<Slot>> = vec![None; total];
        let unique: Vec<usize> = records
            .iter()
            .map(|r| r.index)
            .filter(|i| plan.original_of(*i).is_none())
            .collect();

        let mut retried = 0;
        let mut manually_completed = 0;

        if let Err(e) = std::fs::create_dir_all(&self.config.destination_dir) {
            tracing::warn!(dir = %self.config.destination_dir.display(), error = %e, "cannot create destination");
            fill_pending(&mut slots, &unique, FetchError::from(e));
        } else {
            match self.open_session() {
                Err(err) => {
                    tracing::warn!(error = %err, "retrieval session unavailable");
                    fill_pending(&mut slots, &unique, err);
                }
                Ok(mut session) => {
                    self.first_pass(session.as_mut(), &records, &targets, &unique, &mut slots)
                        .await;
                    drop(session);

                    retried = self.retry_pass(&records, &targets, &unique, &mut slots).await;

                    if self.config.manual_fallback {
                        manually_completed = self
                            .manual_pass(&records, &targets, &unique, &mut slots)
                            .await;
                    }
                }
            }
        }

        if self.control.is_cancelled() {
            fill_pending(&mut slots, &unique, FetchError::RunCancelled);
        }

        self.ui.report_progress(ProgressEvent::PhaseStarted {
            phase: RunPhase::Aggregating,
            count: total,
        });
        let results = collect_results(&records, &plan, &slots);
        let mut summary = report::summarize(results, retried, manually_completed);
        report::finalize(&mut summary, &records, &self.config);

        tracing::info!(
            succeeded = summary.unique_succeeded,
            failed = summary.unique_failed,
            duplicates = summary.duplicates,
            "run finished"
        );
        summary
    }

    fn open_session(&self) -> Result<Box<dyn RetrievalSession>, FetchError> {
        self.provider.prepare()?;
        Ok(self.provider.open()?)
    }

    async fn first_pass(
        &self,
        session: &mut dyn RetrievalSession,
        records: &[ReferenceRecord],
        targets: &[ResolutionTarget],
        unique: &[usize],
        slots: &mut [Option<Slot>],
    ) {
        self.start_phase(RunPhase::FirstPass, unique.len());

        for &index in unique {
            if self.control.is_cancelled() {
                break;
            }
            let cancel = self.control.begin_reference();
            self.announce(index, records, RunPhase::FirstPass);

            let slot = match self.attempt(session, index, &targets[index - 1], &cancel).await {
                Ok(path) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    Slot::done(path, format!("Downloaded {}", name))
                }
                Err(e) => Slot::failed(self.cancelled_or(e)),
            };
            self.emit_result(index, records.len(), &slot);
            slots[index - 1] = Some(slot);
        }
    }

    /// Second automated attempt for every retryable first-pass failure.
    /// Returns how many references were retried.
    async fn retry_pass(
        &self,
        records: &[ReferenceRecord],
        targets: &[ResolutionTarget],
        unique: &[usize],
        slots: &mut [Option<Slot>],
    ) -> usize {
        let pending: Vec<usize> = unique
            .iter()
            .copied()
            .filter(|i| {
                slots[i - 1]
                    .as_ref()
                    .and_then(Slot::error)
                    .is_some_and(FetchError::is_retryable)
            })
            .collect();
        if pending.is_empty() || self.control.is_cancelled() {
            return 0;
        }

        let mut session = match self.open_session() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "could not open a session for the retry pass");
                return 0;
            }
        };
        self.start_phase(RunPhase::Retry, pending.len());

        let mut retried = 0;
        for index in pending {
            if self.control.is_cancelled() {
                break;
            }
            let Some(previous) = slots[index - 1].clone() else {
                continue;
            };
            let cancel = self.control.begin_reference();
            self.announce(index, records, RunPhase::Retry);
            retried += 1;

            let slot = match self
                .attempt(session.as_mut(), index, &targets[index - 1], &cancel)
                .await
            {
                Ok(path) => Slot::done(path, "succeeded on retry"),
                Err(e) => {
                    let e = self.cancelled_or(e);
                    let message = format!("initial attempt: {}; retry attempt: {}", previous.message, e);
                    Slot::failed_with(e, message)
                }
            };
            self.emit_result(index, records.len(), &slot);
            slots[index - 1] = Some(slot);
        }
        retried
    }

    /// Human-assisted pass over what is still missing. Returns how many files
    /// the user supplied.
    async fn manual_pass(
        &self,
        records: &[ReferenceRecord],
        targets: &[ResolutionTarget],
        unique: &[usize],
        slots: &mut [Option<Slot>],
    ) -> usize {
        let pending: Vec<usize> = unique
            .iter()
            .copied()
            .filter(|i| {
                slots[i - 1].as_ref().and_then(Slot::error).is_some_and(|e| {
                    !matches!(e, FetchError::UserSkipped | FetchError::RunCancelled)
                })
            })
            .collect();
        if pending.is_empty() || self.control.is_cancelled() {
            return 0;
        }

        let downloads = self.config.resolved_manual_downloads_dir();
        let prompt = format!(
            "{} reference(s) still have no PDF. Open each one in your browser and save the PDF to {}?",
            pending.len(),
            downloads.display()
        );
        if !self.ui.confirm_manual_fallback(&prompt).await {
            tracing::info!("manual fallback declined");
            return 0;
        }

        // Only used to find a better link to open; the manual pass works without it.
        let mut session = if self.config.manual_auto_open_link {
            self.open_session().ok()
        } else {
            None
        };
        let detector = CompletionDetector::new(self.config.poll_interval(), self.config.manual_wait())
            .with_extension("pdf")
            .ignoring_empty();
        self.start_phase(RunPhase::ManualFallback, pending.len());

        let mut completed = 0;
        for index in pending {
            if self.control.is_cancelled() {
                break;
            }
            let Some(previous) = slots[index - 1].clone() else {
                continue;
            };
            let cancel = self.control.begin_reference();
            self.announce(index, records, RunPhase::ManualFallback);

            let url = self
                .manual_url(session.as_deref_mut(), &targets[index - 1], &cancel)
                .await;
            let record = &records[index - 1];
            let outcome = self
                .manual_one(index, record, &url, &downloads, &detector, &cancel)
                .await;

            let slot = match outcome {
                Ok(path) => {
                    completed += 1;
                    Slot::done(path, "completed manually")
                }
                Err(e) => {
                    let e = self.cancelled_or(e);
                    let message = format!("{}; manual attempt: {}", previous.message, e);
                    Slot::failed_with(e, message)
                }
            };
            self.emit_result(index, records.len(), &slot);
            slots[index - 1] = Some(slot);
        }
        completed
    }

    async fn manual_one(
        &self,
        index: usize,
        record: &ReferenceRecord,
        url: &str,
        downloads: &std::path::Path,
        detector: &CompletionDetector,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        // A skip while the link was being looked up means nothing gets opened.
        if cancel.is_cancelled() {
            return Err(FetchError::UserSkipped);
        }
        let before = snapshot_paths(self.watcher.as_ref(), downloads)?;

        if let Err(e) = self.opener.open(url) {
            tracing::warn!(index, url, error = %e, "could not open browser");
        }
        self.ui.status(
            index,
            format!("Opened {}; save the PDF into {}", url, downloads.display()),
        );

        let file = detector
            .wait_for_file(self.watcher.as_ref(), downloads, &before, cancel)
            .await
            .map_err(|e| match e {
                FetchError::DownloadTimeout => FetchError::ManualFallbackTimeout,
                other => other,
            })?;

        let slug = safe_slug(&record.label(), &record.raw_text);
        let moved = move_and_rename(&file, &self.config.destination_dir, &slug)?;
        tracing::info!(index, from = %file.display(), to = %moved.display(), "manual download moved");
        Ok(moved)
    }

    /// Where to point the user's browser.
    ///
    /// With auto-open on and a session available, the target is loaded and the
    /// first link that is clearly a PDF wins, otherwise the page it landed on.
    /// Anything going wrong falls back to the target itself.
    async fn manual_url(
        &self,
        session: Option<&mut (dyn RetrievalSession + 'static)>,
        target: &ResolutionTarget,
        cancel: &CancellationToken,
    ) -> String {
        let start = match target.strategy_hint {
            StrategyHint::DirectUrl => target.query_or_url.clone(),
            StrategyHint::SearchQuery => format!(
                "{}{}",
                self.config.search_engine_url,
                urlencoding::encode(&target.query_or_url)
            ),
        };
        let Some(session) = session else {
            return start;
        };

        let timeout = self.config.page_load_timeout();
        let page = tokio::select! {
            _ = cancel.cancelled() => return start,
            res = session.navigate(&start, timeout) => res,
        };
        match page {
            Ok(page) => session
                .locate_pdf_candidates(&page)
                .into_iter()
                .find(|c| c.looks_like_pdf())
                .map(|c| c.url)
                .unwrap_or(page.location),
            Err(e) => {
                tracing::debug!(url = %start, error = %e, "could not pre-load manual target");
                start
            }
        }
    }

    async fn attempt(
        &self,
        session: &mut dyn RetrievalSession,
        index: usize,
        target: &ResolutionTarget,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        let mut ctx = AttemptContext {
            index,
            session,
            gate: &self.gate,
            detector: &self.detector,
            watcher: self.watcher.as_ref(),
            ui: &self.ui,
            cancel,
            download_dir: &self.config.destination_dir,
            page_timeout: self.config.page_load_timeout(),
        };
        acquire(&self.strategies, &mut ctx, target).await
    }

    /// A skip caused by cancelling the whole run is reported as such.
    fn cancelled_or(&self, err: FetchError) -> FetchError {
        if err == FetchError::UserSkipped && self.control.is_cancelled() {
            FetchError::RunCancelled
        } else {
            err
        }
    }

    fn start_phase(&self, phase: RunPhase, count: usize) {
        tracing::info!(phase = %phase, count, "phase started");
        self.ui
            .report_progress(ProgressEvent::PhaseStarted { phase, count });
    }

    fn announce(&self, index: usize, records: &[ReferenceRecord], phase: RunPhase) {
        let summary: String = records[index - 1].stripped_text.chars().take(80).collect();
        self.ui.report_progress(ProgressEvent::Processing {
            index,
            total: records.len(),
            phase,
            summary,
        });
    }

    fn emit_result(&self, index: usize, total: usize, slot: &Slot) {
        self.ui.report_progress(ProgressEvent::Result {
            index,
            total,
            result: Box::new(slot.to_result(index)),
        });
    }
}

/// Give every unique reference without an outcome the same failure.
fn fill_pending(slots: &mut [Option<Slot>], unique: &[usize], err: FetchError) {
    for &index in unique {
        let slot = &mut slots[index - 1];
        if slot.is_none() {
            *slot = Some(Slot::failed(err.clone()));
        }
    }
}

/// Final index-ordered results, duplicates copying their original.
fn collect_results(
    records: &[ReferenceRecord],
    plan: &DedupPlan,
    slots: &[Option<Slot>],
) -> Vec<DownloadAttemptResult> {
    records
        .iter()
        .map(|record| {
            let index = record.index;
            let original = plan.original_of(index);
            let source = original.unwrap_or(index);
            let mut result = match &slots[source - 1] {
                Some(slot) => slot.to_result(index),
                None => DownloadAttemptResult::failed(index, FetchError::RunCancelled.to_string()),
            };
            result.duplicate_of = original;
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<ReferenceRecord> {
        (1..=n)
            .map(|i| ReferenceRecord {
                index: i,
                raw_text: format!("ref {}", i),
                stripped_text: format!("ref {}", i),
            })
            .collect()
    }

    #[test]
    fn duplicates_copy_the_original_slot() {
        let recs = records(3);
        let plan = DedupPlan {
            signatures: vec![],
            duplicate_of: vec![None, None, Some(1)],
        };
        let slots = vec![
            Some(Slot::done(PathBuf::from("/d/a.pdf"), "Downloaded a.pdf")),
            Some(Slot::failed(FetchError::EmptyDownload)),
            None,
        ];
        let results = collect_results(&recs, &plan, &slots);

        assert_eq!(results[2].reference_index, 3);
        assert_eq!(results[2].duplicate_of, Some(1));
        assert_eq!(results[2].file_path, results[0].file_path);
        assert!(results[2].success);
        assert_eq!(results[1].message, "Downloaded PDF was empty");
    }

    #[test]
    fn fill_pending_keeps_existing_outcomes() {
        let mut slots = vec![Some(Slot::failed(FetchError::EmptyDownload)), None];
        fill_pending(&mut slots, &[1, 2], FetchError::RunCancelled);
        assert_eq!(slots[0].as_ref().unwrap().message, "Downloaded PDF was empty");
        assert_eq!(
            slots[1].as_ref().unwrap().error(),
            Some(&FetchError::RunCancelled)
        );
    }
}
