//! Error types for retrieval sessions, single-reference attempts and the run as a whole.

use thiserror::Error;

/// Why a single reference could not be acquired.
///
/// Every variant is per-reference and non-fatal: the orchestrator records the
/// `Display` text on the reference's result slot and moves on. The strings are
/// what the user sees in the summary and in `missing_pdfs.txt`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Page did not become ready")]
    NavigationTimeout,
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),
    #[error("Could not locate a PDF download link")]
    NoCandidateFound,
    #[error("Failed to trigger download: {0}")]
    TriggerFailed(String),
    #[error("Download did not complete in time")]
    DownloadTimeout,
    #[error("Downloaded PDF was empty")]
    EmptyDownload,
    #[error("Verification challenge was not cleared")]
    VerificationNotCleared,
    #[error("Skipped by user")]
    UserSkipped,
    #[error("Run cancelled before this reference was processed")]
    RunCancelled,
    #[error("No PDF appeared in the downloads folder")]
    ManualFallbackTimeout,
    #[error("Filesystem error: {0}")]
    FilesystemError(String),
    #[error("Could not start retrieval session: {0}")]
    SessionUnavailable(String),
}

impl FetchError {
    /// Whether a second automated pass could plausibly change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FetchError::UserSkipped | FetchError::RunCancelled | FetchError::SessionUnavailable(_)
        )
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        FetchError::FilesystemError(e.to_string())
    }
}

/// Errors surfaced by a [`RetrievalSession`](crate::session::RetrievalSession).
///
/// Navigation timeouts are kept apart from other navigation failures so the
/// attempt can report "page did not become ready" distinctly from "no PDF link".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("navigation timed out")]
    NavigationTimeout,
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("trigger failed: {0}")]
    Trigger(String),
    #[error("session could not be started: {0}")]
    Init(String),
}

impl From<SessionError> for FetchError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NavigationTimeout => FetchError::NavigationTimeout,
            SessionError::Navigation(msg) => FetchError::NavigationFailed(msg),
            SessionError::Trigger(msg) => FetchError::TriggerFailed(msg),
            SessionError::Init(msg) => FetchError::SessionUnavailable(msg),
        }
    }
}

/// Run-level failures that prevent a summary from being produced at all.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to start worker: {0}")]
    WorkerStart(#[from] std::io::Error),
    #[error("worker thread panicked")]
    WorkerPanicked,
}
