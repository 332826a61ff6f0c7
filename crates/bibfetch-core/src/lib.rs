use std::path::PathBuf;
use std::time::Duration;

pub mod challenge;
pub mod config_file;
pub mod control;
pub mod coordinator;
pub mod dedup;
pub mod detector;
pub mod error;
pub mod files;
pub mod identifiers;
pub mod interaction;
pub mod links;
pub mod manual;
pub mod merge;
pub mod parser;
pub mod query;
pub mod report;
pub mod session;
pub mod strategy;
pub mod worker;

// Re-export for convenience
pub use control::RunControl;
pub use coordinator::Orchestrator;
pub use dedup::{DedupPlan, Signature};
pub use error::{CoreError, FetchError, SessionError};
pub use interaction::{UiEndpoint, UiHandle, UiRequest};
pub use parser::parse_references;
pub use query::build_target;
pub use session::{BrowserProfile, HttpSessionProvider, RetrievalSession, SessionProvider};
pub use worker::{Worker, spawn_worker};

/// One entry of the pasted bibliography.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRecord {
    /// 1-based position in emission order.
    pub index: usize,
    /// The record's lines exactly as they appeared in the input, joined with `\n`.
    pub raw_text: String,
    /// Numbering token removed, lines trimmed and joined with single spaces.
    pub stripped_text: String,
}

impl ReferenceRecord {
    /// Short label used in progress output and file names (`ref_3`).
    pub fn label(&self) -> String {
        format!("ref_{}", self.index)
    }
}

/// How a [`ResolutionTarget`] should be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyHint {
    /// `query_or_url` is a URL to open directly (DOI redirect or explicit link).
    DirectUrl,
    /// `query_or_url` is a free-text query for a search engine or bibliographic API.
    SearchQuery,
}

/// What a reference resolves to before any network access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionTarget {
    pub query_or_url: String,
    pub strategy_hint: StrategyHint,
    pub derived_title: Option<String>,
}

/// Final outcome for one reference index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadAttemptResult {
    pub reference_index: usize,
    pub success: bool,
    pub message: String,
    pub file_path: Option<PathBuf>,
    pub used_filename: Option<String>,
    /// Set when this reference shares its signature with an earlier one and
    /// inherited that reference's outcome.
    pub duplicate_of: Option<usize>,
}

impl DownloadAttemptResult {
    pub fn succeeded(reference_index: usize, message: impl Into<String>, path: PathBuf) -> Self {
        let used_filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        Self {
            reference_index,
            success: true,
            message: message.into(),
            file_path: Some(path),
            used_filename,
            duplicate_of: None,
        }
    }

    pub fn failed(reference_index: usize, message: impl Into<String>) -> Self {
        Self {
            reference_index,
            success: false,
            message: message.into(),
            file_path: None,
            used_filename: None,
            duplicate_of: None,
        }
    }
}

/// Aggregate of a complete run, built once by [`report::summarize`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// One result per reference, ordered by index.
    pub results: Vec<DownloadAttemptResult>,
    pub unique_succeeded: usize,
    pub unique_failed: usize,
    pub duplicates: usize,
    pub retried: usize,
    pub manually_completed: usize,
    pub merged_path: Option<PathBuf>,
    /// Why the combined PDF was not produced, when merging was requested.
    pub merge_note: Option<String>,
    pub missing_report_path: Option<PathBuf>,
}

/// Which pass of the coordinator is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    FirstPass,
    Retry,
    ManualFallback,
    Aggregating,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::FirstPass => write!(f, "first pass"),
            RunPhase::Retry => write!(f, "retry pass"),
            RunPhase::ManualFallback => write!(f, "manual fallback"),
            RunPhase::Aggregating => write!(f, "aggregating results"),
        }
    }
}

/// Progress events emitted by the worker.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Parsed {
        total: usize,
        unique: usize,
    },
    PhaseStarted {
        phase: RunPhase,
        count: usize,
    },
    Processing {
        index: usize,
        total: usize,
        phase: RunPhase,
        summary: String,
    },
    /// Free-form status line (strategy chosen, link found, waiting for file...).
    Status {
        index: usize,
        message: String,
    },
    ChallengeDetected {
        index: usize,
        message: String,
    },
    Result {
        index: usize,
        total: usize,
        result: Box<DownloadAttemptResult>,
    },
    Duplicate {
        index: usize,
        of: usize,
    },
}

/// Configuration for one run of the orchestrator.
#[derive(Clone)]
pub struct Config {
    /// Folder that receives the PDFs, the combined PDF and the missing report.
    pub destination_dir: PathBuf,
    pub browser: BrowserProfile,
    pub page_load_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub challenge_wait_secs: u64,
    /// Enable the human-assisted third pass.
    pub manual_fallback: bool,
    /// Where the user's own browser saves files. Defaults to the platform Downloads dir.
    pub manual_downloads_dir: Option<PathBuf>,
    pub manual_wait_secs: u64,
    /// Open a detected PDF/article link instead of the raw target during the manual pass.
    pub manual_auto_open_link: bool,
    /// Search engine URL; the encoded query is appended.
    pub search_engine_url: String,
    pub bibliographic_api_url: String,
    pub crossref_mailto: Option<String>,
    /// Strategy names to skip ("DOI redirect", "CrossRef", "Search engine").
    pub disabled_strategies: Vec<String>,
    pub merge_pdfs: bool,
    pub write_missing_report: bool,
}

impl Config {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn challenge_wait(&self) -> Duration {
        Duration::from_secs(self.challenge_wait_secs)
    }

    pub fn manual_wait(&self) -> Duration {
        Duration::from_secs(self.manual_wait_secs)
    }

    /// The manual downloads folder, falling back to `~/Downloads`.
    pub fn resolved_manual_downloads_dir(&self) -> PathBuf {
        self.manual_downloads_dir
            .clone()
            .or_else(dirs::download_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("Downloads"))
    }

    pub fn strategy_enabled(&self, name: &str) -> bool {
        !self
            .disabled_strategies
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("destination_dir", &self.destination_dir)
            .field("browser", &self.browser)
            .field("page_load_timeout_secs", &self.page_load_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("challenge_wait_secs", &self.challenge_wait_secs)
            .field("manual_fallback", &self.manual_fallback)
            .field("manual_downloads_dir", &self.manual_downloads_dir)
            .field("manual_wait_secs", &self.manual_wait_secs)
            .field("manual_auto_open_link", &self.manual_auto_open_link)
            .field("search_engine_url", &self.search_engine_url)
            .field("bibliographic_api_url", &self.bibliographic_api_url)
            .field(
                "crossref_mailto",
                &self.crossref_mailto.as_ref().map(|_| "***"),
            )
            .field("disabled_strategies", &self.disabled_strategies)
            .field("merge_pdfs", &self.merge_pdfs)
            .field("write_missing_report", &self.write_missing_report)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination_dir: default_destination_dir(),
            browser: BrowserProfile::Edge,
            page_load_timeout_secs: 60,
            download_timeout_secs: 120,
            poll_interval_ms: 1000,
            challenge_wait_secs: 180,
            manual_fallback: false,
            manual_downloads_dir: None,
            manual_wait_secs: 300,
            manual_auto_open_link: true,
            search_engine_url: "https://scholar.google.com/scholar?q=".into(),
            bibliographic_api_url: "https://api.crossref.org/works".into(),
            crossref_mailto: None,
            disabled_strategies: vec![],
            merge_pdfs: true,
            write_missing_report: true,
        }
    }
}

/// `~/Desktop/Bibliography_PDFs`, or a relative folder when no home directory is known.
pub fn default_destination_dir() -> PathBuf {
    dirs::desktop_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Desktop")))
        .map(|d| d.join("Bibliography_PDFs"))
        .unwrap_or_else(|| PathBuf::from("Bibliography_PDFs"))
}
