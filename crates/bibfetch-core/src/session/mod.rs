//! The retrieval capability the strategies drive.
//!
//! A [`RetrievalSession`] is one browsing context: it navigates, exposes what
//! it landed on, and starts downloads into a directory. Downloads that start
//! asynchronously are picked up by the completion detector, so the session
//! never reports when a file is finished.
//!
//! [`SessionProvider`] is the process-wide readiness state. It is prepared
//! once and then hands out one session per automated phase.

pub mod http;
pub mod mock;

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use crate::error::SessionError;
use crate::links::{LinkHandle, find_pdf_candidates};

pub use http::{HttpSession, HttpSessionProvider};

/// Boxed future returned by session operations.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + Send + 'a>>;

/// Which browser the session imitates.
///
/// Selects the User-Agent and the suffix used for in-progress downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrowserProfile {
    Firefox,
    Chrome,
    #[default]
    Edge,
}

impl BrowserProfile {
    pub fn user_agent(&self) -> &'static str {
        match self {
            BrowserProfile::Firefox => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0"
            }
            BrowserProfile::Chrome => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36"
            }
            BrowserProfile::Edge => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0"
            }
        }
    }

    /// Suffix the browser appends to a file while it is still being written.
    pub fn partial_suffix(&self) -> &'static str {
        match self {
            BrowserProfile::Firefox => ".part",
            BrowserProfile::Chrome | BrowserProfile::Edge => ".crdownload",
        }
    }
}

impl fmt::Display for BrowserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserProfile::Firefox => write!(f, "firefox"),
            BrowserProfile::Chrome => write!(f, "chrome"),
            BrowserProfile::Edge => write!(f, "edge"),
        }
    }
}

impl FromStr for BrowserProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "firefox" => Ok(BrowserProfile::Firefox),
            "chrome" => Ok(BrowserProfile::Chrome),
            "edge" => Ok(BrowserProfile::Edge),
            other => Err(format!(
                "unknown browser '{}' (expected edge, chrome or firefox)",
                other
            )),
        }
    }
}

/// What a navigation landed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBody {
    /// HTML or any other textual response (API JSON included).
    Text(String),
    /// A PDF served directly.
    Pdf(Vec<u8>),
}

/// The page a session is currently showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSnapshot {
    /// Final location after redirects.
    pub location: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: PageBody,
    /// For PDF bodies: the name the server suggested, already sanitized.
    pub suggested_filename: Option<String>,
}

impl ContentSnapshot {
    pub fn text(location: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            status: 200,
            content_type: Some("text/html".into()),
            body: PageBody::Text(body.into()),
            suggested_filename: None,
        }
    }

    pub fn pdf(location: impl Into<String>, bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            status: 200,
            content_type: Some("application/pdf".into()),
            body: PageBody::Pdf(bytes),
            suggested_filename: Some(filename.into()),
        }
    }

    /// Textual body, if this is not a PDF.
    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            PageBody::Text(s) => Some(s),
            PageBody::Pdf(_) => None,
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self.body, PageBody::Pdf(_))
    }
}

/// Result of activating a PDF candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A download into the target directory is under way.
    Started,
    /// The link answered with the PDF bytes; the caller writes them itself.
    Payload { bytes: Vec<u8>, filename: String },
}

/// One browsing context, reused sequentially for every reference of a phase.
pub trait RetrievalSession: Send {
    /// Open `url` and wait until the page is ready or `timeout` elapses.
    ///
    /// A timeout must surface as [`SessionError::NavigationTimeout`], distinct
    /// from other navigation failures.
    fn navigate<'a>(&'a mut self, url: &'a str, timeout: Duration) -> SessionFuture<'a, ContentSnapshot>;

    /// PDF candidates on `content`, strongest first.
    fn locate_pdf_candidates(&self, content: &ContentSnapshot) -> Vec<LinkHandle> {
        match content.as_text() {
            Some(html) => find_pdf_candidates(html, &content.location),
            None => Vec::new(),
        }
    }

    /// Activate `link`, downloading into `download_dir`.
    fn trigger<'a>(&'a mut self, link: &'a LinkHandle, download_dir: &'a Path) -> SessionFuture<'a, TriggerOutcome>;

    /// Where the session currently is, if it has navigated at all.
    fn current_location(&self) -> Option<String>;

    /// Re-read the current page (used to see whether a challenge cleared).
    fn page_content(&mut self) -> SessionFuture<'_, ContentSnapshot>;
}

/// Process-scoped retrieval capability.
pub trait SessionProvider: Send + Sync {
    /// Make the capability ready. Called once before the first session is opened.
    fn prepare(&self) -> Result<(), SessionError>;

    /// A fresh session for one phase.
    fn open(&self) -> Result<Box<dyn RetrievalSession>, SessionError>;
}
