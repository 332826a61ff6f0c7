//! Interactive verification challenges ("unusual traffic", CAPTCHA walls).
//!
//! When a page shows one, the user is notified and the current reference
//! waits until the page no longer shows it, re-checking once a second, for a
//! bounded time.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::interaction::UiHandle;
use crate::session::{ContentSnapshot, RetrievalSession};

/// Phrases in a page's visible text that mark a verification wall.
const TEXT_MARKERS: &[&str] = &[
    "unusual traffic",
    "verify you are human",
    "verify that you are human",
    "are you a robot",
    "not a robot",
    "checking your browser",
    "captcha",
];

/// Location fragments of known challenge redirects.
const LOCATION_MARKERS: &[&str] = &["/sorry/", "/captcha", "challenge-platform"];

/// Visible text of an HTML page: scripts, styles and tags removed, lowercased.
fn visible_text(html: &str) -> String {
    static HIDDEN_BLOCK_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>").unwrap());
    static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

    let without_blocks = HIDDEN_BLOCK_RE.replace_all(html, " ");
    let text = TAG_RE.replace_all(&without_blocks, " ");
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Describe the challenge shown by `page`, if any.
pub fn detect_challenge(page: &ContentSnapshot) -> Option<String> {
    let location = page.location.to_lowercase();
    if let Some(marker) = LOCATION_MARKERS.iter().find(|m| location.contains(*m)) {
        return Some(format!(
            "Verification required at {} (redirected to '{}')",
            page.location, marker
        ));
    }

    let text = visible_text(page.as_text()?);
    TEXT_MARKERS
        .iter()
        .find(|m| text.contains(*m))
        .map(|m| format!("Verification required at {} (page mentions '{}')", page.location, m))
}

/// Suspends a reference while a challenge is showing.
#[derive(Debug, Clone)]
pub struct ChallengeGate {
    pub max_wait: Duration,
    pub recheck_interval: Duration,
}

impl ChallengeGate {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            max_wait,
            recheck_interval: Duration::from_secs(1),
        }
    }

    /// Pass `page` through if it is not a challenge; otherwise wait for the
    /// session's page to clear and return the cleared page.
    pub async fn pass(
        &self,
        session: &mut dyn RetrievalSession,
        page: ContentSnapshot,
        index: usize,
        ui: &UiHandle,
        cancel: &CancellationToken,
    ) -> Result<ContentSnapshot, FetchError> {
        let Some(message) = detect_challenge(&page) else {
            return Ok(page);
        };

        tracing::info!(index, %message, "verification challenge detected");
        let mut ack = ui.notify_challenge(index, &message);
        let mut acked = false;
        let deadline = tokio::time::Instant::now() + self.max_wait;

        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::warn!(index, "verification challenge not cleared in time");
                return Err(FetchError::VerificationNotCleared);
            }
            let sleep_for = self.recheck_interval.min(deadline - now);

            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::UserSkipped),
                _ = &mut ack, if !acked => {
                    acked = true;
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }

            match session.page_content().await {
                Ok(current) if detect_challenge(&current).is_none() => {
                    tracing::info!(index, location = %current.location, "verification challenge cleared");
                    ui.status(index, "Verification cleared, continuing");
                    return Ok(current);
                }
                Ok(_) => tracing::debug!(index, "challenge still showing"),
                Err(e) => tracing::debug!(index, error = %e, "could not re-read page during challenge"),
            }
        }
    }
}
