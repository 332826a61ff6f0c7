//! HTTP-backed retrieval session.
//!
//! Behaves like a minimal browser: a cookie-keeping client with the chosen
//! profile's User-Agent. Triggered downloads stream in a background task into
//! `<name><partial suffix>` and are renamed when complete, exactly the way a
//! real browser leaves files for the completion detector to find.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use super::{
    BrowserProfile, ContentSnapshot, PageBody, RetrievalSession, SessionFuture, SessionProvider,
    TriggerOutcome,
};
use crate::error::SessionError;
use crate::files::{derive_filename, unique_path};
use crate::links::LinkHandle;

/// How long a triggered request may take to return headers.
const TRIGGER_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds the shared HTTP client once and opens [`HttpSession`]s on it.
pub struct HttpSessionProvider {
    profile: BrowserProfile,
    client: OnceLock<reqwest::Client>,
}

impl HttpSessionProvider {
    pub fn new(profile: BrowserProfile) -> Self {
        Self {
            profile,
            client: OnceLock::new(),
        }
    }

    fn build_client(&self) -> Result<reqwest::Client, SessionError> {
        reqwest::Client::builder()
            .user_agent(self.profile.user_agent())
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| SessionError::Init(e.to_string()))
    }
}

impl SessionProvider for HttpSessionProvider {
    fn prepare(&self) -> Result<(), SessionError> {
        if self.client.get().is_none() {
            let client = self.build_client()?;
            // A concurrent prepare may have won; either client is fine.
            let _ = self.client.set(client);
            tracing::debug!(browser = %self.profile, "HTTP client ready");
        }
        Ok(())
    }

    fn open(&self) -> Result<Box<dyn RetrievalSession>, SessionError> {
        let client = self
            .client
            .get()
            .cloned()
            .ok_or_else(|| SessionError::Init("session provider was not prepared".into()))?;
        Ok(Box::new(HttpSession::new(client, self.profile)))
    }
}

struct PendingDownload {
    task: JoinHandle<()>,
    partial: PathBuf,
}

/// One sequential browsing context over a shared [`reqwest::Client`].
pub struct HttpSession {
    client: reqwest::Client,
    profile: BrowserProfile,
    location: Option<String>,
    pending: Vec<PendingDownload>,
}

impl HttpSession {
    pub fn new(client: reqwest::Client, profile: BrowserProfile) -> Self {
        Self {
            client,
            profile,
            location: None,
            pending: Vec::new(),
        }
    }

    /// Abort downloads left over from an earlier reference so they can't
    /// land in a later reference's detection window.
    fn abort_pending(&mut self) {
        for download in self.pending.drain(..) {
            if !download.task.is_finished() {
                download.task.abort();
                let _ = std::fs::remove_file(&download.partial);
                tracing::debug!(partial = %download.partial.display(), "aborted unfinished download");
            }
        }
    }

    async fn fetch(&mut self, url: &str, timeout: Duration) -> Result<ContentSnapshot, SessionError> {
        let client = self.client.clone();
        let request = async move {
            let resp = client.get(url).send().await?;
            let location = resp.url().to_string();
            let status = resp.status().as_u16();
            let content_type = header(&resp, reqwest::header::CONTENT_TYPE);
            let disposition = header(&resp, reqwest::header::CONTENT_DISPOSITION);
            let bytes = resp.bytes().await?;
            Ok::<_, reqwest::Error>((location, status, content_type, disposition, bytes))
        };

        let (location, status, content_type, disposition, bytes) =
            match tokio::time::timeout(timeout, request).await {
                Err(_) => return Err(SessionError::NavigationTimeout),
                Ok(Err(e)) if e.is_timeout() => return Err(SessionError::NavigationTimeout),
                Ok(Err(e)) => return Err(SessionError::Navigation(e.to_string())),
                Ok(Ok(parts)) => parts,
            };

        self.location = Some(location.clone());
        let is_pdf = content_type
            .as_deref()
            .is_some_and(|ct| ct.to_lowercase().contains("application/pdf"))
            || bytes.starts_with(b"%PDF");

        let (body, suggested_filename) = if is_pdf {
            let name = derive_filename(&location, disposition.as_deref());
            (PageBody::Pdf(bytes.to_vec()), Some(name))
        } else {
            (PageBody::Text(String::from_utf8_lossy(&bytes).into_owned()), None)
        };

        tracing::debug!(url, %location, status, pdf = is_pdf, "navigation finished");
        Ok(ContentSnapshot {
            location,
            status,
            content_type,
            body,
            suggested_filename,
        })
    }

    async fn start_download(
        &mut self,
        link: &LinkHandle,
        download_dir: &Path,
    ) -> Result<TriggerOutcome, SessionError> {
        self.abort_pending();

        let resp = tokio::time::timeout(TRIGGER_TIMEOUT, self.client.get(&link.url).send())
            .await
            .map_err(|_| SessionError::Trigger("request timed out".into()))?
            .map_err(|e| SessionError::Trigger(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SessionError::Trigger(format!("HTTP {}", status.as_u16())));
        }

        let final_url = resp.url().to_string();
        let content_type = header(&resp, reqwest::header::CONTENT_TYPE).unwrap_or_default();
        let disposition = header(&resp, reqwest::header::CONTENT_DISPOSITION);
        let declared_pdf = content_type.to_lowercase().contains("application/pdf");

        let mut stream = resp.bytes_stream();
        let first = match stream.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(SessionError::Trigger(e.to_string())),
            None => Default::default(),
        };
        if !declared_pdf && !first.starts_with(b"%PDF") {
            return Err(SessionError::Trigger(format!(
                "link returned {} instead of a PDF",
                if content_type.is_empty() { "unknown content" } else { content_type.as_str() }
            )));
        }

        let file_name = derive_filename(&final_url, disposition.as_deref());
        let target = unique_path(download_dir, &file_name);
        let mut partial = target.clone().into_os_string();
        partial.push(self.profile.partial_suffix());
        let partial = PathBuf::from(partial);

        std::fs::create_dir_all(download_dir)
            .map_err(|e| SessionError::Trigger(format!("cannot create download folder: {}", e)))?;

        let partial_path = partial.clone();
        let task = tokio::spawn(async move {
            let result = async {
                let mut file = tokio::fs::File::create(&partial_path).await?;
                file.write_all(&first).await?;
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(std::io::Error::other)?;
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                drop(file);
                tokio::fs::rename(&partial_path, &target).await?;
                Ok::<_, std::io::Error>(target)
            }
            .await;

            match result {
                Ok(path) => tracing::debug!(path = %path.display(), "download finished"),
                Err(e) => {
                    tracing::warn!(error = %e, "download failed");
                    let _ = tokio::fs::remove_file(&partial_path).await;
                }
            }
        });

        self.pending.push(PendingDownload { task, partial });
        tracing::debug!(url = %link.url, "download started");
        Ok(TriggerOutcome::Started)
    }
}

fn header(resp: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl RetrievalSession for HttpSession {
    fn navigate<'a>(&'a mut self, url: &'a str, timeout: Duration) -> SessionFuture<'a, ContentSnapshot> {
        Box::pin(async move {
            self.abort_pending();
            self.fetch(url, timeout).await
        })
    }

    fn trigger<'a>(&'a mut self, link: &'a LinkHandle, download_dir: &'a Path) -> SessionFuture<'a, TriggerOutcome> {
        Box::pin(self.start_download(link, download_dir))
    }

    fn current_location(&self) -> Option<String> {
        self.location.clone()
    }

    fn page_content(&mut self) -> SessionFuture<'_, ContentSnapshot> {
        Box::pin(async move {
            let Some(url) = self.location.clone() else {
                return Err(SessionError::Navigation("no page loaded".into()));
            };
            self.fetch(&url, TRIGGER_TIMEOUT).await
        })
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        self.abort_pending();
    }
}
