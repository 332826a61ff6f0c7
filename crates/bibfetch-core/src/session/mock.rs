//! Scripted retrieval session for testing.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use super::{
    ContentSnapshot, RetrievalSession, SessionFuture, SessionProvider, TriggerOutcome,
};
use crate::error::SessionError;
use crate::links::LinkHandle;

/// What navigating to a scripted URL produces.
#[derive(Clone, Debug)]
pub enum MockPage {
    /// Land on this page.
    Page(ContentSnapshot),
    /// Never become ready (`NavigationTimeout`).
    Timeout,
    /// Fail with a navigation error.
    Error(String),
    /// Show `challenge` until `clears_after` has elapsed since the navigation,
    /// then `cleared`.
    Challenge {
        challenge: ContentSnapshot,
        cleared: ContentSnapshot,
        clears_after: Duration,
    },
}

impl MockPage {
    pub fn html(location: &str, body: &str) -> Self {
        MockPage::Page(ContentSnapshot::text(location, body))
    }

    pub fn pdf(location: &str, bytes: &[u8], filename: &str) -> Self {
        MockPage::Page(ContentSnapshot::pdf(location, bytes.to_vec(), filename))
    }
}

/// What triggering a scripted link does.
#[derive(Clone, Debug)]
pub enum MockTrigger {
    /// Start a download that writes `bytes` to `name` after `delay`.
    WriteFile {
        name: String,
        bytes: Vec<u8>,
        delay: Duration,
    },
    /// Start a download that never produces a file.
    Nothing,
    /// Answer with the PDF bytes directly.
    Payload { bytes: Vec<u8>, filename: String },
    /// Refuse to start.
    Fail(String),
}

impl MockTrigger {
    pub fn write(name: &str, bytes: &[u8]) -> Self {
        MockTrigger::WriteFile {
            name: name.to_string(),
            bytes: bytes.to_vec(),
            delay: Duration::ZERO,
        }
    }
}

/// Routes and recorded calls, shared between the provider, its sessions and the test.
#[derive(Default)]
pub struct MockScript {
    pages: Mutex<HashMap<String, MockPage>>,
    /// Per-URL trigger behaviours, consumed in order; the last one repeats.
    triggers: Mutex<HashMap<String, Vec<MockTrigger>>>,
    navigations: Mutex<Vec<String>>,
    triggered: Mutex<Vec<String>>,
}

impl MockScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, page: MockPage) -> Self {
        self.pages.lock().unwrap().insert(url.to_string(), page);
        self
    }

    pub fn on_trigger(self, url: &str, behaviours: Vec<MockTrigger>) -> Self {
        self.triggers
            .lock()
            .unwrap()
            .insert(url.to_string(), behaviours);
        self
    }

    /// Every URL passed to `navigate`, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    /// Every link URL passed to `trigger`, in order.
    pub fn triggered(&self) -> Vec<String> {
        self.triggered.lock().unwrap().clone()
    }

    fn next_trigger(&self, url: &str) -> Option<MockTrigger> {
        let mut triggers = self.triggers.lock().unwrap();
        let seq = triggers.get_mut(url)?;
        if seq.len() > 1 {
            Some(seq.remove(0))
        } else {
            seq.first().cloned()
        }
    }
}

/// Hand-rolled [`RetrievalSession`] driven by a [`MockScript`].
pub struct MockSession {
    script: Arc<MockScript>,
    current: Option<(MockPage, Instant)>,
}

impl MockSession {
    pub fn new(script: Arc<MockScript>) -> Self {
        Self {
            script,
            current: None,
        }
    }

    fn visible_page(&self) -> Option<ContentSnapshot> {
        match &self.current {
            Some((MockPage::Page(snapshot), _)) => Some(snapshot.clone()),
            Some((
                MockPage::Challenge {
                    challenge,
                    cleared,
                    clears_after,
                },
                since,
            )) => {
                if since.elapsed() >= *clears_after {
                    Some(cleared.clone())
                } else {
                    Some(challenge.clone())
                }
            }
            _ => None,
        }
    }
}

impl RetrievalSession for MockSession {
    fn navigate<'a>(&'a mut self, url: &'a str, timeout: Duration) -> SessionFuture<'a, ContentSnapshot> {
        Box::pin(async move {
            self.script.navigations.lock().unwrap().push(url.to_string());
            let page = self.script.pages.lock().unwrap().get(url).cloned();
            match page {
                None => Err(SessionError::Navigation(format!("no route for {}", url))),
                Some(MockPage::Timeout) => {
                    tokio::time::sleep(timeout).await;
                    Err(SessionError::NavigationTimeout)
                }
                Some(MockPage::Error(msg)) => Err(SessionError::Navigation(msg)),
                Some(page) => {
                    self.current = Some((page, Instant::now()));
                    self.visible_page()
                        .ok_or_else(|| SessionError::Navigation("blank page".into()))
                }
            }
        })
    }

    fn trigger<'a>(&'a mut self, link: &'a LinkHandle, download_dir: &'a Path) -> SessionFuture<'a, TriggerOutcome> {
        Box::pin(async move {
            self.script.triggered.lock().unwrap().push(link.url.clone());
            match self.script.next_trigger(&link.url) {
                None => Err(SessionError::Trigger(format!("no behaviour for {}", link.url))),
                Some(MockTrigger::Fail(msg)) => Err(SessionError::Trigger(msg)),
                Some(MockTrigger::Nothing) => Ok(TriggerOutcome::Started),
                Some(MockTrigger::Payload { bytes, filename }) => {
                    Ok(TriggerOutcome::Payload { bytes, filename })
                }
                Some(MockTrigger::WriteFile { name, bytes, delay }) => {
                    let path = download_dir.join(name);
                    tokio::spawn(async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        let _ = std::fs::write(path, bytes);
                    });
                    Ok(TriggerOutcome::Started)
                }
            }
        })
    }

    fn current_location(&self) -> Option<String> {
        self.visible_page().map(|p| p.location)
    }

    fn page_content(&mut self) -> SessionFuture<'_, ContentSnapshot> {
        Box::pin(async move {
            self.visible_page()
                .ok_or_else(|| SessionError::Navigation("no page loaded".into()))
        })
    }
}

/// [`SessionProvider`] handing out [`MockSession`]s over one shared script.
pub struct MockSessionProvider {
    script: Arc<MockScript>,
    prepare_error: Option<String>,
    opened: AtomicUsize,
}

impl MockSessionProvider {
    pub fn new(script: MockScript) -> Self {
        Self {
            script: Arc::new(script),
            prepare_error: None,
            opened: AtomicUsize::new(0),
        }
    }

    /// A provider whose `prepare` fails, as when no browser is installed.
    pub fn unavailable(message: &str) -> Self {
        Self {
            script: Arc::new(MockScript::new()),
            prepare_error: Some(message.to_string()),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn script(&self) -> Arc<MockScript> {
        Arc::clone(&self.script)
    }

    /// How many sessions have been opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl SessionProvider for MockSessionProvider {
    fn prepare(&self) -> Result<(), SessionError> {
        match &self.prepare_error {
            Some(msg) => Err(SessionError::Init(msg.clone())),
            None => Ok(()),
        }
    }

    fn open(&self) -> Result<Box<dyn RetrievalSession>, SessionError> {
        self.prepare()?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession::new(Arc::clone(&self.script))))
    }
}
