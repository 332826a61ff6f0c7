//! Opening pages in the user's own browser for the manual pass.

use std::io;
use std::sync::Mutex;

/// Opens a URL somewhere a human can act on it.
pub trait LinkOpener: Send + Sync {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Opens URLs with the platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl LinkOpener for SystemOpener {
    fn open(&self, url: &str) -> io::Result<()> {
        tracing::info!(url, "opening in default browser");
        open::that(url)
    }
}

/// Records URLs instead of opening them.
#[derive(Debug, Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<String>>,
}

impl RecordingOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl LinkOpener for RecordingOpener {
    fn open(&self, url: &str) -> io::Result<()> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(url.to_string());
        }
        Ok(())
    }
}

impl<T: LinkOpener + ?Sized> LinkOpener for std::sync::Arc<T> {
    fn open(&self, url: &str) -> io::Result<()> {
        (**self).open(url)
    }
}
