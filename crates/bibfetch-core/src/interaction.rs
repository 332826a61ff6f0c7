//! Message passing between the worker and the presentation thread.
//!
//! The worker only ever sends. Progress is fire-and-forget; requests that need
//! an answer carry a oneshot sender, so the worker awaits a reply without the
//! UI thread ever blocking on the worker.

use tokio::sync::{mpsc, oneshot};

use crate::ProgressEvent;

/// Requests the worker makes of the user.
#[derive(Debug)]
pub enum UiRequest {
    /// A verification challenge is showing. Sending on `ack` (or dropping it)
    /// asks the worker to re-check the page right away.
    Challenge {
        index: usize,
        message: String,
        ack: oneshot::Sender<()>,
    },
    /// Asked once per run before the first manual item.
    ConfirmManualFallback {
        prompt: String,
        reply: oneshot::Sender<bool>,
    },
}

/// Worker-side handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UiHandle {
    progress: mpsc::UnboundedSender<ProgressEvent>,
    requests: mpsc::UnboundedSender<UiRequest>,
}

/// UI-side receivers.
#[derive(Debug)]
pub struct UiEndpoint {
    pub progress: mpsc::UnboundedReceiver<ProgressEvent>,
    pub requests: mpsc::UnboundedReceiver<UiRequest>,
}

/// A connected handle/endpoint pair.
pub fn channel() -> (UiHandle, UiEndpoint) {
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    (
        UiHandle {
            progress: progress_tx,
            requests: request_tx,
        },
        UiEndpoint {
            progress: progress_rx,
            requests: request_rx,
        },
    )
}

impl UiHandle {
    /// Fire-and-forget progress. A closed UI is ignored.
    pub fn report_progress(&self, event: ProgressEvent) {
        let _ = self.progress.send(event);
    }

    pub fn status(&self, index: usize, message: impl Into<String>) {
        self.report_progress(ProgressEvent::Status {
            index,
            message: message.into(),
        });
    }

    /// Tell the user about a challenge. The returned receiver resolves when
    /// the user acknowledges; it errors immediately if the UI is gone.
    pub fn notify_challenge(&self, index: usize, message: &str) -> oneshot::Receiver<()> {
        self.report_progress(ProgressEvent::ChallengeDetected {
            index,
            message: message.to_string(),
        });
        let (ack, ack_rx) = oneshot::channel();
        let _ = self.requests.send(UiRequest::Challenge {
            index,
            message: message.to_string(),
            ack,
        });
        ack_rx
    }

    /// Ask whether to run the manual pass. `false` if the UI has gone away.
    pub async fn confirm_manual_fallback(&self, prompt: &str) -> bool {
        let (reply, reply_rx) = oneshot::channel();
        if self
            .requests
            .send(UiRequest::ConfirmManualFallback {
                prompt: prompt.to_string(),
                reply,
            })
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }
}
