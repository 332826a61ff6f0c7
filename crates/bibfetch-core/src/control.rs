//! Cooperative cancellation shared by the UI and the worker.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// Run-wide cancellation plus a per-reference "skip" token.
///
/// Each reference gets a child of the run token, so cancelling the run also
/// skips whatever reference is in flight, while skipping only aborts that one.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    run: CancellationToken,
    current: Arc<Mutex<CancellationToken>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the whole run. References not yet reached end as "run cancelled".
    pub fn cancel_run(&self) {
        self.run.cancel();
    }

    /// Abort only the reference currently being processed.
    pub fn skip_current(&self) {
        if let Ok(current) = self.current.lock() {
            current.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.run.is_cancelled()
    }

    pub fn run_token(&self) -> CancellationToken {
        self.run.clone()
    }

    /// Fresh skip token for the next reference.
    pub fn begin_reference(&self) -> CancellationToken {
        let token = self.run.child_token();
        if let Ok(mut current) = self.current.lock() {
            *current = token.clone();
        }
        token
    }
}
