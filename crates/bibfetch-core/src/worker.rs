//! Running the orchestrator on its own thread.
//!
//! The presentation side keeps its own event loop; the worker owns a
//! single-threaded runtime and processes references sequentially.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::coordinator::Orchestrator;
use crate::error::CoreError;
use crate::interaction::UiHandle;
use crate::session::SessionProvider;
use crate::{Config, RunControl, RunSummary};

/// A running pipeline.
pub struct Worker {
    handle: JoinHandle<RunSummary>,
    control: RunControl,
}

impl Worker {
    /// Skip/cancel handle shared with the running pipeline.
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the run is over.
    pub fn join(self) -> Result<RunSummary, CoreError> {
        self.handle.join().map_err(|_| CoreError::WorkerPanicked)
    }
}

/// Start the pipeline for `text` on a dedicated thread.
pub fn spawn_worker(
    text: String,
    config: Config,
    provider: Arc<dyn SessionProvider>,
    ui: UiHandle,
) -> Result<Worker, CoreError> {
    let control = RunControl::new();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let worker_control = control.clone();
    let handle = std::thread::Builder::new()
        .name("bibfetch-worker".into())
        .spawn(move || {
            let orchestrator = Orchestrator::new(config, provider, ui, worker_control);
            runtime.block_on(orchestrator.run(&text))
        })?;

    Ok(Worker { handle, control })
}
