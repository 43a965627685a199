//! Background pipeline runs that can be polled and cancelled.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::progress::ProgressCallback;
use crate::result::PipelineResult;
use connector::ConnectorFactory;
use inventory::Inventory;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Handle to a pipeline running on its own thread
pub struct PipelineHandle {
    cancel: CancelToken,
    status: Arc<Mutex<PipelineResult>>,
    thread: JoinHandle<()>,
}

impl PipelineHandle {
    /// Start `pipeline` in the background
    pub fn spawn(
        pipeline: Pipeline,
        inventory: Arc<Inventory>,
        factory: Arc<dyn ConnectorFactory>,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<Self> {
        let cancel = CancelToken::new();
        let status = Arc::new(Mutex::new(PipelineResult::default()));

        let thread = {
            let cancel = cancel.clone();
            let status = Arc::clone(&status);
            thread::Builder::new()
                .name(format!("pipeline-{}", pipeline.name))
                .spawn(move || {
                    pipeline.execute(&inventory, factory.as_ref(), progress.as_ref(), &cancel, &status);
                })?
        };

        Ok(Self {
            cancel,
            status,
            thread,
        })
    }

    /// Snapshot of the phase and the tasks recorded so far
    pub fn status(&self) -> PipelineResult {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop dispatching new tasks and hosts; in-flight commands finish
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check if the run thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to end and return its final result
    pub fn wait(self) -> Result<PipelineResult> {
        let Self { status, thread, .. } = self;
        if thread.join().is_err() {
            return Err(Error::Runtime("pipeline thread panicked".to_string()));
        }
        let result = status.lock().unwrap_or_else(PoisonError::into_inner).clone();
        Ok(result)
    }
}
