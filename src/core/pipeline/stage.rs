//! The stage abstraction.

use super::RunContext;
use crate::error::{PipelineError, StageError};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};

/// One link of a pipeline.
///
/// `run` owns the send end of the stage's output queue; dropping it on
/// return is what closes the queue. Implementations must not return before
/// every sub-task they spawned for already-received items has finished.
pub trait Stage: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Stable name used in events, logs and errors
    fn name(&self) -> &'static str;

    /// Process `input` until it is closed and drained.
    ///
    /// Returns the number of items sent to `output`.
    fn run(
        &self,
        ctx: &RunContext,
        input: Receiver<Self::Input>,
        output: Sender<Self::Output>,
    ) -> Result<usize, PipelineError>;
}

/// Counting, event-publishing wrapper around a stage's output queue.
///
/// Shared by reference between a stage's sub-tasks.
pub struct Emitter<'a, T> {
    ctx: &'a RunContext,
    stage: &'static str,
    output: &'a Sender<T>,
    emitted: AtomicUsize,
}

impl<'a, T> Emitter<'a, T> {
    pub fn new(ctx: &'a RunContext, stage: &'static str, output: &'a Sender<T>) -> Self {
        Self {
            ctx,
            stage,
            output,
            emitted: AtomicUsize::new(0),
        }
    }

    /// Send one value downstream, blocking while the queue is full.
    ///
    /// A closed downstream queue means the consumer is gone; the run is
    /// cancelled and `Cancelled` is returned.
    pub fn emit(&self, value: T) -> Result<(), PipelineError> {
        if self.output.send(value).is_err() {
            self.ctx.cancel();
            return Err(StageError::Cancelled.into());
        }
        let emitted = self.emitted.fetch_add(1, Ordering::SeqCst) + 1;
        self.ctx.report_progress(self.stage, emitted);
        Ok(())
    }

    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }
}
