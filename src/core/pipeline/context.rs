//! State shared by every stage of one run.

use super::PipelineConfig;
use crate::core::signer::{DataSigner, DigestGate};
use crate::error::{PipelineError, StageError};
use crate::events::{EventSender, StageEvent, StageProgress};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;
use uuid::Uuid;

/// Cooperative cancellation flag.
///
/// Clones share the same flag. Stages poll it between items; sub-tasks poll
/// it before each primitive call.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Everything a stage may touch while a run is in progress.
///
/// Owns the run's digest gate and its first-failure slot; nothing else in
/// a run is shared and mutable.
pub struct RunContext {
    run_id: Uuid,
    config: PipelineConfig,
    signer: Arc<dyn DataSigner>,
    gate: DigestGate,
    cancel: CancellationToken,
    events: EventSender,
    failure: Mutex<Option<PipelineError>>,
}

impl RunContext {
    pub fn new(
        config: PipelineConfig,
        signer: Arc<dyn DataSigner>,
        cancel: CancellationToken,
        events: EventSender,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            signer,
            gate: DigestGate::new(),
            cancel,
            events,
            failure: Mutex::new(None),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Checksum primitive. Never gated.
    pub fn checksum(&self, data: &[u8]) -> Result<String, PipelineError> {
        self.ensure_running()?;
        Ok(self.signer.checksum(data)?)
    }

    /// Digest primitive, admitted through the run's gate.
    /// Cancellation is checked again once admitted.
    pub fn digest(&self, data: &[u8]) -> Result<String, PipelineError> {
        self.ensure_running()?;
        let _admitted = self.gate.enter();
        self.ensure_running()?;
        Ok(self.signer.digest(data)?)
    }

    /// `Err(Cancelled)` once the run is being wound down.
    pub fn ensure_running(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(StageError::Cancelled.into());
        }
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Record a failure and cancel the run.
    ///
    /// Only the first failure is kept. Cancellation reports are dropped:
    /// they are a consequence of some other failure, not a cause.
    pub fn fail(&self, error: PipelineError) {
        if error.is_cancellation() {
            return;
        }
        {
            let mut slot = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                warn!(run_id = %self.run_id, error = %error, "pipeline run failed");
                *slot = Some(error);
            }
        }
        self.cancel.cancel();
    }

    /// Remove and return the recorded failure, if any.
    pub(crate) fn take_failure(&self) -> Option<PipelineError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn report_progress(&self, stage: &'static str, emitted: usize) {
        self.events.stage(StageEvent::Progress(StageProgress {
            stage: stage.to_string(),
            emitted,
        }));
    }
}
