//! Dual-hash stage: `checksum(x) + "~" + checksum(digest(x))`.

use super::{for_each_item, worker_pool};
use crate::core::pipeline::{Emitter, RunContext, Stage};
use crate::error::PipelineError;
use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

/// Stage name used in events and errors
pub const SINGLE_HASH_STAGE: &str = "single_hash";

/// Hashes every source number twice, once through the digest.
///
/// Items run on a bounded rayon pool owned by the stage. Inside an item the
/// digest chain and the plain checksum are forked with `rayon::join`, so the
/// checksum can be picked up by an idle worker while the digest waits for
/// the run's gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleHash {
    workers: Option<usize>,
}

impl SingleHash {
    /// Use the run's `signing_workers` setting
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the pool size for this stage only
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: Some(workers),
        }
    }

    /// Sign one item rendered as text.
    pub fn sign_item(ctx: &RunContext, data: &str) -> Result<String, PipelineError> {
        let (chained, plain) = rayon::join(
            || {
                ctx.digest(data.as_bytes())
                    .and_then(|digest| ctx.checksum(digest.as_bytes()))
            },
            || ctx.checksum(data.as_bytes()),
        );

        Ok(format!("{}~{}", plain?, chained?))
    }
}

impl Stage for SingleHash {
    type Input = i64;
    type Output = String;

    fn name(&self) -> &'static str {
        SINGLE_HASH_STAGE
    }

    fn run(
        &self,
        ctx: &RunContext,
        input: Receiver<i64>,
        output: Sender<String>,
    ) -> Result<usize, PipelineError> {
        let workers = self.workers.unwrap_or(ctx.config().signing_workers);
        let pool = worker_pool(SINGLE_HASH_STAGE, workers)?;

        let emitter = Emitter::new(ctx, SINGLE_HASH_STAGE, &output);
        for_each_item(ctx, &pool, &input, |item: i64| {
            let signed = Self::sign_item(ctx, &item.to_string())?;
            debug!(stage = SINGLE_HASH_STAGE, item, %signed, "item signed");
            emitter.emit(signed)
        });

        ctx.ensure_running()?;
        Ok(emitter.emitted())
    }
}
