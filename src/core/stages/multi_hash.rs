//! Six-way expansion stage.

use super::{for_each_item, worker_pool};
use crate::core::pipeline::{Emitter, RunContext, Stage};
use crate::error::PipelineError;
use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;

/// Stage name used in events and errors
pub const MULTI_HASH_STAGE: &str = "multi_hash";

/// Number of prefixed checksums computed per item
pub const EXPANSION_FACTOR: usize = 6;

/// Expands every item into `checksum("0" + x) + ... + checksum("5" + x)`.
///
/// Items run on a bounded rayon pool owned by the stage; the six checksums
/// of one item run as an indexed parallel iterator, so their concatenation
/// order is the index order no matter which finishes first.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiHash {
    workers: Option<usize>,
}

impl MultiHash {
    /// Use the run's `expansion_workers` setting
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the pool size for this stage only
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: Some(workers),
        }
    }

    /// Expand one item.
    pub fn expand(ctx: &RunContext, item: &str) -> Result<String, PipelineError> {
        let parts: Vec<Result<String, PipelineError>> = (0..EXPANSION_FACTOR)
            .into_par_iter()
            .map(|index| ctx.checksum(format!("{}{}", index, item).as_bytes()))
            .collect();

        parts
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.concat())
    }
}

impl Stage for MultiHash {
    type Input = String;
    type Output = String;

    fn name(&self) -> &'static str {
        MULTI_HASH_STAGE
    }

    fn run(
        &self,
        ctx: &RunContext,
        input: Receiver<String>,
        output: Sender<String>,
    ) -> Result<usize, PipelineError> {
        let workers = self.workers.unwrap_or(ctx.config().expansion_workers);
        let pool = worker_pool(MULTI_HASH_STAGE, workers)?;

        let emitter = Emitter::new(ctx, MULTI_HASH_STAGE, &output);
        for_each_item(ctx, &pool, &input, |item: String| {
            Self::expand(ctx, &item).and_then(|expanded| emitter.emit(expanded))
        });

        ctx.ensure_running()?;
        Ok(emitter.emitted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::{CancellationToken, PipelineConfig};
    use crate::core::signer::DataSigner;
    use crate::core::stages::testing::{FailingSigner, StubSigner};
    use crate::events::null_sender;
    use crossbeam_channel::bounded;
    use std::sync::Arc;

    fn context(signer: Arc<dyn DataSigner>) -> RunContext {
        RunContext::new(
            PipelineConfig::default(),
            signer,
            CancellationToken::new(),
            null_sender(),
        )
    }

    fn run_stage(
        stage: MultiHash,
        ctx: &RunContext,
        items: &[&str],
    ) -> Result<Vec<String>, PipelineError> {
        let (in_tx, in_rx) = bounded(items.len().max(1));
        for item in items {
            in_tx.send(item.to_string()).unwrap();
        }
        drop(in_tx);

        let (out_tx, out_rx) = bounded(items.len().max(1));
        stage.run(ctx, in_rx, out_tx)?;
        let mut outputs: Vec<String> = out_rx.iter().collect();
        outputs.sort();
        Ok(outputs)
    }

    #[test]
    fn expansion_concatenates_in_index_order() {
        let ctx = context(Arc::new(StubSigner));
        assert_eq!(MultiHash::expand(&ctx, "x").unwrap(), "0x1x2x3x4x5x");
    }

    #[test]
    fn index_order_holds_with_a_single_worker() {
        let ctx = context(Arc::new(StubSigner));
        let outputs = run_stage(MultiHash::with_workers(1), &ctx, &["a", "b"]).unwrap();
        assert_eq!(outputs, vec!["0a1a2a3a4a5a", "0b1b2b3b4b5b"]);
    }

    #[test]
    fn many_items_on_a_small_pool() {
        let ctx = context(Arc::new(StubSigner));
        let items: Vec<String> = (0..200).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = items.iter().map(String::as_str).collect();

        let outputs = run_stage(MultiHash::with_workers(2), &ctx, &refs).unwrap();
        assert_eq!(outputs.len(), 200);
        assert!(outputs.contains(&"019911992199319941995199".to_string()));
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let ctx = context(Arc::new(StubSigner));
        let error = run_stage(MultiHash::with_workers(0), &ctx, &["a"]).unwrap_err();
        assert!(matches!(error, PipelineError::Config(_)));
    }

    #[test]
    fn checksum_failure_fails_the_stage() {
        let ctx = context(Arc::new(FailingSigner));
        let error = run_stage(MultiHash::new(), &ctx, &["a"]).unwrap_err();
        assert!(error.is_cancellation());
        assert!(ctx.take_failure().is_some());
    }
}
