//! Order-independent collector stage.

use crate::core::pipeline::{Emitter, RunContext, Stage};
use crate::error::PipelineError;
use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

/// Stage name used in events and errors
pub const COMBINE_RESULTS_STAGE: &str = "combine_results";

/// Separator placed between collected results
pub const RESULT_SEPARATOR: &str = "_";

/// Sort `values` byte-wise and join them with `_`.
///
/// The result depends only on the multiset of values, never on the order
/// they arrived in.
pub fn combine(mut values: Vec<String>) -> String {
    values.sort_unstable();
    values.join(RESULT_SEPARATOR)
}

/// Collects the whole upstream output into one string.
#[derive(Debug, Clone, Copy, Default)]
pub struct CombineResults;

impl CombineResults {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for CombineResults {
    type Input = String;
    type Output = String;

    fn name(&self) -> &'static str {
        COMBINE_RESULTS_STAGE
    }

    fn run(
        &self,
        ctx: &RunContext,
        input: Receiver<String>,
        output: Sender<String>,
    ) -> Result<usize, PipelineError> {
        let collected: Vec<String> = input.iter().collect();
        // An upstream failure closes the queue early; never combine a partial set
        ctx.ensure_running()?;

        debug!(
            stage = COMBINE_RESULTS_STAGE,
            items = collected.len(),
            "combining results"
        );
        Emitter::new(ctx, COMBINE_RESULTS_STAGE, &output).emit(combine(collected))?;
        Ok(1)
    }
}
