//! # Stages Module
//!
//! The three built-in signing stages.
//!
//! ## Chain
//! 1. **SingleHash** - `i64` -> `checksum(x)~checksum(digest(x))`
//! 2. **MultiHash** - six prefixed checksums, concatenated in index order
//! 3. **CombineResults** - sort, join with `_`, emit one value
//!
//! Completion order inside the first two stages is not deterministic; the
//! collector's sort is what makes the final signature reproducible.

mod combine;
mod multi_hash;
mod single_hash;

pub use combine::{combine, CombineResults, COMBINE_RESULTS_STAGE, RESULT_SEPARATOR};
pub use multi_hash::{MultiHash, EXPANSION_FACTOR, MULTI_HASH_STAGE};
pub use single_hash::{SingleHash, SINGLE_HASH_STAGE};

use crate::core::pipeline::{Pipeline, PipelineBuilder, RunContext};
use crate::error::{PipelineError, StageError};
use crossbeam_channel::{bounded, Receiver};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Items a hashing stage keeps in flight per pool thread
const IN_FLIGHT_PER_WORKER: usize = 2;

/// Wire the standard signing chain onto `items`.
pub fn standard_pipeline<I>(builder: PipelineBuilder, items: I) -> Pipeline<String>
where
    I: IntoIterator<Item = i64> + Send + 'static,
{
    builder
        .source(items)
        .stage(SingleHash::new())
        .stage(MultiHash::new())
        .stage(CombineResults::new())
}

/// Build the bounded worker pool a hashing stage runs its items on.
pub(crate) fn worker_pool(
    stage: &'static str,
    workers: usize,
) -> Result<ThreadPool, PipelineError> {
    if workers == 0 {
        return Err(PipelineError::Config(format!(
            "{} stage needs at least 1 worker",
            stage
        )));
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(move |index| format!("{}-{}", stage, index))
        .build()
        .map_err(|e| StageError::WorkerPool {
            stage,
            reason: e.to_string(),
        })?;
    debug!(stage, workers, "worker pool ready");
    Ok(pool)
}

/// Run `work` on `pool` for every item received from `input`.
///
/// At most `IN_FLIGHT_PER_WORKER` items per pool thread are in flight; once
/// that many are started, receiving stops until one finishes, so the rest
/// of the input waits in the upstream queue. Returns after every started
/// item has finished. A failing item fails the run.
pub(crate) fn for_each_item<T, F>(
    ctx: &RunContext,
    pool: &ThreadPool,
    input: &Receiver<T>,
    work: F,
) where
    T: Send,
    F: Fn(T) -> Result<(), PipelineError> + Sync,
{
    let (permits, released) =
        bounded::<()>(pool.current_num_threads() * IN_FLIGHT_PER_WORKER);

    pool.in_place_scope(|scope| {
        for item in input.iter() {
            if ctx.is_cancelled() || permits.send(()).is_err() {
                break;
            }
            let work = &work;
            let released = &released;
            scope.spawn(move |_| {
                if let Err(error) = work(item) {
                    ctx.fail(error);
                }
                // This item's own permit is still queued, so this never misses
                let _ = released.try_recv();
            });
        }
    });
}
