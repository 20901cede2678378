//! Pipeline execution implementation.

use super::{CancellationToken, Emitter, PipelineConfig, RunContext, Stage};
use crate::core::signer::{DataSigner, SignerConfig};
use crate::error::{PipelineError, StageError};
use crate::events::{
    null_sender, EventSender, PipelineEvent, PipelineSummary, StageEvent, StageReport,
};
use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Name reported for the item source
pub const SOURCE_STAGE: &str = "source";

/// Starts the stages of a chain and returns the receive end of its last queue.
type Launcher<T> = Box<
    dyn FnOnce(&Arc<RunContext>, &mut StageSet) -> Result<Receiver<T>, PipelineError> + Send,
>;

/// A running stage thread. `None` means it stopped with an error that has
/// already been recorded on the run context.
struct StageHandle {
    name: &'static str,
    handle: JoinHandle<Option<usize>>,
}

/// The stage threads started for one run.
///
/// Every thread holds a clone of `exited` until it ends, so the matching
/// receiver disconnects once all of them are gone.
struct StageSet {
    handles: Vec<StageHandle>,
    exited: Sender<()>,
}

/// Result of pipeline execution
#[derive(Debug)]
pub struct PipelineResult<T> {
    /// Every value the last stage emitted
    pub outputs: Vec<T>,
    /// Run statistics
    pub summary: PipelineSummary,
}

/// Builder for pipeline configuration
pub struct PipelineBuilder {
    config: PipelineConfig,
    signer: Option<Arc<dyn DataSigner>>,
    cancel: CancellationToken,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            signer: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the capacity of every inter-stage queue
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the worker pool size of the dual-hash stage
    pub fn signing_workers(mut self, workers: usize) -> Self {
        self.config.signing_workers = workers;
        self
    }

    /// Set the worker pool size of the expansion stage
    pub fn expansion_workers(mut self, workers: usize) -> Self {
        self.config.expansion_workers = workers;
        self
    }

    /// Abort the run if it has not finished after `deadline`
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.config.deadline = Some(deadline);
        self
    }

    /// Set the hash primitives
    pub fn signer(mut self, signer: Arc<dyn DataSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Use an externally owned cancellation token
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Start a chain whose first queue is fed from `items`
    pub fn source<I>(self, items: I) -> Pipeline<I::Item>
    where
        I: IntoIterator + Send + 'static,
        I::Item: Send + 'static,
    {
        let launcher: Launcher<I::Item> = Box::new(move |ctx, stages| {
            let (tx, rx) = bounded(ctx.config().queue_capacity);
            spawn_stage(ctx, stages, SOURCE_STAGE, move |ctx| {
                emit_source(ctx, items, tx)
            })?;
            Ok(rx)
        });

        Pipeline {
            config: self.config,
            signer: self.signer.unwrap_or_else(|| SignerConfig::new().build()),
            cancel: self.cancel,
            stage_names: vec![SOURCE_STAGE],
            launcher,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A typed chain of stages ready to run.
///
/// `T` is the item type of the chain's last queue; appending a stage only
/// type-checks if its input matches `T`.
pub struct Pipeline<T> {
    config: PipelineConfig,
    signer: Arc<dyn DataSigner>,
    cancel: CancellationToken,
    stage_names: Vec<&'static str>,
    launcher: Launcher<T>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Append a stage to the chain
    pub fn stage<S>(self, stage: S) -> Pipeline<S::Output>
    where
        S: Stage<Input = T>,
    {
        let Pipeline {
            config,
            signer,
            cancel,
            mut stage_names,
            launcher,
        } = self;
        let name = stage.name();
        stage_names.push(name);

        let launcher: Launcher<S::Output> = Box::new(move |ctx, stages| {
            let input = launcher(ctx, stages)?;
            let (tx, rx) = bounded(ctx.config().queue_capacity);
            spawn_stage(ctx, stages, name, move |ctx| stage.run(ctx, input, tx))?;
            Ok(rx)
        });

        Pipeline {
            config,
            signer,
            cancel,
            stage_names,
            launcher,
        }
    }

    /// Names of the chain's links, source first
    pub fn stage_names(&self) -> &[&'static str] {
        &self.stage_names
    }

    /// Run the pipeline without events
    pub fn run(self) -> Result<PipelineResult<T>, PipelineError> {
        self.run_with_events(&null_sender())
    }

    /// Run a pipeline whose last stage emits exactly one value
    pub fn run_single(self) -> Result<T, PipelineError> {
        self.run_single_with_events(&null_sender())
    }

    /// Like [`run_single`](Self::run_single), with event reporting
    pub fn run_single_with_events(self, events: &EventSender) -> Result<T, PipelineError> {
        let stage = self.stage_names.last().copied().unwrap_or(SOURCE_STAGE);
        let outputs = self.run_with_events(events)?.outputs;
        let found = outputs.len();

        match <[T; 1]>::try_from(outputs) {
            Ok([value]) => Ok(value),
            Err(_) => Err(StageError::ShapeMismatch {
                stage,
                expected: 1,
                found,
            }
            .into()),
        }
    }

    /// Run the pipeline with event reporting
    ///
    /// Returns once the last queue is closed and every stage thread has been
    /// joined, or as soon as the deadline passes. On failure no partial
    /// output is returned.
    pub fn run_with_events(
        self,
        events: &EventSender,
    ) -> Result<PipelineResult<T>, PipelineError> {
        self.config.validate()?;

        let start_time = Instant::now();
        let started_at = Utc::now();
        let stage_names = self.stage_names;
        let ctx = Arc::new(RunContext::new(
            self.config,
            self.signer,
            self.cancel,
            events.clone(),
        ));
        let run_id = ctx.run_id();

        info!(%run_id, stages = ?stage_names, "pipeline started");
        events.pipeline(PipelineEvent::Started {
            run_id,
            stages: stage_names.iter().map(|s| s.to_string()).collect(),
        });

        let (exited_tx, exited_rx) = unbounded();
        let mut stages = StageSet {
            handles: Vec::with_capacity(stage_names.len()),
            exited: exited_tx,
        };
        let launched = (self.launcher)(&ctx, &mut stages);
        let StageSet { handles, exited } = stages;
        drop(exited);

        let deadline = ctx.config().deadline;
        let deadline_at = deadline.map(|d| start_time + d);

        let terminal = match launched {
            Ok(terminal) => terminal,
            Err(error) => {
                ctx.fail(error);
                if wait_for_exit(&exited_rx, deadline_at) {
                    join_stages(&ctx, handles);
                }
                return Err(finish_failed(&ctx, events));
            }
        };

        let outputs = drain(&terminal, deadline_at);
        drop(terminal);

        // The last queue can close while upstream stages are still busy, so
        // the deadline covers their exit too
        let outputs = match outputs {
            Some(outputs) if wait_for_exit(&exited_rx, deadline_at) => outputs,
            _ => {
                ctx.fail(
                    StageError::DeadlineExceeded {
                        timeout_ms: deadline.map_or(0, millis),
                    }
                    .into(),
                );
                // Stage threads are detached; they stop at their next cancellation check
                return Err(finish_failed(&ctx, events));
            }
        };

        let stages = join_stages(&ctx, handles);
        if ctx.is_cancelled() {
            return Err(finish_failed(&ctx, events));
        }

        let summary = PipelineSummary {
            run_id,
            started_at,
            stages,
            duration_ms: millis(start_time.elapsed()),
        };

        info!(
            %run_id,
            items = summary.source_items(),
            outputs = outputs.len(),
            duration_ms = summary.duration_ms,
            "pipeline completed"
        );
        events.pipeline(PipelineEvent::Completed {
            summary: summary.clone(),
        });

        Ok(PipelineResult { outputs, summary })
    }
}

fn emit_source<I>(
    ctx: &RunContext,
    items: I,
    output: Sender<I::Item>,
) -> Result<usize, PipelineError>
where
    I: IntoIterator,
{
    let emitter = Emitter::new(ctx, SOURCE_STAGE, &output);
    for item in items {
        ctx.ensure_running()?;
        emitter.emit(item)?;
    }
    Ok(emitter.emitted())
}

/// Start `body` on its own named thread and add it to `stages`.
fn spawn_stage<F>(
    ctx: &Arc<RunContext>,
    stages: &mut StageSet,
    name: &'static str,
    body: F,
) -> Result<(), PipelineError>
where
    F: FnOnce(&RunContext) -> Result<usize, PipelineError> + Send + 'static,
{
    let ctx = Arc::clone(ctx);
    let exited = stages.exited.clone();
    let handle = thread::Builder::new()
        .name(format!("stage-{}", name))
        .spawn(move || {
            // Dropped when the thread ends, panics included
            let _exited = exited;
            debug!(stage = name, "stage started");
            ctx.events().stage(StageEvent::Started {
                stage: name.to_string(),
            });

            match body(&ctx) {
                Ok(items_emitted) => {
                    debug!(stage = name, items_emitted, "stage completed");
                    ctx.events().stage(StageEvent::Completed {
                        stage: name.to_string(),
                        items_emitted,
                    });
                    Some(items_emitted)
                }
                Err(error) if error.is_cancellation() => {
                    debug!(stage = name, "stage stopped after cancellation");
                    None
                }
                Err(error) => {
                    ctx.events().stage(StageEvent::Failed {
                        stage: name.to_string(),
                        message: error.to_string(),
                    });
                    ctx.fail(error);
                    None
                }
            }
        })
        .map_err(|source| StageError::Spawn {
            stage: name,
            source,
        })?;

    stages.handles.push(StageHandle { name, handle });
    Ok(())
}

/// Collect everything from the last queue until it closes.
///
/// Returns `None` if `deadline` passes first.
fn drain<T>(terminal: &Receiver<T>, deadline: Option<Instant>) -> Option<Vec<T>> {
    let mut outputs = Vec::new();
    loop {
        let next = match deadline {
            Some(deadline) => terminal.recv_deadline(deadline),
            None => terminal.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match next {
            Ok(value) => outputs.push(value),
            Err(RecvTimeoutError::Disconnected) => return Some(outputs),
            Err(RecvTimeoutError::Timeout) => return None,
        }
    }
}

/// Wait until every stage thread has ended.
///
/// Returns `false` if `deadline` passes first.
fn wait_for_exit(exited: &Receiver<()>, deadline: Option<Instant>) -> bool {
    // Nothing is ever sent; the receiver only reports disconnection
    match deadline {
        Some(deadline) => !matches!(
            exited.recv_deadline(deadline),
            Err(RecvTimeoutError::Timeout)
        ),
        None => {
            let _ = exited.recv();
            true
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn join_stages(ctx: &RunContext, handles: Vec<StageHandle>) -> Vec<StageReport> {
    handles
        .into_iter()
        .map(|StageHandle { name, handle }| {
            let items_emitted = match handle.join() {
                Ok(emitted) => emitted.unwrap_or(0),
                Err(_) => {
                    ctx.fail(StageError::Panicked { stage: name }.into());
                    0
                }
            };
            StageReport {
                stage: name.to_string(),
                items_emitted,
            }
        })
        .collect()
}

/// Turn a wound-down run into the one error its caller sees.
fn finish_failed(ctx: &RunContext, events: &EventSender) -> PipelineError {
    let run_id = ctx.run_id();
    match ctx.take_failure() {
        Some(error) => {
            events.pipeline(PipelineEvent::Error {
                run_id,
                message: error.to_string(),
            });
            error
        }
        None => {
            warn!(%run_id, "pipeline cancelled");
            events.pipeline(PipelineEvent::Cancelled { run_id });
            StageError::Cancelled.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignerError;
    use crate::events::{Event, EventChannel};

    /// Doubles every number it sees.
    struct Doubler;

    impl Stage for Doubler {
        type Input = i64;
        type Output = i64;

        fn name(&self) -> &'static str {
            "doubler"
        }

        fn run(
            &self,
            ctx: &RunContext,
            input: Receiver<i64>,
            output: Sender<i64>,
        ) -> Result<usize, PipelineError> {
            let emitter = Emitter::new(ctx, self.name(), &output);
            for value in input {
                emitter.emit(value * 2)?;
            }
            Ok(emitter.emitted())
        }
    }

    /// Sums its whole input into one value.
    struct Summer;

    impl Stage for Summer {
        type Input = i64;
        type Output = i64;

        fn name(&self) -> &'static str {
            "summer"
        }

        fn run(
            &self,
            ctx: &RunContext,
            input: Receiver<i64>,
            output: Sender<i64>,
        ) -> Result<usize, PipelineError> {
            let total: i64 = input.iter().sum();
            Emitter::new(ctx, self.name(), &output).emit(total)?;
            Ok(1)
        }
    }

    /// Fails on the first item it receives.
    struct Failing;

    impl Stage for Failing {
        type Input = i64;
        type Output = i64;

        fn name(&self) -> &'static str {
            "failing"
        }

        fn run(
            &self,
            _ctx: &RunContext,
            input: Receiver<i64>,
            _output: Sender<i64>,
        ) -> Result<usize, PipelineError> {
            match input.recv() {
                Ok(value) => Err(SignerError::Failed {
                    primitive: "checksum",
                    input: value.to_string(),
                    reason: "refused".to_string(),
                }
                .into()),
                Err(_) => Ok(0),
            }
        }
    }

    /// Panics on the first item it receives.
    struct Panicking;

    impl Stage for Panicking {
        type Input = i64;
        type Output = i64;

        fn name(&self) -> &'static str {
            "panicking"
        }

        fn run(
            &self,
            _ctx: &RunContext,
            input: Receiver<i64>,
            _output: Sender<i64>,
        ) -> Result<usize, PipelineError> {
            if input.recv().is_ok() {
                panic!("stage blew up");
            }
            Ok(0)
        }
    }

    /// Holds its thread well past any test deadline, ignoring cancellation.
    struct Stalled;

    impl Stage for Stalled {
        type Input = i64;
        type Output = i64;

        fn name(&self) -> &'static str {
            "stalled"
        }

        fn run(
            &self,
            _ctx: &RunContext,
            input: Receiver<i64>,
            _output: Sender<i64>,
        ) -> Result<usize, PipelineError> {
            let _ = input.recv();
            thread::sleep(Duration::from_millis(1500));
            Ok(0)
        }
    }

    /// Returns straight away, closing its output before upstream is done.
    struct Quitter;

    impl Stage for Quitter {
        type Input = i64;
        type Output = i64;

        fn name(&self) -> &'static str {
            "quitter"
        }

        fn run(
            &self,
            _ctx: &RunContext,
            _input: Receiver<i64>,
            _output: Sender<i64>,
        ) -> Result<usize, PipelineError> {
            Ok(0)
        }
    }

    #[test]
    fn pipeline_builder_records_stage_names() {
        let pipeline = PipelineBuilder::new()
            .queue_capacity(8)
            .source(vec![1_i64, 2, 3])
            .stage(Doubler)
            .stage(Summer);

        assert_eq!(pipeline.stage_names(), &["source", "doubler", "summer"]);
    }

    #[test]
    fn pipeline_runs_chain_to_completion() {
        let result = PipelineBuilder::new()
            .source(vec![1_i64, 2, 3])
            .stage(Doubler)
            .stage(Doubler)
            .run()
            .unwrap();

        assert_eq!(result.outputs, vec![4, 8, 12]);
        assert_eq!(result.summary.source_items(), 3);
        assert_eq!(result.summary.stages.len(), 3);
        assert!(result.summary.stages.iter().all(|s| s.items_emitted == 3));
    }

    #[test]
    fn pipeline_handles_empty_source() {
        let total = PipelineBuilder::new()
            .source(Vec::<i64>::new())
            .stage(Doubler)
            .stage(Summer)
            .run_single()
            .unwrap();

        assert_eq!(total, 0);
    }

    #[test]
    fn small_queues_apply_backpressure_without_deadlock() {
        let total = PipelineBuilder::new()
            .queue_capacity(1)
            .source(1..=1000_i64)
            .stage(Doubler)
            .stage(Summer)
            .run_single()
            .unwrap();

        assert_eq!(total, 1000 * 1001);
    }

    #[test]
    fn run_single_rejects_multiple_outputs() {
        let error = PipelineBuilder::new()
            .source(vec![1_i64, 2])
            .stage(Doubler)
            .run_single()
            .unwrap_err();

        assert!(matches!(
            error,
            PipelineError::Stage(StageError::ShapeMismatch {
                stage: "doubler",
                expected: 1,
                found: 2,
            })
        ));
    }

    #[test]
    fn stage_error_is_surfaced_without_partial_output() {
        let error = PipelineBuilder::new()
            .source(0..10_000_i64)
            .stage(Failing)
            .stage(Summer)
            .run()
            .unwrap_err();

        assert!(matches!(error, PipelineError::Signer(SignerError::Failed { .. })));
    }

    #[test]
    fn stage_panic_is_reported() {
        let error = PipelineBuilder::new()
            .source(vec![1_i64, 2, 3])
            .stage(Panicking)
            .stage(Summer)
            .run()
            .unwrap_err();

        assert!(matches!(
            error,
            PipelineError::Stage(StageError::Panicked { stage: "panicking" })
        ));
    }

    #[test]
    fn deadline_covers_stages_still_busy_after_the_last_queue_closes() {
        let start = Instant::now();
        let error = PipelineBuilder::new()
            .deadline(Duration::from_millis(100))
            .source(vec![1_i64, 2, 3])
            .stage(Stalled)
            .stage(Quitter)
            .run()
            .unwrap_err();

        assert!(matches!(
            error,
            PipelineError::Stage(StageError::DeadlineExceeded { timeout_ms: 100 })
        ));
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let error = PipelineBuilder::new()
            .queue_capacity(0)
            .source(vec![1_i64])
            .run()
            .unwrap_err();

        assert!(matches!(error, PipelineError::Config(_)));
    }

    #[test]
    fn pre_cancelled_run_reports_cancellation() {
        let token = CancellationToken::new();
        token.cancel();

        let error = PipelineBuilder::new()
            .cancellation(token)
            .source(vec![1_i64, 2, 3])
            .stage(Doubler)
            .run()
            .unwrap_err();

        assert!(error.is_cancellation());
    }

    #[test]
    fn events_bracket_a_successful_run() {
        let (sender, receiver) = EventChannel::new();

        PipelineBuilder::new()
            .source(vec![5_i64])
            .stage(Doubler)
            .run_with_events(&sender)
            .unwrap();
        drop(sender);

        let events: Vec<Event> = receiver.iter().collect();
        assert!(matches!(
            events.first(),
            Some(Event::Pipeline(PipelineEvent::Started { .. }))
        ));
        assert!(matches!(
            events.last(),
            Some(Event::Pipeline(PipelineEvent::Completed { .. }))
        ));
        let completed_stages = events
            .iter()
            .filter(|e| matches!(e, Event::Stage(StageEvent::Completed { .. })))
            .count();
        assert_eq!(completed_stages, 2);
    }
}
