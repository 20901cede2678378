//! Event type definitions for progress reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// All events emitted by a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Pipeline-level events
    Pipeline(PipelineEvent),
    /// Per-stage events
    Stage(StageEvent),
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Run has started with the given chain of stages
    Started { run_id: Uuid, stages: Vec<String> },
    /// Run completed successfully
    Completed { summary: PipelineSummary },
    /// Run was cancelled or timed out
    Cancelled { run_id: Uuid },
    /// Run failed; `message` is the error returned to the caller
    Error { run_id: Uuid, message: String },
}

/// Events emitted by individual stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageEvent {
    /// Stage thread is up and waiting for input
    Started { stage: String },
    /// Stage handed one more item to the next queue
    Progress(StageProgress),
    /// Stage drained its input and closed its output
    Completed { stage: String, items_emitted: usize },
    /// Stage stopped with an error
    Failed { stage: String, message: String },
}

/// Progress information for one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageProgress {
    /// Name of the reporting stage
    pub stage: String,
    /// Items emitted by this stage so far
    pub emitted: usize,
}

/// Items emitted by one stage over a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub items_emitted: usize,
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Per-stage emitted counts, source first
    pub stages: Vec<StageReport>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl PipelineSummary {
    /// Number of items the source emitted
    pub fn source_items(&self) -> usize {
        self.stages.first().map_or(0, |s| s.items_emitted)
    }
}
