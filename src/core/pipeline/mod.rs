//! # Pipeline Module
//!
//! Runs a typed chain of concurrent stages connected by bounded queues.
//!
//! ## Lifecycle
//! 1. **Build** - `PipelineBuilder::source(items)` then `.stage(..)` per link;
//!    adjacent item types are checked by the compiler
//! 2. **Launch** - one named thread per link, one bounded queue between links
//! 3. **Drain** - the caller collects the last queue until it closes
//! 4. **Join** - every stage thread is joined; the first failure wins
//!
//! ## Concurrency
//! A stage closes its output only by returning from `Stage::run`, and it may
//! only return once every sub-task it started has been joined.

mod config;
mod context;
mod executor;
mod stage;

pub use config::{PipelineConfig, DEFAULT_QUEUE_CAPACITY};
pub use context::{CancellationToken, RunContext};
pub use executor::{Pipeline, PipelineBuilder, PipelineResult, SOURCE_STAGE};
pub use stage::{Emitter, Stage};
