//! # Core Module
//!
//! The signing engine, independent of any front end.
//!
//! ## Modules
//! - `signer` - The checksum and digest primitives plus the digest gate
//! - `pipeline` - Typed stage chains, bounded queues and the executor
//! - `stages` - The built-in signing stages and the standard chain

pub mod pipeline;
pub mod signer;
pub mod stages;

// Re-export commonly used types
pub use pipeline::{CancellationToken, Pipeline, PipelineBuilder, PipelineConfig, PipelineResult};
pub use signer::{DataSigner, HashSigner, SignerConfig};
pub use stages::{standard_pipeline, CombineResults, MultiHash, SingleHash};
