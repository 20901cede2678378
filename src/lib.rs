//! # Pipeline Signer
//!
//! Computes a deterministic combined signature over a sequence of integers
//! by pushing them through a chain of concurrent hashing stages.
//!
//! ## Guarantees
//! - **Deterministic** - the same input always yields the same signature,
//!   whatever order the stages finish their items in
//! - **Serialized digests** - at most one digest call is in flight per run
//! - **All or nothing** - a failing run returns its first error, never a
//!   partial signature
//!
//! ## Architecture
//! - `core` - The signing engine
//! - `events` - Event-driven progress reporting
//! - `error` - Error types

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{PipelineError, Result};

use crate::core::{standard_pipeline, PipelineBuilder};

/// Sign `items` with the default configuration and primitives.
pub fn sign(items: &[i64]) -> Result<String> {
    standard_pipeline(PipelineBuilder::new(), items.to_vec()).run_single()
}

/// Initialize tracing for the library
///
/// This should be called by the application entry point. Does nothing if a
/// global subscriber is already installed.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
