//! Pipeline configuration.

use crate::error::PipelineError;
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

/// Capacity of every inter-stage queue unless configured otherwise
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Worker count used when the platform cannot report its parallelism
const FALLBACK_WORKERS: usize = 4;

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(FALLBACK_WORKERS)
}

/// Configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of each bounded queue between stages
    pub queue_capacity: usize,
    /// Size of the worker pool used by the dual-hash stage
    pub signing_workers: usize,
    /// Size of the worker pool used by the expansion stage
    pub expansion_workers: usize,
    /// Give up on the run after this long (None = wait forever)
    pub deadline: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            signing_workers: default_workers(),
            expansion_workers: default_workers(),
            deadline: None,
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would stall or never start a run
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.queue_capacity == 0 {
            return Err(PipelineError::Config(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if self.signing_workers == 0 {
            return Err(PipelineError::Config(
                "signing stage needs at least 1 worker".to_string(),
            ));
        }
        if self.expansion_workers == 0 {
            return Err(PipelineError::Config(
                "expansion stage needs at least 1 worker".to_string(),
            ));
        }
        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(PipelineError::Config(
                "deadline must be longer than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.queue_capacity, 100);
        assert!(config.signing_workers >= 1);
        assert!(config.expansion_workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = PipelineConfig {
            queue_capacity: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = PipelineConfig {
            expansion_workers: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let config = PipelineConfig {
            signing_workers: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn zero_deadline_is_rejected() {
        let config = PipelineConfig {
            deadline: Some(Duration::ZERO),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
