//! # Signer Module
//!
//! The two hash primitives the pipeline is built from.
//!
//! ## Primitives
//! - **checksum** - xxh3-64, decimal. Safe for any number of concurrent callers.
//! - **digest** - BLAKE3-256, hex. Must never run twice at once; callers go
//!   through a [`DigestGate`].
//!
//! ## Example
//! ```rust,ignore
//! use pipeline_signer::core::signer::SignerConfig;
//!
//! let signer = SignerConfig::new()
//!     .digest_delay(Duration::from_millis(10))
//!     .build();
//! ```

mod gate;
mod hash_signer;
mod traits;

pub use gate::DigestGate;
pub use hash_signer::HashSigner;
pub use traits::DataSigner;

use std::sync::Arc;
use std::time::Duration;

/// Configuration builder for the production signer
#[derive(Debug, Clone, Default)]
pub struct SignerConfig {
    /// Simulated latency added to every checksum call
    checksum_delay: Duration,
    /// Simulated latency added to every digest call
    digest_delay: Duration,
}

impl SignerConfig {
    /// Create a configuration with no simulated latency
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every checksum call
    pub fn checksum_delay(mut self, delay: Duration) -> Self {
        self.checksum_delay = delay;
        self
    }

    /// Sleep this long inside every digest call
    ///
    /// A longer delay widens the window in which overlapping digest calls
    /// would be detected.
    pub fn digest_delay(mut self, delay: Duration) -> Self {
        self.digest_delay = delay;
        self
    }

    /// Build the signer
    pub fn build(self) -> Arc<dyn DataSigner> {
        Arc::new(HashSigner::new(self.checksum_delay, self.digest_delay))
    }
}
