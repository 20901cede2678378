//! Trait definition for the hash primitives.

use crate::error::SignerError;

/// The two primitives every signing stage is built from.
///
/// `checksum` may be called from any number of threads at once.
/// `digest` may not: implementations are free to fail (or worse) when two
/// calls overlap, so callers must route it through a
/// [`DigestGate`](super::DigestGate).
pub trait DataSigner: Send + Sync {
    /// Fast, non-cryptographic checksum.
    fn checksum(&self, data: &[u8]) -> Result<String, SignerError>;

    /// Cryptographic digest. Not reentrant.
    fn digest(&self, data: &[u8]) -> Result<String, SignerError>;
}
