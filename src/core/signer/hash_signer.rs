//! Production primitives: xxh3 checksums and BLAKE3 digests.

use super::DataSigner;
use crate::error::SignerError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use xxhash_rust::xxh3::xxh3_64;

/// Signer backed by xxh3-64 (checksum) and BLAKE3 (digest).
///
/// Checksums are rendered as unsigned decimal, digests as lowercase hex.
/// The digest side detects overlapping callers and fails the late one with
/// [`SignerError::Overheat`].
#[derive(Debug, Default)]
pub struct HashSigner {
    checksum_delay: Duration,
    digest_delay: Duration,
    digests_in_flight: AtomicUsize,
}

impl HashSigner {
    /// Create a signer with simulated latencies
    pub fn new(checksum_delay: Duration, digest_delay: Duration) -> Self {
        Self {
            checksum_delay,
            digest_delay,
            digests_in_flight: AtomicUsize::new(0),
        }
    }
}

/// Decrements the in-flight counter when a digest call ends, however it ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DataSigner for HashSigner {
    fn checksum(&self, data: &[u8]) -> Result<String, SignerError> {
        if !self.checksum_delay.is_zero() {
            thread::sleep(self.checksum_delay);
        }
        Ok(xxh3_64(data).to_string())
    }

    fn digest(&self, data: &[u8]) -> Result<String, SignerError> {
        let previous = self.digests_in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight(&self.digests_in_flight);
        if previous > 0 {
            return Err(SignerError::Overheat {
                primitive: "digest",
                in_flight: previous + 1,
            });
        }

        if !self.digest_delay.is_zero() {
            thread::sleep(self.digest_delay);
        }
        Ok(blake3::hash(data).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn checksum_is_decimal_xxh3() {
        let signer = HashSigner::default();
        assert_eq!(signer.checksum(b"7").unwrap(), "499566431179015674");
        assert_eq!(signer.checksum(b"").unwrap(), xxh3_64(b"").to_string());
    }

    #[test]
    fn digest_is_hex_blake3() {
        let signer = HashSigner::default();
        assert_eq!(
            signer.digest(b"").unwrap(),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
        assert_eq!(
            signer.digest(b"7").unwrap(),
            "22f36339ae3058eeaf19a52949cfb9eb0a6bf4c21c05b6191ae4a19c8a93de4b"
        );
    }

    #[test]
    fn sequential_digests_do_not_overheat() {
        let signer = HashSigner::new(Duration::ZERO, Duration::from_millis(1));
        for i in 0..5 {
            assert!(signer.digest(i.to_string().as_bytes()).is_ok());
        }
    }

    #[test]
    fn overlapping_digests_overheat() {
        let signer = Arc::new(HashSigner::new(
            Duration::ZERO,
            Duration::from_millis(200),
        ));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let signer = Arc::clone(&signer);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    // Stagger the second caller so the first is surely inside
                    if i == 1 {
                        thread::sleep(Duration::from_millis(50));
                    }
                    signer.digest(b"x")
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(SignerError::Overheat { in_flight: 2, .. })
        ));
    }
}
