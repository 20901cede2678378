//! Run-scoped admission gate for digest calls.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Serializes every `digest` call made during one pipeline run.
///
/// One gate exists per run and is shared by all stages and sub-tasks of
/// that run; it is held for the whole primitive call.
#[derive(Debug, Default)]
pub struct DigestGate {
    lock: Mutex<()>,
}

impl DigestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other digest is in flight. The gate is released when
    /// the returned guard drops.
    pub fn enter(&self) -> MutexGuard<'_, ()> {
        // A panic inside a previous digest call does not corrupt `()`
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
