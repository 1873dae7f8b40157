//! One-way cooperative stop flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag that can be raised once and observed from any thread.
///
/// Workers poll it between units of work; nothing is interrupted
/// mid-iteration. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    raised: Arc<AtomicBool>,
}

impl StopSignal {
    /// A lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Idempotent.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// True once any clone has raised the signal.
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}
