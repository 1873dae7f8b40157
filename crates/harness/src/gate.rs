//! Start gate for the lifecycle pool.
//!
//! Lifecycle workers park in [`StartGate::wait`] until the orchestrator has
//! spawned the whole pool and calls [`StartGate::open`], so every worker's
//! discovery races the others instead of trickling in at spawn rate.

use parking_lot::{Condvar, Mutex};

/// A one-shot gate: closed until opened, then open forever.
#[derive(Debug, Default)]
pub struct StartGate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl StartGate {
    /// A closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the gate is opened. Returns immediately once open.
    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }

    /// Open the gate and wake every waiter. Idempotent.
    ///
    /// Also called on spawn failure so already-started workers are not left
    /// waiting.
    pub fn open(&self) {
        let mut open = self.open.lock();
        *open = true;
        self.opened.notify_all();
    }

    /// True once opened.
    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use static_assertions::assert_impl_all;

    assert_impl_all!(StartGate: Send, Sync);

    #[test]
    fn test_waiters_block_until_open() {
        let gate = Arc::new(StartGate::new());
        let passed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let passed = Arc::clone(&passed);
                thread::spawn(move || {
                    gate.wait();
                    passed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(passed.load(Ordering::SeqCst), 0);
        assert!(!gate.is_open());

        gate.open();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(passed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_wait_after_open_returns() {
        let gate = StartGate::new();
        gate.open();
        gate.open();
        gate.wait();
        assert!(gate.is_open());
    }
}
