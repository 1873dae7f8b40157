//! Memory pressure workers.
//!
//! Each worker allocates a multi-page buffer, writes the fill byte across all
//! of it, and frees it, over and over until its stop signal is raised. The
//! workers share nothing with the lifecycle pool; they only exist to keep the
//! process allocator busy while domains are being opened and closed.

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::{StressError, StressResult};
use crate::signal::StopSignal;

const ROLE: &str = "pressure";

/// Allocate `size` bytes and write `fill` across the whole extent.
pub fn allocate_filled(size: usize, fill: u8) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::with_capacity(size);
    buf.resize(size, fill);
    buf
}

/// One allocate/fill/free cycle.
pub fn churn_once(size: usize, fill: u8) {
    let buf = allocate_filled(size, fill);
    // Keep the optimizer from eliding the allocation and the writes.
    black_box(buf.as_slice());
    drop(buf);
}

/// Run cycles until `stop` is raised; returns the number completed.
///
/// The signal is checked between cycles, so at most one cycle starts after
/// the stop request is published.
pub fn run_pressure(stop: &StopSignal, size: usize, fill: u8, completed: &AtomicU64) -> u64 {
    let mut local = 0u64;
    while !stop.is_raised() {
        churn_once(size, fill);
        local += 1;
        completed.fetch_add(1, Ordering::Relaxed);
    }
    local
}

/// A pool of pressure workers sharing one stop signal.
///
/// Dropping the pool stops and joins the workers, so no pressure thread
/// outlives the harness even on an early-return path.
pub struct PressurePool {
    stop: StopSignal,
    completed: Arc<AtomicU64>,
    workers: Vec<JoinHandle<u64>>,
}

impl PressurePool {
    /// Spawn `count` workers churning `size`-byte buffers filled with `fill`.
    ///
    /// If a spawn fails, the workers already started are stopped and joined
    /// before the error is returned.
    pub fn start(count: usize, size: usize, fill: u8) -> StressResult<Self> {
        let mut pool = PressurePool {
            stop: StopSignal::new(),
            completed: Arc::new(AtomicU64::new(0)),
            workers: Vec::with_capacity(count),
        };

        for index in 0..count {
            let stop = pool.stop.clone();
            let completed = Arc::clone(&pool.completed);
            let spawned = thread::Builder::new()
                .name(format!("fabstress-pressure-{}", index))
                .spawn(move || run_pressure(&stop, size, fill, &completed));
            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(source) => {
                    // Drop stops and joins what was started.
                    return Err(StressError::Spawn {
                        role: ROLE,
                        index,
                        source,
                    });
                }
            }
        }

        debug!(workers = count, buffer_size = size, "pressure pool started");
        Ok(pool)
    }

    /// Number of workers in the pool.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True if the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Cycles completed so far across all workers.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Ask every worker to stop after its current cycle. Does not wait.
    pub fn request_stop(&self) {
        self.stop.raise();
    }

    /// Stop every worker and wait for it to exit.
    ///
    /// Returns the total number of cycles completed.
    pub fn stop_and_join(mut self) -> StressResult<u64> {
        self.stop.raise();
        let mut total = 0u64;
        let mut first_panic = None;
        for (index, handle) in self.workers.drain(..).enumerate() {
            match handle.join() {
                Ok(n) => total += n,
                Err(payload) => {
                    if first_panic.is_none() {
                        first_panic = Some(StressError::panicked(ROLE, index, payload));
                    }
                }
            }
        }
        debug!(cycles = total, "pressure pool stopped");
        match first_panic {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }
}

impl Drop for PressurePool {
    fn drop(&mut self) {
        self.stop.raise();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabstress_core::{FILL_BYTE, PAGE_SIZE, PRESSURE_BUFFER_SIZE};
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn test_buffer_is_fully_filled() {
        let buf = allocate_filled(PRESSURE_BUFFER_SIZE, FILL_BYTE);
        assert_eq!(buf.len(), 51 * 4096);
        assert!(buf.iter().all(|&b| b == 0x41));
    }

    #[test]
    fn test_stopped_before_start_runs_nothing() {
        let stop = StopSignal::new();
        stop.raise();
        let completed = AtomicU64::new(0);
        assert_eq!(run_pressure(&stop, PAGE_SIZE, FILL_BYTE, &completed), 0);
        assert_eq!(completed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_pool_makes_progress_and_stops() {
        let pool = PressurePool::start(4, PAGE_SIZE * 2, FILL_BYTE).unwrap();
        assert_eq!(pool.len(), 4);
        while pool.completed() < 100 {
            std::thread::yield_now();
        }
        let total = pool.stop_and_join().unwrap();
        assert!(total >= 100);
    }

    #[test]
    fn test_at_most_one_cycle_after_stop() {
        // A single worker so the counter reflects one thread's iterations.
        let pool = PressurePool::start(1, PRESSURE_BUFFER_SIZE, FILL_BYTE).unwrap();
        while pool.completed() < 10 {
            std::thread::yield_now();
        }
        pool.request_stop();
        let at_stop = pool.completed();
        std::thread::sleep(Duration::from_millis(20));
        let total = pool.stop_and_join().unwrap();
        assert!(
            total <= at_stop + 1,
            "worker ran {} cycles after stop",
            total - at_stop
        );
    }

    #[test]
    fn test_empty_pool() {
        let pool = PressurePool::start(0, PAGE_SIZE, FILL_BYTE).unwrap();
        assert!(pool.is_empty());
        assert_eq!(pool.stop_and_join().unwrap(), 0);
    }

    #[test]
    fn test_drop_joins_workers() {
        let completed;
        {
            let pool = PressurePool::start(2, PAGE_SIZE, FILL_BYTE).unwrap();
            completed = Arc::clone(&pool.completed);
        }
        let after_drop = completed.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(completed.load(Ordering::Relaxed), after_drop);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_fill_covers_every_byte(size in 1usize..(4 * PAGE_SIZE), fill in any::<u8>()) {
            let buf = allocate_filled(size, fill);
            prop_assert_eq!(buf.len(), size);
            prop_assert!(buf.iter().all(|&b| b == fill));
        }
    }
}
