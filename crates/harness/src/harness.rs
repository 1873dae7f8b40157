//! Stress orchestrator.
//!
//! Three phases:
//!
//! 1. **launch**: start the pressure pool, then spawn every lifecycle worker
//!    behind a closed [`StartGate`] and open it once the pool is complete.
//! 2. **drain**: join every lifecycle worker. The first worker to fail raises
//!    the halt signal; the rest stop opening domains at their next cycle and
//!    tear down.
//! 3. **wind-down**: stop the pressure pool and join it.
//!
//! The run succeeds only if no worker reported an error.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use fabstress_core::{FabricResult, StressConfig};
use fabstress_fabric::FabricProvider;
use tracing::{error, info};

use crate::error::{StressError, StressResult};
use crate::gate::StartGate;
use crate::lifecycle::{DomainLifecycleWorker, LifecycleOutcome};
use crate::pressure::PressurePool;
use crate::signal::StopSignal;

const ROLE: &str = "domain";

/// Totals from a clean run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessReport {
    /// Lifecycle workers that ran to completion.
    pub lifecycle_workers: usize,
    /// Domain open/close cycles completed across all workers.
    pub domain_cycles: u64,
    /// Allocate/fill/free cycles completed across all pressure workers.
    pub pressure_iterations: u64,
}

/// Runs the lifecycle pool against `provider` under memory pressure.
pub struct Harness<P: FabricProvider + 'static> {
    provider: Arc<P>,
    config: StressConfig,
}

impl<P: FabricProvider + 'static> Harness<P> {
    /// Create a harness.
    pub fn new(provider: Arc<P>, config: StressConfig) -> Self {
        Self { provider, config }
    }

    /// The configuration this harness runs with.
    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Run all three phases.
    pub fn run(&self) -> StressResult<HarnessReport> {
        self.config.validate()?;
        let config = &self.config;

        info!(
            pressure_workers = config.pressure_workers,
            lifecycle_workers = config.lifecycle_workers,
            domain_cycles = config.domain_cycles,
            buffer_size = config.pressure_buffer_size,
            "launch"
        );
        let pressure = PressurePool::start(
            config.pressure_workers,
            config.pressure_buffer_size,
            config.fill_byte,
        )?;

        let halt = StopSignal::new();
        let gate = Arc::new(StartGate::new());
        let handles = match self.spawn_lifecycle_pool(&halt, &gate) {
            Ok(handles) => handles,
            Err(e) => {
                // `pressure` is stopped and joined on drop.
                error!("{}", e);
                return Err(e);
            }
        };
        gate.open();

        info!("drain");
        let mut first_error: Option<StressError> = None;
        let mut report = HarnessReport {
            lifecycle_workers: 0,
            domain_cycles: 0,
            pressure_iterations: 0,
        };
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(outcome)) => {
                    report.domain_cycles += outcome.cycles as u64;
                    if !outcome.halted {
                        report.lifecycle_workers += 1;
                    }
                }
                Ok(Err(e)) => {
                    first_error.get_or_insert(StressError::Fabric(e));
                }
                Err(payload) => {
                    halt.raise();
                    first_error.get_or_insert(StressError::panicked(ROLE, index, payload));
                }
            }
        }

        info!(
            domain_cycles = report.domain_cycles,
            pressure_cycles = pressure.completed(),
            "wind-down"
        );
        let pressure_result = pressure.stop_and_join();

        match (first_error, pressure_result) {
            (Some(e), Err(pressure_err)) => {
                error!("{}", pressure_err);
                Err(e)
            }
            (Some(e), Ok(_)) => Err(e),
            (None, Err(e)) => Err(e),
            (None, Ok(iterations)) => {
                report.pressure_iterations = iterations;
                Ok(report)
            }
        }
    }

    fn spawn_lifecycle_pool(
        &self,
        halt: &StopSignal,
        gate: &Arc<StartGate>,
    ) -> StressResult<Vec<JoinHandle<FabricResult<LifecycleOutcome>>>> {
        let count = self.config.lifecycle_workers;
        let mut handles = Vec::with_capacity(count);

        for index in 0..count {
            let provider = Arc::clone(&self.provider);
            let hints = self.config.hints.clone();
            let cycles = self.config.domain_cycles;
            let halt_worker = halt.clone();
            let gate_worker = Arc::clone(gate);

            let spawned = thread::Builder::new()
                .name(format!("fabstress-domain-{}", index))
                .spawn(move || {
                    gate_worker.wait();
                    let worker =
                        DomainLifecycleWorker::new(&*provider, &hints, cycles, &halt_worker, index);
                    let result = worker.run();
                    if result.is_err() {
                        halt_worker.raise();
                    }
                    result
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    halt.raise();
                    gate.open();
                    join_abandoned(handles);
                    return Err(StressError::Spawn {
                        role: ROLE,
                        index,
                        source,
                    });
                }
            }
        }
        Ok(handles)
    }
}

/// Join workers left behind by an aborted launch, logging every failure.
///
/// Returns how many of them failed.
fn join_abandoned(handles: Vec<JoinHandle<FabricResult<LifecycleOutcome>>>) -> usize {
    let mut failed = 0;
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                failed += 1;
                error!(worker = index, "{}", e);
            }
            Err(payload) => {
                failed += 1;
                error!("{}", StressError::panicked(ROLE, index, payload));
            }
        }
    }
    failed
}
