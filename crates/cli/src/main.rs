//! fabstress - libfabric domain lifecycle stress run.
//!
//! Takes no arguments. Loads libfabric, runs the harness with the compiled-in
//! configuration, and exits 0 if no resource-lifecycle call failed. Any
//! failure prints its diagnostic to stderr and exits 1.

use std::process;
use std::sync::Arc;

use fabstress_core::StressConfig;
use fabstress_fabric::LibfabricProvider;
use fabstress_harness::Harness;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Log filter; fixed so the run does not depend on the environment.
const LOG_FILTER: &str = "fabstress=info,fabstress_harness=info,fabstress_fabric=warn";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(LOG_FILTER))
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();

    let provider = match LibfabricProvider::load() {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let harness = Harness::new(Arc::new(provider), StressConfig::default());
    match harness.run() {
        Ok(report) => {
            info!(
                lifecycle_workers = report.lifecycle_workers,
                domain_cycles = report.domain_cycles,
                pressure_iterations = report.pressure_iterations,
                "stress run passed"
            );
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
