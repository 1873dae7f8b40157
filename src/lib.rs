//! fabstress - concurrency stress harness for the libfabric domain lifecycle
//!
//! Many threads each discover a provider, open a fabric, and open/close a
//! domain on it hundreds of times, while another pool of threads churns large
//! heap buffers. The first failing native call is fatal.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use fabstress::{Harness, LibfabricProvider, StressConfig};
//!
//! let provider = Arc::new(LibfabricProvider::load()?);
//! let report = Harness::new(provider, StressConfig::default()).run()?;
//! assert_eq!(report.domain_cycles, 50 * 500);
//! ```
//!
//! # Architecture
//!
//! - `fabstress-core`: status codes, errors, compiled-in configuration
//! - `fabstress-fabric`: native binding, error translation, ownership guards
//! - `fabstress-harness`: lifecycle and pressure pools, orchestrator

pub use fabstress_core::*;
pub use fabstress_fabric::{
    check, check_result, local_address, DomainGuard, EndpointGuard, FabricProvider,
    FabricSession, Hints, LibfabricProvider, NameQuery, QueryResult,
};
pub use fabstress_harness::{
    DomainLifecycleWorker, Harness, HarnessReport, LifecycleOutcome, PressurePool, StartGate,
    StopSignal, StressError, StressResult,
};
