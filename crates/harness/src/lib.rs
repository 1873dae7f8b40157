//! Stress harness for the fabric domain lifecycle
//!
//! Two thread pools run side by side:
//! - lifecycle workers, each opening its own fabric and cycling domains on it
//! - pressure workers, churning large heap buffers until told to stop
//!
//! [`Harness`] drives both and turns the first native failure into a
//! process-wide halt.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod gate;
pub mod harness;
pub mod lifecycle;
pub mod pressure;
pub mod signal;

pub use error::{StressError, StressResult};
pub use gate::StartGate;
pub use harness::{Harness, HarnessReport};
pub use lifecycle::{DomainLifecycleWorker, LifecycleOutcome};
pub use pressure::{allocate_filled, churn_once, run_pressure, PressurePool};
pub use signal::StopSignal;
