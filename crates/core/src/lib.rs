//! Core types for fabstress
//!
//! This crate defines the foundational types shared by the native binding and
//! the stress harness:
//! - Status: native `fi_errno` status codes
//! - FabricError / CallSite: the fatal error taxonomy
//! - StressConfig: compiled-in stress parameters
//! - HintsConfig: the fixed provider-selection descriptor

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod status;

pub use config::{
    AddrFormat, Caps, EndpointType, HintsConfig, MrMode, Progress, Protocol, ResourceMgmt,
    StressConfig, Threading, DEFAULT_DOMAIN_CYCLES, DEFAULT_LIFECYCLE_WORKERS,
    DEFAULT_PRESSURE_WORKERS, FILL_BYTE, FI_CONTEXT, FI_TRANSMIT_COMPLETE, PAGE_SIZE,
    PRESSURE_BUFFER_SIZE,
};
pub use error::{CallSite, FabricError, FabricResult};
pub use status::Status;
