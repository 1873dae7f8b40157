//! libfabric resource lifecycle for fabstress
//!
//! This crate owns everything that touches the native fabric API:
//! - `provider`: the `FabricProvider` seam, one method per native call
//! - `libfabric`: the provider backed by libfabric, loaded at runtime
//! - `check`: native status → fatal `FabricError` with the caller's location
//! - `session`: ownership-checked hints / query / fabric / domain guards
//! - `address`: the two-call `fi_getname` size-probe protocol
//! - `testkit`: a scripted provider with fault injection (feature `testkit`)

#![warn(clippy::all)]

pub mod address;
pub mod check;
pub mod dl;
pub mod ffi;
pub mod libfabric;
pub mod provider;
pub mod session;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use address::local_address;
pub use check::{check, check_result};
pub use libfabric::LibfabricProvider;
pub use provider::{FabricProvider, NameQuery};
pub use session::{DomainGuard, EndpointGuard, FabricSession, Hints, QueryResult};
