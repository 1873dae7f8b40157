//! Provider trait for the native fabric resource API.
//!
//! `FabricProvider` is the seam between the lifecycle logic and the native
//! library. Each method is one native call and returns the raw `Status` on
//! failure; turning a status into a fatal diagnostic is the job of
//! [`crate::check`], so the call site recorded is the caller's.
//!
//! Implementations:
//! - [`crate::LibfabricProvider`]: libfabric loaded at runtime
//! - `testkit::ScriptedProvider`: in-process provider with fault injection

use fabstress_core::{FabricResult, HintsConfig, Status};

/// A handle that can report its locally bound address (`fi_getname`).
pub trait NameQuery {
    /// Copy the bound address into `buf`.
    ///
    /// `len` holds the buffer length on entry and the address length on
    /// return. A `None` buffer or one shorter than the address yields
    /// [`Status::ETOOSMALL`] with `len` set to the required length.
    fn get_name(&self, buf: Option<&mut [u8]>, len: &mut usize) -> Status;
}

/// The native fabric resource API.
///
/// Handle types are owned values; the `close_*`/`release_*` methods consume
/// them so a handle cannot be used after it is closed. Ordering between
/// handles (domains before their fabric, everything before the query result)
/// is enforced one level up by [`crate::session`].
pub trait FabricProvider: Send + Sync {
    /// Hints descriptor (`struct fi_info` used as input)
    type Hints: Send;
    /// Query result (`struct fi_info` list returned by discovery)
    type Info: Send;
    /// Open fabric (`struct fid_fabric`)
    type Fabric: Send;
    /// Open domain (`struct fid_domain`)
    type Domain: Send;
    /// Open endpoint (`struct fid_ep`)
    type Endpoint: Send + NameQuery;

    /// API version passed to the resource query.
    fn api_version(&self) -> u32;

    /// Allocate an empty hints descriptor. `None` if allocation failed.
    fn alloc_hints(&self) -> Option<Self::Hints>;

    /// Write `config` into `hints`.
    ///
    /// Fails only if a string field cannot be allocated or encoded.
    fn apply_hints(&self, hints: &mut Self::Hints, config: &HintsConfig) -> FabricResult<()>;

    /// Null out the destination address so release does not free memory the
    /// descriptor does not own.
    fn clear_dest_addr(&self, hints: &mut Self::Hints);

    /// Free a hints descriptor.
    fn release_hints(&self, hints: Self::Hints);

    /// Resource query with no node and no service.
    fn get_info(&self, version: u32, hints: &Self::Hints) -> Result<Self::Info, Status>;

    /// Free a query result.
    fn release_info(&self, info: Self::Info);

    /// Open a fabric from the query result's fabric attributes.
    fn open_fabric(&self, info: &Self::Info) -> Result<Self::Fabric, Status>;

    /// Close a fabric.
    fn close_fabric(&self, fabric: Self::Fabric) -> Status;

    /// Open a domain on `fabric` described by `info`.
    fn open_domain(&self, fabric: &Self::Fabric, info: &Self::Info) -> Result<Self::Domain, Status>;

    /// Close a domain.
    fn close_domain(&self, domain: Self::Domain) -> Status;

    /// Open an endpoint on `domain` described by `info`.
    fn open_endpoint(
        &self,
        domain: &Self::Domain,
        info: &Self::Info,
    ) -> Result<Self::Endpoint, Status>;

    /// Close an endpoint.
    fn close_endpoint(&self, endpoint: Self::Endpoint) -> Status;

    /// Human-readable description of a status (`fi_strerror`).
    fn describe(&self, status: Status) -> String;
}
