//! `FabricProvider` backed by libfabric.

use std::ffi::{c_int, c_void, CString};
use std::ptr::{self, NonNull};

use fabstress_core::{FabricError, FabricResult, HintsConfig, Status};
use tracing::debug;

use crate::ffi::{self, FabricApi, FiInfo, FidDomain, FidEp, FidFabric};
use crate::provider::{FabricProvider, NameQuery};

/// Owned `struct fi_info` (hints descriptor or query result).
pub struct InfoPtr(NonNull<FiInfo>);

/// Owned `struct fid_fabric`.
pub struct FabricPtr(NonNull<FidFabric>);

/// Owned `struct fid_domain`.
pub struct DomainPtr(NonNull<FidDomain>);

/// Owned `struct fid_ep`.
pub struct EndpointPtr(NonNull<FidEp>);

// SAFETY: each pointer is owned by exactly one Rust value and the library is
// asked for FI_THREAD_SAFE objects, so moving ownership between threads is
// sound. None of these types is Sync.
unsafe impl Send for InfoPtr {}
unsafe impl Send for FabricPtr {}
unsafe impl Send for DomainPtr {}
unsafe impl Send for EndpointPtr {}

impl NameQuery for EndpointPtr {
    fn get_name(&self, buf: Option<&mut [u8]>, len: &mut usize) -> Status {
        let addr = match buf {
            Some(buf) => {
                *len = (*len).min(buf.len());
                buf.as_mut_ptr() as *mut c_void
            }
            None => ptr::null_mut(),
        };
        // SAFETY: the endpoint is live for as long as &self is, and `addr` is
        // either null or valid for `*len` bytes.
        Status::from_raw(unsafe { ffi::fi_getname(self.0.as_ptr(), addr, len) })
    }
}

/// libfabric loaded from the system at runtime.
pub struct LibfabricProvider {
    api: FabricApi,
}

impl LibfabricProvider {
    /// Load libfabric and resolve its entry points.
    pub fn load() -> FabricResult<Self> {
        let api = FabricApi::load()?;
        let version = api.version();
        debug!(
            major = version >> 16,
            minor = version & 0xffff,
            "loaded libfabric"
        );
        Ok(Self { api })
    }
}

fn close_fid(fid: *mut ffi::Fid) -> Status {
    // SAFETY: callers pass the fid of an object they own and then forget it.
    Status::from_raw(unsafe { ffi::fi_close(fid) })
}

impl FabricProvider for LibfabricProvider {
    type Hints = InfoPtr;
    type Info = InfoPtr;
    type Fabric = FabricPtr;
    type Domain = DomainPtr;
    type Endpoint = EndpointPtr;

    fn api_version(&self) -> u32 {
        self.api.version()
    }

    fn alloc_hints(&self) -> Option<InfoPtr> {
        NonNull::new(self.api.allocinfo()).map(InfoPtr)
    }

    fn apply_hints(&self, hints: &mut InfoPtr, config: &HintsConfig) -> FabricResult<()> {
        let info = hints.0.as_ptr();
        let prov_name = CString::new(config.provider_name.as_str())
            .map_err(|e| FabricError::unexpected(format!("provider name: {}", e)))?;

        // SAFETY: `info` came from fi_dupinfo(NULL), which allocates every
        // attribute struct; the pointers are still checked before use.
        unsafe {
            let domain_attr = (*info).domain_attr;
            let fabric_attr = (*info).fabric_attr;
            let ep_attr = (*info).ep_attr;
            let tx_attr = (*info).tx_attr;
            if domain_attr.is_null()
                || fabric_attr.is_null()
                || ep_attr.is_null()
                || tx_attr.is_null()
            {
                return Err(FabricError::unexpected(
                    "hints descriptor is missing attribute structs",
                ));
            }

            (*domain_attr).threading = config.threading as c_int;
            (*domain_attr).mr_mode = config.mr_mode.0;
            (*domain_attr).name = ptr::null_mut();

            // fi_freeinfo releases prov_name with free(), so it must come
            // from the C allocator.
            let dup = ffi::strdup(prov_name.as_ptr());
            if dup.is_null() {
                return Err(FabricError::Allocation("Provider name"));
            }
            (*fabric_attr).prov_name = dup;

            (*domain_attr).resource_mgmt = config.resource_mgmt as c_int;
            (*ep_attr).ep_type = config.endpoint_type as c_int;
            (*ep_attr).protocol = config.protocol as u32;

            (*info).addr_format = config.addr_format as u32;
            (*info).dest_addr = ptr::null_mut();
            (*info).mode = config.mode;
            (*domain_attr).control_progress = config.control_progress as c_int;
            (*domain_attr).data_progress = config.data_progress as c_int;
            (*info).caps = config.caps.0;
            (*tx_attr).op_flags = config.tx_op_flags;
        }
        Ok(())
    }

    fn clear_dest_addr(&self, hints: &mut InfoPtr) {
        // SAFETY: hints is a live descriptor owned by the caller.
        unsafe {
            (*hints.0.as_ptr()).dest_addr = ptr::null_mut();
        }
    }

    fn release_hints(&self, hints: InfoPtr) {
        // SAFETY: ownership ends here; the pointer is not used again.
        unsafe { self.api.freeinfo(hints.0.as_ptr()) }
    }

    fn get_info(&self, version: u32, hints: &InfoPtr) -> Result<InfoPtr, Status> {
        let mut out: *mut FiInfo = ptr::null_mut();
        // SAFETY: hints is live; fi_getinfo allocates the result list.
        let ret = unsafe { self.api.getinfo(version, hints.0.as_ptr(), &mut out) };
        Status::from_raw(ret).into_result()?;
        NonNull::new(out).map(InfoPtr).ok_or(Status::ENODATA)
    }

    fn release_info(&self, info: InfoPtr) {
        // SAFETY: ownership ends here; the pointer is not used again.
        unsafe { self.api.freeinfo(info.0.as_ptr()) }
    }

    fn open_fabric(&self, info: &InfoPtr) -> Result<FabricPtr, Status> {
        let mut fabric: *mut FidFabric = ptr::null_mut();
        // SAFETY: info is a live query result with fabric attributes.
        let ret = unsafe { self.api.fabric((*info.0.as_ptr()).fabric_attr, &mut fabric) };
        Status::from_raw(ret).into_result()?;
        NonNull::new(fabric).map(FabricPtr).ok_or(Status::EOTHER)
    }

    fn close_fabric(&self, fabric: FabricPtr) -> Status {
        close_fid(unsafe { ptr::addr_of_mut!((*fabric.0.as_ptr()).fid) })
    }

    fn open_domain(&self, fabric: &FabricPtr, info: &InfoPtr) -> Result<DomainPtr, Status> {
        let mut domain: *mut FidDomain = ptr::null_mut();
        // SAFETY: both objects are live and owned by the caller.
        let ret = unsafe { ffi::fi_domain(fabric.0.as_ptr(), info.0.as_ptr(), &mut domain) };
        Status::from_raw(ret).into_result()?;
        NonNull::new(domain).map(DomainPtr).ok_or(Status::EOTHER)
    }

    fn close_domain(&self, domain: DomainPtr) -> Status {
        close_fid(unsafe { ptr::addr_of_mut!((*domain.0.as_ptr()).fid) })
    }

    fn open_endpoint(&self, domain: &DomainPtr, info: &InfoPtr) -> Result<EndpointPtr, Status> {
        let mut ep: *mut FidEp = ptr::null_mut();
        // SAFETY: both objects are live and owned by the caller.
        let ret = unsafe { ffi::fi_endpoint(domain.0.as_ptr(), info.0.as_ptr(), &mut ep) };
        Status::from_raw(ret).into_result()?;
        NonNull::new(ep).map(EndpointPtr).ok_or(Status::EOTHER)
    }

    fn close_endpoint(&self, endpoint: EndpointPtr) -> Status {
        close_fid(unsafe { ptr::addr_of_mut!((*endpoint.0.as_ptr()).fid) })
    }

    fn describe(&self, status: Status) -> String {
        self.api.strerror(status.errno())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    assert_impl_all!(LibfabricProvider: Send, Sync);
    assert_impl_all!(InfoPtr: Send);
    assert_impl_all!(DomainPtr: Send);
    assert_not_impl_any!(FabricPtr: Sync);
    assert_not_impl_any!(DomainPtr: Sync, Clone);
}
