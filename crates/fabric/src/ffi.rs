//! libfabric C ABI, resolved at runtime.
//!
//! Only the exported entry points are resolved through `dlsym`. The calls the
//! C headers define as `static inline` (`fi_domain`, `fi_endpoint`,
//! `fi_close`, `fi_getname`) are dispatched through the ops tables hanging
//! off each `fid`, exactly as the inline wrappers do.
//!
//! Structs that libfabric allocates and Rust only reads or patches through a
//! pointer are declared as layout-compatible prefixes: fields past the last
//! one this crate touches are omitted. Never construct or copy them by value.

use std::ffi::{c_char, c_int, c_void, CStr};

use fabstress_core::FabricResult;

use crate::dl::SharedLibrary;

// ---------------------------------------------------------------------------
// Object layouts (rdma/fabric.h, rdma/fi_domain.h, rdma/fi_endpoint.h)
// ---------------------------------------------------------------------------

/// `struct fi_info`
#[repr(C)]
pub struct FiInfo {
    pub next: *mut FiInfo,
    pub caps: u64,
    pub mode: u64,
    pub addr_format: u32,
    pub src_addrlen: usize,
    pub dest_addrlen: usize,
    pub src_addr: *mut c_void,
    pub dest_addr: *mut c_void,
    pub handle: *mut Fid,
    pub tx_attr: *mut FiTxAttr,
    pub rx_attr: *mut c_void,
    pub ep_attr: *mut FiEpAttr,
    pub domain_attr: *mut FiDomainAttr,
    pub fabric_attr: *mut FiFabricAttr,
    pub nic: *mut c_void,
}

/// Prefix of `struct fi_tx_attr`
#[repr(C)]
pub struct FiTxAttr {
    pub caps: u64,
    pub mode: u64,
    pub op_flags: u64,
}

/// Prefix of `struct fi_ep_attr`
#[repr(C)]
pub struct FiEpAttr {
    pub ep_type: c_int,
    pub protocol: u32,
    pub protocol_version: u32,
}

/// Prefix of `struct fi_domain_attr`
#[repr(C)]
pub struct FiDomainAttr {
    pub domain: *mut FidDomain,
    pub name: *mut c_char,
    pub threading: c_int,
    pub control_progress: c_int,
    pub data_progress: c_int,
    pub resource_mgmt: c_int,
    pub av_type: c_int,
    pub mr_mode: c_int,
}

/// `struct fi_fabric_attr`
#[repr(C)]
pub struct FiFabricAttr {
    pub fabric: *mut FidFabric,
    pub name: *mut c_char,
    pub prov_name: *mut c_char,
    pub prov_version: u32,
    pub api_version: u32,
}

/// `struct fid`
#[repr(C)]
pub struct Fid {
    pub fclass: usize,
    pub context: *mut c_void,
    pub ops: *mut FiOps,
}

/// Prefix of `struct fi_ops`
#[repr(C)]
pub struct FiOps {
    pub size: usize,
    pub close: unsafe extern "C" fn(fid: *mut Fid) -> c_int,
}

/// `struct fid_fabric`
#[repr(C)]
pub struct FidFabric {
    pub fid: Fid,
    pub ops: *mut FiOpsFabric,
    pub api_version: u32,
}

/// Prefix of `struct fi_ops_fabric`
#[repr(C)]
pub struct FiOpsFabric {
    pub size: usize,
    pub domain: unsafe extern "C" fn(
        fabric: *mut FidFabric,
        info: *mut FiInfo,
        domain: *mut *mut FidDomain,
        context: *mut c_void,
    ) -> c_int,
}

/// Prefix of `struct fid_domain`
#[repr(C)]
pub struct FidDomain {
    pub fid: Fid,
    pub ops: *mut FiOpsDomain,
}

/// Prefix of `struct fi_ops_domain`
#[repr(C)]
pub struct FiOpsDomain {
    pub size: usize,
    pub av_open: *mut c_void,
    pub cq_open: *mut c_void,
    pub endpoint: unsafe extern "C" fn(
        domain: *mut FidDomain,
        info: *mut FiInfo,
        ep: *mut *mut FidEp,
        context: *mut c_void,
    ) -> c_int,
}

/// Prefix of `struct fid_ep`
#[repr(C)]
pub struct FidEp {
    pub fid: Fid,
    pub ops: *mut c_void,
    pub cm: *mut FiOpsCm,
}

/// Prefix of `struct fi_ops_cm`
#[repr(C)]
pub struct FiOpsCm {
    pub size: usize,
    pub setname: *mut c_void,
    pub getname:
        unsafe extern "C" fn(fid: *mut Fid, addr: *mut c_void, addrlen: *mut usize) -> c_int,
}

// ---------------------------------------------------------------------------
// Exported entry points
// ---------------------------------------------------------------------------

type FnFiGetinfo = unsafe extern "C" fn(
    version: u32,
    node: *const c_char,
    service: *const c_char,
    flags: u64,
    hints: *const FiInfo,
    info: *mut *mut FiInfo,
) -> c_int;
type FnFiFreeinfo = unsafe extern "C" fn(info: *mut FiInfo);
type FnFiDupinfo = unsafe extern "C" fn(info: *const FiInfo) -> *mut FiInfo;
type FnFiFabric = unsafe extern "C" fn(
    attr: *mut FiFabricAttr,
    fabric: *mut *mut FidFabric,
    context: *mut c_void,
) -> c_int;
type FnFiStrerror = unsafe extern "C" fn(errnum: c_int) -> *const c_char;
type FnFiVersion = unsafe extern "C" fn() -> u32;

/// The loaded library and every resolved entry point.
pub struct FabricApi {
    /// Keeps the library mapped while any function pointer is reachable.
    _lib: SharedLibrary,
    fi_getinfo: FnFiGetinfo,
    fi_freeinfo: FnFiFreeinfo,
    fi_dupinfo: FnFiDupinfo,
    fi_fabric: FnFiFabric,
    fi_strerror: FnFiStrerror,
    fi_version: FnFiVersion,
}

// SAFETY: the entry points are plain C functions. Objects are opened with
// FI_THREAD_SAFE and every handle is used by the thread that opened it.
unsafe impl Send for FabricApi {}
unsafe impl Sync for FabricApi {}

macro_rules! resolve {
    ($lib:expr, $name:literal) => {{
        let cname = concat!($name, "\0");
        let cstr = CStr::from_bytes_with_nul(cname.as_bytes())
            .map_err(|e| fabstress_core::FabricError::Library(e.to_string()))?;
        // SAFETY: the symbol is transmuted to the signature declared for it
        // in the libfabric headers.
        unsafe { std::mem::transmute::<*mut c_void, _>($lib.symbol(cstr)?) }
    }};
}

impl FabricApi {
    /// Shared object names tried in order.
    pub const LIBRARY_NAMES: [&'static CStr; 2] = [c"libfabric.so.1", c"libfabric.so"];

    /// Load libfabric and resolve every entry point this crate calls.
    pub fn load() -> FabricResult<Self> {
        let lib = SharedLibrary::open_first(&Self::LIBRARY_NAMES)?;

        let fi_getinfo: FnFiGetinfo = resolve!(lib, "fi_getinfo");
        let fi_freeinfo: FnFiFreeinfo = resolve!(lib, "fi_freeinfo");
        let fi_dupinfo: FnFiDupinfo = resolve!(lib, "fi_dupinfo");
        let fi_fabric: FnFiFabric = resolve!(lib, "fi_fabric");
        let fi_strerror: FnFiStrerror = resolve!(lib, "fi_strerror");
        let fi_version: FnFiVersion = resolve!(lib, "fi_version");

        Ok(Self {
            _lib: lib,
            fi_getinfo,
            fi_freeinfo,
            fi_dupinfo,
            fi_fabric,
            fi_strerror,
            fi_version,
        })
    }

    /// `fi_version()`: the API version the loaded library implements.
    pub fn version(&self) -> u32 {
        unsafe { (self.fi_version)() }
    }

    /// `fi_allocinfo()`, which the header defines as `fi_dupinfo(NULL)`.
    pub fn allocinfo(&self) -> *mut FiInfo {
        unsafe { (self.fi_dupinfo)(std::ptr::null()) }
    }

    /// `fi_getinfo(version, NULL, NULL, 0, hints, &info)`
    ///
    /// # Safety
    ///
    /// `hints` must be a live descriptor from `allocinfo`.
    pub unsafe fn getinfo(&self, version: u32, hints: *const FiInfo, info: &mut *mut FiInfo) -> c_int {
        (self.fi_getinfo)(
            version,
            std::ptr::null(),
            std::ptr::null(),
            0,
            hints,
            info,
        )
    }

    /// `fi_freeinfo(info)`
    ///
    /// # Safety
    ///
    /// `info` must be a live descriptor and is invalid afterwards.
    pub unsafe fn freeinfo(&self, info: *mut FiInfo) {
        (self.fi_freeinfo)(info)
    }

    /// `fi_fabric(attr, &fabric, NULL)`
    ///
    /// # Safety
    ///
    /// `attr` must belong to a live `fi_info`.
    pub unsafe fn fabric(&self, attr: *mut FiFabricAttr, fabric: &mut *mut FidFabric) -> c_int {
        (self.fi_fabric)(attr, fabric, std::ptr::null_mut())
    }

    /// `fi_strerror(errnum)` copied into an owned string.
    pub fn strerror(&self, errnum: c_int) -> String {
        let msg = unsafe { (self.fi_strerror)(errnum) };
        if msg.is_null() {
            return format!("unknown error {}", errnum);
        }
        // SAFETY: fi_strerror returns a static NUL-terminated string.
        unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    }
}

// ---------------------------------------------------------------------------
// Inline wrappers from the headers
// ---------------------------------------------------------------------------

/// `fi_domain(fabric, info, &domain, NULL)`
///
/// # Safety
///
/// `fabric` and `info` must be live objects from this library.
pub unsafe fn fi_domain(
    fabric: *mut FidFabric,
    info: *mut FiInfo,
    domain: &mut *mut FidDomain,
) -> c_int {
    ((*(*fabric).ops).domain)(fabric, info, domain, std::ptr::null_mut())
}

/// `fi_endpoint(domain, info, &ep, NULL)`
///
/// # Safety
///
/// `domain` and `info` must be live objects from this library.
pub unsafe fn fi_endpoint(domain: *mut FidDomain, info: *mut FiInfo, ep: &mut *mut FidEp) -> c_int {
    ((*(*domain).ops).endpoint)(domain, info, ep, std::ptr::null_mut())
}

/// `fi_close(fid)`
///
/// # Safety
///
/// `fid` must be a live object; it is invalid afterwards.
pub unsafe fn fi_close(fid: *mut Fid) -> c_int {
    ((*(*fid).ops).close)(fid)
}

/// `fi_getname(&ep->fid, addr, addrlen)`
///
/// # Safety
///
/// `ep` must be a live endpoint; `addr` must be null or point to at least
/// `*addrlen` writable bytes.
pub unsafe fn fi_getname(ep: *mut FidEp, addr: *mut c_void, addrlen: &mut usize) -> c_int {
    ((*(*ep).cm).getname)(std::ptr::addr_of_mut!((*ep).fid), addr, addrlen)
}

// libc allocator used for strings libfabric will later free()
extern "C" {
    pub fn strdup(s: *const c_char) -> *mut c_char;
}
