//! Stress parameters and the provider-selection descriptor
//!
//! Nothing here is read from a file, a flag, or the environment. The
//! `Default` impls are the compiled-in configuration; the `with_*` methods
//! exist so tests can run smaller variants of the same harness.

use crate::error::{FabricError, FabricResult};

// ============================================================================
// Stress constants
// ============================================================================

/// Page size the pressure buffer is expressed in.
pub const PAGE_SIZE: usize = 4096;

/// Pressure buffer size: 51 pages, larger than any single-page fast path.
pub const PRESSURE_BUFFER_SIZE: usize = 51 * PAGE_SIZE;

/// Byte written across every pressure buffer (321 mod 256).
pub const FILL_BYTE: u8 = (321u32 % 256) as u8;

/// Number of memory pressure threads.
pub const DEFAULT_PRESSURE_WORKERS: usize = 50;

/// Number of domain lifecycle threads.
pub const DEFAULT_LIFECYCLE_WORKERS: usize = 50;

/// Domain open/close cycles per lifecycle worker.
pub const DEFAULT_DOMAIN_CYCLES: usize = 500;

/// Stress harness configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StressConfig {
    /// Memory pressure threads to run alongside the lifecycle workers.
    pub pressure_workers: usize,
    /// Domain lifecycle threads.
    pub lifecycle_workers: usize,
    /// Domain open/close cycles per lifecycle worker.
    pub domain_cycles: usize,
    /// Bytes allocated per pressure iteration.
    pub pressure_buffer_size: usize,
    /// Byte written across each pressure buffer.
    pub fill_byte: u8,
    /// Provider selection used by every lifecycle worker.
    pub hints: HintsConfig,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            pressure_workers: DEFAULT_PRESSURE_WORKERS,
            lifecycle_workers: DEFAULT_LIFECYCLE_WORKERS,
            domain_cycles: DEFAULT_DOMAIN_CYCLES,
            pressure_buffer_size: PRESSURE_BUFFER_SIZE,
            fill_byte: FILL_BYTE,
            hints: HintsConfig::default(),
        }
    }
}

impl StressConfig {
    /// Set the number of pressure workers.
    pub fn with_pressure_workers(mut self, n: usize) -> Self {
        self.pressure_workers = n;
        self
    }

    /// Set the number of lifecycle workers.
    pub fn with_lifecycle_workers(mut self, n: usize) -> Self {
        self.lifecycle_workers = n;
        self
    }

    /// Set the domain cycles per lifecycle worker.
    pub fn with_domain_cycles(mut self, n: usize) -> Self {
        self.domain_cycles = n;
        self
    }

    /// Set the pressure buffer size in bytes.
    pub fn with_pressure_buffer_size(mut self, bytes: usize) -> Self {
        self.pressure_buffer_size = bytes;
        self
    }

    /// Total domain open/close cycles a clean run performs.
    pub fn total_domain_cycles(&self) -> u64 {
        self.lifecycle_workers as u64 * self.domain_cycles as u64
    }

    /// Reject configurations that cannot exercise anything.
    ///
    /// Zero pressure workers is allowed (it isolates the lifecycle); zero
    /// lifecycle workers or a zero-byte buffer is not.
    pub fn validate(&self) -> FabricResult<()> {
        if self.lifecycle_workers == 0 {
            return Err(FabricError::unexpected(
                "lifecycle_workers must be at least 1",
            ));
        }
        if self.pressure_buffer_size == 0 {
            return Err(FabricError::unexpected(
                "pressure_buffer_size must be non-zero",
            ));
        }
        if self.hints.provider_name.as_bytes().contains(&0) {
            return Err(FabricError::unexpected(
                "provider name must not contain NUL bytes",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Hints descriptor fields
// ============================================================================

/// `enum fi_threading`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Threading {
    /// `FI_THREAD_UNSPEC`
    Unspec = 0,
    /// `FI_THREAD_SAFE`
    Safe = 1,
    /// `FI_THREAD_FID`
    Fid = 2,
    /// `FI_THREAD_DOMAIN`
    Domain = 3,
    /// `FI_THREAD_COMPLETION`
    Completion = 4,
    /// `FI_THREAD_ENDPOINT`
    Endpoint = 5,
}

/// `enum fi_progress`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Progress {
    /// `FI_PROGRESS_UNSPEC`
    Unspec = 0,
    /// `FI_PROGRESS_AUTO`
    Auto = 1,
    /// `FI_PROGRESS_MANUAL`
    Manual = 2,
}

/// `enum fi_resource_mgmt`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ResourceMgmt {
    /// `FI_RM_UNSPEC`
    Unspec = 0,
    /// `FI_RM_DISABLED`
    Disabled = 1,
    /// `FI_RM_ENABLED`
    Enabled = 2,
}

/// `enum fi_ep_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EndpointType {
    /// `FI_EP_UNSPEC`
    Unspec = 0,
    /// `FI_EP_MSG`
    Msg = 1,
    /// `FI_EP_DGRAM`
    Dgram = 2,
    /// `FI_EP_RDM`
    Rdm = 3,
}

/// Endpoint protocol (`FI_PROTO_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Protocol {
    /// `FI_PROTO_UNSPEC`
    Unspec = 0,
    /// `FI_PROTO_RDMA_CM_IB_RC`
    RdmaCmIbRc = 1,
    /// `FI_PROTO_RXM`
    Rxm = 11,
}

/// Address format (`FI_FORMAT_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AddrFormat {
    /// `FI_FORMAT_UNSPEC`
    Unspec = 0,
    /// `FI_SOCKADDR`
    Sockaddr = 1,
}

/// Memory registration mode bits (`FI_MR_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MrMode(pub i32);

impl MrMode {
    /// `FI_MR_LOCAL`
    pub const LOCAL: MrMode = MrMode(1 << 2);
    /// `FI_MR_VIRT_ADDR`
    pub const VIRT_ADDR: MrMode = MrMode(1 << 4);
    /// `FI_MR_ALLOCATED`
    pub const ALLOCATED: MrMode = MrMode(1 << 5);
    /// `FI_MR_PROV_KEY`
    pub const PROV_KEY: MrMode = MrMode(1 << 6);

    /// True when every bit of `other` is set.
    pub const fn contains(self, other: MrMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for MrMode {
    type Output = MrMode;

    fn bitor(self, rhs: MrMode) -> MrMode {
        MrMode(self.0 | rhs.0)
    }
}

/// Capability bits (`FI_*` in `fi_info::caps`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caps(pub u64);

impl Caps {
    /// `FI_MSG`
    pub const MSG: Caps = Caps(1 << 1);
    /// `FI_RMA`
    pub const RMA: Caps = Caps(1 << 2);
    /// `FI_TAGGED`
    pub const TAGGED: Caps = Caps(1 << 3);
    /// `FI_DIRECTED_RECV`
    pub const DIRECTED_RECV: Caps = Caps(1 << 48);
    /// `FI_SOURCE`
    pub const SOURCE: Caps = Caps(1 << 57);

    /// True when every bit of `other` is set.
    pub const fn contains(self, other: Caps) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Caps {
    type Output = Caps;

    fn bitor(self, rhs: Caps) -> Caps {
        Caps(self.0 | rhs.0)
    }
}

/// `FI_CONTEXT` mode bit.
pub const FI_CONTEXT: u64 = 1 << 59;

/// `FI_TRANSMIT_COMPLETE` operation flag.
pub const FI_TRANSMIT_COMPLETE: u64 = 1 << 27;

/// Provider selection written into the hints descriptor before discovery.
///
/// The destination address is deliberately not part of this type: this
/// process only opens local resources and always queries with no
/// destination.
#[derive(Debug, Clone, PartialEq)]
pub struct HintsConfig {
    /// `domain_attr->threading`
    pub threading: Threading,
    /// `domain_attr->mr_mode`
    pub mr_mode: MrMode,
    /// `fabric_attr->prov_name`
    pub provider_name: String,
    /// `domain_attr->resource_mgmt`
    pub resource_mgmt: ResourceMgmt,
    /// `ep_attr->type`
    pub endpoint_type: EndpointType,
    /// `ep_attr->protocol`
    pub protocol: Protocol,
    /// `addr_format`
    pub addr_format: AddrFormat,
    /// `mode`
    pub mode: u64,
    /// `domain_attr->control_progress`
    pub control_progress: Progress,
    /// `domain_attr->data_progress`
    pub data_progress: Progress,
    /// `caps`
    pub caps: Caps,
    /// `tx_attr->op_flags`
    pub tx_op_flags: u64,
}

impl Default for HintsConfig {
    fn default() -> Self {
        Self {
            threading: Threading::Safe,
            mr_mode: MrMode::LOCAL | MrMode::ALLOCATED | MrMode::PROV_KEY | MrMode::VIRT_ADDR,
            provider_name: "verbs".to_string(),
            resource_mgmt: ResourceMgmt::Enabled,
            endpoint_type: EndpointType::Rdm,
            protocol: Protocol::Rxm,
            addr_format: AddrFormat::Unspec,
            mode: FI_CONTEXT,
            control_progress: Progress::Auto,
            data_progress: Progress::Auto,
            caps: Caps::MSG | Caps::RMA | Caps::TAGGED | Caps::SOURCE | Caps::DIRECTED_RECV,
            tx_op_flags: FI_TRANSMIT_COMPLETE,
        }
    }
}
