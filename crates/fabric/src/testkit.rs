//! In-process `FabricProvider` for tests.
//!
//! `ScriptedProvider` behaves like a well-formed libfabric provider and keeps
//! a ledger of every handle it has handed out. Ordering mistakes by the
//! caller (closing a fabric with live domains, closing a domain from another
//! thread, releasing a query result under an open fabric, releasing hints
//! with a destination address still set) are refused with a failing status
//! and recorded as violations.
//!
//! Faults can be injected per call count, e.g. fail the 37th domain open
//! process-wide with `-FI_ENOMEM`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use fabstress_core::{FabricResult, HintsConfig, Status};
use parking_lot::Mutex;

use crate::provider::{FabricProvider, NameQuery};

/// A recorded provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Hints descriptor allocated
    HintsAllocated,
    /// Hints descriptor configured
    HintsApplied(HintsConfig),
    /// Hints descriptor released
    HintsReleased {
        /// Whether the destination address was cleared first
        dest_addr_cleared: bool,
    },
    /// Resource query succeeded
    InfoQueried {
        /// Query result id
        info: u64,
    },
    /// Query result released
    InfoReleased {
        /// Query result id
        info: u64,
    },
    /// Fabric opened
    FabricOpened {
        /// Fabric id
        fabric: u64,
    },
    /// Fabric closed
    FabricClosed {
        /// Fabric id
        fabric: u64,
    },
    /// Domain opened
    DomainOpened {
        /// Domain id
        domain: u64,
        /// Owning fabric id
        fabric: u64,
    },
    /// Domain closed
    DomainClosed {
        /// Domain id
        domain: u64,
        /// Owning fabric id
        fabric: u64,
    },
    /// Endpoint opened
    EndpointOpened {
        /// Endpoint id
        endpoint: u64,
    },
    /// Endpoint closed
    EndpointClosed {
        /// Endpoint id
        endpoint: u64,
    },
}

/// Call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptedStats {
    /// Hints descriptors allocated
    pub hints_allocated: u64,
    /// Hints descriptors released
    pub hints_released: u64,
    /// Successful resource queries
    pub infos_queried: u64,
    /// Query results released
    pub infos_released: u64,
    /// Fabrics opened
    pub fabrics_opened: u64,
    /// Fabrics closed
    pub fabrics_closed: u64,
    /// Domains opened
    pub domains_opened: u64,
    /// Domains closed
    pub domains_closed: u64,
    /// Highest number of domains open at the same time
    pub peak_open_domains: u64,
}

/// Opaque hints descriptor.
pub struct ScriptedHints {
    config: Option<HintsConfig>,
    dest_addr_cleared: bool,
}

/// Opaque query result.
pub struct ScriptedInfo {
    id: u64,
}

/// Opaque fabric handle.
pub struct ScriptedFabric {
    id: u64,
}

/// Opaque domain handle.
pub struct ScriptedDomain {
    id: u64,
    fabric: u64,
}

#[derive(Default)]
struct Faults {
    hints_alloc: bool,
    query: Option<Status>,
    fabric_open: Option<Status>,
    domain_open: Option<(u64, Status)>,
    domain_close: Option<(u64, Status)>,
}

#[derive(Default)]
struct Ledger {
    /// info id -> open fabrics derived from it
    infos: HashMap<u64, usize>,
    /// fabric id -> (info id, open domains)
    fabrics: HashMap<u64, (u64, usize)>,
    /// domain id -> (fabric id, opening thread)
    domains: HashMap<u64, (u64, ThreadId)>,
    violations: Vec<String>,
}

/// Scripted provider with an ordering ledger and fault injection.
pub struct ScriptedProvider {
    next_id: AtomicU64,
    domain_open_calls: AtomicU64,
    domain_close_calls: AtomicU64,
    open_domains: AtomicU64,
    stats: Mutex<ScriptedStats>,
    ledger: Mutex<Ledger>,
    faults: Mutex<Faults>,
    events: Option<Mutex<Vec<Event>>>,
    address: Vec<u8>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    /// Provider with no faults and no event log.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            domain_open_calls: AtomicU64::new(0),
            domain_close_calls: AtomicU64::new(0),
            open_domains: AtomicU64::new(0),
            stats: Mutex::new(ScriptedStats::default()),
            ledger: Mutex::new(Ledger::default()),
            faults: Mutex::new(Faults::default()),
            events: None,
            address: vec![0x02, 0x00, 0x00, 0x00, 0x7f, 0x00, 0x00, 0x01],
        }
    }

    /// Record every call in an event log.
    pub fn with_event_log(mut self) -> Self {
        self.events = Some(Mutex::new(Vec::new()));
        self
    }

    /// Address reported by endpoints opened on this provider.
    pub fn with_address(mut self, address: Vec<u8>) -> Self {
        self.address = address;
        self
    }

    /// Make the next hints allocation return nothing.
    pub fn fail_hints_alloc(&self) {
        self.faults.lock().hints_alloc = true;
    }

    /// Make every resource query fail with `status`.
    pub fn fail_query(&self, status: Status) {
        self.faults.lock().query = Some(status);
    }

    /// Make every fabric open fail with `status`.
    pub fn fail_fabric_open(&self, status: Status) {
        self.faults.lock().fabric_open = Some(status);
    }

    /// Make the `nth` domain open (1-based, process-wide) fail with `status`.
    pub fn fail_domain_open(&self, nth: u64, status: Status) {
        self.faults.lock().domain_open = Some((nth, status));
    }

    /// Make the `nth` domain close (1-based, process-wide) fail with `status`.
    ///
    /// The domain is still released, as a provider would on a failed close.
    pub fn fail_domain_close(&self, nth: u64, status: Status) {
        self.faults.lock().domain_close = Some((nth, status));
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> ScriptedStats {
        *self.stats.lock()
    }

    /// Ordering violations observed so far.
    pub fn violations(&self) -> Vec<String> {
        self.ledger.lock().violations.clone()
    }

    /// Recorded events, empty unless built `with_event_log`.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .as_ref()
            .map(|e| e.lock().clone())
            .unwrap_or_default()
    }

    /// Handles not yet released: (hints, infos, fabrics, domains).
    pub fn outstanding(&self) -> (u64, u64, u64, u64) {
        let s = self.stats();
        (
            s.hints_allocated - s.hints_released,
            s.infos_queried - s.infos_released,
            s.fabrics_opened - s.fabrics_closed,
            s.domains_opened - s.domains_closed,
        )
    }

    fn record(&self, event: Event) {
        if let Some(events) = &self.events {
            events.lock().push(event);
        }
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn violation(&self, ledger: &mut Ledger, msg: String) {
        tracing::error!("scripted provider violation: {}", msg);
        ledger.violations.push(msg);
    }
}

impl FabricProvider for ScriptedProvider {
    type Hints = ScriptedHints;
    type Info = ScriptedInfo;
    type Fabric = ScriptedFabric;
    type Domain = ScriptedDomain;
    type Endpoint = ScriptedEndpoint;

    fn api_version(&self) -> u32 {
        (1 << 16) | 18
    }

    fn alloc_hints(&self) -> Option<ScriptedHints> {
        if std::mem::take(&mut self.faults.lock().hints_alloc) {
            return None;
        }
        self.stats.lock().hints_allocated += 1;
        self.record(Event::HintsAllocated);
        Some(ScriptedHints {
            config: None,
            dest_addr_cleared: false,
        })
    }

    fn apply_hints(&self, hints: &mut ScriptedHints, config: &HintsConfig) -> FabricResult<()> {
        hints.config = Some(config.clone());
        self.record(Event::HintsApplied(config.clone()));
        Ok(())
    }

    fn clear_dest_addr(&self, hints: &mut ScriptedHints) {
        hints.dest_addr_cleared = true;
    }

    fn release_hints(&self, hints: ScriptedHints) {
        if !hints.dest_addr_cleared {
            let mut ledger = self.ledger.lock();
            self.violation(&mut ledger, "hints released with dest_addr set".to_string());
        }
        self.stats.lock().hints_released += 1;
        self.record(Event::HintsReleased {
            dest_addr_cleared: hints.dest_addr_cleared,
        });
    }

    fn get_info(&self, _version: u32, hints: &ScriptedHints) -> Result<ScriptedInfo, Status> {
        if let Some(status) = self.faults.lock().query {
            return Err(status);
        }
        if hints.config.is_none() {
            return Err(Status::EINVAL);
        }
        let id = self.id();
        self.ledger.lock().infos.insert(id, 0);
        self.stats.lock().infos_queried += 1;
        self.record(Event::InfoQueried { info: id });
        Ok(ScriptedInfo { id })
    }

    fn release_info(&self, info: ScriptedInfo) {
        {
            let mut ledger = self.ledger.lock();
            match ledger.infos.remove(&info.id) {
                Some(0) => {}
                Some(open) => self.violation(
                    &mut ledger,
                    format!("info {} released with {} open fabrics", info.id, open),
                ),
                None => self.violation(&mut ledger, format!("info {} released twice", info.id)),
            }
        }
        self.stats.lock().infos_released += 1;
        self.record(Event::InfoReleased { info: info.id });
    }

    fn open_fabric(&self, info: &ScriptedInfo) -> Result<ScriptedFabric, Status> {
        if let Some(status) = self.faults.lock().fabric_open {
            return Err(status);
        }
        let id = self.id();
        {
            let mut ledger = self.ledger.lock();
            match ledger.infos.get_mut(&info.id) {
                Some(open) => *open += 1,
                None => {
                    self.violation(&mut ledger, format!("fabric opened from dead info {}", info.id));
                    return Err(Status::EINVAL);
                }
            }
            ledger.fabrics.insert(id, (info.id, 0));
        }
        self.stats.lock().fabrics_opened += 1;
        self.record(Event::FabricOpened { fabric: id });
        Ok(ScriptedFabric { id })
    }

    fn close_fabric(&self, fabric: ScriptedFabric) -> Status {
        {
            let mut ledger = self.ledger.lock();
            match ledger.fabrics.get(&fabric.id).copied() {
                Some((_, domains)) if domains > 0 => {
                    self.violation(
                        &mut ledger,
                        format!("fabric {} closed with {} open domains", fabric.id, domains),
                    );
                    return Status::EBUSY;
                }
                Some((info, _)) => {
                    ledger.fabrics.remove(&fabric.id);
                    if let Some(open) = ledger.infos.get_mut(&info) {
                        *open -= 1;
                    }
                }
                None => {
                    self.violation(&mut ledger, format!("fabric {} closed twice", fabric.id));
                    return Status::EINVAL;
                }
            }
        }
        self.stats.lock().fabrics_closed += 1;
        self.record(Event::FabricClosed { fabric: fabric.id });
        Status::SUCCESS
    }

    fn open_domain(
        &self,
        fabric: &ScriptedFabric,
        _info: &ScriptedInfo,
    ) -> Result<ScriptedDomain, Status> {
        let call = self.domain_open_calls.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some((nth, status)) = self.faults.lock().domain_open {
            if call == nth {
                return Err(status);
            }
        }
        let id = self.id();
        {
            let mut ledger = self.ledger.lock();
            match ledger.fabrics.get_mut(&fabric.id) {
                Some((_, domains)) => *domains += 1,
                None => {
                    self.violation(&mut ledger, format!("domain opened on closed fabric {}", fabric.id));
                    return Err(Status::EINVAL);
                }
            }
            ledger.domains.insert(id, (fabric.id, thread::current().id()));
        }
        let open_now = self.open_domains.fetch_add(1, Ordering::AcqRel) + 1;
        {
            let mut stats = self.stats.lock();
            stats.domains_opened += 1;
            stats.peak_open_domains = stats.peak_open_domains.max(open_now);
        }
        self.record(Event::DomainOpened {
            domain: id,
            fabric: fabric.id,
        });
        Ok(ScriptedDomain {
            id,
            fabric: fabric.id,
        })
    }

    fn close_domain(&self, domain: ScriptedDomain) -> Status {
        let call = self.domain_close_calls.fetch_add(1, Ordering::AcqRel) + 1;
        {
            let mut ledger = self.ledger.lock();
            match ledger.domains.remove(&domain.id) {
                Some((fabric, owner)) => {
                    if owner != thread::current().id() {
                        self.violation(
                            &mut ledger,
                            format!("domain {} closed by a thread that did not open it", domain.id),
                        );
                    }
                    if let Some((_, domains)) = ledger.fabrics.get_mut(&fabric) {
                        *domains -= 1;
                    } else {
                        self.violation(
                            &mut ledger,
                            format!("domain {} closed after fabric {}", domain.id, fabric),
                        );
                    }
                }
                None => {
                    self.violation(&mut ledger, format!("domain {} closed twice", domain.id));
                    return Status::EINVAL;
                }
            }
        }
        self.open_domains.fetch_sub(1, Ordering::AcqRel);
        self.stats.lock().domains_closed += 1;
        self.record(Event::DomainClosed {
            domain: domain.id,
            fabric: domain.fabric,
        });
        match self.faults.lock().domain_close {
            Some((nth, status)) if nth == call => status,
            _ => Status::SUCCESS,
        }
    }

    fn open_endpoint(
        &self,
        _domain: &ScriptedDomain,
        _info: &ScriptedInfo,
    ) -> Result<ScriptedEndpoint, Status> {
        let endpoint = ScriptedEndpoint::new(self.address.clone());
        let id = self.id();
        self.record(Event::EndpointOpened { endpoint: id });
        Ok(endpoint.with_id(id))
    }

    fn close_endpoint(&self, endpoint: ScriptedEndpoint) -> Status {
        self.record(Event::EndpointClosed {
            endpoint: endpoint.id,
        });
        Status::SUCCESS
    }

    fn describe(&self, status: Status) -> String {
        match status {
            Status::SUCCESS => "Success".to_string(),
            Status::ENOMEM => "Cannot allocate memory".to_string(),
            Status::EBUSY => "Device or resource busy".to_string(),
            Status::EINVAL => "Invalid argument".to_string(),
            Status::ENODATA => "No data available".to_string(),
            Status::ETOOSMALL => "Provided buffer is too small".to_string(),
            Status::EOTHER => "Unspecified error".to_string(),
            other => format!("Unknown error {}", other.errno()),
        }
    }
}

/// How a [`ScriptedEndpoint`] answers `fi_getname`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeBehavior {
    /// Probe returns too-small with the length, fetch fills the buffer
    Conforming,
    /// Probe with no buffer returns success (a provider bug)
    ProbeSucceeds,
    /// Probe returns this status instead of too-small
    ProbeFails(Status),
    /// Fetch returns this status
    FetchFails(Status),
    /// Fetch succeeds but reports one byte less than the probe
    FetchShrinks,
}

/// Endpoint answering name queries from a fixed address.
pub struct ScriptedEndpoint {
    id: u64,
    address: Vec<u8>,
    behavior: ProbeBehavior,
    calls: AtomicUsize,
    fetch_lengths: Mutex<Vec<usize>>,
}

impl ScriptedEndpoint {
    /// Conforming endpoint bound to `address`.
    pub fn new(address: Vec<u8>) -> Self {
        Self {
            id: 0,
            address,
            behavior: ProbeBehavior::Conforming,
            calls: AtomicUsize::new(0),
            fetch_lengths: Mutex::new(Vec::new()),
        }
    }

    /// Override the name query behaviour.
    pub fn with_behavior(mut self, behavior: ProbeBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Number of `get_name` calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Buffer lengths passed to fetch calls, in order.
    pub fn fetch_buffer_lengths(&self) -> Vec<usize> {
        self.fetch_lengths.lock().clone()
    }
}

impl NameQuery for ScriptedEndpoint {
    fn get_name(&self, buf: Option<&mut [u8]>, len: &mut usize) -> Status {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let needed = self.address.len();
        let buf = match buf {
            None => {
                *len = needed;
                return match self.behavior {
                    ProbeBehavior::ProbeSucceeds => Status::SUCCESS,
                    ProbeBehavior::ProbeFails(status) => status,
                    _ => Status::ETOOSMALL,
                };
            }
            Some(buf) => buf,
        };

        self.fetch_lengths.lock().push(buf.len());
        if let ProbeBehavior::FetchFails(status) = self.behavior {
            return status;
        }
        if buf.len() < needed || *len < needed {
            *len = needed;
            return Status::ETOOSMALL;
        }
        buf[..needed].copy_from_slice(&self.address);
        *len = if self.behavior == ProbeBehavior::FetchShrinks {
            needed.saturating_sub(1)
        } else {
            needed
        };
        Status::SUCCESS
    }
}
