//! Ownership-checked resource lifecycle.
//!
//! Wraps the raw provider handles so the lifecycle ordering is enforced by
//! the borrow checker:
//!
//! ```text
//! Hints ──query()──► QueryResult ──open_fabric()──► FabricSession<'q>
//!                                                        │ open_domain()
//!                                                        ▼
//!                                                  DomainGuard<'f> ──open_endpoint()──► EndpointGuard<'d>
//! ```
//!
//! Each guard borrows its parent, and the consuming `close`/`release`
//! methods need the parent unborrowed, so a domain cannot outlive its fabric
//! and a fabric cannot outlive its query result. Explicit `close` checks the
//! native status; `Drop` is the unwind/error path and only logs.

use fabstress_core::{FabricError, FabricResult, HintsConfig, Status};
use tracing::warn;

use crate::check::{check, check_result};
use crate::provider::{FabricProvider, NameQuery};

/// Configured hints descriptor.
pub struct Hints<'p, P: FabricProvider> {
    provider: &'p P,
    raw: Option<P::Hints>,
}

impl<'p, P: FabricProvider> Hints<'p, P> {
    /// Allocate a descriptor and write `config` into it.
    pub fn build(provider: &'p P, config: &HintsConfig) -> FabricResult<Self> {
        let raw = provider
            .alloc_hints()
            .ok_or(FabricError::Allocation("Hints"))?;
        let mut hints = Hints {
            provider,
            raw: Some(raw),
        };
        if let Some(raw) = hints.raw.as_mut() {
            provider.apply_hints(raw, config)?;
        }
        Ok(hints)
    }

    /// Resolve the hints to a query result (`fi_getinfo`).
    #[track_caller]
    pub fn query(&self) -> FabricResult<QueryResult<'p, P>> {
        let version = self.provider.api_version();
        let info = check_result(
            self.provider,
            self.provider.get_info(version, self.raw()),
            "fi_getinfo",
        )?;
        Ok(QueryResult {
            provider: self.provider,
            raw: Some(info),
        })
    }

    /// Clear the destination address and free the descriptor.
    pub fn release(self) {
        drop(self)
    }

    fn raw(&self) -> &P::Hints {
        self.raw
            .as_ref()
            .unwrap_or_else(|| unreachable!("hints used after release"))
    }
}

impl<P: FabricProvider> Drop for Hints<'_, P> {
    fn drop(&mut self) {
        if let Some(mut raw) = self.raw.take() {
            self.provider.clear_dest_addr(&mut raw);
            self.provider.release_hints(raw);
        }
    }
}

/// Provider-matched configuration returned by discovery.
pub struct QueryResult<'p, P: FabricProvider> {
    provider: &'p P,
    raw: Option<P::Info>,
}

impl<'p, P: FabricProvider> QueryResult<'p, P> {
    /// Open a fabric from this result's fabric attributes (`fi_fabric`).
    #[track_caller]
    pub fn open_fabric(&self) -> FabricResult<FabricSession<'_, P>> {
        let fabric = check_result(
            self.provider,
            self.provider.open_fabric(self.raw()),
            "fi_fabric",
        )?;
        Ok(FabricSession {
            query: self,
            raw: Some(fabric),
        })
    }

    /// Free the query result.
    pub fn release(self) {
        drop(self)
    }

    fn raw(&self) -> &P::Info {
        self.raw
            .as_ref()
            .unwrap_or_else(|| unreachable!("query result used after release"))
    }
}

impl<P: FabricProvider> Drop for QueryResult<'_, P> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.provider.release_info(raw);
        }
    }
}

/// An open fabric, borrowed from the query result it was opened from.
pub struct FabricSession<'q, P: FabricProvider> {
    query: &'q QueryResult<'q, P>,
    raw: Option<P::Fabric>,
}

impl<'q, P: FabricProvider> FabricSession<'q, P> {
    /// Open a domain on this fabric (`fi_domain`).
    #[track_caller]
    pub fn open_domain(&self) -> FabricResult<DomainGuard<'_, P>> {
        let provider = self.query.provider;
        let domain = check_result(
            provider,
            provider.open_domain(self.raw(), self.query.raw()),
            "fi_domain",
        )?;
        Ok(DomainGuard {
            fabric: self,
            raw: Some(domain),
        })
    }

    /// Close the fabric (`fi_close`).
    #[track_caller]
    pub fn close(mut self) -> FabricResult<()> {
        let provider = self.query.provider;
        match self.raw.take() {
            Some(raw) => check(provider, provider.close_fabric(raw), "fi_close"),
            None => Ok(()),
        }
    }

    fn raw(&self) -> &P::Fabric {
        self.raw
            .as_ref()
            .unwrap_or_else(|| unreachable!("fabric used after close"))
    }
}

impl<P: FabricProvider> Drop for FabricSession<'_, P> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            let provider = self.query.provider;
            let status = provider.close_fabric(raw);
            if !status.is_success() {
                warn!(status = status.code(), "fabric close on unwind failed: {}", provider.describe(status));
            }
        }
    }
}

/// An open domain, borrowed from its fabric.
pub struct DomainGuard<'f, P: FabricProvider> {
    fabric: &'f FabricSession<'f, P>,
    raw: Option<P::Domain>,
}

impl<'f, P: FabricProvider> DomainGuard<'f, P> {
    /// Open an endpoint on this domain (`fi_endpoint`).
    #[track_caller]
    pub fn open_endpoint(&self) -> FabricResult<EndpointGuard<'_, P>> {
        let query = self.fabric.query;
        let endpoint = check_result(
            query.provider,
            query.provider.open_endpoint(self.raw(), query.raw()),
            "fi_endpoint",
        )?;
        Ok(EndpointGuard {
            provider: query.provider,
            _domain: self,
            raw: Some(endpoint),
        })
    }

    /// Close the domain (`fi_close`).
    #[track_caller]
    pub fn close(mut self) -> FabricResult<()> {
        let provider = self.fabric.query.provider;
        match self.raw.take() {
            Some(raw) => check(provider, provider.close_domain(raw), "fi_close"),
            None => Ok(()),
        }
    }

    fn raw(&self) -> &P::Domain {
        self.raw
            .as_ref()
            .unwrap_or_else(|| unreachable!("domain used after close"))
    }
}

impl<P: FabricProvider> Drop for DomainGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            let provider = self.fabric.query.provider;
            let status = provider.close_domain(raw);
            if !status.is_success() {
                warn!(status = status.code(), "domain close on unwind failed: {}", provider.describe(status));
            }
        }
    }
}

/// An open endpoint, borrowed from its domain.
pub struct EndpointGuard<'d, P: FabricProvider> {
    provider: &'d P,
    _domain: &'d DomainGuard<'d, P>,
    raw: Option<P::Endpoint>,
}

impl<'d, P: FabricProvider> EndpointGuard<'d, P> {
    /// Close the endpoint (`fi_close`).
    #[track_caller]
    pub fn close(mut self) -> FabricResult<()> {
        match self.raw.take() {
            Some(raw) => check(self.provider, self.provider.close_endpoint(raw), "fi_close"),
            None => Ok(()),
        }
    }
}

impl<P: FabricProvider> NameQuery for EndpointGuard<'_, P> {
    fn get_name(&self, buf: Option<&mut [u8]>, len: &mut usize) -> Status {
        match self.raw.as_ref() {
            Some(raw) => raw.get_name(buf, len),
            None => Status::EINVAL,
        }
    }
}

impl<P: FabricProvider> Drop for EndpointGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            let status = self.provider.close_endpoint(raw);
            if !status.is_success() {
                warn!(status = status.code(), "endpoint close on unwind failed: {}", self.provider.describe(status));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{Event, ScriptedProvider};

    #[test]
    fn test_full_lifecycle_order() {
        let provider = ScriptedProvider::new().with_event_log();
        let hints = Hints::build(&provider, &HintsConfig::default()).unwrap();
        let query = hints.query().unwrap();
        let fabric = query.open_fabric().unwrap();
        let domain = fabric.open_domain().unwrap();
        domain.close().unwrap();
        fabric.close().unwrap();
        query.release();
        hints.release();

        let events = provider.events();
        assert!(matches!(events[0], Event::HintsAllocated));
        assert!(matches!(events[1], Event::HintsApplied(_)));
        assert!(matches!(events[2], Event::InfoQueried { .. }));
        assert!(matches!(events[3], Event::FabricOpened { .. }));
        assert!(matches!(events[4], Event::DomainOpened { .. }));
        assert!(matches!(events[5], Event::DomainClosed { .. }));
        assert!(matches!(events[6], Event::FabricClosed { .. }));
        assert!(matches!(events[7], Event::InfoReleased { .. }));
        assert_eq!(
            events[8],
            Event::HintsReleased {
                dest_addr_cleared: true
            }
        );
        assert!(provider.violations().is_empty());
    }

    #[test]
    fn test_hints_carry_config() {
        let provider = ScriptedProvider::new().with_event_log();
        let mut config = HintsConfig::default();
        config.provider_name = "tcp".to_string();
        let hints = Hints::build(&provider, &config).unwrap();
        drop(hints);

        let applied = provider
            .events()
            .into_iter()
            .find_map(|e| match e {
                Event::HintsApplied(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(applied.provider_name, "tcp");
    }

    #[test]
    fn test_hints_allocation_failure() {
        let provider = ScriptedProvider::new();
        provider.fail_hints_alloc();
        let err = Hints::build(&provider, &HintsConfig::default()).err().unwrap();
        assert!(matches!(err, FabricError::Allocation("Hints")));
    }

    #[test]
    fn test_query_failure_releases_hints() {
        let provider = ScriptedProvider::new();
        provider.fail_query(Status::ENODATA);
        {
            let hints = Hints::build(&provider, &HintsConfig::default()).unwrap();
            let err = hints.query().err().unwrap();
            assert_eq!(err.status(), Some(Status::ENODATA));
            assert_eq!(err.call_site().unwrap().operation, "fi_getinfo");
        }
        let stats = provider.stats();
        assert_eq!(stats.hints_allocated, stats.hints_released);
        assert!(provider.violations().is_empty());
    }

    #[test]
    fn test_drop_unwinds_in_reverse_order() {
        let provider = ScriptedProvider::new().with_event_log();
        {
            let hints = Hints::build(&provider, &HintsConfig::default()).unwrap();
            let query = hints.query().unwrap();
            let fabric = query.open_fabric().unwrap();
            let _domain = fabric.open_domain().unwrap();
            // Everything dropped here without explicit close
        }
        assert!(provider.violations().is_empty());
        let stats = provider.stats();
        assert_eq!(stats.domains_opened, stats.domains_closed);
        assert_eq!(stats.fabrics_opened, stats.fabrics_closed);
        assert_eq!(stats.infos_queried, stats.infos_released);
    }

    #[test]
    fn test_domain_open_failure_names_call_site() {
        let provider = ScriptedProvider::new();
        provider.fail_domain_open(1, Status::ENOMEM);
        let hints = Hints::build(&provider, &HintsConfig::default()).unwrap();
        let query = hints.query().unwrap();
        let fabric = query.open_fabric().unwrap();

        let line = line!() + 1;
        let err = fabric.open_domain().err().unwrap();
        let site = err.call_site().copied().unwrap();
        assert!(site.file.ends_with("session.rs"));
        assert_eq!(site.line, line);
        assert_eq!(site.operation, "fi_domain");
    }

    #[test]
    fn test_domain_close_failure_is_checked() {
        let provider = ScriptedProvider::new();
        provider.fail_domain_close(1, Status::EBUSY);
        let hints = Hints::build(&provider, &HintsConfig::default()).unwrap();
        let query = hints.query().unwrap();
        let fabric = query.open_fabric().unwrap();
        let domain = fabric.open_domain().unwrap();
        let err = domain.close().unwrap_err();
        assert_eq!(err.status(), Some(Status::EBUSY));
        assert_eq!(err.call_site().unwrap().operation, "fi_close");
    }

    #[test]
    fn test_endpoint_reports_address() {
        let provider = ScriptedProvider::new().with_address(vec![0xfe, 0x80, 0x01]);
        let hints = Hints::build(&provider, &HintsConfig::default()).unwrap();
        let query = hints.query().unwrap();
        let fabric = query.open_fabric().unwrap();
        let domain = fabric.open_domain().unwrap();
        let endpoint = domain.open_endpoint().unwrap();

        let addr = crate::address::local_address(&endpoint).unwrap();
        assert_eq!(addr, vec![0xfe, 0x80, 0x01]);

        endpoint.close().unwrap();
        domain.close().unwrap();
        fabric.close().unwrap();
        assert!(provider.violations().is_empty());
    }
}
