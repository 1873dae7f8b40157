//! Domain lifecycle worker.
//!
//! One worker is one complete acquisition: discover, open a fabric, open and
//! close a domain `cycles` times, then tear everything down in reverse. Every
//! native call is checked and the first failure ends the worker; there is no
//! retry.

use fabstress_core::{FabricResult, HintsConfig};
use fabstress_fabric::{FabricProvider, Hints};
use tracing::{debug, trace};

use crate::signal::StopSignal;

/// What a lifecycle worker got through before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleOutcome {
    /// Domain open/close cycles completed.
    pub cycles: usize,
    /// True if the worker stopped early because the harness was halted.
    pub halted: bool,
}

impl LifecycleOutcome {
    fn halted_before_start() -> Self {
        Self {
            cycles: 0,
            halted: true,
        }
    }
}

/// Runs one discovery-through-teardown sequence against a provider.
pub struct DomainLifecycleWorker<'a, P: FabricProvider> {
    provider: &'a P,
    hints: &'a HintsConfig,
    cycles: usize,
    halt: &'a StopSignal,
    index: usize,
}

impl<'a, P: FabricProvider> DomainLifecycleWorker<'a, P> {
    /// Create a worker that performs `cycles` domain open/close pairs.
    ///
    /// `halt` is polled between cycles; once raised the worker stops opening
    /// domains and tears down.
    pub fn new(
        provider: &'a P,
        hints: &'a HintsConfig,
        cycles: usize,
        halt: &'a StopSignal,
        index: usize,
    ) -> Self {
        Self {
            provider,
            hints,
            cycles,
            halt,
            index,
        }
    }

    /// Run the sequence.
    ///
    /// The halt signal is also polled before discovery and before the fabric
    /// is opened, so a worker released after a failure acquires nothing.
    pub fn run(&self) -> FabricResult<LifecycleOutcome> {
        if self.halt.is_raised() {
            return Ok(LifecycleOutcome::halted_before_start());
        }
        let hints = Hints::build(self.provider, self.hints)?;
        let query = hints.query()?;
        if self.halt.is_raised() {
            query.release();
            hints.release();
            return Ok(LifecycleOutcome::halted_before_start());
        }
        let fabric = query.open_fabric()?;
        debug!(worker = self.index, "fabric open");

        let mut outcome = LifecycleOutcome {
            cycles: 0,
            halted: false,
        };
        for _ in 0..self.cycles {
            if self.halt.is_raised() {
                outcome.halted = true;
                break;
            }
            let domain = fabric.open_domain()?;
            domain.close()?;
            outcome.cycles += 1;
        }
        trace!(worker = self.index, cycles = outcome.cycles, "domain cycles done");

        fabric.close()?;
        query.release();
        hints.release();

        debug!(
            worker = self.index,
            cycles = outcome.cycles,
            halted = outcome.halted,
            "lifecycle worker finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabstress_core::{FabricError, Status};
    use fabstress_fabric::testkit::{Event, ScriptedProvider};

    fn run(provider: &ScriptedProvider, cycles: usize, halt: &StopSignal) -> FabricResult<LifecycleOutcome> {
        let hints = HintsConfig::default();
        DomainLifecycleWorker::new(provider, &hints, cycles, halt, 0).run()
    }

    #[test]
    fn test_completes_all_cycles() {
        let provider = ScriptedProvider::new();
        let outcome = run(&provider, 500, &StopSignal::new()).unwrap();
        assert_eq!(
            outcome,
            LifecycleOutcome {
                cycles: 500,
                halted: false
            }
        );

        let stats = provider.stats();
        assert_eq!(stats.fabrics_opened, 1);
        assert_eq!(stats.domains_opened, 500);
        assert_eq!(stats.domains_closed, 500);
        assert_eq!(stats.peak_open_domains, 1);
        assert_eq!(provider.outstanding(), (0, 0, 0, 0));
        assert!(provider.violations().is_empty());
    }

    #[test]
    fn test_each_close_follows_its_open() {
        let provider = ScriptedProvider::new().with_event_log();
        run(&provider, 20, &StopSignal::new()).unwrap();

        let events = provider.events();
        let domain_events: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::DomainOpened { .. } | Event::DomainClosed { .. }))
            .collect();
        assert_eq!(domain_events.len(), 40);
        for pair in domain_events.chunks(2) {
            match (pair[0], pair[1]) {
                (
                    Event::DomainOpened { domain: a, .. },
                    Event::DomainClosed { domain: b, .. },
                ) => assert_eq!(a, b),
                other => panic!("unexpected pair {:?}", other),
            }
        }
    }

    #[test]
    fn test_fabric_closed_after_last_domain() {
        let provider = ScriptedProvider::new().with_event_log();
        run(&provider, 5, &StopSignal::new()).unwrap();

        let events = provider.events();
        let last_domain_close = events
            .iter()
            .rposition(|e| matches!(e, Event::DomainClosed { .. }))
            .unwrap();
        let fabric_close = events
            .iter()
            .position(|e| matches!(e, Event::FabricClosed { .. }))
            .unwrap();
        let info_release = events
            .iter()
            .position(|e| matches!(e, Event::InfoReleased { .. }))
            .unwrap();
        assert!(last_domain_close < fabric_close);
        assert!(fabric_close < info_release);
        assert_eq!(
            events.last(),
            Some(&Event::HintsReleased {
                dest_addr_cleared: true
            })
        );
    }

    #[test]
    fn test_domain_open_failure_is_fatal_and_tears_down() {
        let provider = ScriptedProvider::new();
        provider.fail_domain_open(37, Status::ENOMEM);

        let err = run(&provider, 500, &StopSignal::new()).unwrap_err();
        let site = err.call_site().copied().unwrap();
        assert!(site.file.ends_with("lifecycle.rs"));
        assert_eq!(site.operation, "fi_domain");
        assert_eq!(err.status(), Some(Status::ENOMEM));

        assert_eq!(provider.stats().domains_opened, 36);
        assert_eq!(provider.outstanding(), (0, 0, 0, 0));
        assert!(provider.violations().is_empty());
    }

    #[test]
    fn test_domain_close_failure_is_fatal() {
        let provider = ScriptedProvider::new();
        provider.fail_domain_close(3, Status::EBUSY);

        let err = run(&provider, 10, &StopSignal::new()).unwrap_err();
        assert_eq!(err.call_site().unwrap().operation, "fi_close");
        assert_eq!(provider.stats().domains_opened, 3);
    }

    #[test]
    fn test_discovery_failure_opens_nothing() {
        let provider = ScriptedProvider::new();
        provider.fail_query(Status::ENODATA);

        let err = run(&provider, 10, &StopSignal::new()).unwrap_err();
        assert_eq!(err.call_site().unwrap().operation, "fi_getinfo");
        assert_eq!(provider.stats().fabrics_opened, 0);
        assert_eq!(provider.outstanding(), (0, 0, 0, 0));
    }

    #[test]
    fn test_fabric_open_failure() {
        let provider = ScriptedProvider::new();
        provider.fail_fabric_open(Status::EINVAL);

        let err = run(&provider, 10, &StopSignal::new()).unwrap_err();
        assert_eq!(err.call_site().unwrap().operation, "fi_fabric");
        assert_eq!(provider.outstanding(), (0, 0, 0, 0));
    }

    #[test]
    fn test_hints_allocation_failure() {
        let provider = ScriptedProvider::new();
        provider.fail_hints_alloc();
        let err = run(&provider, 10, &StopSignal::new()).unwrap_err();
        assert!(matches!(err, FabricError::Allocation(_)));
    }

    #[test]
    fn test_halt_before_start_acquires_nothing() {
        let provider = ScriptedProvider::new();
        let halt = StopSignal::new();
        halt.raise();

        let outcome = run(&provider, 500, &halt).unwrap();
        assert_eq!(
            outcome,
            LifecycleOutcome {
                cycles: 0,
                halted: true
            }
        );
        let stats = provider.stats();
        assert_eq!(stats.hints_allocated, 0);
        assert_eq!(stats.infos_queried, 0);
        assert_eq!(stats.fabrics_opened, 0);
        assert_eq!(stats.domains_opened, 0);
        assert_eq!(provider.outstanding(), (0, 0, 0, 0));
    }

    #[test]
    fn test_halt_raised_by_peer_stops_other_workers() {
        let provider = ScriptedProvider::new();
        provider.fail_domain_open(3, Status::ENOMEM);
        let halt = StopSignal::new();

        assert!(run(&provider, 10, &halt).is_err());
        halt.raise();
        let outcome = run(&provider, 10, &halt).unwrap();

        assert!(outcome.halted);
        let stats = provider.stats();
        assert_eq!(stats.hints_allocated, 1);
        assert_eq!(stats.fabrics_opened, 1);
        assert_eq!(stats.domains_opened, 2);
        assert_eq!(provider.outstanding(), (0, 0, 0, 0));
    }
}
