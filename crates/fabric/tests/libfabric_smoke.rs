//! Smoke tests against the system libfabric.
//!
//! These need libfabric installed and a verbs device that matches the default
//! hints, so they are ignored by default:
//!
//! `cargo test -p fabstress-fabric --test libfabric_smoke -- --ignored`

use fabstress_core::HintsConfig;
use fabstress_fabric::{local_address, FabricProvider, Hints, LibfabricProvider};

#[test]
#[ignore = "requires libfabric and a verbs device"]
fn test_domain_cycle_on_verbs() {
    let provider = LibfabricProvider::load().unwrap();
    assert!(provider.api_version() >> 16 >= 1);

    let hints = Hints::build(&provider, &HintsConfig::default()).unwrap();
    let query = hints.query().unwrap();
    let fabric = query.open_fabric().unwrap();
    for _ in 0..10 {
        fabric.open_domain().unwrap().close().unwrap();
    }
    fabric.close().unwrap();
    query.release();
    hints.release();
}

#[test]
#[ignore = "requires libfabric and a verbs device"]
fn test_endpoint_address_probe() {
    let provider = LibfabricProvider::load().unwrap();
    let hints = Hints::build(&provider, &HintsConfig::default()).unwrap();
    let query = hints.query().unwrap();
    let fabric = query.open_fabric().unwrap();
    let domain = fabric.open_domain().unwrap();
    let endpoint = domain.open_endpoint().unwrap();

    let addr = local_address(&endpoint).unwrap();
    assert!(!addr.is_empty());
    assert_eq!(addr.capacity(), addr.len());

    endpoint.close().unwrap();
    domain.close().unwrap();
    fabric.close().unwrap();
}

#[test]
#[ignore = "requires libfabric"]
fn test_strerror_describes_status() {
    let provider = LibfabricProvider::load().unwrap();
    let msg = provider.describe(fabstress_core::Status::ETOOSMALL);
    assert!(!msg.is_empty());
}
