//! Native status → fatal diagnostic.
//!
//! Every resource-lifecycle call goes through [`check`] or [`check_result`].
//! Success is a no-op; anything else becomes a [`FabricError::Native`] that
//! carries the caller's file, line, column and the native operation name.
//! There is no recoverable class of native error: callers propagate the
//! error with `?` until the harness halts the process.

use std::panic::Location;

use fabstress_core::{CallSite, FabricError, FabricResult, Status};
use tracing::error;

use crate::provider::FabricProvider;

/// Validate a native status.
#[track_caller]
pub fn check<P: FabricProvider + ?Sized>(
    provider: &P,
    status: Status,
    operation: &'static str,
) -> FabricResult<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(escalate(provider, status, CallSite::new(Location::caller(), operation)))
}

/// Validate a native call that produced a value on success.
#[track_caller]
pub fn check_result<P: FabricProvider + ?Sized, T>(
    provider: &P,
    result: Result<T, Status>,
    operation: &'static str,
) -> FabricResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(status) => Err(escalate(
            provider,
            status,
            CallSite::new(Location::caller(), operation),
        )),
    }
}

fn escalate<P: FabricProvider + ?Sized>(provider: &P, status: Status, site: CallSite) -> FabricError {
    let message = provider.describe(status);
    error!(
        file = site.file,
        line = site.line,
        column = site.column,
        operation = site.operation,
        status = status.code(),
        "native call failed: {}",
        message
    );
    FabricError::Native {
        site,
        status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedProvider;

    #[test]
    fn test_success_is_noop() {
        let provider = ScriptedProvider::new();
        assert!(check(&provider, Status::SUCCESS, "fi_close").is_ok());
        assert_eq!(check_result(&provider, Ok::<_, Status>(7), "fi_domain").unwrap(), 7);
    }

    #[test]
    fn test_failure_records_call_site() {
        let provider = ScriptedProvider::new();
        let line = line!() + 1;
        let err = check(&provider, Status::EBUSY, "fi_close").unwrap_err();

        let site = err.call_site().copied().unwrap();
        assert!(site.file.ends_with("check.rs"));
        assert_eq!(site.line, line);
        assert_eq!(site.operation, "fi_close");
        assert_eq!(err.status(), Some(Status::EBUSY));
    }

    #[test]
    fn test_failure_message_uses_provider_description() {
        let provider = ScriptedProvider::new();
        let err = check_result(&provider, Err::<(), _>(Status::ENODATA), "fi_getinfo").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Check failed file: "));
        assert!(msg.contains("`fi_getinfo`"));
        assert!(msg.ends_with(&provider.describe(Status::ENODATA)));
    }
}
