//! Error types for fabstress
//!
//! Every failure in the resource lifecycle is fatal. The variants only exist
//! so the diagnostic says which kind of contract was broken:
//! - `Native`: a fabric call returned a non-success status
//! - `Allocation`: a descriptor or buffer could not be allocated
//! - `Unexpected`: the provider (or the caller) violated a call protocol
//! - `Library`: the native library could not be loaded

use crate::status::Status;
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Result type alias for fabric operations
pub type FabricResult<T> = std::result::Result<T, FabricError>;

/// Where a checked native call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Source file of the call.
    pub file: &'static str,
    /// Line of the call.
    pub line: u32,
    /// Column of the call.
    pub column: u32,
    /// Native operation that was invoked (e.g. `fi_domain`). The enclosing
    /// function is identified by `file`, `line` and `column`.
    pub operation: &'static str,
}

impl CallSite {
    /// Build a call site from a caller location.
    pub fn new(location: &'static Location<'static>, operation: &'static str) -> Self {
        CallSite {
            file: location.file(),
            line: location.line(),
            column: location.column(),
            operation,
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}:{}) `{}`",
            self.file, self.line, self.column, self.operation
        )
    }
}

/// Fatal error raised by the fabric resource lifecycle
#[derive(Debug, Error)]
pub enum FabricError {
    /// A native call failed
    #[error("Check failed file: {site}: {message}")]
    Native {
        /// Where the failing call was made
        site: CallSite,
        /// Raw status the call returned
        status: Status,
        /// Provider description of the status (`fi_strerror`)
        message: String,
    },

    /// Allocation failed before any native status existed
    #[error("{0} allocation failed")]
    Allocation(&'static str),

    /// A call protocol was violated
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// The native library or one of its symbols could not be loaded
    #[error("failed to load fabric library: {0}")]
    Library(String),
}

impl FabricError {
    /// Create an unexpected-condition error
    pub fn unexpected(msg: impl Into<String>) -> Self {
        FabricError::Unexpected(msg.into())
    }

    /// Native status carried by this error, if any
    pub fn status(&self) -> Option<Status> {
        match self {
            FabricError::Native { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Call site carried by this error, if any
    pub fn call_site(&self) -> Option<&CallSite> {
        match self {
            FabricError::Native { site, .. } => Some(site),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn here(operation: &'static str) -> CallSite {
        CallSite::new(Location::caller(), operation)
    }

    #[test]
    fn test_native_display_names_site_and_message() {
        let site = here("fi_domain");
        let err = FabricError::Native {
            site,
            status: Status::ENOMEM,
            message: "Cannot allocate memory".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Check failed file: "));
        assert!(msg.contains("error.rs("));
        assert!(msg.contains(&format!("({}:{})", site.line, site.column)));
        assert!(msg.contains("`fi_domain`"));
        assert!(msg.ends_with(": Cannot allocate memory"));
    }

    #[test]
    fn test_call_site_tracks_caller() {
        let line = line!() + 1;
        let site = here("fi_fabric");
        assert!(site.file.ends_with("error.rs"));
        assert_eq!(site.line, line);
        assert_eq!(site.operation, "fi_fabric");
    }

    #[test]
    fn test_allocation_display() {
        let err = FabricError::Allocation("Hints");
        assert_eq!(err.to_string(), "Hints allocation failed");
        assert!(err.status().is_none());
        assert!(err.call_site().is_none());
    }

    #[test]
    fn test_unexpected_display() {
        let err = FabricError::unexpected("sizing probe returned success");
        assert_eq!(
            err.to_string(),
            "Unexpected error: sizing probe returned success"
        );
    }

    #[test]
    fn test_status_accessor() {
        let err = FabricError::Native {
            site: here("fi_close"),
            status: Status::EBUSY,
            message: "Device or resource busy".to_string(),
        };
        assert_eq!(err.status(), Some(Status::EBUSY));
        assert_eq!(err.call_site().map(|s| s.operation), Some("fi_close"));
    }
}
