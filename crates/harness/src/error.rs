//! Harness-level errors
//!
//! Wraps the fatal `FabricError` raised by a lifecycle worker together with
//! the failures that only exist at the thread-pool level.

use std::any::Any;
use std::io;

use fabstress_core::FabricError;
use thiserror::Error;

/// Result type alias for harness operations
pub type StressResult<T> = std::result::Result<T, StressError>;

/// Fatal harness error
#[derive(Debug, Error)]
pub enum StressError {
    /// A resource-lifecycle call failed
    #[error(transparent)]
    Fabric(#[from] FabricError),

    /// A worker thread could not be started
    #[error("failed to spawn {role} worker {index}: {source}")]
    Spawn {
        /// Pool the worker belongs to
        role: &'static str,
        /// Worker index within its pool
        index: usize,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// A worker thread panicked
    #[error("{role} worker {index} panicked: {message}")]
    WorkerPanicked {
        /// Pool the worker belongs to
        role: &'static str,
        /// Worker index within its pool
        index: usize,
        /// Panic payload, if it was a string
        message: String,
    },
}

impl StressError {
    pub(crate) fn panicked(role: &'static str, index: usize, payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "(non-string panic)".to_string());
        StressError::WorkerPanicked {
            role,
            index,
            message,
        }
    }

    /// The underlying fabric error, if this failure came from a native call
    pub fn as_fabric(&self) -> Option<&FabricError> {
        match self {
            StressError::Fabric(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fabric_error_is_transparent() {
        let err = StressError::from(FabricError::Allocation("Hints"));
        assert_eq!(err.to_string(), "Hints allocation failed");
        assert!(err.as_fabric().is_some());
    }

    #[test]
    fn test_panic_payload_str() {
        let err = StressError::panicked("pressure", 3, Box::new("boom"));
        assert_eq!(err.to_string(), "pressure worker 3 panicked: boom");
    }

    #[test]
    fn test_panic_payload_string() {
        let err = StressError::panicked("domain", 0, Box::new(String::from("bad state")));
        assert!(err.to_string().ends_with("bad state"));
        assert!(err.as_fabric().is_none());
    }

    #[test]
    fn test_panic_payload_other() {
        let err = StressError::panicked("domain", 1, Box::new(42u32));
        assert!(err.to_string().contains("(non-string panic)"));
    }

    #[test]
    fn test_spawn_display() {
        let err = StressError::Spawn {
            role: "domain",
            index: 7,
            source: io::Error::new(io::ErrorKind::WouldBlock, "no threads"),
        };
        assert_eq!(err.to_string(), "failed to spawn domain worker 7: no threads");
    }
}
