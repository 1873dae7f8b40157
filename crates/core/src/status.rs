//! Native status codes
//!
//! libfabric reports failures as negated `fi_errno` values: `0` is success,
//! `-FI_ETOOSMALL` means a caller-supplied buffer was too small, and so on.
//! `Status` keeps the raw code so it can be handed back to `fi_strerror`.

use std::fmt;

/// `FI_ERRNO_OFFSET` from `rdma/fi_errno.h`; provider-specific codes start here.
pub const FI_ERRNO_OFFSET: i32 = 256;

/// A raw status returned by a native fabric call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(i32);

impl Status {
    /// The call succeeded.
    pub const SUCCESS: Status = Status(0);
    /// Out of memory (`-FI_ENOMEM`).
    pub const ENOMEM: Status = Status(-12);
    /// Resource busy (`-FI_EBUSY`).
    pub const EBUSY: Status = Status(-16);
    /// Invalid argument (`-FI_EINVAL`).
    pub const EINVAL: Status = Status(-22);
    /// No matching provider (`-FI_ENODATA`).
    pub const ENODATA: Status = Status(-61);
    /// Unspecified provider error (`-FI_EOTHER`).
    pub const EOTHER: Status = Status(-FI_ERRNO_OFFSET);
    /// Provided buffer is too small (`-FI_ETOOSMALL`).
    pub const ETOOSMALL: Status = Status(-(FI_ERRNO_OFFSET + 1));

    /// Wrap a raw return code.
    pub const fn from_raw(code: i32) -> Self {
        Status(code)
    }

    /// The raw return code, as the native call produced it.
    pub const fn code(self) -> i32 {
        self.0
    }

    /// The positive errno value, as `fi_strerror` expects it.
    pub const fn errno(self) -> i32 {
        self.0.wrapping_abs()
    }

    /// True when the call succeeded.
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Convert to a `Result`, keeping the failing status as the error.
    pub fn into_result(self) -> Result<(), Status> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Status(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Status::SUCCESS => write!(f, "success"),
            Status::ENOMEM => write!(f, "-FI_ENOMEM"),
            Status::EBUSY => write!(f, "-FI_EBUSY"),
            Status::EINVAL => write!(f, "-FI_EINVAL"),
            Status::ENODATA => write!(f, "-FI_ENODATA"),
            Status::EOTHER => write!(f, "-FI_EOTHER"),
            Status::ETOOSMALL => write!(f, "-FI_ETOOSMALL"),
            Status(code) => write!(f, "status {}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_zero() {
        assert!(Status::SUCCESS.is_success());
        assert!(Status::from_raw(0).is_success());
        assert_eq!(Status::SUCCESS.into_result(), Ok(()));
    }

    #[test]
    fn test_failure_keeps_code() {
        let status = Status::from(-22);
        assert!(!status.is_success());
        assert_eq!(status, Status::EINVAL);
        assert_eq!(status.into_result(), Err(Status::EINVAL));
    }

    #[test]
    fn test_errno_is_positive() {
        assert_eq!(Status::ETOOSMALL.code(), -257);
        assert_eq!(Status::ETOOSMALL.errno(), 257);
        assert_eq!(Status::ENODATA.errno(), 61);
    }

    #[test]
    fn test_display_names_known_codes() {
        assert_eq!(Status::ETOOSMALL.to_string(), "-FI_ETOOSMALL");
        assert_eq!(Status::from_raw(-999).to_string(), "status -999");
    }
}
