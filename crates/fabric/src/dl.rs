//! Runtime loading of the native fabric library.
//!
//! `SharedLibrary` wraps `dlopen`/`dlsym`/`dlclose` so the binary carries no
//! link-time dependency on libfabric. Used by `LibfabricProvider::load` to
//! open `libfabric.so.1`.

use std::ffi::{c_char, c_int, c_void, CStr};

use fabstress_core::{FabricError, FabricResult};

/// Handle to a dynamically loaded shared library.
pub struct SharedLibrary {
    handle: *mut c_void,
}

// SAFETY: the dlopen handle is a process-global resource. dlsym and dlclose
// are thread-safe; symbol usage is the caller's concern.
unsafe impl Send for SharedLibrary {}
unsafe impl Sync for SharedLibrary {}

impl SharedLibrary {
    /// Open a shared library by name with `RTLD_NOW | RTLD_LOCAL`.
    pub fn open(name: &CStr) -> FabricResult<Self> {
        // SAFETY: name is a valid C string. RTLD_NOW resolves every symbol
        // immediately so a broken install fails here rather than mid-run.
        let handle = unsafe { dlopen(name.as_ptr(), RTLD_NOW | RTLD_LOCAL) };
        if handle.is_null() {
            return Err(FabricError::Library(format!(
                "{}: {}",
                name.to_string_lossy(),
                last_error().unwrap_or_else(|| "unknown dlopen error".to_string())
            )));
        }
        Ok(Self { handle })
    }

    /// Try each candidate in order, returning the first that opens.
    pub fn open_first(candidates: &[&CStr]) -> FabricResult<Self> {
        let mut failures = Vec::with_capacity(candidates.len());
        for name in candidates {
            match Self::open(name) {
                Ok(lib) => return Ok(lib),
                Err(e) => failures.push(e.to_string()),
            }
        }
        Err(FabricError::Library(failures.join("; ")))
    }

    /// Look up a symbol by name.
    ///
    /// # Safety
    ///
    /// The caller must cast the returned pointer to the symbol's real
    /// signature before calling it.
    pub unsafe fn symbol(&self, name: &CStr) -> FabricResult<*mut c_void> {
        // Clear any stale error so a null symbol can be told apart from a
        // missing one.
        dlerror();
        let ptr = dlsym(self.handle, name.as_ptr());
        if let Some(msg) = last_error() {
            return Err(FabricError::Library(format!(
                "{}: {}",
                name.to_string_lossy(),
                msg
            )));
        }
        if ptr.is_null() {
            return Err(FabricError::Library(format!(
                "{} resolved to null",
                name.to_string_lossy()
            )));
        }
        Ok(ptr)
    }
}

impl Drop for SharedLibrary {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            // SAFETY: handle came from a successful dlopen and is closed once.
            unsafe {
                dlclose(self.handle);
            }
        }
    }
}

fn last_error() -> Option<String> {
    // SAFETY: dlerror returns either null or a NUL-terminated thread-local
    // string that stays valid until the next dl* call on this thread.
    let err = unsafe { dlerror() };
    if err.is_null() {
        None
    } else {
        Some(
            unsafe { CStr::from_ptr(err) }
                .to_string_lossy()
                .into_owned(),
        )
    }
}

const RTLD_NOW: c_int = 2;
const RTLD_LOCAL: c_int = 0;

extern "C" {
    fn dlopen(filename: *const c_char, flags: c_int) -> *mut c_void;
    fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
    fn dlclose(handle: *mut c_void) -> c_int;
    fn dlerror() -> *const c_char;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_library_fails() {
        let err = SharedLibrary::open(c"libfabstress-does-not-exist.so.0")
            .err()
            .expect("missing library must not load");
        let msg = err.to_string();
        assert!(msg.contains("libfabstress-does-not-exist.so.0"));
    }

    #[test]
    fn test_open_first_reports_every_candidate() {
        let err = SharedLibrary::open_first(&[c"libfabstress-a.so", c"libfabstress-b.so"])
            .err()
            .expect("no candidate exists");
        let msg = err.to_string();
        assert!(msg.contains("libfabstress-a.so"));
        assert!(msg.contains("libfabstress-b.so"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_resolve_libc_symbol() {
        let lib = SharedLibrary::open(c"libc.so.6").unwrap();
        let ptr = unsafe { lib.symbol(c"malloc") }.unwrap();
        assert!(!ptr.is_null());

        let missing = unsafe { lib.symbol(c"fabstress_no_such_symbol") };
        assert!(missing.is_err());
    }
}
