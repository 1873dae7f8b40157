//! Local address extraction (`fi_getname`).
//!
//! Two calls: a size probe with no buffer, which must come back
//! `-FI_ETOOSMALL` with a positive length, then a fill into a buffer of
//! exactly that length. Any other outcome is a protocol violation.
//!
//! The address is not used to bind or connect anything; this is a
//! standalone query on an open handle.

use fabstress_core::{FabricError, FabricResult, Status};

use crate::provider::NameQuery;

/// Read the locally bound address of `handle`.
///
/// The returned buffer's length equals the probed length and it carries no
/// spare capacity.
pub fn local_address<N: NameQuery + ?Sized>(handle: &N) -> FabricResult<Vec<u8>> {
    let mut len = 0usize;
    let status = handle.get_name(None, &mut len);
    if status != Status::ETOOSMALL || len == 0 {
        return Err(FabricError::unexpected(format!(
            "address size probe returned {} with length {}",
            status, len
        )));
    }

    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| FabricError::Allocation("Address buffer"))?;
    data.resize(len, 0u8);

    let mut filled = len;
    let status = handle.get_name(Some(&mut data), &mut filled);
    if !status.is_success() {
        return Err(FabricError::unexpected(format!(
            "address fetch returned {}",
            status
        )));
    }
    if filled != len {
        return Err(FabricError::unexpected(format!(
            "address length changed from {} to {} between probe and fetch",
            len, filled
        )));
    }

    data.shrink_to_fit();
    Ok(data)
}
