//! Guest memory access for host functions.
//!
//! Every pointer a guest hands to a host function is bounds-checked here
//! before it is dereferenced.

use wasmtime::{Caller, Extern, Memory};

use contract_runtime_common::{ADDRESS_LEN, Address, HostFunctionError};
use contract_runtime_core::{ALLOC_EXPORT, MEMORY_EXPORT, SandboxState};

fn memory_error(reason: impl Into<String>) -> HostFunctionError {
    HostFunctionError::MemoryAccess {
        reason: reason.into(),
    }
}

/// The guest's exported linear memory.
///
/// # Errors
///
/// Returns [`HostFunctionError::MissingExport`] if the guest exports no memory.
pub fn guest_memory(caller: &mut Caller<'_, SandboxState>) -> Result<Memory, HostFunctionError> {
    caller
        .get_export(MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .ok_or_else(|| HostFunctionError::MissingExport {
            name: MEMORY_EXPORT.into(),
        })
}

/// Validate a guest `(ptr, len)` pair and turn it into a byte range.
fn checked_range(ptr: i32, len: i32, memory_size: usize) -> Result<std::ops::Range<usize>, HostFunctionError> {
    let start = usize::try_from(ptr).map_err(|_| memory_error(format!("negative pointer {ptr}")))?;
    let len = usize::try_from(len).map_err(|_| memory_error(format!("negative length {len}")))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| memory_error("pointer + length overflow"))?;
    if end > memory_size {
        return Err(memory_error(format!(
            "range {start}..{end} exceeds memory size {memory_size}"
        )));
    }
    Ok(start..end)
}

/// Copy `len` bytes out of guest memory starting at `ptr`.
///
/// # Errors
///
/// Returns an error if the memory is missing or the range is out of bounds.
pub fn read_bytes(
    caller: &mut Caller<'_, SandboxState>,
    ptr: i32,
    len: i32,
) -> Result<Vec<u8>, HostFunctionError> {
    let memory = guest_memory(caller)?;
    let data = memory.data(&*caller);
    let range = checked_range(ptr, len, data.len())?;
    Ok(data[range].to_vec())
}

/// Read a UTF-8 string out of guest memory.
///
/// # Errors
///
/// Returns an error if the range is out of bounds or not valid UTF-8.
pub fn read_string(
    caller: &mut Caller<'_, SandboxState>,
    ptr: i32,
    len: i32,
) -> Result<String, HostFunctionError> {
    String::from_utf8(read_bytes(caller, ptr, len)?).map_err(|e| {
        HostFunctionError::InvalidArgument {
            reason: format!("string is not valid UTF-8: {e}"),
        }
    })
}

/// Read a fixed-size [`Address`] from guest memory.
///
/// # Errors
///
/// Returns an error if the range is out of bounds.
pub fn read_address(
    caller: &mut Caller<'_, SandboxState>,
    ptr: i32,
) -> Result<Address, HostFunctionError> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let bytes = read_bytes(caller, ptr, ADDRESS_LEN as i32)?;
    Address::from_slice(&bytes).ok_or_else(|| memory_error("short address read"))
}

/// Copy `bytes` into guest memory at `ptr`.
///
/// # Errors
///
/// Returns an error if the memory is missing or the range is out of bounds.
pub fn write_bytes(
    caller: &mut Caller<'_, SandboxState>,
    ptr: i32,
    bytes: &[u8],
) -> Result<(), HostFunctionError> {
    let memory = guest_memory(caller)?;
    let len = i32::try_from(bytes.len()).map_err(|_| memory_error("write too large"))?;
    let range = checked_range(ptr, len, memory.data_size(&*caller))?;
    memory
        .write(&mut *caller, range.start, bytes)
        .map_err(|e| memory_error(e.to_string()))
}

/// Allocate space through the guest's `alloc` export and copy `bytes` there.
///
/// Returns the guest pointer.
///
/// # Errors
///
/// Propagates traps raised by `alloc` itself; returns a host error if the
/// export is missing or the write is out of bounds.
pub async fn alloc_and_write(
    caller: &mut Caller<'_, SandboxState>,
    bytes: &[u8],
) -> wasmtime::Result<i32> {
    let alloc = caller
        .get_export(ALLOC_EXPORT)
        .and_then(Extern::into_func)
        .ok_or_else(|| HostFunctionError::MissingExport {
            name: ALLOC_EXPORT.into(),
        })?
        .typed::<i32, i32>(&*caller)?;

    let len = i32::try_from(bytes.len()).map_err(|_| memory_error("write too large"))?;
    let ptr = alloc.call_async(&mut *caller, len).await?;
    write_bytes(caller, ptr, bytes)?;
    Ok(ptr)
}

/// Pack a guest pointer and length into one `i64` as `(ptr << 32) | len`.
pub fn pack_ptr_len(ptr: i32, len: u32) -> i64 {
    (i64::from(ptr) << 32) | i64::from(len)
}
