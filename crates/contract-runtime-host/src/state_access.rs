//! `state` host module.
//!
//! Key/value storage scoped to the executing contract's address:
//! - `state.get(key_ptr, key_len, out_ptr, out_cap) -> i32`: full value
//!   length, or -1 if absent; at most `out_cap` bytes are copied
//! - `state.put(key_ptr, key_len, val_ptr, val_len)`
//! - `state.delete(key_ptr, key_len) -> i32`: 1 if the key existed

use std::sync::Arc;

use wasmtime::{Caller, Linker};

use contract_runtime_common::{HostFunctionError, RuntimeError};
use contract_runtime_core::{CallRegistry, SandboxState};

use crate::memory::{read_bytes, write_bytes};

/// Register the `state` module.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_state(
    linker: &mut Linker<SandboxState>,
    registry: &Arc<CallRegistry>,
) -> Result<(), RuntimeError> {
    let get_registry = registry.clone();
    linker
        .func_wrap_async(
            "state",
            "get",
            move |mut caller: Caller<'_, SandboxState>,
                  (key_ptr, key_len, out_ptr, out_cap): (i32, i32, i32, i32)| {
                let registry = get_registry.clone();
                Box::new(async move {
                    state_get(&mut caller, &registry, key_ptr, key_len, out_ptr, out_cap).await
                })
            },
        )
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to register state.get: {e}")))?;

    let put_registry = registry.clone();
    linker
        .func_wrap_async(
            "state",
            "put",
            move |mut caller: Caller<'_, SandboxState>,
                  (key_ptr, key_len, val_ptr, val_len): (i32, i32, i32, i32)| {
                let registry = put_registry.clone();
                Box::new(async move {
                    state_put(&mut caller, &registry, key_ptr, key_len, val_ptr, val_len).await
                })
            },
        )
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to register state.put: {e}")))?;

    let delete_registry = registry.clone();
    linker
        .func_wrap_async(
            "state",
            "delete",
            move |mut caller: Caller<'_, SandboxState>, (key_ptr, key_len): (i32, i32)| {
                let registry = delete_registry.clone();
                Box::new(async move { state_delete(&mut caller, &registry, key_ptr, key_len).await })
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register state.delete: {e}"))
        })?;

    Ok(())
}

async fn state_get(
    caller: &mut Caller<'_, SandboxState>,
    registry: &CallRegistry,
    key_ptr: i32,
    key_len: i32,
    out_ptr: i32,
    out_cap: i32,
) -> wasmtime::Result<i32> {
    let info = registry.lookup(caller.data().id())?;
    let key = read_bytes(caller, key_ptr, key_len)?;

    let Some(value) = info
        .state
        .get_state(&info.contract, &key)
        .await
        .map_err(HostFunctionError::from)?
    else {
        return Ok(-1);
    };

    let cap = usize::try_from(out_cap).unwrap_or(0);
    let copied = value.len().min(cap);
    write_bytes(caller, out_ptr, &value[..copied])?;

    Ok(i32::try_from(value.len()).unwrap_or(i32::MAX))
}

async fn state_put(
    caller: &mut Caller<'_, SandboxState>,
    registry: &CallRegistry,
    key_ptr: i32,
    key_len: i32,
    val_ptr: i32,
    val_len: i32,
) -> wasmtime::Result<()> {
    let info = registry.lookup(caller.data().id())?;
    let key = read_bytes(caller, key_ptr, key_len)?;
    let value = read_bytes(caller, val_ptr, val_len)?;

    info.state
        .put_state(&info.contract, &key, value)
        .await
        .map_err(HostFunctionError::from)?;
    Ok(())
}

async fn state_delete(
    caller: &mut Caller<'_, SandboxState>,
    registry: &CallRegistry,
    key_ptr: i32,
    key_len: i32,
) -> wasmtime::Result<i32> {
    let info = registry.lookup(caller.data().id())?;
    let key = read_bytes(caller, key_ptr, key_len)?;

    let existed = info
        .state
        .delete_state(&info.contract, &key)
        .await
        .map_err(HostFunctionError::from)?;
    Ok(i32::from(existed))
}
