//! `balance` host module.
//!
//! - `balance.get(addr_ptr) -> i64`
//! - `balance.send(to_ptr, amount) -> i32`: 0 on success, 1 if the transfer
//!   was refused by the state backend

use std::sync::Arc;

use tracing::debug;
use wasmtime::{Caller, Linker};

use contract_runtime_common::{HostFunctionError, RuntimeError};
use contract_runtime_core::{CallRegistry, SandboxState};

use crate::memory::read_address;

/// Register the `balance` module.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_balance(
    linker: &mut Linker<SandboxState>,
    registry: &Arc<CallRegistry>,
) -> Result<(), RuntimeError> {
    let get_registry = registry.clone();
    linker
        .func_wrap_async(
            "balance",
            "get",
            move |mut caller: Caller<'_, SandboxState>, (addr_ptr,): (i32,)| {
                let registry = get_registry.clone();
                Box::new(async move { balance_get(&mut caller, &registry, addr_ptr).await })
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register balance.get: {e}"))
        })?;

    let send_registry = registry.clone();
    linker
        .func_wrap_async(
            "balance",
            "send",
            move |mut caller: Caller<'_, SandboxState>, (to_ptr, amount): (i32, i64)| {
                let registry = send_registry.clone();
                Box::new(async move { balance_send(&mut caller, &registry, to_ptr, amount).await })
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register balance.send: {e}"))
        })?;

    Ok(())
}

async fn balance_get(
    caller: &mut Caller<'_, SandboxState>,
    registry: &CallRegistry,
    addr_ptr: i32,
) -> wasmtime::Result<i64> {
    let info = registry.lookup(caller.data().id())?;
    let address = read_address(caller, addr_ptr)?;

    let balance = info
        .state
        .get_balance(&address)
        .await
        .map_err(HostFunctionError::from)?;

    Ok(i64::try_from(balance).unwrap_or(i64::MAX))
}

async fn balance_send(
    caller: &mut Caller<'_, SandboxState>,
    registry: &CallRegistry,
    to_ptr: i32,
    amount: i64,
) -> wasmtime::Result<i32> {
    let info = registry.lookup(caller.data().id())?;
    let to = read_address(caller, to_ptr)?;
    let amount = u64::try_from(amount).map_err(|_| HostFunctionError::InvalidArgument {
        reason: format!("negative transfer amount {amount}"),
    })?;

    match info.state.transfer_balance(&info.contract, &to, amount).await {
        Ok(()) => Ok(0),
        Err(e) => {
            debug!(from = %info.contract, to = %to, amount, error = %e, "Transfer refused");
            Ok(1)
        }
    }
}
