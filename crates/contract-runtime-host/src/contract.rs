//! `contract` host module.
//!
//! - `contract.set_call_result(ptr, len)`: record the bytes returned to the caller
//! - `contract.remaining_fuel() -> i64`
//! - `contract.deploy(id_ptr, id_len, data_ptr, data_len, out_ptr) -> i32`:
//!   create an account bound to a stored contract id and write its address
//!   to `out_ptr`; 0 on success, 1 if the backend refused
//! - `contract.call_contract(addr_ptr, fn_ptr, fn_len, params_ptr, params_len,
//!   fuel, value) -> i64`: run a nested call and return its result packed as
//!   `(ptr << 32) | len`, or -1 if the nested call failed
//!
//! A nested call is funded from the caller's own pool: `fuel` is debited
//! before the call and whatever the nested call leaves unused is granted
//! back afterwards.

use std::sync::Arc;

use tracing::{debug, instrument};
use wasmtime::{Caller, Linker};

use contract_runtime_common::{ContractId, HostFunctionError, RuntimeError};
use contract_runtime_core::{CallRegistry, FuelMeter, SandboxState};

use crate::memory::{alloc_and_write, pack_ptr_len, read_address, read_bytes, read_string, write_bytes};

/// Arguments of `contract.call_contract`, as passed by the guest.
#[derive(Debug, Clone, Copy)]
struct NestedCallArgs {
    addr_ptr: i32,
    fn_ptr: i32,
    fn_len: i32,
    params_ptr: i32,
    params_len: i32,
    fuel: i64,
    value: i64,
}

/// Register the `contract` module.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_contract(
    linker: &mut Linker<SandboxState>,
    registry: &Arc<CallRegistry>,
) -> Result<(), RuntimeError> {
    linker
        .func_wrap(
            "contract",
            "set_call_result",
            |mut caller: Caller<'_, SandboxState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let bytes = read_bytes(&mut caller, ptr, len)?;
                caller.data_mut().set_result(bytes);
                Ok(())
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register contract.set_call_result: {e}"))
        })?;

    linker
        .func_wrap(
            "contract",
            "remaining_fuel",
            |caller: Caller<'_, SandboxState>| -> i64 {
                i64::try_from(caller.remaining_fuel()).unwrap_or(i64::MAX)
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register contract.remaining_fuel: {e}"))
        })?;

    let deploy_registry = registry.clone();
    linker
        .func_wrap_async(
            "contract",
            "deploy",
            move |mut caller: Caller<'_, SandboxState>,
                  (id_ptr, id_len, data_ptr, data_len, out_ptr): (i32, i32, i32, i32, i32)| {
                let registry = deploy_registry.clone();
                Box::new(async move {
                    deploy(&mut caller, &registry, id_ptr, id_len, data_ptr, data_len, out_ptr)
                        .await
                })
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register contract.deploy: {e}"))
        })?;

    let call_registry = registry.clone();
    linker
        .func_wrap_async(
            "contract",
            "call_contract",
            move |mut caller: Caller<'_, SandboxState>,
                  (addr_ptr, fn_ptr, fn_len, params_ptr, params_len, fuel, value): (
                i32,
                i32,
                i32,
                i32,
                i32,
                i64,
                i64,
            )| {
                let registry = call_registry.clone();
                let args = NestedCallArgs {
                    addr_ptr,
                    fn_ptr,
                    fn_len,
                    params_ptr,
                    params_len,
                    fuel,
                    value,
                };
                Box::new(async move { call_contract(&mut caller, &registry, args).await })
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register contract.call_contract: {e}"))
        })?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn deploy(
    caller: &mut Caller<'_, SandboxState>,
    registry: &CallRegistry,
    id_ptr: i32,
    id_len: i32,
    data_ptr: i32,
    data_len: i32,
    out_ptr: i32,
) -> wasmtime::Result<i32> {
    let info = registry.lookup(caller.data().id())?;
    let id = ContractId::new(read_bytes(caller, id_ptr, id_len)?);
    let creation_data = read_bytes(caller, data_ptr, data_len)?;

    match info.state.new_account_with_contract(&id, &creation_data).await {
        Ok(address) => {
            write_bytes(caller, out_ptr, address.as_bytes())?;
            debug!(deployer = %info.contract, contract_id = %id, address = %address, "Account created");
            Ok(0)
        }
        Err(e) => {
            debug!(deployer = %info.contract, contract_id = %id, error = %e, "Deploy refused");
            Ok(1)
        }
    }
}

#[instrument(skip_all, fields(sandbox_id = %caller.data().id(), fuel = args.fuel))]
async fn call_contract(
    caller: &mut Caller<'_, SandboxState>,
    registry: &CallRegistry,
    args: NestedCallArgs,
) -> wasmtime::Result<i64> {
    let info = registry.lookup(caller.data().id())?;
    let invoker = caller
        .data()
        .invoker()
        .ok_or_else(|| HostFunctionError::InvalidArgument {
            reason: "nested calls are not available in this sandbox".into(),
        })?;

    let limit = invoker.max_call_depth();
    if info.depth >= limit {
        return Err(HostFunctionError::CallDepthExceeded { limit }.into());
    }

    let target = read_address(caller, args.addr_ptr)?;
    let function = read_string(caller, args.fn_ptr, args.fn_len)?;
    let params = read_bytes(caller, args.params_ptr, args.params_len)?;
    let fuel = u64::try_from(args.fuel).map_err(|_| HostFunctionError::InvalidArgument {
        reason: format!("negative fuel budget {}", args.fuel),
    })?;
    let value = u64::try_from(args.value).map_err(|_| HostFunctionError::InvalidArgument {
        reason: format!("negative call value {}", args.value),
    })?;

    caller.consume_fuel(fuel)?;

    if value > 0 {
        if let Err(e) = info
            .state
            .transfer_balance(&info.contract, &target, value)
            .await
        {
            debug!(to = %target, value, error = %e, "Nested call value transfer refused");
            caller.refund_fuel(fuel);
            return Ok(-1);
        }
    }

    let outcome = invoker
        .invoke(info.nested(target, function, params, fuel, value))
        .await;
    caller.refund_fuel(fuel.saturating_sub(outcome.fuel_used));

    match outcome.output {
        Ok(bytes) => {
            let len = u32::try_from(bytes.len()).map_err(|_| HostFunctionError::InvalidArgument {
                reason: "nested call result too large".into(),
            })?;
            let ptr = alloc_and_write(caller, &bytes).await?;
            debug!(to = %target, fuel_used = outcome.fuel_used, len, "Nested call returned");
            Ok(pack_ptr_len(ptr, len))
        }
        Err(e) => {
            debug!(to = %target, fuel_used = outcome.fuel_used, error = %e, "Nested call failed");
            Ok(-1)
        }
    }
}
