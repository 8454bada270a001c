//! Host function registration for Wasmtime linkers.
//!
//! Every sandbox is instantiated against one shared linker carrying the
//! `log`, `balance`, `state` and `contract` modules. Host functions find the
//! call they are servicing through the [`CallRegistry`].

use std::sync::Arc;

use tracing::warn;
use wasmtime::{Caller, Linker};

use contract_runtime_common::RuntimeError;
use contract_runtime_core::{CallRegistry, SandboxState, WasmEngine};

use crate::balance::register_balance;
use crate::contract::register_contract;
use crate::logging::{LoggingHost, level_from_i32};
use crate::memory::read_bytes;
use crate::state_access::register_state;

/// Build a linker with every host module registered.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn build_linker(
    engine: &WasmEngine,
    registry: &Arc<CallRegistry>,
) -> Result<Linker<SandboxState>, RuntimeError> {
    let mut linker = Linker::new(engine.inner());
    register_all(&mut linker, registry)?;
    Ok(linker)
}

/// Register all host modules on a linker.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(
    linker: &mut Linker<SandboxState>,
    registry: &Arc<CallRegistry>,
) -> Result<(), RuntimeError> {
    register_logging(linker, registry)?;
    register_balance(linker, registry)?;
    register_state(linker, registry)?;
    register_contract(linker, registry)?;
    Ok(())
}

/// Register the logging host function.
///
/// Registers `log.write(level: i32, ptr: i32, len: i32)`.
///
/// # Memory Protocol
///
/// The guest passes:
/// - `level`: Log level (0=debug, 1=info, 2=warn, 3=error)
/// - `ptr`: Pointer to the message string in guest memory
/// - `len`: Length of the message in bytes (UTF-8)
///
/// Bad pointers are reported and the line dropped; logging never traps.
pub fn register_logging(
    linker: &mut Linker<SandboxState>,
    registry: &Arc<CallRegistry>,
) -> Result<(), RuntimeError> {
    let registry = registry.clone();
    linker
        .func_wrap(
            "log",
            "write",
            move |mut caller: Caller<'_, SandboxState>, level: i32, ptr: i32, len: i32| {
                let sandbox = caller.data().id();

                let bytes = match read_bytes(&mut caller, ptr, len) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(sandbox_id = sandbox.get(), error = %e, "Dropped guest log line");
                        return;
                    }
                };
                let message = String::from_utf8_lossy(&bytes);
                let contract = registry.get(sandbox).map(|info| info.contract);

                LoggingHost::log(sandbox, contract.as_ref(), level_from_i32(level), &message);
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register log function: {e}"))
        })?;

    Ok(())
}
