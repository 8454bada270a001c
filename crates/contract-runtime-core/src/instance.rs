//! Per-call sandbox lifecycle.
//!
//! A [`Sandbox`] is one instance of a compiled contract with its own store,
//! linear memory and fuel pool. It is created for exactly one call and closed
//! when dropped:
//!
//! 1. Instantiate the module against the host linker with a fresh store
//! 2. Allocate guest memory through the `alloc` export and copy the payload in
//! 3. Invoke the named export with the payload offset
//! 4. Collect the result and fuel consumption

use std::time::{Duration, Instant};

use tracing::{debug, error, instrument, warn};
use wasmtime::{Instance, Linker, Store, Trap, Val};

use contract_runtime_common::{ExecutionConfig, HostFunctionError, RuntimeError};

use crate::store::{FuelMeter, SandboxId, SandboxState, create_store};
use crate::{CompiledModule, ExecutionStats, WasmEngine};

/// Name of the guest's linear memory export.
pub const MEMORY_EXPORT: &str = "memory";

/// Name of the guest's allocation export.
pub const ALLOC_EXPORT: &str = "alloc";

/// An isolated, single-use contract instance.
pub struct Sandbox {
    store: Store<SandboxState>,
    instance: Instance,
    timeout_ms: u64,
    created_at: Instant,
}

impl Sandbox {
    /// Instantiate `module` in a fresh store holding `fuel`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Instantiation`] if the store cannot be set up,
    /// an import cannot be resolved, or the engine has no free instance slot.
    #[instrument(skip_all, fields(content_hash = %module.content_hash(), fuel = fuel))]
    pub async fn instantiate(
        engine: &WasmEngine,
        linker: &Linker<SandboxState>,
        module: &CompiledModule,
        config: &ExecutionConfig,
        fuel: u64,
    ) -> Result<Self, RuntimeError> {
        let created_at = Instant::now();
        let mut store = create_store(engine, config, fuel)?;

        let instance = linker
            .instantiate_async(&mut store, module.as_module())
            .await
            .map_err(|e| RuntimeError::instantiation(format!("{e:#}")))?;

        debug!(sandbox_id = %store.data().id(), "Sandbox created");

        Ok(Self {
            store,
            instance,
            timeout_ms: config.timeout_ms,
            created_at,
        })
    }

    /// This sandbox's identity.
    pub fn id(&self) -> SandboxId {
        self.store.data().id()
    }

    /// Mutable access to the store data, e.g. to attach a nested-call invoker.
    pub fn state_mut(&mut self) -> &mut SandboxState {
        self.store.data_mut()
    }

    /// Fuel left in the pool.
    pub fn remaining_fuel(&self) -> u64 {
        self.store.remaining_fuel()
    }

    /// Fuel consumed so far.
    pub fn fuel_consumed(&self) -> u64 {
        self.store.fuel_consumed()
    }

    /// Time since the sandbox was created.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Measurements for this call so far.
    pub fn execution_stats(&self, cache_hit: bool) -> ExecutionStats {
        ExecutionStats {
            fuel_used: self.fuel_consumed(),
            elapsed: self.elapsed(),
            cache_hit,
        }
    }

    /// Copy `payload` into guest memory and call `function` with its offset.
    ///
    /// Returns whatever the guest last recorded as its call result, or an
    /// empty vector if it recorded nothing.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::MemoryWrite`] if `memory`/`alloc` are missing or the copy fails
    /// - [`RuntimeError::ExportMissing`] if `function` is not an exported function
    /// - [`RuntimeError::FuelExhausted`] / [`RuntimeError::ExecutionTimeout`] on resource limits
    /// - [`RuntimeError::HostFunction`] if a host capability failed
    /// - [`RuntimeError::Trap`] for any other fault inside the guest
    #[instrument(skip(self, payload), fields(sandbox_id = %self.id(), payload_len = payload.len()))]
    pub async fn invoke(&mut self, function: &str, payload: &[u8]) -> Result<Vec<u8>, RuntimeError> {
        let ptr = self.write_payload(payload).await?;

        let func = self
            .instance
            .get_func(&mut self.store, function)
            .ok_or_else(|| RuntimeError::export_missing(function))?;
        let result_count = func.ty(&self.store).results().len();
        let mut results = vec![Val::I32(0); result_count];

        let outcome = func
            .call_async(&mut self.store, &[Val::I32(ptr)], &mut results)
            .await;

        match outcome {
            Ok(()) => {
                let output = self.store.data_mut().take_result().unwrap_or_default();
                debug!(
                    fuel_used = self.fuel_consumed(),
                    output_len = output.len(),
                    "Guest function returned"
                );
                Ok(output)
            }
            Err(e) => {
                let err = classify_error(e, self.timeout_ms);
                match &err {
                    RuntimeError::FuelExhausted | RuntimeError::ExecutionTimeout { .. } => {
                        warn!(fuel_used = self.fuel_consumed(), error = %err, "Execution stopped");
                    }
                    _ => {
                        error!(fuel_used = self.fuel_consumed(), error = %err, "Execution trapped");
                    }
                }
                Err(err)
            }
        }
    }

    async fn write_payload(&mut self, payload: &[u8]) -> Result<i32, RuntimeError> {
        let memory = self
            .instance
            .get_memory(&mut self.store, MEMORY_EXPORT)
            .ok_or_else(|| RuntimeError::memory_write("module does not export `memory`"))?;
        let alloc = self
            .instance
            .get_typed_func::<i32, i32>(&mut self.store, ALLOC_EXPORT)
            .map_err(|e| RuntimeError::memory_write(format!("`alloc` export unusable: {e}")))?;

        let len = i32::try_from(payload.len())
            .map_err(|_| RuntimeError::memory_write("payload exceeds guest address space"))?;

        let ptr = alloc
            .call_async(&mut self.store, len)
            .await
            .map_err(|e| match classify_error(e, self.timeout_ms) {
                err @ (RuntimeError::FuelExhausted | RuntimeError::ExecutionTimeout { .. }) => err,
                other => RuntimeError::memory_write(format!("`alloc` failed: {other}")),
            })?;

        let offset = usize::try_from(ptr)
            .map_err(|_| RuntimeError::memory_write(format!("`alloc` returned {ptr}")))?;
        memory
            .write(&mut self.store, offset, payload)
            .map_err(|e| RuntimeError::memory_write(e.to_string()))?;

        Ok(ptr)
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        debug!(
            sandbox_id = %self.id(),
            fuel_used = self.fuel_consumed(),
            duration_us = u64::try_from(self.elapsed().as_micros()).unwrap_or(u64::MAX),
            "Sandbox closed"
        );
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id())
            .field("remaining_fuel", &self.remaining_fuel())
            .finish_non_exhaustive()
    }
}

/// Map an error raised while running guest code onto the runtime taxonomy.
///
/// Errors raised by host capabilities keep their identity; engine traps are
/// split into resource limits and genuine guest faults.
pub fn classify_error(error: wasmtime::Error, timeout_ms: u64) -> RuntimeError {
    let error = match error.downcast::<RuntimeError>() {
        Ok(runtime) => return runtime,
        Err(other) => other,
    };
    let error = match error.downcast::<HostFunctionError>() {
        Ok(host) => return RuntimeError::HostFunction(host),
        Err(other) => other,
    };

    match error.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => RuntimeError::FuelExhausted,
        Some(Trap::Interrupt) => RuntimeError::ExecutionTimeout {
            duration_ms: timeout_ms,
        },
        Some(trap) => RuntimeError::trap(error.to_string(), Some(format!("{trap:?}"))),
        None => RuntimeError::trap(error.to_string(), None),
    }
}
