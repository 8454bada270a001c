//! Per-sandbox store state and fuel metering.
//!
//! This module provides:
//! - [`SandboxId`]: the handle host capabilities use to find their call
//! - [`SandboxState`]: data carried by every sandbox [`Store`]
//! - [`FuelMeter`]: fuel operations shared by a sandbox store and host callers
//! - [`create_store`]: builds a store with its fuel pool, deadline and memory limit

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use wasmtime::{AsContext, AsContextMut, Store, StoreLimits, StoreLimitsBuilder};

use contract_runtime_common::{ExecutionConfig, RuntimeError};

use crate::WasmEngine;
use crate::context::ContractInvoker;

static NEXT_SANDBOX_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of one sandbox.
///
/// Allocated from a process-wide counter, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SandboxId(u64);

impl SandboxId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_SANDBOX_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sbx-{}", self.0)
    }
}

/// Data stored in each sandbox's [`Store`].
///
/// Host functions read it through [`wasmtime::Caller::data`].
pub struct SandboxState {
    id: SandboxId,
    limits: StoreLimits,
    initial_fuel: u64,
    fuel_granted: u64,
    result: Option<Vec<u8>>,
    invoker: Option<Arc<dyn ContractInvoker>>,
}

impl SandboxState {
    /// Create state for a sandbox with the given fuel budget.
    pub fn new(initial_fuel: u64, max_memory_bytes: usize) -> Self {
        Self {
            id: SandboxId::next(),
            limits: StoreLimitsBuilder::new()
                .memory_size(max_memory_bytes)
                .instances(1)
                .build(),
            initial_fuel,
            fuel_granted: 0,
            result: None,
            invoker: None,
        }
    }

    /// This sandbox's identity.
    pub fn id(&self) -> SandboxId {
        self.id
    }

    /// Fuel the sandbox was created with.
    pub fn initial_fuel(&self) -> u64 {
        self.initial_fuel
    }

    /// Fuel added on top of the initial budget.
    pub fn fuel_granted(&self) -> u64 {
        self.fuel_granted
    }

    /// Record the call result.
    pub fn set_result(&mut self, bytes: Vec<u8>) {
        self.result = Some(bytes);
    }

    /// Take the call result, leaving none behind.
    pub fn take_result(&mut self) -> Option<Vec<u8>> {
        self.result.take()
    }

    /// Attach the invoker used for nested calls.
    pub fn set_invoker(&mut self, invoker: Arc<dyn ContractInvoker>) {
        self.invoker = Some(invoker);
    }

    /// The invoker for nested calls, if one is attached.
    pub fn invoker(&self) -> Option<Arc<dyn ContractInvoker>> {
        self.invoker.clone()
    }
}

impl std::fmt::Debug for SandboxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxState")
            .field("id", &self.id)
            .field("initial_fuel", &self.initial_fuel)
            .field("fuel_granted", &self.fuel_granted)
            .field("has_result", &self.result.is_some())
            .finish_non_exhaustive()
    }
}

/// Create a store for one sandbox.
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
    fuel: u64,
) -> Result<Store<SandboxState>, RuntimeError> {
    let state = SandboxState::new(fuel, config.max_memory_bytes());
    let mut store = Store::new(engine.inner(), state);
    store.limiter(|state| &mut state.limits);

    store
        .set_fuel(fuel)
        .map_err(|e| RuntimeError::instantiation(format!("Failed to set fuel: {e}")))?;

    if engine.is_epoch_enabled() {
        store.set_epoch_deadline(engine.deadline_ticks(config.timeout()));
        store.epoch_deadline_trap();
    }

    Ok(store)
}

/// Fuel operations on a sandbox.
///
/// Implemented for every mutable store context whose data is
/// [`SandboxState`], so the orchestrator and host capabilities share one
/// ledger.
pub trait FuelMeter {
    /// Fuel left in the pool.
    fn remaining_fuel(&self) -> u64;

    /// Grant `amount` more fuel.
    fn add_fuel(&mut self, amount: u64);

    /// Return `amount` previously debited with [`FuelMeter::consume_fuel`].
    ///
    /// Unlike [`FuelMeter::add_fuel`] this is not a grant: refunded fuel
    /// simply no longer counts as consumed.
    fn refund_fuel(&mut self, amount: u64);

    /// Debit `amount`, failing with [`RuntimeError::FuelExhausted`] if less remains.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::FuelExhausted`] without debiting anything when
    /// `amount` exceeds the remaining fuel.
    fn consume_fuel(&mut self, amount: u64) -> Result<(), RuntimeError>;

    /// Fuel used so far: budget plus grants minus what remains.
    fn fuel_consumed(&self) -> u64;
}

impl<T> FuelMeter for T
where
    T: AsContextMut<Data = SandboxState>,
{
    fn remaining_fuel(&self) -> u64 {
        self.as_context().get_fuel().unwrap_or(0)
    }

    fn add_fuel(&mut self, amount: u64) {
        let remaining = self.remaining_fuel();
        let mut ctx = self.as_context_mut();
        if ctx.set_fuel(remaining.saturating_add(amount)).is_ok() {
            let state = ctx.data_mut();
            state.fuel_granted = state.fuel_granted.saturating_add(amount);
        }
    }

    fn refund_fuel(&mut self, amount: u64) {
        let remaining = self.remaining_fuel();
        // A failed set leaves the debit standing; the store has no fuel metering.
        let _ = self
            .as_context_mut()
            .set_fuel(remaining.saturating_add(amount));
    }

    fn consume_fuel(&mut self, amount: u64) -> Result<(), RuntimeError> {
        let remaining = self.remaining_fuel();
        if amount > remaining {
            return Err(RuntimeError::FuelExhausted);
        }
        self.as_context_mut()
            .set_fuel(remaining - amount)
            .map_err(|_| RuntimeError::FuelExhausted)
    }

    fn fuel_consumed(&self) -> u64 {
        let ctx = self.as_context();
        let state = ctx.data();
        state
            .initial_fuel
            .saturating_add(state.fuel_granted)
            .saturating_sub(ctx.get_fuel().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_runtime_common::EngineConfig;

    fn test_engine() -> WasmEngine {
        WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_sandbox_ids_are_unique() {
        let a = SandboxId::next();
        let b = SandboxId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
        assert!(a.to_string().starts_with("sbx-"));
    }

    #[test]
    fn test_store_creation() {
        let engine = test_engine();
        let store = create_store(&engine, &ExecutionConfig::default(), 1000).unwrap();

        assert_eq!(store.remaining_fuel(), 1000);
        assert_eq!(store.data().initial_fuel(), 1000);
        assert_eq!(store.fuel_consumed(), 0);
    }

    #[test]
    fn test_consume_fuel() {
        let engine = test_engine();
        let mut store = create_store(&engine, &ExecutionConfig::default(), 100).unwrap();

        store.consume_fuel(40).unwrap();
        assert_eq!(store.remaining_fuel(), 60);
        assert_eq!(store.fuel_consumed(), 40);

        let err = store.consume_fuel(61).unwrap_err();
        assert!(matches!(err, RuntimeError::FuelExhausted));
        assert_eq!(store.remaining_fuel(), 60);
    }

    #[test]
    fn test_add_fuel_is_not_counted_as_consumed() {
        let engine = test_engine();
        let mut store = create_store(&engine, &ExecutionConfig::default(), 100).unwrap();

        store.consume_fuel(100).unwrap();
        store.add_fuel(30);

        assert_eq!(store.remaining_fuel(), 30);
        assert_eq!(store.data().fuel_granted(), 30);
        assert_eq!(store.fuel_consumed(), 100);
    }

    #[test]
    fn test_refund_reverses_consumption() {
        let engine = test_engine();
        let mut store = create_store(&engine, &ExecutionConfig::default(), 100).unwrap();

        store.consume_fuel(60).unwrap();
        store.refund_fuel(45);

        assert_eq!(store.remaining_fuel(), 85);
        assert_eq!(store.data().fuel_granted(), 0);
        assert_eq!(store.fuel_consumed(), 15);
    }

    #[test]
    fn test_result_slot() {
        let mut state = SandboxState::new(0, 1024);
        assert!(state.take_result().is_none());

        state.set_result(vec![1, 2]);
        assert_eq!(state.take_result(), Some(vec![1, 2]));
        assert!(state.take_result().is_none());
    }
}
