//! Reusable call defaults.

use std::future::Future;

use contract_runtime_common::{ActionId, Address, RuntimeError};
use contract_runtime_core::CallInfo;

use crate::runtime::ContractRuntime;

/// A runtime paired with default call fields.
///
/// Created by [`ContractRuntime::with_defaults`]. Each call starts from a
/// copy of the defaults (state backend, actor, fuel, block fields) and only
/// names what differs: the target, the function and the parameters.
#[derive(Clone)]
pub struct CallContext {
    runtime: ContractRuntime,
    defaults: CallInfo,
}

impl CallContext {
    pub(crate) fn new(runtime: ContractRuntime, defaults: CallInfo) -> Self {
        Self { runtime, defaults }
    }

    /// The defaults every call starts from.
    pub fn defaults(&self) -> &CallInfo {
        &self.defaults
    }

    /// The runtime calls are sent to.
    pub fn runtime(&self) -> &ContractRuntime {
        &self.runtime
    }

    #[must_use]
    pub fn with_actor(mut self, actor: Address) -> Self {
        self.defaults.actor = actor;
        self
    }

    #[must_use]
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.defaults.fuel = fuel;
        self
    }

    /// Set the block height and timestamp.
    #[must_use]
    pub fn with_block(mut self, height: u64, timestamp: u64) -> Self {
        self.defaults.height = height;
        self.defaults.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_action_id(mut self, action_id: ActionId) -> Self {
        self.defaults.action_id = action_id;
        self
    }

    /// The full call input for `function` on `contract`.
    pub fn call_info(
        &self,
        contract: Address,
        function: impl Into<String>,
        params: impl Into<Vec<u8>>,
    ) -> CallInfo {
        let mut info = self.defaults.clone();
        info.contract = contract;
        info.function_name = function.into();
        info.params = params.into();
        info.value = 0;
        info.depth = 0;
        info.sandbox = None;
        info
    }

    /// Call `function` on `contract` with the defaults.
    ///
    /// # Errors
    ///
    /// See [`ContractRuntime::call_contract`].
    pub async fn call_contract(
        &self,
        contract: Address,
        function: impl Into<String>,
        params: impl Into<Vec<u8>>,
    ) -> Result<Vec<u8>, RuntimeError> {
        self.runtime
            .call_contract(self.call_info(contract, function, params))
            .await
    }

    /// Call `function` on `contract`, abandoning it if `cancel` completes
    /// before the guest starts.
    ///
    /// # Errors
    ///
    /// See [`ContractRuntime::call_contract_until`].
    pub async fn call_contract_until<C>(
        &self,
        contract: Address,
        function: impl Into<String>,
        params: impl Into<Vec<u8>>,
        cancel: C,
    ) -> Result<Vec<u8>, RuntimeError>
    where
        C: Future<Output = ()> + Send,
    {
        self.runtime
            .call_contract_until(self.call_info(contract, function, params), cancel)
            .await
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use contract_runtime_common::{EngineConfig, RuntimeConfig};
    use contract_runtime_core::InMemoryState;

    fn runtime() -> ContractRuntime {
        ContractRuntime::new(RuntimeConfig {
            engine: EngineConfig {
                pooling_allocator: false,
                epoch_interruption: false,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_call_info_starts_from_defaults() {
        let actor = Address::from_parts(0, [2; 32]);
        let contract = Address::from_parts(0, [3; 32]);

        let mut defaults = CallInfo::new(Arc::new(InMemoryState::new()), Address::ZERO, "");
        defaults.params = b"stale".to_vec();
        let ctx = runtime()
            .with_defaults(defaults)
            .with_actor(actor)
            .with_fuel(500)
            .with_block(10, 1_700_000_000)
            .with_action_id(ActionId::new([9; 32]));

        let info = ctx.call_info(contract, "transfer", vec![1, 2]);
        assert_eq!(info.contract, contract);
        assert_eq!(info.actor, actor);
        assert_eq!(info.function_name, "transfer");
        assert_eq!(info.params, vec![1, 2]);
        assert_eq!(info.fuel, 500);
        assert_eq!(info.height, 10);
        assert_eq!(info.timestamp, 1_700_000_000);
        assert_eq!(info.action_id, ActionId::new([9; 32]));
        assert_eq!(info.depth, 0);
        assert!(info.sandbox.is_none());
    }

    #[test]
    fn test_explicit_fuel_default_is_kept() {
        let mut defaults = CallInfo::new(Arc::new(InMemoryState::new()), Address::ZERO, "");
        defaults.fuel = 1_000_000;

        let ctx = runtime().with_defaults(defaults);
        assert_eq!(ctx.defaults().fuel, 1_000_000);
    }
}
