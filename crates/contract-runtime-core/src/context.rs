//! Call inputs and context marshaling.
//!
//! - [`CallInfo`]: everything a single contract invocation needs
//! - [`Context`]: the fixed-size record prepended to the guest's parameters
//! - [`ContractInvoker`]: the seam host capabilities use to start nested calls

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use contract_runtime_common::{ActionId, Address, RuntimeError};

use crate::StateManager;
use crate::store::SandboxId;

/// Encoded size of a [`Context`]: two addresses, height, timestamp and action id.
pub const CONTEXT_LEN: usize = 33 + 33 + 8 + 8 + 32;

/// The call context as seen by the guest.
///
/// Encoded with fixed-width little-endian integers and no length prefixes,
/// so the guest can read fields at fixed offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Context {
    /// The contract being executed.
    pub contract: Address,
    /// The account that initiated the call.
    pub actor: Address,
    /// Block height.
    pub height: u64,
    /// Block timestamp.
    pub timestamp: u64,
    /// The action that triggered the call.
    pub action_id: ActionId,
}

impl Context {
    /// Encode into the fixed wire form.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Serialization`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>, RuntimeError> {
        bincode::serialize(self).map_err(|e| RuntimeError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Decode from the fixed wire form.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Serialization`] if `bytes` is not a valid encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, RuntimeError> {
        bincode::deserialize(bytes).map_err(|e| RuntimeError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Encode the context followed by `params`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Serialization`] if encoding fails.
    pub fn payload(&self, params: &[u8]) -> Result<Vec<u8>, RuntimeError> {
        let mut payload = self.encode()?;
        payload.extend_from_slice(params);
        Ok(payload)
    }
}

/// Input record for a single contract call.
#[derive(Clone)]
pub struct CallInfo {
    /// State backend the call reads and writes through.
    pub state: Arc<dyn StateManager>,
    /// The account that initiated the call.
    pub actor: Address,
    /// Exported function to invoke.
    pub function_name: String,
    /// The contract account being called.
    pub contract: Address,
    /// Opaque parameter bytes appended after the encoded context.
    pub params: Vec<u8>,
    /// Fuel budget for this call.
    pub fuel: u64,
    /// Block height.
    pub height: u64,
    /// Block timestamp.
    pub timestamp: u64,
    /// The action that triggered the call.
    pub action_id: ActionId,
    /// Value transferred to `contract` with a nested call.
    pub value: u64,
    /// Nesting depth; zero for a top-level call.
    pub depth: u32,
    /// Sandbox servicing this call, set while it is live.
    pub sandbox: Option<SandboxId>,
}

impl CallInfo {
    /// Create a call with zeroed block fields and no fuel.
    pub fn new(
        state: Arc<dyn StateManager>,
        contract: Address,
        function_name: impl Into<String>,
    ) -> Self {
        Self {
            state,
            actor: Address::ZERO,
            function_name: function_name.into(),
            contract,
            params: Vec::new(),
            fuel: 0,
            height: 0,
            timestamp: 0,
            action_id: ActionId::default(),
            value: 0,
            depth: 0,
            sandbox: None,
        }
    }

    /// The guest-visible context for this call.
    pub fn context(&self) -> Context {
        Context {
            contract: self.contract,
            actor: self.actor,
            height: self.height,
            timestamp: self.timestamp,
            action_id: self.action_id,
        }
    }

    /// Derive the input of a nested call made by this call's contract.
    ///
    /// The nested call inherits the block fields and state backend; the
    /// calling contract becomes its actor.
    pub fn nested(
        &self,
        contract: Address,
        function_name: impl Into<String>,
        params: Vec<u8>,
        fuel: u64,
        value: u64,
    ) -> Self {
        Self {
            state: self.state.clone(),
            actor: self.contract,
            function_name: function_name.into(),
            contract,
            params,
            fuel,
            height: self.height,
            timestamp: self.timestamp,
            action_id: self.action_id,
            value,
            depth: self.depth + 1,
            sandbox: None,
        }
    }
}

impl std::fmt::Debug for CallInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallInfo")
            .field("contract", &self.contract)
            .field("actor", &self.actor)
            .field("function_name", &self.function_name)
            .field("params_len", &self.params.len())
            .field("fuel", &self.fuel)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .field("sandbox", &self.sandbox)
            .finish_non_exhaustive()
    }
}

/// Outcome of a call started through a [`ContractInvoker`].
#[derive(Debug)]
pub struct InvocationOutcome {
    /// The call result.
    pub output: Result<Vec<u8>, RuntimeError>,
    /// Fuel the call consumed, whether or not it succeeded.
    pub fuel_used: u64,
}

/// Something that can run a full contract call.
///
/// Host capabilities receive one through the sandbox state so they can
/// start nested calls without depending on the orchestrator crate.
#[async_trait]
pub trait ContractInvoker: Send + Sync {
    /// Run `info` to completion.
    async fn invoke(&self, info: CallInfo) -> InvocationOutcome;

    /// Maximum nesting depth allowed for nested calls.
    fn max_call_depth(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryState;

    fn sample_context() -> Context {
        Context {
            contract: Address::from_parts(1, [0xaa; 32]),
            actor: Address::from_parts(0, [0xbb; 32]),
            height: 42,
            timestamp: 1_700_000_000,
            action_id: ActionId::new([9; 32]),
        }
    }

    #[test]
    fn test_context_encoding_is_fixed_width() {
        let bytes = sample_context().encode().unwrap();
        assert_eq!(bytes.len(), CONTEXT_LEN);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[33], 0);
        assert_eq!(&bytes[66..74], &42u64.to_le_bytes());
        assert_eq!(&bytes[74..82], &1_700_000_000u64.to_le_bytes());
        assert_eq!(&bytes[82..], &[9; 32]);
    }

    #[test]
    fn test_context_decode_inverts_encode() {
        let ctx = sample_context();
        let decoded = Context::decode(&ctx.encode().unwrap()).unwrap();
        assert_eq!(decoded, ctx);
    }

    #[test]
    fn test_context_decode_truncated() {
        let bytes = sample_context().encode().unwrap();
        let result = Context::decode(&bytes[..50]);
        assert!(matches!(result, Err(RuntimeError::Serialization { .. })));
    }

    #[test]
    fn test_payload_appends_params() {
        let payload = sample_context().payload(b"hello").unwrap();
        assert_eq!(payload.len(), CONTEXT_LEN + 5);
        assert_eq!(&payload[CONTEXT_LEN..], b"hello");
    }

    #[test]
    fn test_nested_call_info() {
        let state = Arc::new(InMemoryState::new());
        let mut info = CallInfo::new(state, Address::from_parts(0, [1; 32]), "outer");
        info.height = 7;
        info.sandbox = Some(SandboxId::next());

        let target = Address::from_parts(0, [2; 32]);
        let nested = info.nested(target, "inner", vec![1], 500, 3);

        assert_eq!(nested.actor, info.contract);
        assert_eq!(nested.contract, target);
        assert_eq!(nested.height, 7);
        assert_eq!(nested.depth, 1);
        assert_eq!(nested.value, 3);
        assert!(nested.sandbox.is_none());
    }
}
