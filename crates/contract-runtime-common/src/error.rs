//! Error types for the contract runtime.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`RuntimeError`]: Top-level errors for a contract call, one variant per stage
//! - [`HostFunctionError`]: Errors raised by host capability modules
//! - [`StateError`]: Errors reported by the state backend
//! - [`ValidationError`]: Rejections reported by a module validator

use thiserror::Error;

/// Top-level runtime errors.
///
/// Each variant names the stage of the call lifecycle that failed. Errors
/// from external collaborators are wrapped with the identifier they were
/// operating on so the failing stage can be recovered from the message alone.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The target address has no associated contract.
    #[error("Contract resolution failed for {address}: {source}")]
    Resolution {
        /// Hex-encoded address that failed to resolve.
        address: String,
        /// Underlying state error.
        #[source]
        source: StateError,
    },

    /// The bytecode for a contract id could not be fetched.
    #[error("Failed to retrieve bytecode for contract {contract_id}: {source}")]
    ByteRetrieval {
        /// Hex-encoded contract id.
        contract_id: String,
        /// Underlying state error.
        #[source]
        source: StateError,
    },

    /// The configured validator rejected the bytecode.
    #[error("Validation failed for contract {contract_id}: {source}")]
    Validation {
        /// Hex-encoded contract id.
        contract_id: String,
        /// The validator's rejection.
        #[source]
        source: ValidationError,
    },

    /// WebAssembly compilation failed.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The sandbox could not be created (linking or instantiation failure).
    #[error("Instantiation failed: {reason}")]
    Instantiation {
        /// Description of the instantiation failure.
        reason: String,
    },

    /// The requested function is not exported by the contract.
    #[error("Function '{name}' is not exported by the contract")]
    ExportMissing {
        /// Name of the missing export.
        name: String,
    },

    /// The requested export exists but cannot be called with a single `i32` argument.
    #[error("Function '{name}' has an unsupported signature: {signature}")]
    SignatureMismatch {
        /// Name of the export.
        name: String,
        /// Rendered signature of the export.
        signature: String,
    },

    /// The call payload could not be written into sandbox memory.
    #[error("Failed to write to sandbox memory: {reason}")]
    MemoryWrite {
        /// Description of the failure.
        reason: String,
    },

    /// Execution exhausted its fuel budget.
    #[error("Fuel exhausted: compute budget exceeded")]
    FuelExhausted,

    /// Execution hit the compute-deadline ceiling.
    #[error("Execution timeout after {duration_ms}ms")]
    ExecutionTimeout {
        /// The configured ceiling in milliseconds.
        duration_ms: u64,
    },

    /// A WebAssembly trap occurred inside the sandbox.
    #[error("Wasm trap: {message}")]
    Trap {
        /// Description of the trap.
        message: String,
        /// Trap code if available.
        code: Option<String>,
    },

    /// The call context could not be encoded.
    #[error("Context serialization failed: {reason}")]
    Serialization {
        /// Description of the encoding failure.
        reason: String,
    },

    /// The call was cancelled before the sandbox was invoked.
    #[error("Call cancelled during {stage}")]
    Cancelled {
        /// The stage that was running when cancellation fired.
        stage: &'static str,
    },

    /// A host function returned an error.
    #[error("Host function error: {0}")]
    HostFunction(#[from] HostFunctionError),

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

/// Errors from host capability implementations.
///
/// These originate on the host side of the sandbox boundary, as opposed to
/// [`RuntimeError::Trap`], which originates inside the guest.
#[derive(Error, Debug)]
pub enum HostFunctionError {
    /// The calling sandbox has no registered call context.
    #[error("No active call registered for sandbox {sandbox_id}")]
    UnknownCall {
        /// Handle of the calling sandbox.
        sandbox_id: u64,
    },

    /// Guest memory access was out of bounds or otherwise invalid.
    #[error("Guest memory access failed: {reason}")]
    MemoryAccess {
        /// Description of the failure.
        reason: String,
    },

    /// The guest does not export something the host needs.
    #[error("Guest export missing: {name}")]
    MissingExport {
        /// Name of the missing export.
        name: String,
    },

    /// Invalid argument was passed to a host function.
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Description of why the argument was invalid.
        reason: String,
    },

    /// Nested contract calls exceeded the configured depth.
    #[error("Call depth limit of {limit} exceeded")]
    CallDepthExceeded {
        /// The configured limit.
        limit: u32,
    },

    /// The state backend failed while servicing a host call.
    #[error("State access failed: {0}")]
    State(#[from] StateError),
}

/// Errors reported by the state backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The address is not bound to any contract.
    #[error("No contract bound to account {address}")]
    AccountNotFound {
        /// Hex-encoded address.
        address: String,
    },

    /// No bytecode is stored under the contract id.
    #[error("No bytecode stored for contract {contract_id}")]
    ContractNotFound {
        /// Hex-encoded contract id.
        contract_id: String,
    },

    /// A transfer exceeded the sender's balance.
    #[error("Insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance {
        /// Balance of the sender.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// Any other backend failure.
    #[error("State backend error: {0}")]
    Backend(String),
}

/// A module validator's rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ValidationError {
    /// Why the module was rejected.
    pub reason: String,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RuntimeError {
    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `Instantiation` error.
    pub fn instantiation(reason: impl Into<String>) -> Self {
        Self::Instantiation {
            reason: reason.into(),
        }
    }

    /// Create a new `ExportMissing` error.
    pub fn export_missing(name: impl Into<String>) -> Self {
        Self::ExportMissing { name: name.into() }
    }

    /// Create a new `MemoryWrite` error.
    pub fn memory_write(reason: impl Into<String>) -> Self {
        Self::MemoryWrite {
            reason: reason.into(),
        }
    }

    /// Create a new `Trap` error.
    pub fn trap(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Trap {
            message: message.into(),
            code,
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates a resource limit was exceeded.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::FuelExhausted | Self::ExecutionTimeout { .. })
    }

    /// Returns `true` if the fault was raised inside the sandbox.
    pub fn is_trap(&self) -> bool {
        matches!(self, Self::Trap { .. })
    }

    /// Returns `true` if the fault was raised by a host capability.
    pub fn is_host_error(&self) -> bool {
        matches!(self, Self::HostFunction(_))
    }

    /// Returns `true` if the call failed before any sandbox was created.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            Self::Resolution { .. }
                | Self::ByteRetrieval { .. }
                | Self::Validation { .. }
                | Self::CompilationFailed { .. }
                | Self::ExportMissing { .. }
                | Self::SignatureMismatch { .. }
                | Self::Serialization { .. }
                | Self::Cancelled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::export_missing("transfer");
        assert_eq!(
            err.to_string(),
            "Function 'transfer' is not exported by the contract"
        );

        let err = RuntimeError::FuelExhausted;
        assert_eq!(err.to_string(), "Fuel exhausted: compute budget exceeded");
    }

    #[test]
    fn test_resolution_error_wraps_source() {
        let err = RuntimeError::Resolution {
            address: "00ff".into(),
            source: StateError::AccountNotFound {
                address: "00ff".into(),
            },
        };
        assert!(err.to_string().contains("Contract resolution failed for 00ff"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_validation_error_message() {
        let err = RuntimeError::Validation {
            contract_id: "01".into(),
            source: ValidationError::new("validation failed"),
        };
        assert!(err.to_string().contains("validation failed"));
        assert!(err.is_pre_execution());
    }

    #[test]
    fn test_error_from_host_function() {
        let host_err = HostFunctionError::CallDepthExceeded { limit: 8 };
        let runtime_err: RuntimeError = host_err.into();

        assert!(runtime_err.is_host_error());
        assert!(!runtime_err.is_trap());
    }

    #[test]
    fn test_host_error_from_state() {
        let err: HostFunctionError = StateError::Backend("disk".into()).into();
        assert!(matches!(err, HostFunctionError::State(_)));
    }

    #[test]
    fn test_is_resource_limit() {
        assert!(RuntimeError::FuelExhausted.is_resource_limit());
        assert!(RuntimeError::ExecutionTimeout { duration_ms: 100 }.is_resource_limit());
        assert!(!RuntimeError::trap("unreachable", None).is_resource_limit());
    }

    #[test]
    fn test_is_trap() {
        assert!(RuntimeError::trap("unreachable", Some("UnreachableCodeReached".into())).is_trap());
        assert!(!RuntimeError::FuelExhausted.is_trap());
        assert!(!RuntimeError::memory_write("oob").is_pre_execution());
    }
}
