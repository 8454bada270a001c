//! Host functions implementation for contract-runtime.
//!
//! This crate provides the host capabilities linked into every contract
//! sandbox. Guest modules import them by module and function name.
//!
//! # Modules
//!
//! - [`logging`]: `log.write`, guest log lines re-emitted through `tracing`
//! - [`balance`]: `balance.get`, `balance.send`
//! - [`state_access`]: `state.get`, `state.put`, `state.delete`
//! - [`contract`]: call results, fuel queries, account creation and nested calls
//!
//! # Call Resolution
//!
//! Host functions never receive the call context from the guest. They read
//! the sandbox id out of the store data and look the active call up in the
//! [`CallRegistry`](contract_runtime_core::CallRegistry); a sandbox with no
//! registered call gets a host error.

pub mod balance;
pub mod contract;
pub mod linker;
pub mod logging;
pub mod memory;
pub mod state_access;

pub use linker::{build_linker, register_all};
pub use logging::{LogLevel, LoggingHost};
