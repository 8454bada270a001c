//! Call orchestration for contract-runtime.
//!
//! This crate ties the engine, host capabilities and module caching together
//! into [`ContractRuntime`], the entry point for executing contract calls:
//!
//! - Address → contract id resolution through the state backend
//! - Compiled-module caching with cold-path validation
//! - One fresh, fuel-metered sandbox per call
//! - Nested calls from guests back through the same runtime
//! - Block-scoped execution statistics
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use contract_runtime_common::RuntimeConfig;
//! use contract_runtime_core::{CallInfo, InMemoryState};
//! use contract_runtime_executor::ContractRuntime;
//!
//! # async fn run(address: contract_runtime_common::Address) -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = ContractRuntime::new(RuntimeConfig::default())?;
//! let state = Arc::new(InMemoryState::new());
//!
//! let ctx = runtime.with_defaults(CallInfo::new(state, address, ""));
//! let result = ctx.call_contract(address, "get_value", Vec::new()).await?;
//!
//! println!("{:?} {:?}", result, runtime.get_block_stats());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod call_context;
pub mod loader;
pub mod runtime;

pub use builder::RuntimeBuilder;
pub use call_context::CallContext;
pub use loader::{LoadedModule, ModuleLoader};
pub use runtime::ContractRuntime;
