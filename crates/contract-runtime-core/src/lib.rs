//! Core Wasmtime runtime for contract-runtime.
//!
//! This crate provides the building blocks of a contract call:
//! - [`WasmEngine`]: Configured Wasmtime engine with pooling allocator and epoch ticker
//! - [`CompiledModule`]: Compiled contract module wrapper
//! - [`ModuleCache`] / [`BoundedModuleCache`]: Compiled module caching
//! - [`ModuleValidator`]: Optional gate on cold compilation
//! - [`Sandbox`]: Per-call instance lifecycle
//! - [`FuelMeter`]: Fuel accounting shared with host capabilities
//! - [`CallRegistry`]: Maps live sandboxes to the call they service
//! - [`StatsCollector`]: Block-scoped statistics
//! - [`StateManager`]: The state backend interface, with [`InMemoryState`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WasmEngine                          │
//! │  (Shared across all calls, thread-safe)                 │
//! │  - Pooling Allocator                                    │
//! │  - Fuel metering, epoch deadlines                       │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │              CompiledModule (ModuleCache)               │
//! │  (Cached per contract id, shared across sandboxes)      │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │           Sandbox = Store<SandboxState> + Instance      │
//! │  (Per-call, isolated, closed on drop)                   │
//! │  - Own fuel pool and linear memory                      │
//! │  - SandboxId -> CallInfo via CallRegistry               │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod context;
pub mod engine;
pub mod instance;
pub mod module;
pub mod registry;
pub mod state;
pub mod stats;
pub mod store;
pub mod validator;

pub use cache::{BoundedModuleCache, ModuleCache};
pub use context::{CONTEXT_LEN, CallInfo, Context, ContractInvoker, InvocationOutcome};
pub use engine::{EpochTicker, WasmEngine};
pub use instance::{ALLOC_EXPORT, MEMORY_EXPORT, Sandbox, classify_error};
pub use module::{CompiledModule, ExportShape};
pub use registry::{CallRegistry, RegistrationGuard};
pub use state::{BalanceManager, ContractManager, InMemoryState, StateManager};
pub use stats::{BlockStats, ExecutionStats, StatsCollector};
pub use store::{FuelMeter, SandboxId, SandboxState, create_store};
pub use validator::{ModuleValidator, SizeLimitValidator};
