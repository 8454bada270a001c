//! Common types, errors, and configuration for contract-runtime.
//!
//! This crate provides shared functionality used across the contract-runtime workspace:
//! - Error types using `thiserror`, one variant per call-lifecycle stage
//! - Configuration structures for engine, execution, cache and validation
//! - Primitive identifiers (addresses, contract ids, action ids)

pub mod config;
pub mod config_file;
pub mod error;
pub mod types;

pub use config::{CacheConfig, EngineConfig, ExecutionConfig, RuntimeConfig, ValidationConfig};
pub use config_file::{ConfigFile, ConfigFileError, ContractEntry};
pub use error::{HostFunctionError, RuntimeError, StateError, ValidationError};
pub use types::{ACTION_ID_LEN, ADDRESS_LEN, ActionId, Address, ContractId, ParseIdError};
