//! Configuration file structures for the contract runtime.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ContractEntry`]: A contract to deploy into the local state at startup

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::RuntimeConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [runtime.engine]
/// pooling_allocator = false
/// epoch_tick_ms = 1
///
/// [runtime.execution]
/// default_fuel = 10_000_000
/// timeout_ms = 1000
///
/// [runtime.cache]
/// max_bytes = 67108864
///
/// [[contracts]]
/// id = "token"
/// path = "./contracts/token.wasm"
/// address = "00aa..."
/// balance = 1000
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Contracts to deploy at startup.
    #[serde(default)]
    pub contracts: Vec<ContractEntry>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// A contract to deploy at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractEntry {
    /// Contract identifier under which the bytecode is stored.
    pub id: String,

    /// Path to the WebAssembly module file.
    pub path: String,

    /// Hex-encoded account address bound to this contract.
    pub address: String,

    /// Initial balance of the account.
    #[serde(default)]
    pub balance: u64,
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}
