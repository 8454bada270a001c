//! Configuration structures for the contract runtime.
//!
//! This module defines configuration options for various components:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (pooling, epoch interruption)
//! - [`ExecutionConfig`]: Per-call limits (fuel, memory, deadline, call depth)
//! - [`CacheConfig`]: Built-in compiled-module cache budget
//! - [`ValidationConfig`]: Built-in module validator settings
//!
//! All settings are fixed once the runtime is constructed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-call execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Compiled module cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Module validation configuration.
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Wasmtime engine configuration.
///
/// These settings affect the global Wasmtime engine shared by every call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable pooling allocator for fast per-call sandbox creation.
    ///
    /// Every call instantiates a fresh sandbox, so pre-allocated slots
    /// keep instantiation cheap.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,

    /// Maximum concurrent sandboxes in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled. Nested calls hold
    /// one slot per active frame.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per pool slot in megabytes.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Enable epoch-based interruption.
    ///
    /// This is the compute-deadline ceiling that backs up fuel metering.
    #[serde(default = "defaults::epoch_interruption")]
    pub epoch_interruption: bool,

    /// Interval between epoch increments in milliseconds.
    #[serde(default = "defaults::epoch_tick_ms")]
    pub epoch_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            epoch_interruption: defaults::epoch_interruption(),
            epoch_tick_ms: defaults::epoch_tick_ms(),
        }
    }
}

impl EngineConfig {
    /// Get the epoch tick as a `Duration`.
    pub fn epoch_tick(&self) -> Duration {
        Duration::from_millis(self.epoch_tick_ms.max(1))
    }
}

/// Per-call execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Fuel granted to a call that does not specify a budget.
    #[serde(default = "defaults::default_fuel")]
    pub default_fuel: u64,

    /// Compute-deadline ceiling in milliseconds.
    ///
    /// Enforced through epoch interruption, independent of fuel.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum linear memory per sandbox in megabytes.
    #[serde(default = "defaults::max_memory_mb")]
    pub max_memory_mb: u32,

    /// Maximum depth of nested contract calls.
    #[serde(default = "defaults::max_call_depth")]
    pub max_call_depth: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_fuel: defaults::default_fuel(),
            timeout_ms: defaults::timeout_ms(),
            max_memory_mb: defaults::max_memory_mb(),
            max_call_depth: defaults::max_call_depth(),
        }
    }
}

impl ExecutionConfig {
    /// Get the timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Maximum linear memory per sandbox in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb as usize) * 1024 * 1024
    }
}

/// Built-in compiled module cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Byte budget of the cache.
    ///
    /// An entry costs its id length plus its serialized module size.
    #[serde(default = "defaults::cache_max_bytes")]
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: defaults::cache_max_bytes(),
        }
    }
}

/// Built-in module validator configuration.
///
/// Ignored when a custom validator is supplied to the runtime builder.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    /// Enable the built-in size/header validator.
    #[serde(default)]
    pub enabled: bool,

    /// Largest accepted bytecode in bytes.
    #[serde(default = "defaults::max_module_bytes")]
    pub max_module_bytes: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_module_bytes: defaults::max_module_bytes(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        true
    }

    pub const fn max_instances() -> u32 {
        1000
    }

    pub const fn instance_memory_mb() -> u32 {
        64
    }

    pub const fn epoch_interruption() -> bool {
        true
    }

    pub const fn epoch_tick_ms() -> u64 {
        1
    }

    pub const fn default_fuel() -> u64 {
        10_000_000
    }

    pub const fn timeout_ms() -> u64 {
        1_000
    }

    pub const fn max_memory_mb() -> u32 {
        16
    }

    pub const fn max_call_depth() -> u32 {
        8
    }

    pub const fn cache_max_bytes() -> usize {
        64 * 1024 * 1024
    }

    pub const fn max_module_bytes() -> usize {
        4 * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();

        assert!(config.engine.pooling_allocator);
        assert_eq!(config.engine.max_instances, 1000);
        assert_eq!(config.engine.instance_memory_mb, 64);
        assert!(config.engine.epoch_interruption);
        assert_eq!(config.engine.epoch_tick_ms, 1);

        assert_eq!(config.execution.default_fuel, 10_000_000);
        assert_eq!(config.execution.timeout_ms, 1_000);
        assert_eq!(config.execution.max_memory_mb, 16);
        assert_eq!(config.execution.max_call_depth, 8);

        assert_eq!(config.cache.max_bytes, 64 * 1024 * 1024);
        assert!(!config.validation.enabled);
    }

    #[test]
    fn test_config_serialization() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RuntimeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(
            config.engine.max_instances,
            deserialized.engine.max_instances
        );
        assert_eq!(
            config.execution.default_fuel,
            deserialized.execution.default_fuel
        );
        assert_eq!(config.cache.max_bytes, deserialized.cache.max_bytes);
    }

    #[test]
    fn test_execution_limits() {
        let config = ExecutionConfig {
            timeout_ms: 500,
            max_memory_mb: 2,
            ..Default::default()
        };

        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.max_memory_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_epoch_tick_never_zero() {
        let config = EngineConfig {
            epoch_tick_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.epoch_tick(), Duration::from_millis(1));
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"engine": {"max_instances": 500}, "cache": {"max_bytes": 1024}}"#;
        let config: RuntimeConfig = serde_json::from_str(json).unwrap();

        // Explicitly set values
        assert_eq!(config.engine.max_instances, 500);
        assert_eq!(config.cache.max_bytes, 1024);
        // Default values for unspecified fields
        assert!(config.engine.pooling_allocator);
        assert_eq!(config.execution.default_fuel, 10_000_000);
        assert_eq!(config.validation.max_module_bytes, 4 * 1024 * 1024);
    }
}
