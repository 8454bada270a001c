//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is the foundation of the runtime. It is:
//! - Thread-safe and shared across all calls
//! - Configured with pooling allocator for fast per-call instantiation
//! - Set up with fuel metering and epoch interruption for resource limiting
//!
//! [`EpochTicker`] drives epoch interruption: a background thread advances
//! the engine epoch at a fixed interval so every sandbox deadline is measured
//! in ticks of that interval.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, InstanceAllocationStrategy, PoolingAllocationConfig};

use contract_runtime_common::{EngineConfig, RuntimeError};

/// Thread-safe WebAssembly engine wrapper.
///
/// This struct wraps a Wasmtime [`Engine`] configured for contract
/// execution. The engine is shared across all calls and contains no
/// per-call state.
///
/// # Configuration
///
/// The engine is configured with:
/// - **Pooling Allocator**: Pre-allocates sandbox slots so a fresh instance
///   per call stays cheap
/// - **Fuel Metering**: Always on; every call is fuel-bounded
/// - **Epoch Interruption**: Optional compute-deadline ceiling
/// - **Async Support**: Host capabilities await the state backend
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The Wasmtime configuration is invalid
    /// - The pooling allocator cannot be initialized
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let mut wasmtime_config = Config::new();

        // Host functions await the state backend
        wasmtime_config.async_support(true);

        // Fuel is the primary compute budget
        wasmtime_config.consume_fuel(true);

        if config.epoch_interruption {
            wasmtime_config.epoch_interruption(true);
        }

        wasmtime_config.cranelift_opt_level(wasmtime::OptLevel::Speed);

        if config.pooling_allocator {
            let pooling_config = Self::create_pooling_config(config);

            wasmtime_config
                .allocation_strategy(InstanceAllocationStrategy::Pooling(pooling_config));

            info!(
                max_instances = config.max_instances,
                instance_memory_mb = config.instance_memory_mb,
                "Pooling allocator enabled"
            );
        }

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!("Wasmtime engine initialized");

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Create pooling allocation configuration.
    fn create_pooling_config(config: &EngineConfig) -> PoolingAllocationConfig {
        let mut pooling = PoolingAllocationConfig::default();

        pooling.total_core_instances(config.max_instances);
        pooling.total_memories(config.max_instances);
        pooling.total_tables(config.max_instances);

        let max_memory_bytes = (config.instance_memory_mb as usize) * 1024 * 1024;
        pooling.max_memory_size(max_memory_bytes);

        pooling
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Increment the epoch counter.
    pub fn increment_epoch(&self) {
        self.engine.increment_epoch();
    }

    /// Check if the pooling allocator is enabled.
    pub fn is_pooling_enabled(&self) -> bool {
        self.config.pooling_allocator
    }

    /// Check if epoch interruption is enabled.
    pub fn is_epoch_enabled(&self) -> bool {
        self.config.epoch_interruption
    }

    /// Number of epoch ticks that approximate `timeout`.
    ///
    /// Always at least one tick.
    pub fn deadline_ticks(&self, timeout: Duration) -> u64 {
        let tick = self.config.epoch_tick().as_millis().max(1);
        let ticks = timeout.as_millis() / tick;
        u64::try_from(ticks).unwrap_or(u64::MAX).max(1)
    }

    /// Start a background ticker for this engine if epoch interruption is on.
    pub fn start_ticker(&self) -> Option<EpochTicker> {
        self.config
            .epoch_interruption
            .then(|| EpochTicker::start(self.inner().clone(), self.config.epoch_tick()))
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("pooling_allocator", &self.config.pooling_allocator)
            .field("max_instances", &self.config.max_instances)
            .field("epoch_interruption", &self.config.epoch_interruption)
            .finish_non_exhaustive()
    }
}

/// Background thread that advances the engine epoch at a fixed interval.
///
/// The thread stops when the ticker is dropped.
pub struct EpochTicker {
    stop_tx: Option<mpsc::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl EpochTicker {
    /// Spawn the ticker thread.
    pub fn start(engine: Engine, tick: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let join_handle = std::thread::Builder::new()
            .name("epoch-ticker".into())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(tick) {
                        Err(RecvTimeoutError::Timeout) => engine.increment_epoch(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            });

        let join_handle = match join_handle {
            Ok(handle) => {
                debug!(tick_ms = tick.as_millis(), "Epoch ticker started");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Failed to spawn epoch ticker; deadlines will not fire");
                None
            }
        };

        Self {
            stop_tx: Some(stop_tx),
            join_handle,
        }
    }

    /// Returns `true` if the ticker thread is running.
    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for EpochTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochTicker")
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation_default() {
        let config = EngineConfig::default();
        let engine = WasmEngine::new(&config);

        assert!(engine.is_ok());
        let engine = engine.unwrap();
        assert!(engine.is_pooling_enabled());
        assert!(engine.is_epoch_enabled());
    }

    #[test]
    fn test_engine_creation_no_pooling() {
        let config = EngineConfig {
            pooling_allocator: false,
            ..Default::default()
        };
        let engine = WasmEngine::new(&config).unwrap();
        assert!(!engine.is_pooling_enabled());
    }

    #[test]
    fn test_deadline_ticks() {
        let config = EngineConfig {
            pooling_allocator: false,
            epoch_tick_ms: 10,
            ..Default::default()
        };
        let engine = WasmEngine::new(&config).unwrap();

        assert_eq!(engine.deadline_ticks(Duration::from_millis(100)), 10);
        assert_eq!(engine.deadline_ticks(Duration::from_millis(5)), 1);
        assert_eq!(engine.deadline_ticks(Duration::ZERO), 1);
    }

    #[test]
    fn test_ticker_starts_and_stops() {
        let config = EngineConfig {
            pooling_allocator: false,
            ..Default::default()
        };
        let engine = WasmEngine::new(&config).unwrap();

        let ticker = engine.start_ticker().expect("epoch interruption is on");
        assert!(ticker.is_running());
        drop(ticker);
    }

    #[test]
    fn test_no_ticker_without_epoch() {
        let config = EngineConfig {
            pooling_allocator: false,
            epoch_interruption: false,
            ..Default::default()
        };
        let engine = WasmEngine::new(&config).unwrap();
        assert!(engine.start_ticker().is_none());
    }

    #[test]
    fn test_engine_debug() {
        let config = EngineConfig::default();
        let engine = WasmEngine::new(&config).unwrap();

        let debug_str = format!("{engine:?}");
        assert!(debug_str.contains("WasmEngine"));
        assert!(debug_str.contains("pooling_allocator"));
    }
}
