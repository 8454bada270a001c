//! Runtime construction.

use std::sync::Arc;

use tracing::info;

use contract_runtime_common::{RuntimeConfig, RuntimeError};
use contract_runtime_core::{
    BoundedModuleCache, CallRegistry, ModuleCache, ModuleValidator, SizeLimitValidator,
    StatsCollector, WasmEngine,
};
use contract_runtime_host::build_linker;

use crate::loader::ModuleLoader;
use crate::runtime::{ContractRuntime, RuntimeInner};

/// Builder for [`ContractRuntime`].
///
/// # Example
///
/// ```ignore
/// let runtime = ContractRuntime::builder(RuntimeConfig::default())
///     .with_validator(Arc::new(MyValidator))
///     .with_cache_strategy(Arc::new(PerBlockCache::default()))
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    validator: Option<Arc<dyn ModuleValidator>>,
    strategy: Option<Arc<dyn ModuleCache>>,
}

impl RuntimeBuilder {
    /// Start from `config`.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            validator: None,
            strategy: None,
        }
    }

    /// Validate cold bytecode with `validator` instead of the built-in one.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn ModuleValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Cache compiled modules in `strategy` instead of the built-in
    /// byte-bounded LRU cache.
    #[must_use]
    pub fn with_cache_strategy(mut self, strategy: Arc<dyn ModuleCache>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Create the engine, link the host modules and start the epoch ticker.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] for inconsistent limits, or
    /// whatever engine or linker creation reports.
    pub fn build(self) -> Result<ContractRuntime, RuntimeError> {
        validate(&self.config)?;

        let engine = WasmEngine::new(&self.config.engine)?;
        let registry = Arc::new(CallRegistry::new());
        let linker = build_linker(&engine, &registry)?;

        let validator = self.validator.or_else(|| {
            SizeLimitValidator::from_config(&self.config.validation)
                .map(|v| Arc::new(v) as Arc<dyn ModuleValidator>)
        });
        let has_strategy = self.strategy.is_some();
        let cache = self.strategy.unwrap_or_else(|| {
            Arc::new(BoundedModuleCache::new(self.config.cache.max_bytes))
                as Arc<dyn ModuleCache>
        });

        let loader = ModuleLoader::new(engine.clone(), cache, validator);

        let ticker = engine.start_ticker();

        info!(
            pooling = engine.is_pooling_enabled(),
            epoch = engine.is_epoch_enabled(),
            cache_max_bytes = self.config.cache.max_bytes,
            has_strategy,
            has_validator = loader.has_validator(),
            "Contract runtime ready"
        );

        Ok(ContractRuntime::from_inner(RuntimeInner {
            engine,
            linker,
            loader,
            registry,
            stats: StatsCollector::new(),
            execution: self.config.execution,
            _ticker: ticker,
        }))
    }
}

impl std::fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("config", &self.config)
            .field("has_validator", &self.validator.is_some())
            .field("has_strategy", &self.strategy.is_some())
            .finish()
    }
}

fn validate(config: &RuntimeConfig) -> Result<(), RuntimeError> {
    if config.execution.max_memory_mb == 0 {
        return Err(RuntimeError::invalid_config(
            "execution.max_memory_mb must be at least 1",
        ));
    }
    if config.engine.pooling_allocator
        && config.execution.max_memory_mb > config.engine.instance_memory_mb
    {
        return Err(RuntimeError::invalid_config(format!(
            "execution.max_memory_mb ({}) exceeds engine.instance_memory_mb ({})",
            config.execution.max_memory_mb, config.engine.instance_memory_mb
        )));
    }
    if config.engine.pooling_allocator && config.engine.max_instances == 0 {
        return Err(RuntimeError::invalid_config(
            "engine.max_instances must be at least 1 with the pooling allocator",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_runtime_common::EngineConfig;

    fn plain() -> RuntimeConfig {
        RuntimeConfig {
            engine: EngineConfig {
                pooling_allocator: false,
                epoch_interruption: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_build() {
        let runtime = RuntimeBuilder::new(plain()).build().unwrap();
        assert_eq!(runtime.active_calls(), 0);
    }

    #[test]
    fn test_zero_memory_rejected() {
        let mut config = plain();
        config.execution.max_memory_mb = 0;

        let err = RuntimeBuilder::new(config).build().unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfig { .. }));
    }

    #[test]
    fn test_memory_larger_than_pool_slot_rejected() {
        let mut config = RuntimeConfig::default();
        config.engine.instance_memory_mb = 4;
        config.execution.max_memory_mb = 8;

        let err = RuntimeBuilder::new(config).build().unwrap_err();
        assert!(err.to_string().contains("instance_memory_mb"));
    }

    #[test]
    fn test_custom_parts_are_reported() {
        let builder = RuntimeBuilder::new(plain())
            .with_validator(Arc::new(SizeLimitValidator::new(1024)))
            .with_cache_strategy(Arc::new(BoundedModuleCache::new(1024)));

        let debug = format!("{builder:?}");
        assert!(debug.contains("has_validator: true"));
        assert!(debug.contains("has_strategy: true"));
        builder.build().unwrap();
    }
}
