//! Module acquisition.
//!
//! [`ModuleLoader`] turns a contract id into a compiled module that is known
//! to export the requested function:
//!
//! 1. Cache hit: return it, skipping validation and compilation
//! 2. Cache miss: fetch the bytecode, validate, compile, check the export,
//!    then insert into the cache
//!
//! The cache is whichever [`ModuleCache`] the runtime was built with: a
//! caller-supplied strategy or the built-in bounded cache, never both.
//!
//! A module whose requested export is missing is never cached by the call
//! that discovered it.

use std::sync::Arc;

use tracing::{debug, instrument};

use contract_runtime_common::{ContractId, RuntimeError};
use contract_runtime_core::{
    CompiledModule, ExportShape, ModuleCache, ModuleValidator, StateManager, WasmEngine,
};

/// A module ready for instantiation.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    /// The compiled module.
    pub module: Arc<CompiledModule>,
    /// Whether it came from the cache.
    pub cache_hit: bool,
}

/// Cache, validator and compiler sequencing.
pub struct ModuleLoader {
    engine: WasmEngine,
    cache: Arc<dyn ModuleCache>,
    validator: Option<Arc<dyn ModuleValidator>>,
}

impl ModuleLoader {
    /// Create a loader over `cache`.
    pub fn new(
        engine: WasmEngine,
        cache: Arc<dyn ModuleCache>,
        validator: Option<Arc<dyn ModuleValidator>>,
    ) -> Self {
        Self {
            engine,
            cache,
            validator,
        }
    }

    /// The cache this loader reads and fills.
    pub fn cache(&self) -> &Arc<dyn ModuleCache> {
        &self.cache
    }

    /// Returns `true` if a validator is configured.
    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Produce a module for `id` that exports `function`.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ByteRetrieval`] if the bytecode cannot be fetched
    /// - [`RuntimeError::Validation`] if the validator rejects it
    /// - [`RuntimeError::CompilationFailed`] if it does not compile
    /// - [`RuntimeError::ExportMissing`] / [`RuntimeError::SignatureMismatch`]
    ///   if `function` is not callable
    #[instrument(skip(self, state), fields(contract_id = %id))]
    pub async fn load(
        &self,
        id: &ContractId,
        state: &dyn StateManager,
        function: &str,
    ) -> Result<LoadedModule, RuntimeError> {
        if let Some(module) = self.cache.get_module(id) {
            debug!("Module cache hit");
            check_export(&module, function)?;
            return Ok(LoadedModule {
                module,
                cache_hit: true,
            });
        }

        debug!("Module cache miss");
        let bytes =
            state
                .get_contract_bytes(id)
                .await
                .map_err(|source| RuntimeError::ByteRetrieval {
                    contract_id: id.to_string(),
                    source,
                })?;

        if let Some(validator) = &self.validator {
            validator
                .validate_module(&bytes)
                .map_err(|source| RuntimeError::Validation {
                    contract_id: id.to_string(),
                    source,
                })?;
        }

        let module = Arc::new(CompiledModule::from_bytes(self.engine.inner(), &bytes)?);
        check_export(&module, function)?;

        self.cache.put_module(id, module.clone());

        Ok(LoadedModule {
            module,
            cache_hit: false,
        })
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("has_validator", &self.has_validator())
            .finish_non_exhaustive()
    }
}

fn check_export(module: &CompiledModule, function: &str) -> Result<(), RuntimeError> {
    match module.export_shape(function) {
        ExportShape::Callable => Ok(()),
        ExportShape::Missing => Err(RuntimeError::export_missing(function)),
        ExportShape::Mismatched(signature) => Err(RuntimeError::SignatureMismatch {
            name: function.to_string(),
            signature,
        }),
    }
}
