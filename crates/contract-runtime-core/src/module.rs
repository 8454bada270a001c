//! WebAssembly module compilation.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's [`Module`]
//! holding the metadata the module cache needs: a content hash for tracing and
//! the serialized artifact size used as the cache eviction cost.

use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::{info, instrument};
use wasmtime::{Engine, ExternType, Module, ValType};

use contract_runtime_common::RuntimeError;

/// A compiled contract module.
///
/// Immutable after creation; shared behind an `Arc` by whichever cache tier
/// holds it and by every sandbox instantiated from it.
#[derive(Clone)]
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    inner: Module,

    /// SHA-256 of the original Wasm bytes, hex-encoded.
    content_hash: String,

    /// Size of the serialized artifact in bytes.
    artifact_size: usize,
}

/// How an export is shaped, as far as the call path cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportShape {
    /// No export with that name exists, or it is not a function.
    Missing,
    /// A function taking exactly one `i32`.
    Callable,
    /// A function with some other parameter list.
    Mismatched(String),
}

impl CompiledModule {
    /// Compile a module from raw WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid, compilation fails, or the
    /// compiled artifact cannot be serialized for size accounting.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes).map_err(|e| {
            RuntimeError::compilation_failed(format!("Module compilation failed: {e}"))
        })?;

        let artifact_size = module
            .serialize()
            .map_err(|e| {
                RuntimeError::compilation_failed(format!("Module serialization failed: {e}"))
            })?
            .len();

        let content_hash = compute_hash(bytes);
        let duration = start.elapsed();

        info!(
            content_hash = %content_hash,
            artifact_size,
            duration_ms = duration.as_millis(),
            "Contract module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
            artifact_size,
        })
    }

    /// Get the inner Wasmtime module.
    pub fn as_module(&self) -> &Module {
        &self.inner
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Size of the serialized compiled artifact.
    pub fn artifact_size(&self) -> usize {
        self.artifact_size
    }

    /// Inspect the export `name` without instantiating the module.
    pub fn export_shape(&self, name: &str) -> ExportShape {
        match self.inner.get_export(name) {
            Some(ExternType::Func(ty)) => {
                let params: Vec<ValType> = ty.params().collect();
                if params.len() == 1 && matches!(params[0], ValType::I32) {
                    ExportShape::Callable
                } else {
                    ExportShape::Mismatched(format!("{ty:?}"))
                }
            }
            _ => ExportShape::Missing,
        }
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < 8 {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: file too small",
            ));
        }

        if &bytes[0..4] != b"\0asm" {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: bad magic number",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .field("artifact_size", &self.artifact_size)
            .finish_non_exhaustive()
    }
}

fn compute_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WasmEngine;
    use contract_runtime_common::EngineConfig;

    // Minimal valid Wasm module (empty module)
    const MINIMAL_WASM: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, // magic: \0asm
        0x01, 0x00, 0x00, 0x00, // version: 1
    ];

    fn test_engine() -> WasmEngine {
        let engine_config = EngineConfig {
            pooling_allocator: false,
            epoch_interruption: false,
            ..Default::default()
        };
        WasmEngine::new(&engine_config).unwrap()
    }

    #[test]
    fn test_validate_wasm_header_valid() {
        assert!(CompiledModule::validate_wasm_header(MINIMAL_WASM).is_ok());
    }

    #[test]
    fn test_validate_wasm_header_too_small() {
        let result = CompiledModule::validate_wasm_header(&[0x00, 0x61]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_wasm_header_bad_magic() {
        let bad_wasm = &[0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        let result = CompiledModule::validate_wasm_header(bad_wasm);
        assert!(result.is_err());
    }

    #[test]
    fn test_compute_hash() {
        let hash1 = compute_hash(b"hello");
        let hash2 = compute_hash(b"hello");
        let hash3 = compute_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
        assert!(hash1.starts_with("2cf24dba"));
    }

    #[test]
    fn test_module_compilation() {
        let engine = test_engine();

        let module = CompiledModule::from_bytes(engine.inner(), MINIMAL_WASM).unwrap();
        assert!(!module.content_hash().is_empty());
        assert!(module.artifact_size() > 0);
    }

    #[test]
    fn test_malformed_body_fails_compilation() {
        let engine = test_engine();
        let mut bytes = MINIMAL_WASM.to_vec();
        bytes.extend_from_slice(&[0xff, 0xff, 0xff]);

        let result = CompiledModule::from_bytes(engine.inner(), &bytes);
        assert!(matches!(
            result,
            Err(RuntimeError::CompilationFailed { .. })
        ));
    }

    #[test]
    fn test_export_shape() {
        let engine = test_engine();
        let wasm = wat::parse_str(
            r#"(module
                (func (export "good") (param i32))
                (func (export "bad") (param i64 i64))
                (memory (export "memory") 1))"#,
        )
        .unwrap();
        let module = CompiledModule::from_bytes(engine.inner(), &wasm).unwrap();

        assert_eq!(module.export_shape("good"), ExportShape::Callable);
        assert!(matches!(module.export_shape("bad"), ExportShape::Mismatched(_)));
        assert_eq!(module.export_shape("memory"), ExportShape::Missing);
        assert_eq!(module.export_shape("absent"), ExportShape::Missing);
    }

    #[test]
    fn test_module_debug() {
        let engine = test_engine();
        let module = CompiledModule::from_bytes(engine.inner(), MINIMAL_WASM).unwrap();

        let debug_str = format!("{module:?}");
        assert!(debug_str.contains("CompiledModule"));
        assert!(debug_str.contains("content_hash"));
    }
}
