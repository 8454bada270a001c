//! Module validation.
//!
//! A [`ModuleValidator`] gates cold compilation: it sees the raw bytecode
//! once per artifact, before compilation, and never on a cache hit.

use contract_runtime_common::{ValidationConfig, ValidationError};

/// Custom validation of raw contract bytecode.
pub trait ModuleValidator: Send + Sync {
    /// Validate the bytes before compilation.
    ///
    /// Returning an error aborts the call before any sandbox is created.
    fn validate_module(&self, bytes: &[u8]) -> Result<(), ValidationError>;
}

/// Built-in validator enforcing a size ceiling and the wasm header.
#[derive(Debug, Clone)]
pub struct SizeLimitValidator {
    max_bytes: usize,
}

impl SizeLimitValidator {
    /// Reject anything larger than `max_bytes`.
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Build from configuration, or `None` when validation is disabled.
    pub fn from_config(config: &ValidationConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_module_bytes))
    }
}

impl ModuleValidator for SizeLimitValidator {
    fn validate_module(&self, bytes: &[u8]) -> Result<(), ValidationError> {
        if bytes.is_empty() {
            return Err(ValidationError::new("module is empty"));
        }
        if bytes.len() > self.max_bytes {
            return Err(ValidationError::new(format!(
                "module is {} bytes, limit is {}",
                bytes.len(),
                self.max_bytes
            )));
        }
        if !bytes.starts_with(b"\0asm") {
            return Err(ValidationError::new("missing wasm magic number"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_WASM: &[u8] = &[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

    #[test]
    fn test_accepts_small_module() {
        let validator = SizeLimitValidator::new(64);
        assert!(validator.validate_module(MINIMAL_WASM).is_ok());
    }

    #[test]
    fn test_rejects_oversized_module() {
        let validator = SizeLimitValidator::new(4);
        let err = validator.validate_module(MINIMAL_WASM).unwrap_err();
        assert!(err.reason.contains("limit is 4"));
    }

    #[test]
    fn test_rejects_empty_and_bad_magic() {
        let validator = SizeLimitValidator::new(64);
        assert!(validator.validate_module(&[]).is_err());
        assert!(validator.validate_module(b"not wasm").is_err());
    }

    #[test]
    fn test_from_config() {
        assert!(SizeLimitValidator::from_config(&ValidationConfig::default()).is_none());

        let config = ValidationConfig {
            enabled: true,
            max_module_bytes: 10,
        };
        let validator = SizeLimitValidator::from_config(&config).unwrap();
        assert!(validator.validate_module(&[0; 11]).is_err());
    }
}
