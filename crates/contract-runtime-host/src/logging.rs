//! Logging host function implementation.
//!
//! Guest log lines are re-emitted through `tracing`, tagged with the address
//! of the contract that wrote them.

use tracing::{debug, error, info, warn};

use contract_runtime_common::Address;
use contract_runtime_core::SandboxId;

/// Log level for guest logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug-level messages.
    Debug,
    /// Informational messages.
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Host implementation for the `log` module.
pub struct LoggingHost;

impl LoggingHost {
    /// Emit a guest log line.
    ///
    /// `contract` is `None` when the calling sandbox has no registered call.
    pub fn log(sandbox: SandboxId, contract: Option<&Address>, level: LogLevel, message: &str) {
        let contract = contract.map(ToString::to_string).unwrap_or_default();
        let sandbox_id = sandbox.get();
        match level {
            LogLevel::Debug => debug!(sandbox_id, contract = %contract, guest_log = true, "{}", message),
            LogLevel::Info => info!(sandbox_id, contract = %contract, guest_log = true, "{}", message),
            LogLevel::Warn => warn!(sandbox_id, contract = %contract, guest_log = true, "{}", message),
            LogLevel::Error => error!(sandbox_id, contract = %contract, guest_log = true, "{}", message),
        }
    }
}

/// Convert a numeric log level to [`LogLevel`].
///
/// 0=debug, 1=info, 2=warn, 3=error; anything else is treated as info.
pub fn level_from_i32(level: i32) -> LogLevel {
    match level {
        0 => LogLevel::Debug,
        2 => LogLevel::Warn,
        3 => LogLevel::Error,
        _ => LogLevel::Info,
    }
}
