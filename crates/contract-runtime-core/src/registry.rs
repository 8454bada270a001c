//! Call-info registry.
//!
//! Maps the [`SandboxId`] of every live sandbox to the [`CallInfo`] it is
//! servicing, so host capabilities can recover "who is calling" from nothing
//! more than their store data. Entries are sharded, so calls on different
//! sandboxes never contend on a shared lock.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use contract_runtime_common::HostFunctionError;

use crate::CallInfo;
use crate::store::SandboxId;

/// Concurrent map from live sandbox to its call.
#[derive(Debug, Default)]
pub struct CallRegistry {
    entries: DashMap<SandboxId, Arc<CallInfo>>,
}

impl CallRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `info` for `sandbox` until the returned guard is dropped.
    #[must_use = "the entry is removed as soon as the guard is dropped"]
    pub fn register(&self, sandbox: SandboxId, info: CallInfo) -> RegistrationGuard<'_> {
        trace!(sandbox_id = %sandbox, "Registering call");
        self.entries.insert(sandbox, Arc::new(info));
        RegistrationGuard {
            registry: self,
            sandbox,
        }
    }

    /// The call serviced by `sandbox`.
    ///
    /// The returned handle is detached from the map; holding it does not
    /// block other sandboxes.
    pub fn get(&self, sandbox: SandboxId) -> Option<Arc<CallInfo>> {
        self.entries.get(&sandbox).map(|entry| Arc::clone(entry.value()))
    }

    /// Like [`get`](Self::get), but as a host-call error when absent.
    ///
    /// # Errors
    ///
    /// Returns [`HostFunctionError::UnknownCall`] if `sandbox` is not registered.
    pub fn lookup(&self, sandbox: SandboxId) -> Result<Arc<CallInfo>, HostFunctionError> {
        self.get(sandbox).ok_or(HostFunctionError::UnknownCall {
            sandbox_id: sandbox.get(),
        })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no call is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove(&self, sandbox: SandboxId) {
        trace!(sandbox_id = %sandbox, "Removing call");
        self.entries.remove(&sandbox);
    }
}

/// Removes its registry entry when dropped.
#[derive(Debug)]
pub struct RegistrationGuard<'a> {
    registry: &'a CallRegistry,
    sandbox: SandboxId,
}

impl RegistrationGuard<'_> {
    /// The sandbox this guard covers.
    pub fn sandbox(&self) -> SandboxId {
        self.sandbox
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.sandbox);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryState;
    use contract_runtime_common::Address;

    fn info(byte: u8) -> CallInfo {
        CallInfo::new(
            Arc::new(InMemoryState::new()),
            Address::from_parts(0, [byte; 32]),
            "run",
        )
    }

    #[test]
    fn test_guard_removes_entry() {
        let registry = CallRegistry::new();
        let sandbox = SandboxId::next();

        {
            let guard = registry.register(sandbox, info(1));
            assert_eq!(guard.sandbox(), sandbox);
            assert_eq!(registry.len(), 1);
            assert_eq!(
                registry.get(sandbox).unwrap().contract,
                Address::from_parts(0, [1; 32])
            );
        }

        assert!(registry.is_empty());
        assert!(registry.get(sandbox).is_none());
    }

    #[test]
    fn test_lookup_unknown_sandbox() {
        let registry = CallRegistry::new();
        let sandbox = SandboxId::next();

        let err = registry.lookup(sandbox).unwrap_err();
        assert!(matches!(
            err,
            HostFunctionError::UnknownCall { sandbox_id } if sandbox_id == sandbox.get()
        ));
    }

    #[test]
    fn test_guard_removes_entry_on_panic() {
        let registry = CallRegistry::new();
        let sandbox = SandboxId::next();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = registry.register(sandbox, info(2));
            panic!("guest blew up");
        }));

        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_disjoint_entries() {
        let registry = Arc::new(CallRegistry::new());

        let handles: Vec<_> = (0..16u8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let sandbox = SandboxId::next();
                    let _guard = registry.register(sandbox, info(i));
                    let found = registry.get(sandbox).unwrap();
                    assert_eq!(found.contract, Address::from_parts(0, [i; 32]));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(registry.is_empty());
    }
}
