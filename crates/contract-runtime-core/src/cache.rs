//! Compiled module caching.
//!
//! [`ModuleCache`] is the single cache abstraction the runtime consults
//! before compiling. Callers may plug in their own strategy (per-block,
//! persistent, ...); otherwise the runtime uses [`BoundedModuleCache`], a
//! byte-budgeted LRU.
//!
//! ## Eviction cost
//!
//! An entry costs `id.len() + module.artifact_size()`. When an insert would
//! push the total over budget, least-recently-used entries are evicted until
//! it fits. An entry larger than the whole budget is not cached.

use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use contract_runtime_common::ContractId;

use crate::CompiledModule;

/// A lookup layer from contract id to compiled module.
///
/// Implementations must be safe under concurrent `get`/`put`. Concurrent
/// puts for the same id may race; last writer wins, but an entry is never
/// observed half-written.
pub trait ModuleCache: Send + Sync {
    /// Look up a compiled module.
    fn get_module(&self, id: &ContractId) -> Option<Arc<CompiledModule>>;

    /// Store a compiled module.
    fn put_module(&self, id: &ContractId, module: Arc<CompiledModule>);
}

/// Byte-budgeted LRU cache of compiled modules.
pub struct BoundedModuleCache {
    inner: Mutex<LruState>,
    max_bytes: usize,
}

struct LruState {
    entries: LruCache<ContractId, Arc<CompiledModule>>,
    used_bytes: usize,
}

fn entry_cost(id: &ContractId, module: &CompiledModule) -> usize {
    id.len().saturating_add(module.artifact_size())
}

impl BoundedModuleCache {
    /// Create a cache holding at most `max_bytes` worth of entries.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(LruState {
                entries: LruCache::unbounded(),
                used_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Configured byte budget.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Bytes currently accounted to cached entries.
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().used_bytes
    }

    /// Number of cached modules.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check for an entry without touching its recency.
    pub fn contains(&self, id: &ContractId) -> bool {
        self.inner.lock().entries.contains(id)
    }

    /// Remove an entry, returning it if present.
    pub fn remove(&self, id: &ContractId) -> Option<Arc<CompiledModule>> {
        let mut state = self.inner.lock();
        let module = state.entries.pop(id)?;
        state.used_bytes = state.used_bytes.saturating_sub(entry_cost(id, &module));
        Some(module)
    }
}

impl ModuleCache for BoundedModuleCache {
    fn get_module(&self, id: &ContractId) -> Option<Arc<CompiledModule>> {
        self.inner.lock().entries.get(id).cloned()
    }

    fn put_module(&self, id: &ContractId, module: Arc<CompiledModule>) {
        let cost = entry_cost(id, &module);
        if cost > self.max_bytes {
            debug!(
                contract_id = %id,
                cost,
                max_bytes = self.max_bytes,
                "Module exceeds cache budget; not cached"
            );
            return;
        }

        let mut state = self.inner.lock();

        if let Some(previous) = state.entries.pop(id) {
            state.used_bytes = state.used_bytes.saturating_sub(entry_cost(id, &previous));
        }

        while state.used_bytes + cost > self.max_bytes {
            let Some((evicted_id, evicted)) = state.entries.pop_lru() else {
                break;
            };
            state.used_bytes = state
                .used_bytes
                .saturating_sub(entry_cost(&evicted_id, &evicted));
            debug!(contract_id = %evicted_id, "Evicted compiled module");
        }

        state.entries.put(id.clone(), module);
        state.used_bytes += cost;
    }
}

impl std::fmt::Debug for BoundedModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("BoundedModuleCache")
            .field("entries", &state.entries.len())
            .field("used_bytes", &state.used_bytes)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WasmEngine;
    use contract_runtime_common::EngineConfig;

    fn compile(body: &str) -> Arc<CompiledModule> {
        let engine = WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            epoch_interruption: false,
            ..Default::default()
        })
        .unwrap();
        let wasm = wat::parse_str(format!("(module {body})")).unwrap();
        Arc::new(CompiledModule::from_bytes(engine.inner(), &wasm).unwrap())
    }

    #[test]
    fn test_put_and_get() {
        let cache = BoundedModuleCache::new(usize::MAX);
        let id = ContractId::from("a");
        let module = compile(r#"(func (export "f") (param i32))"#);

        assert!(cache.get_module(&id).is_none());
        cache.put_module(&id, module.clone());

        let cached = cache.get_module(&id).unwrap();
        assert!(Arc::ptr_eq(&cached, &module));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used_bytes(), 1 + module.artifact_size());
    }

    #[test]
    fn test_replace_same_id_keeps_single_entry() {
        let cache = BoundedModuleCache::new(usize::MAX);
        let id = ContractId::from("a");
        let first = compile(r#"(func (export "f") (param i32))"#);
        let second = compile(r#"(func (export "g") (param i32))"#);

        cache.put_module(&id, first);
        cache.put_module(&id, second.clone());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used_bytes(), 1 + second.artifact_size());
        assert!(Arc::ptr_eq(&cache.get_module(&id).unwrap(), &second));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let module = compile(r#"(func (export "f") (param i32))"#);
        let per_entry = 1 + module.artifact_size();
        let cache = BoundedModuleCache::new(per_entry * 2);

        let a = ContractId::from("a");
        let b = ContractId::from("b");
        let c = ContractId::from("c");

        cache.put_module(&a, module.clone());
        cache.put_module(&b, module.clone());
        // Touch `a` so `b` becomes least recently used
        assert!(cache.get_module(&a).is_some());
        cache.put_module(&c, module);

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
        assert!(cache.used_bytes() <= cache.max_bytes());
    }

    #[test]
    fn test_oversized_entry_not_cached() {
        let module = compile(r#"(func (export "f") (param i32))"#);
        let cache = BoundedModuleCache::new(module.artifact_size() / 2);
        let id = ContractId::from("big");

        cache.put_module(&id, module);

        assert!(cache.is_empty());
        assert_eq!(cache.used_bytes(), 0);
    }

    #[test]
    fn test_remove_releases_budget() {
        let cache = BoundedModuleCache::new(usize::MAX);
        let id = ContractId::from("a");
        cache.put_module(&id, compile(""));

        assert!(cache.remove(&id).is_some());
        assert!(cache.remove(&id).is_none());
        assert_eq!(cache.used_bytes(), 0);
    }

    #[test]
    fn test_concurrent_puts_same_id() {
        let cache = Arc::new(BoundedModuleCache::new(usize::MAX));
        let module = compile(r#"(func (export "f") (param i32))"#);
        let id = ContractId::from("shared");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let module = module.clone();
                let id = id.clone();
                std::thread::spawn(move || cache.put_module(&id, module))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used_bytes(), id.len() + module.artifact_size());
    }
}
