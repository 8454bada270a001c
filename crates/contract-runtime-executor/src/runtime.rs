//! The call orchestrator.
//!
//! [`ContractRuntime`] owns the engine, the host linker, the module loader,
//! the call-info registry and the block statistics. Every call runs the same
//! pipeline:
//!
//! 1. Resolve the contract id bound to the target address
//! 2. Acquire a compiled module (cache, or fetch + validate + compile)
//! 3. Create a fresh sandbox holding the call's fuel budget
//! 4. Register the call so host capabilities can find it
//! 5. Write context + params into guest memory and invoke the export
//! 6. Merge the call's measurements into the block statistics
//!
//! The runtime is cheap to clone; clones share all state.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use wasmtime::Linker;

use contract_runtime_common::{ExecutionConfig, RuntimeConfig, RuntimeError};
use contract_runtime_core::{
    BlockStats, CallInfo, CallRegistry, ContractInvoker, EpochTicker, InvocationOutcome, Sandbox,
    SandboxState, StatsCollector, WasmEngine,
};

use crate::builder::RuntimeBuilder;
use crate::call_context::CallContext;
use crate::loader::ModuleLoader;

/// Sandboxed, fuel-metered contract runtime.
#[derive(Clone)]
pub struct ContractRuntime {
    inner: Arc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    pub(crate) engine: WasmEngine,
    pub(crate) linker: Linker<SandboxState>,
    pub(crate) loader: ModuleLoader,
    pub(crate) registry: Arc<CallRegistry>,
    pub(crate) stats: StatsCollector,
    pub(crate) execution: ExecutionConfig,
    // Stops the epoch thread when the last clone is dropped.
    pub(crate) _ticker: Option<EpochTicker>,
}

impl ContractRuntime {
    /// Create a runtime with the built-in cache and validator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the engine cannot
    /// be created.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        RuntimeBuilder::new(config).build()
    }

    /// Start configuring a runtime.
    pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub(crate) fn from_inner(inner: RuntimeInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// A reusable call context whose unset fields fall back to `defaults`.
    ///
    /// A zero fuel budget in `defaults` is replaced by the configured
    /// `default_fuel`.
    pub fn with_defaults(&self, mut defaults: CallInfo) -> CallContext {
        if defaults.fuel == 0 {
            defaults.fuel = self.inner.execution.default_fuel;
        }
        CallContext::new(self.clone(), defaults)
    }

    /// Execute one contract call and return the bytes it recorded as its result.
    ///
    /// # Errors
    ///
    /// Returns the [`RuntimeError`] of whichever stage failed; see the
    /// module docs for the pipeline.
    pub async fn call_contract(&self, info: CallInfo) -> Result<Vec<u8>, RuntimeError> {
        self.execute(info, std::future::pending()).await.output
    }

    /// Like [`call_contract`](Self::call_contract), but abandoned with
    /// [`RuntimeError::Cancelled`] if `cancel` completes before the sandbox
    /// is invoked.
    ///
    /// Once the guest is running, `cancel` is no longer polled; fuel and the
    /// compute deadline bound the rest of the call.
    ///
    /// # Errors
    ///
    /// As [`call_contract`](Self::call_contract), plus [`RuntimeError::Cancelled`].
    pub async fn call_contract_until<C>(
        &self,
        info: CallInfo,
        cancel: C,
    ) -> Result<Vec<u8>, RuntimeError>
    where
        C: Future<Output = ()> + Send,
    {
        self.execute(info, cancel).await.output
    }

    /// Snapshot of the block statistics.
    pub fn get_block_stats(&self) -> BlockStats {
        self.inner.stats.snapshot()
    }

    /// Zero the block statistics.
    pub fn reset_block_stats(&self) {
        self.inner.stats.reset();
    }

    /// Number of calls currently executing, nested calls included.
    pub fn active_calls(&self) -> usize {
        self.inner.registry.len()
    }

    /// The underlying engine.
    pub fn engine(&self) -> &WasmEngine {
        &self.inner.engine
    }

    /// Per-call limits.
    pub fn execution_config(&self) -> &ExecutionConfig {
        &self.inner.execution
    }

    #[instrument(
        skip_all,
        fields(
            contract = %info.contract,
            function = %info.function_name,
            fuel = info.fuel,
            depth = info.depth,
        )
    )]
    async fn execute<C>(&self, mut info: CallInfo, cancel: C) -> InvocationOutcome
    where
        C: Future<Output = ()> + Send,
    {
        let mut cancel = std::pin::pin!(cancel);
        let inner = &self.inner;

        let prepared = async {
            let contract_id = race(
                "resolution",
                async {
                    info.state
                        .get_account_contract(&info.contract)
                        .await
                        .map_err(|source| RuntimeError::Resolution {
                            address: info.contract.to_string(),
                            source,
                        })
                },
                &mut cancel,
            )
            .await?;

            let loaded = race(
                "module acquisition",
                inner
                    .loader
                    .load(&contract_id, info.state.as_ref(), &info.function_name),
                &mut cancel,
            )
            .await?;

            let payload = info.context().payload(&info.params)?;
            Ok::<_, RuntimeError>((loaded, payload))
        }
        .await;

        let (loaded, payload) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                debug!(error = %err, "Call failed before sandbox creation");
                return InvocationOutcome {
                    output: Err(err),
                    fuel_used: 0,
                };
            }
        };

        let mut sandbox = match Sandbox::instantiate(
            &inner.engine,
            &inner.linker,
            &loaded.module,
            &inner.execution,
            info.fuel,
        )
        .await
        {
            Ok(sandbox) => sandbox,
            Err(err) => {
                warn!(error = %err, "Sandbox creation failed");
                return InvocationOutcome {
                    output: Err(err),
                    fuel_used: 0,
                };
            }
        };

        sandbox.state_mut().set_invoker(Arc::new(self.clone()));
        info.sandbox = Some(sandbox.id());

        let function = info.function_name.clone();
        let output = {
            let _registration = inner.registry.register(sandbox.id(), info);
            sandbox.invoke(&function, &payload).await
        };

        let stats = sandbox.execution_stats(loaded.cache_hit);
        inner.stats.record(&stats);

        info!(
            sandbox_id = %sandbox.id(),
            fuel_used = stats.fuel_used,
            duration_us = u64::try_from(stats.elapsed.as_micros()).unwrap_or(u64::MAX),
            cache_hit = stats.cache_hit,
            success = output.is_ok(),
            "Contract call finished"
        );

        InvocationOutcome {
            output,
            fuel_used: stats.fuel_used,
        }
    }
}

/// Run one pre-invocation stage, giving up if `cancel` fires first.
async fn race<T, F, C>(
    stage: &'static str,
    work: F,
    cancel: &mut Pin<&mut C>,
) -> Result<T, RuntimeError>
where
    F: Future<Output = Result<T, RuntimeError>>,
    C: Future<Output = ()>,
{
    tokio::select! {
        biased;
        () = cancel.as_mut() => {
            debug!(stage, "Call cancelled");
            Err(RuntimeError::Cancelled { stage })
        }
        result = work => result,
    }
}

#[async_trait]
impl ContractInvoker for ContractRuntime {
    async fn invoke(&self, info: CallInfo) -> InvocationOutcome {
        self.execute(info, std::future::pending()).await
    }

    fn max_call_depth(&self) -> u32 {
        self.inner.execution.max_call_depth
    }
}

impl std::fmt::Debug for ContractRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractRuntime")
            .field("engine", &self.inner.engine)
            .field("loader", &self.inner.loader)
            .field("active_calls", &self.active_calls())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_runtime_common::{Address, ContractId, EngineConfig};
    use contract_runtime_core::InMemoryState;

    const COUNTER: &str = r#"(module
        (import "contract" "set_call_result" (func $set_result (param i32 i32)))
        (memory (export "memory") 1)
        (global $next (mut i32) (i32.const 1024))
        (func (export "alloc") (param $len i32) (result i32)
            (local $ptr i32)
            global.get $next
            local.set $ptr
            global.get $next
            local.get $len
            i32.add
            global.set $next
            local.get $ptr)
        (func (export "answer") (param $ptr i32)
            (i32.store8 (i32.const 0) (i32.const 42))
            (call $set_result (i32.const 0) (i32.const 1))))"#;

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            engine: EngineConfig {
                pooling_allocator: false,
                epoch_interruption: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn deployed() -> (Arc<InMemoryState>, Address) {
        let state = Arc::new(InMemoryState::new());
        let address = Address::from_parts(0, [7; 32]);
        state.deploy(
            address,
            ContractId::from("counter"),
            wat::parse_str(COUNTER).unwrap(),
        );
        (state, address)
    }

    #[tokio::test]
    async fn test_call_and_stats() {
        let runtime = ContractRuntime::new(config()).unwrap();
        let (state, address) = deployed();

        let mut info = CallInfo::new(state, address, "answer");
        info.fuel = 1_000_000;

        assert_eq!(runtime.call_contract(info.clone()).await.unwrap(), vec![42]);
        assert_eq!(runtime.call_contract(info).await.unwrap(), vec![42]);

        let stats = runtime.get_block_stats();
        assert_eq!(stats.contract_calls, 2);
        assert_eq!(stats.cache_hits, 1);
        assert!(stats.total_fuel_used > 0);
        assert_eq!(runtime.active_calls(), 0);

        runtime.reset_block_stats();
        assert_eq!(runtime.get_block_stats(), BlockStats::default());
    }

    #[tokio::test]
    async fn test_failures_before_sandbox_are_not_counted() {
        let runtime = ContractRuntime::new(config()).unwrap();
        let (state, _) = deployed();

        let mut info = CallInfo::new(state, Address::from_parts(0, [9; 32]), "answer");
        info.fuel = 1_000_000;

        let err = runtime.call_contract(info).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Resolution { .. }));
        assert_eq!(runtime.get_block_stats().contract_calls, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_resolution() {
        let runtime = ContractRuntime::new(config()).unwrap();
        let (state, address) = deployed();

        let mut info = CallInfo::new(state, address, "answer");
        info.fuel = 1_000_000;

        let err = runtime
            .call_contract_until(info, std::future::ready(()))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled { stage: "resolution" }));
        assert_eq!(runtime.get_block_stats().contract_calls, 0);
    }

    #[tokio::test]
    async fn test_with_defaults_fills_fuel() {
        let runtime = ContractRuntime::new(config()).unwrap();
        let (state, address) = deployed();

        let ctx = runtime.with_defaults(CallInfo::new(state, Address::ZERO, ""));
        assert_eq!(ctx.defaults().fuel, runtime.execution_config().default_fuel);
        assert_eq!(ctx.call_contract(address, "answer", Vec::new()).await.unwrap(), vec![42]);
    }

    #[test]
    fn test_invoker_depth_follows_config() {
        let mut config = config();
        config.execution.max_call_depth = 3;
        let runtime = ContractRuntime::new(config).unwrap();
        assert_eq!(ContractInvoker::max_call_depth(&runtime), 3);
    }
}
