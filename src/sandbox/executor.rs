//! Core execution engine for the JavaScript sandbox.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rquickjs::{Context, Ctx, Module, Value};

use crate::error::{EvaluationError, FaultKind, Result, SandboxError};
use crate::sandbox::bridge::declare_bridge_module;
use crate::sandbox::config::{EvalOptions, RuntimeConfig};
use crate::sandbox::fs::FsBridge;
use crate::sandbox::io::{install_console, ConsoleOutput};
use crate::sandbox::limits::{EngineLimits, InterruptHandle, InterruptState};
use crate::sandbox::marshal::{catch_exception, to_json};
use crate::sandbox::resolver::{
    EngineLoader, EngineResolver, ModuleNotFound, ModuleResolver, ResolutionLog, ENTRY_MODULE,
};
use crate::sandbox::result::EvaluationResult;
use crate::sandbox::shims;
use crate::sandbox::vfs::VirtualFs;

/// A sandboxed JavaScript runtime.
///
/// Owns one QuickJS engine and one module resolver bound to a fixed
/// [`RuntimeConfig`]. Creating it is the expensive part; afterwards any
/// number of [`evaluate`](Self::evaluate) calls can run against it, one at a
/// time. Clones share the same engine.
#[derive(Clone)]
pub struct JsSandbox {
    inner: Arc<SandboxInner>,
}

struct SandboxInner {
    /// `None` once disposed. The lock also serializes evaluations.
    engine: Mutex<Option<rquickjs::Runtime>>,
    resolver: ModuleResolver,
    fs: Option<Arc<dyn FsBridge>>,
    interrupt: Arc<InterruptState>,
    misses: ResolutionLog,
    console: ConsoleOutput,
}

impl std::fmt::Debug for JsSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsSandbox")
            .field("allow_fs", &self.inner.fs.is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl JsSandbox {
    /// Create a new sandbox runtime with the given configuration.
    ///
    /// Fails if the configuration is inconsistent (filesystem access without
    /// a bridge, malformed file trees) or the engine cannot start.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let fs = match (config.allow_fs, &config.fs_bridge) {
            (true, Some(bridge)) => Some(Arc::clone(bridge)),
            (true, None) => {
                return Err(SandboxError::Config(
                    "allow_fs is set but no filesystem bridge was provided".to_string(),
                ))
            }
            (false, _) => None,
        };

        let vfs = VirtualFs::build(
            shims::builtin_tree(config.enable_test_utils),
            &config.node_modules,
            &config.mount_fs,
        )?;
        let resolver = ModuleResolver::new(Arc::new(vfs));

        let runtime = rquickjs::Runtime::new().map_err(|e| {
            SandboxError::RuntimeInit(anyhow::anyhow!("failed to create engine: {}", e))
        })?;
        EngineLimits {
            max_memory: config.max_memory,
            max_stack_size: config.max_stack_size,
        }
        .apply(&runtime);

        let interrupt = Arc::new(InterruptState::new());
        let handler_state = Arc::clone(&interrupt);
        runtime.set_interrupt_handler(Some(Box::new(move || handler_state.should_interrupt())));

        let misses = ResolutionLog::default();
        runtime.set_loader(
            EngineResolver::new(resolver.clone(), misses.clone()),
            EngineLoader::new(resolver.clone()),
        );

        tracing::info!(
            allow_fs = fs.is_some(),
            test_utils = config.enable_test_utils,
            packages = config.node_modules.len(),
            mounts = config.mount_fs.len(),
            "sandbox runtime created"
        );

        Ok(Self {
            inner: Arc::new(SandboxInner {
                engine: Mutex::new(Some(runtime)),
                resolver,
                fs,
                interrupt,
                misses,
                console: ConsoleOutput::with_limit(config.max_console_bytes),
            }),
        })
    }

    /// Evaluate `code` as an ES module and marshal its default export.
    ///
    /// Every fault raised inside the sandbox, including timeouts, is returned
    /// as a failed [`EvaluationResult`]. The only error is
    /// [`SandboxError::Disposed`].
    ///
    /// Calls on the same runtime are serialized: a call issued while another
    /// is running waits for it to finish.
    pub fn evaluate(&self, code: &str, options: EvalOptions) -> Result<EvaluationResult> {
        let engine = self.inner.lock_engine();
        // A caller queued behind the lock must not start once disposal began.
        if self.inner.interrupt.is_closed() {
            return Err(SandboxError::Disposed);
        }
        let runtime = engine.as_ref().ok_or(SandboxError::Disposed)?;
        Ok(self.inner.run(runtime, code, options))
    }

    /// Evaluate on tokio's blocking pool.
    pub async fn evaluate_async(
        &self,
        code: impl Into<String>,
        options: EvalOptions,
    ) -> Result<EvaluationResult> {
        let sandbox = self.clone();
        let code = code.into();
        tokio::task::spawn_blocking(move || sandbox.evaluate(&code, options))
            .await
            .map_err(|e| SandboxError::TaskFailed(format!("task panicked: {}", e)))?
    }

    /// Handle that aborts the in-flight evaluation from another thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle::new(Arc::clone(&self.inner.interrupt))
    }

    /// Console output of the most recent evaluation.
    pub fn console(&self) -> ConsoleOutput {
        self.inner.console.clone()
    }

    /// The merged module tree this runtime resolves against.
    pub fn vfs(&self) -> &VirtualFs {
        self.inner.resolver.vfs()
    }

    /// Release the engine.
    ///
    /// An evaluation still running is interrupted and awaited first, and
    /// callers waiting behind it give up with [`SandboxError::Disposed`].
    /// Disposing twice is a no-op; evaluating afterwards returns
    /// [`SandboxError::Disposed`].
    pub fn dispose(&self) {
        if self.inner.interrupt.close() {
            tracing::warn!("disposing a runtime with an evaluation in flight");
        }
        let mut engine = self.inner.lock_engine();
        if engine.take().is_some() {
            tracing::info!("sandbox runtime disposed");
        }
    }

    /// Check if [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.interrupt.is_closed()
    }
}

impl SandboxInner {
    fn lock_engine(&self) -> MutexGuard<'_, Option<rquickjs::Runtime>> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One evaluation: `Compiling -> Running -> {Completed | Faulted |
    /// Interrupted} -> Disposed`.
    fn run(&self, runtime: &rquickjs::Runtime, code: &str, options: EvalOptions) -> EvaluationResult {
        let started = Instant::now();
        let timeout = options.execution_timeout;
        self.console.clear();
        self.misses.clear();

        let mut scope = CallScope::enter(runtime, &self.interrupt, timeout);
        let outcome = match scope.open() {
            Ok(context) => context.with(|ctx| self.drive(&ctx, code)),
            Err(e) => Err((
                Stage::Setup,
                EvaluationError::new(
                    FaultKind::Exception,
                    format!("failed to create evaluation context: {e}"),
                ),
            )),
        };

        let outcome = if self.interrupt.tripped() {
            Err(self.interrupted(timeout))
        } else {
            outcome.map_err(|(stage, fault)| self.classify(stage, fault))
        };
        drop(scope);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(data) => {
                tracing::debug!(elapsed_ms, phase = "completed", "evaluation finished");
                EvaluationResult::Ok(data)
            }
            Err(fault) => {
                tracing::warn!(elapsed_ms, kind = %fault.kind, message = %fault.message, "evaluation failed");
                EvaluationResult::Err(fault)
            }
        }
    }

    fn drive<'js>(&self, ctx: &Ctx<'js>, code: &str) -> std::result::Result<serde_json::Value, (Stage, EvaluationError)> {
        let fault = move |stage: Stage| move |e: rquickjs::Error| (stage, engine_fault(ctx, e));

        install_console(ctx, &self.console).map_err(fault(Stage::Setup))?;
        declare_bridge_module(ctx, self.fs.as_ref(), &self.interrupt).map_err(fault(Stage::Setup))?;

        tracing::debug!(phase = "compiling", code_len = code.len());
        let declared = Module::declare(ctx.clone(), ENTRY_MODULE, code).map_err(fault(Stage::Link))?;
        let (module, done) = declared.eval().map_err(fault(Stage::Link))?;

        tracing::debug!(phase = "running");
        done.finish::<()>().map_err(fault(Stage::Body))?;

        let exported: Value = module.get("default").map_err(fault(Stage::Marshal))?;
        to_json(ctx, exported).map_err(|e| (Stage::Marshal, e))
    }

    fn interrupted(&self, timeout: Option<Duration>) -> EvaluationError {
        let message = match timeout {
            _ if self.interrupt.is_closed() => "interrupted: runtime disposed".to_string(),
            _ if self.interrupt.was_cancelled() => "interrupted: evaluation cancelled by host".to_string(),
            Some(t) => format!("interrupted: execution timeout of {}ms exceeded", t.as_millis()),
            None => "interrupted".to_string(),
        };
        EvaluationError::new(FaultKind::Interrupted, message)
    }

    /// Upgrade a script exception raised while linking the entry module
    /// by an import that did not resolve. Failures once the body runs,
    /// including uncaught dynamic imports, stay exceptions.
    fn classify(&self, stage: Stage, fault: EvaluationError) -> EvaluationError {
        if stage != Stage::Link || fault.kind != FaultKind::Exception {
            return fault;
        }
        match self.misses.miss_mentioned_in(&fault.message) {
            Some(specifier) => EvaluationError {
                kind: FaultKind::ModuleNotFound,
                message: ModuleNotFound { specifier }.to_string(),
                stack: fault.stack,
            },
            None => fault,
        }
    }
}

/// Where in a call a fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Context, console and bridge set-up.
    Setup,
    /// Compiling the entry module and loading its static imports.
    Link,
    /// Running the entry module to completion.
    Body,
    /// Reading and converting the default export.
    Marshal,
}

/// Convert an engine error into a fault, taking the pending exception if
/// there is one.
fn engine_fault<'js>(ctx: &Ctx<'js>, err: rquickjs::Error) -> EvaluationError {
    match err {
        rquickjs::Error::Exception => {
            let thrown = catch_exception(ctx);
            EvaluationError::new(FaultKind::Exception, thrown.message).with_stack(thrown.stack)
        }
        rquickjs::Error::Resolving { name, .. } | rquickjs::Error::Loading { name, .. } => {
            EvaluationError::new(
                FaultKind::ModuleNotFound,
                ModuleNotFound { specifier: name }.to_string(),
            )
        }
        rquickjs::Error::WouldBlock => EvaluationError::new(
            FaultKind::Exception,
            "module evaluation is waiting on a promise that can never settle",
        ),
        rquickjs::Error::Allocation => EvaluationError::new(FaultKind::Exception, "out of memory"),
        other => EvaluationError::new(FaultKind::Exception, other.to_string()),
    }
}

/// Per-call engine resources. Dropping the scope frees the context,
/// disarms the deadline and collects garbage, on every exit path.
struct CallScope<'a> {
    runtime: &'a rquickjs::Runtime,
    interrupt: &'a InterruptState,
    context: Option<Context>,
}

impl<'a> CallScope<'a> {
    fn enter(runtime: &'a rquickjs::Runtime, interrupt: &'a InterruptState, timeout: Option<Duration>) -> Self {
        interrupt.arm(timeout);
        Self {
            runtime,
            interrupt,
            context: None,
        }
    }

    fn open(&mut self) -> rquickjs::Result<&Context> {
        let context = Context::full(self.runtime)?;
        Ok(self.context.insert(context))
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        self.context.take();
        self.interrupt.disarm();
        self.runtime.run_gc();
        tracing::trace!(phase = "disposed", "evaluation resources released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sandbox() -> JsSandbox {
        JsSandbox::new(RuntimeConfig::default()).unwrap()
    }

    #[test]
    fn test_simple_execution() {
        let result = sandbox()
            .evaluate("export default 1 + 1", EvalOptions::default())
            .unwrap();
        assert_eq!(result, EvaluationResult::Ok(json!(2)));
    }

    #[test]
    fn test_missing_default_export_is_null() {
        let result = sandbox()
            .evaluate("export const x = 1", EvalOptions::default())
            .unwrap();
        assert_eq!(result.data(), Some(&serde_json::Value::Null));
    }

    #[test]
    fn test_timeout() {
        let result = sandbox()
            .evaluate("while (true) {}\nexport default 'ok'", EvalOptions::from_millis(1))
            .unwrap();
        assert_eq!(result.kind(), Some(FaultKind::Interrupted));
        assert!(result.error().unwrap().message.contains("interrupted"));
    }

    #[test]
    fn test_allow_fs_without_bridge_is_config_error() {
        let config = RuntimeConfig::builder().allow_fs(true).build();
        let err = JsSandbox::new(config).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_classify_upgrades_recorded_miss_while_linking() {
        let sandbox = sandbox();
        sandbox.inner.misses.record("left-pad");
        let fault = || {
            EvaluationError::new(
                FaultKind::Exception,
                "ReferenceError: Error resolving module 'left-pad' from '/src/index.js': Module 'left-pad' not installed or available",
            )
        };
        let classified = sandbox.inner.classify(Stage::Link, fault());
        assert_eq!(classified.kind, FaultKind::ModuleNotFound);
        assert_eq!(classified.message, "Module 'left-pad' not installed or available");

        assert_eq!(sandbox.inner.classify(Stage::Body, fault()).kind, FaultKind::Exception);

        let unrelated = EvaluationError::new(FaultKind::Exception, "Error: left-pad broke");
        assert_eq!(sandbox.inner.classify(Stage::Link, unrelated).kind, FaultKind::Exception);
    }

    #[test]
    fn test_evaluate_after_dispose_is_refused_without_blocking() {
        let sandbox = sandbox();
        sandbox.dispose();
        assert!(sandbox.is_disposed());
        let err = sandbox.evaluate("export default 1", EvalOptions::default()).unwrap_err();
        assert!(err.is_disposed());
    }

    #[test]
    fn test_evaluate_async_on_current_thread_runtime() {
        let sandbox = sandbox();
        let result = tokio_test::block_on(
            sandbox.evaluate_async("export default [1, 'a']", EvalOptions::default()),
        )
        .unwrap();
        assert_eq!(result.data(), Some(&json!([1, "a"])));
    }

    #[test]
    fn test_runtime_is_reusable_after_fault() {
        let sandbox = sandbox();
        let failed = sandbox
            .evaluate("throw new Error('first')", EvalOptions::default())
            .unwrap();
        assert_eq!(failed.kind(), Some(FaultKind::Exception));

        let ok = sandbox
            .evaluate("export default 'second'", EvalOptions::default())
            .unwrap();
        assert_eq!(ok.data(), Some(&json!("second")));
    }
}
