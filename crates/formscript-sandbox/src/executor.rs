//! Sandbox executor: creates fresh V8 isolates and runs form scripts.
//!
//! Each execution gets a brand new runtime. No state leaks between calls.
//!
//! V8 isolates are `!Send`, so all JsRuntime operations run on a dedicated
//! thread with its own single-threaded tokio runtime. The public API is
//! fully async and `Send`-safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use serde::Deserialize;
use serde_json::Value;

use crate::ast_validator::analyze;
use crate::audit::{AuditEntryBuilder, AuditLogger, NoopAuditLogger};
use crate::bindings::{self, Bindings};
use crate::entry::ScriptForm;
use crate::error::ExecutionError;
use crate::metrics::SandboxMetrics;
use crate::ops::{formscript_ext, ConsoleCalls, ExecutionResult, TrapsFired};

/// Extra time the async caller waits past the timeout before it gives up on
/// the sandbox thread and terminates the isolate itself.
///
/// Together with host-side preparation this keeps the worst-case overshoot
/// under 200ms.
const HOST_GRACE: Duration = Duration::from_millis(150);

/// Largest overshoot past the configured timeout a caller can observe.
pub const MAX_TIMEOUT_OVERSHOOT: Duration = Duration::from_millis(200);

/// Configuration for the sandbox executor.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum wall-clock execution time.
    pub timeout: Duration,
    /// Maximum size of a script in bytes.
    pub max_code_size: usize,
    /// Maximum size of the JSON result in bytes.
    pub max_output_size: usize,
    /// V8 heap limit in bytes.
    pub max_heap_size: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            max_code_size: 64 * 1024,        // 64 KB
            max_output_size: 1024 * 1024,    // 1 MB
            max_heap_size: 32 * 1024 * 1024, // 32 MB
        }
    }
}

/// The sandbox executor. Creates fresh V8 isolates for each execution.
///
/// This is `Send + Sync` safe: all V8 operations are dispatched to a
/// dedicated thread internally. The executor holds no per-call state, so
/// concurrent calls never coordinate.
pub struct ScriptExecutor {
    config: SandboxConfig,
    audit_logger: Arc<dyn AuditLogger>,
    metrics: Option<Arc<SandboxMetrics>>,
}

/// What the sandbox thread reports back for one call.
struct RunOutcome {
    result: Result<Value, ExecutionError>,
    console_calls: u32,
}

impl RunOutcome {
    fn failed(err: ExecutionError) -> Self {
        Self {
            result: Err(err),
            console_calls: 0,
        }
    }
}

impl ScriptExecutor {
    /// Create a new executor with the given configuration.
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            audit_logger: Arc::new(NoopAuditLogger),
            metrics: None,
        }
    }

    /// Attach an audit logger. Every call emits one entry.
    pub fn with_audit_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.audit_logger = logger;
        self
    }

    /// Attach Prometheus metrics.
    pub fn with_metrics(mut self, metrics: Arc<SandboxMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `code` against `bindings` and return the value of `processForm()`.
    ///
    /// Never panics and never hangs past the configured timeout plus a
    /// short grace period; every failure is an [`ExecutionError`].
    pub async fn execute(&self, code: &str, bindings: &Bindings) -> Result<Value, ExecutionError> {
        tracing::info!(
            code_len = code.len(),
            bindings = bindings.len(),
            "execute: starting"
        );

        let mut audit_builder = AuditEntryBuilder::new(code, bindings.len());
        let start = Instant::now();

        let outcome = match self.prepare(code, bindings) {
            Ok((form, bindings_literal)) => self.run_on_thread(form, bindings_literal).await,
            Err(e) => RunOutcome::failed(e),
        };

        if outcome.console_calls > 0 {
            tracing::debug!(
                console_calls = outcome.console_calls,
                "script attempted to log; console output is discarded"
            );
        }

        audit_builder.console_calls(outcome.console_calls);
        let entry = audit_builder.finish(&outcome.result);
        self.audit_logger.log(&entry).await;

        if let Some(metrics) = &self.metrics {
            metrics.record(&outcome.result, start.elapsed().as_secs_f64());
        }

        match &outcome.result {
            Ok(_) => tracing::info!(
                duration_ms = entry.duration_ms,
                result_size_bytes = entry.result_size_bytes,
                "execute: complete"
            ),
            Err(e) => tracing::warn!(kind = %e.kind(), error = %e, "execute: failed"),
        }

        outcome.result
    }

    /// Host-side checks that need no isolate.
    fn prepare(
        &self,
        code: &str,
        bindings: &Bindings,
    ) -> Result<(ScriptForm, String), ExecutionError> {
        if code.len() > self.config.max_code_size {
            return Err(ExecutionError::CodeTooLarge {
                max: self.config.max_code_size,
                actual: code.len(),
            });
        }
        bindings::check_reserved(bindings)?;
        let form = analyze(code)?;
        let literal = bindings::json_literal(bindings)?;
        Ok((form, literal))
    }

    /// Spawn the sandbox thread and wait for it, bounded by the host deadline.
    async fn run_on_thread(&self, form: ScriptForm, bindings_literal: String) -> RunOutcome {
        let config = self.config.clone();

        // V8 isolates are !Send, so run everything on a dedicated thread
        let (tx, rx) = tokio::sync::oneshot::channel();
        let (handle_tx, mut handle_rx) = tokio::sync::oneshot::channel::<v8::IsolateHandle>();
        let spawned = std::thread::Builder::new()
            .name("formscript-sandbox".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let outcome = RunOutcome::failed(ExecutionError::Internal(e.into()));
                        if tx.send(outcome).is_err() {
                            tracing::warn!("sandbox result receiver dropped");
                        }
                        return;
                    }
                };
                let outcome = rt.block_on(run_script(&config, &form, &bindings_literal, handle_tx));
                if tx.send(outcome).is_err() {
                    tracing::warn!("sandbox result receiver dropped before result was sent");
                }
            });
        if let Err(e) = spawned {
            return RunOutcome::failed(ExecutionError::Internal(
                anyhow::Error::new(e).context("failed to spawn sandbox thread"),
            ));
        }

        let deadline = self.config.timeout + HOST_GRACE;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => RunOutcome::failed(ExecutionError::Internal(anyhow::anyhow!(
                "sandbox thread panicked"
            ))),
            Err(_) => {
                // The watchdog did not get the isolate back in time; kill it from here.
                if let Ok(handle) = handle_rx.try_recv() {
                    handle.terminate_execution();
                }
                tracing::error!(
                    deadline_ms = deadline.as_millis() as u64,
                    "sandbox thread missed host deadline; isolate terminated"
                );
                RunOutcome::failed(ExecutionError::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// State for the near-heap-limit callback.
struct HeapLimitState {
    handle: v8::IsolateHandle,
    /// Whether the heap limit has been triggered. Uses AtomicBool so the callback
    /// can use a shared `&` reference instead of `&mut`, eliminating aliasing concerns.
    triggered: AtomicBool,
}

/// V8 near-heap-limit callback. Terminates execution and grants 1MB grace
/// for the termination to propagate cleanly.
extern "C" fn near_heap_limit_callback(
    data: *mut std::ffi::c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` points to `heap_state` (Box<HeapLimitState>) allocated in
    // `run_script`, which keeps the Box alive until after the runtime's event
    // loop has finished. V8 only invokes this callback while script runs.
    let state = unsafe { &*(data as *const HeapLimitState) };
    if !state.triggered.swap(true, Ordering::SeqCst) {
        state.handle.terminate_execution();
    }
    // Grant 1MB grace so the termination exception can propagate
    current_heap_limit + 1024 * 1024
}

/// Create a fresh JsRuntime with the formscript extension loaded and V8 heap limits set.
pub(crate) fn create_runtime(max_heap_size: usize) -> Result<JsRuntime, ExecutionError> {
    let create_params = v8::CreateParams::default().heap_limits(0, max_heap_size);

    let runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![formscript_ext::init()],
        create_params: Some(create_params),
        ..Default::default()
    });

    {
        let state = runtime.op_state();
        let mut state = state.borrow_mut();
        state.put(ConsoleCalls(0));
        state.put(TrapsFired(Vec::new()));
    }

    Ok(runtime)
}

/// Build the bootstrap that shapes the global scope before user code runs.
///
/// Order matters: primordials are captured first, then the console shim and
/// capability traps, then bindings (so they can shadow both), then the frozen
/// internal global, and finally the runtime globals are removed.
fn build_bootstrap(bindings_literal: &str) -> String {
    format!(
        r#"((ops) => {{
    const global = globalThis;
    const stringify = JSON.stringify;
    const parse = JSON.parse;
    const defineProperty = Object.defineProperty;
    const freeze = Object.freeze;
    const keys = Object.keys;
    const toString = String;
    const EvalErrorCtor = EvalError;
    const TypeErrorCtor = TypeError;
    const setResult = (json) => ops.op_formscript_set_result(json);
    const countConsole = () => ops.op_formscript_console();
    const recordViolation = (what) => ops.op_formscript_violation(what);

    const noop = () => {{ countConsole(); }};
    defineProperty(global, 'console', {{
        value: freeze({{ log: noop, info: noop, warn: noop, error: noop, debug: noop, trace: noop }}),
        writable: true, configurable: true, enumerable: false,
    }});

    const makeTrap = (what, proto) => {{
        const trap = function () {{
            recordViolation(what);
            throw new EvalErrorCtor(what + ' is not available in the sandbox');
        }};
        if (proto) {{
            trap.prototype = proto;
        }}
        return trap;
    }};
    const AsyncFunction = (async function () {{}}).constructor;
    const GeneratorFunction = (function* () {{}}).constructor;
    const AsyncGeneratorFunction = (async function* () {{}}).constructor;
    const functionTrap = makeTrap('Function()', Function.prototype);
    for (const [ctor, what] of [
        [Function, 'Function()'],
        [AsyncFunction, 'AsyncFunction()'],
        [GeneratorFunction, 'GeneratorFunction()'],
        [AsyncGeneratorFunction, 'AsyncGeneratorFunction()'],
    ]) {{
        defineProperty(ctor.prototype, 'constructor', {{
            value: ctor === Function ? functionTrap : makeTrap(what, ctor.prototype),
            writable: false, configurable: false, enumerable: false,
        }});
    }}
    for (const [name, trap] of [
        ['eval', makeTrap('eval()')],
        ['Function', functionTrap],
        ['require', makeTrap('require()')],
    ]) {{
        defineProperty(global, name, {{
            value: trap, writable: false, configurable: true, enumerable: false,
        }});
    }}

    const data = parse({bindings_literal});
    for (const key of keys(data)) {{
        defineProperty(global, key, {{
            value: data[key], writable: false, configurable: false, enumerable: true,
        }});
    }}

    const describe = (e) => {{
        try {{
            const isObject = e !== null && (typeof e === 'object' || typeof e === 'function');
            const name = isObject && typeof e.name === 'string' ? e.name : 'Error';
            const message = isObject && 'message' in e ? toString(e.message) : toString(e);
            return {{ name, message }};
        }} catch (_) {{
            return {{ name: 'Error', message: 'uncaught exception' }};
        }}
    }};
    const drive = async (entry) => {{
        let value;
        try {{
            value = await entry();
        }} catch (e) {{
            setResult(stringify({{ error: describe(e) }}));
            return;
        }}
        if (value === undefined) {{
            setResult('"noResult"');
            return;
        }}
        let json;
        try {{
            json = stringify(value);
        }} catch (_) {{
            json = undefined;
        }}
        if (json === undefined) {{
            setResult('"notSerializable"');
            return;
        }}
        setResult('{{"ok":' + json + '}}');
    }};
    let started = false;
    defineProperty(global, '__formscript', {{
        value: freeze({{
            run: (entry) => {{
                if (started) {{
                    throw new TypeErrorCtor('__formscript.run may only be called once');
                }}
                started = true;
                return drive(entry);
            }},
        }}),
        writable: false, configurable: false, enumerable: false,
    }});

    delete global.Deno;
    delete global.WebAssembly;
}})(Deno.core.ops);"#
    )
}

/// Wrap the entry body so `__formscript.run` drives it and reports the envelope.
fn wrap_user_code(form: &ScriptForm) -> String {
    format!(
        "__formscript.run(function () {{\n{}\n}});",
        form.entry_body()
    )
}

/// Result envelope written by `__formscript.run`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Envelope {
    #[serde(rename = "ok")]
    Success(Value),
    Error { name: String, message: String },
    NoResult,
    NotSerializable,
}

/// An error V8 reported outside the result envelope.
#[derive(Debug)]
enum ScriptFailure {
    /// `execute_script` failed, so the source did not compile or the
    /// bootstrap threw.
    Evaluate(String),
    /// The event loop surfaced an uncaught error after evaluation.
    EventLoop(String),
}

/// Map a script error from V8 onto an error kind.
///
/// Only the compile path can yield `syntax`; anything thrown later is
/// `runtime`, whatever its constructor name.
fn classify_script_error(failure: ScriptFailure) -> ExecutionError {
    match failure {
        ScriptFailure::Evaluate(message) if message.contains("SyntaxError") => {
            ExecutionError::Syntax { message }
        }
        ScriptFailure::Evaluate(message) | ScriptFailure::EventLoop(message) => {
            ExecutionError::runtime("Error", message)
        }
    }
}

/// Run one script on the current thread (must be called from a dedicated
/// thread, not the main tokio runtime).
async fn run_script(
    config: &SandboxConfig,
    form: &ScriptForm,
    bindings_literal: &str,
    handle_tx: tokio::sync::oneshot::Sender<v8::IsolateHandle>,
) -> RunOutcome {
    let mut runtime = match create_runtime(config.max_heap_size) {
        Ok(rt) => rt,
        Err(e) => return RunOutcome::failed(e),
    };
    let _ = handle_tx.send(runtime.v8_isolate().thread_safe_handle());

    // --- Set up heap limit callback ---
    let heap_state = Box::new(HeapLimitState {
        handle: runtime.v8_isolate().thread_safe_handle(),
        triggered: AtomicBool::new(false),
    });
    runtime.v8_isolate().add_near_heap_limit_callback(
        near_heap_limit_callback,
        &*heap_state as *const HeapLimitState as *mut std::ffi::c_void,
    );

    // --- Set up CPU watchdog ---
    let watchdog_handle = runtime.v8_isolate().thread_safe_handle();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog_timed_out = timed_out.clone();
    let timeout = config.timeout;
    let (cancel_tx, cancel_rx) = std::sync::mpsc::channel::<()>();

    let watchdog = std::thread::spawn(move || {
        if let Err(std::sync::mpsc::RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(timeout) {
            watchdog_timed_out.store(true, Ordering::SeqCst);
            watchdog_handle.terminate_execution();
        }
    });

    // --- Bootstrap, then user code ---
    let bootstrap_error = runtime
        .execute_script("[formscript:bootstrap]", build_bootstrap(bindings_literal))
        .err()
        .map(|e| ScriptFailure::Evaluate(e.to_string()));

    let mut loop_timed_out = false;
    let exec_error = match bootstrap_error {
        Some(e) => Some(e),
        None => match runtime.execute_script("[formscript:script]", wrap_user_code(form)) {
            Ok(_) => {
                // Drive the event loop so async entry functions settle
                match tokio::time::timeout(
                    config.timeout,
                    runtime.run_event_loop(PollEventLoopOptions::default()),
                )
                .await
                {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(ScriptFailure::EventLoop(e.to_string())),
                    Err(_) => {
                        loop_timed_out = true;
                        None
                    }
                }
            }
            Err(e) => Some(ScriptFailure::Evaluate(e.to_string())),
        },
    };

    // --- Cleanup: cancel watchdog and wait for it to exit ---
    // The watchdog must be done before the runtime is dropped.
    let _ = cancel_tx.send(());
    let _ = watchdog.join();

    let (console_calls, traps, result_str) = {
        let state = runtime.op_state();
        let mut state = state.borrow_mut();
        let console_calls = state.try_borrow::<ConsoleCalls>().map_or(0, |c| c.0);
        let traps = state.try_take::<TrapsFired>().map(|t| t.0).unwrap_or_default();
        let result = state.try_take::<ExecutionResult>().map(|r| r.0);
        (console_calls, traps, result)
    };

    let result = classify(
        config,
        heap_state.triggered.load(Ordering::SeqCst),
        timed_out.load(Ordering::SeqCst) || loop_timed_out,
        traps,
        exec_error,
        result_str,
    );
    drop(runtime);
    drop(heap_state);

    RunOutcome {
        result,
        console_calls,
    }
}

/// Check error causes in priority order and decode the envelope.
fn classify(
    config: &SandboxConfig,
    heap_triggered: bool,
    timed_out: bool,
    traps: Vec<String>,
    exec_error: Option<ScriptFailure>,
    result_str: Option<String>,
) -> Result<Value, ExecutionError> {
    if heap_triggered {
        return Err(ExecutionError::HeapLimitExceeded);
    }

    if timed_out {
        return Err(ExecutionError::Timeout {
            timeout_ms: config.timeout.as_millis() as u64,
        });
    }

    // A trap counts even when the script caught its exception.
    if let Some(description) = traps.into_iter().next() {
        return Err(ExecutionError::CapabilityTrap { description });
    }

    if let Some(failure) = exec_error {
        return Err(classify_script_error(failure));
    }

    let result_str = result_str
        .ok_or_else(|| ExecutionError::runtime("Error", "processForm did not settle"))?;

    if result_str.len() > config.max_output_size {
        return Err(ExecutionError::OutputTooLarge {
            max: config.max_output_size,
        });
    }

    match serde_json::from_str::<Envelope>(&result_str)? {
        Envelope::Success(value) => Ok(value),
        Envelope::Error { name, message } => Err(ExecutionError::Runtime { name, message }),
        Envelope::NoResult => Err(ExecutionError::NoResult),
        Envelope::NotSerializable => Err(ExecutionError::NotSerializable),
    }
}
