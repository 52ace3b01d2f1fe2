#![warn(missing_docs)]

//! # formscript-sandbox
//!
//! V8 sandbox that runs untrusted form scripts against submitted form data.
//!
//! A form script is either a bare list of statements ending in `return`, or a
//! script that declares `processForm` itself. Either way the value returned
//! by `processForm()` is the result, and every failure is an
//! [`ExecutionError`] classified as one of four [`ErrorKind`]s.
//!
//! ## Security model
//!
//! - **V8 isolate**: Same process-level isolation as Chrome tabs
//! - **No ambient capabilities**: No fs, net, env, module or process access
//! - **Fresh runtime per call**: No state leakage between executions
//! - **Pre-execution analysis**: Disabled capabilities caught before reaching V8
//! - **Runtime traps**: `eval`, `Function` and friends report violations when touched
//! - **Timeout enforcement**: Watchdog plus a host-side deadline
//! - **Read-only bindings**: Form fields are JSON copies installed as frozen globals
//!
//! ```no_run
//! use formscript_sandbox::{Bindings, SandboxConfig, ScriptExecutor};
//!
//! # async fn demo() -> Result<(), formscript_sandbox::ExecutionError> {
//! let executor = ScriptExecutor::new(SandboxConfig::default());
//! let mut bindings = Bindings::new();
//! bindings.insert("a".into(), 2.into());
//! bindings.insert("b".into(), 3.into());
//! let value = executor.execute("return { sum: a + b };", &bindings).await?;
//! assert_eq!(value["sum"], 5);
//! # Ok(())
//! # }
//! ```

pub mod ast_validator;
pub mod audit;
pub mod bindings;
pub mod entry;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod ops;
pub mod redact;

pub use bindings::Bindings;
pub use entry::ScriptForm;
pub use error::{ErrorKind, ExecutionError};
pub use executor::{SandboxConfig, ScriptExecutor};
pub use metrics::SandboxMetrics;
