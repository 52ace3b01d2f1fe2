//! deno_core op definitions for the formscript sandbox.
//!
//! The `#[op2]` macro generates additional public items (v8 function pointers,
//! metadata structs) that cannot carry doc comments. We suppress `missing_docs`
//! at the module level; all actual functions and types are documented below.
#![allow(missing_docs)]

use deno_core::op2;
use deno_core::OpState;

/// Store the execution envelope in OpState.
///
/// Only the first envelope is kept, so a script cannot overwrite its result
/// after the entry function has settled.
#[op2(fast)]
pub fn op_formscript_set_result(state: &mut OpState, #[string] json: &str) {
    if state.try_borrow::<ExecutionResult>().is_none() {
        state.put(ExecutionResult(json.to_string()));
    }
}

/// Count a call to the no-op console. Arguments are never seen by the host.
#[op2(fast)]
pub fn op_formscript_console(state: &mut OpState) {
    if let Some(calls) = state.try_borrow_mut::<ConsoleCalls>() {
        calls.0 = calls.0.saturating_add(1);
    }
}

/// Record that a capability trap fired. The trap throws on the JS side.
#[op2(fast)]
pub fn op_formscript_violation(state: &mut OpState, #[string] capability: &str) {
    tracing::warn!(capability = %capability, "sandbox capability trap fired");
    if let Some(traps) = state.try_borrow_mut::<TrapsFired>() {
        traps.0.push(capability.to_string());
    }
}

/// Wrapper for execution envelopes stored in OpState.
pub struct ExecutionResult(pub String);

/// Number of console calls the script attempted.
pub struct ConsoleCalls(pub u32);

/// Capabilities whose traps fired, in order.
pub struct TrapsFired(pub Vec<String>);

deno_core::extension!(
    formscript_ext,
    ops = [
        op_formscript_set_result,
        op_formscript_console,
        op_formscript_violation
    ],
);
