//! Entry-function normalization.
//!
//! Form scripts come in two shapes: a bare sequence of statements ending in a
//! `return`, or a script that declares `processForm` itself. Both are turned
//! into a function body whose completion value is `processForm()`.

/// Name of the conventional entry function.
pub const ENTRY_FUNCTION: &str = "processForm";

/// A script resolved to one of its two accepted shapes.
///
/// Built by [`crate::ast_validator::analyze`] from the parsed program, never
/// by searching the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptForm {
    /// Statements to be used as the body of `processForm`.
    RawStatements(String),
    /// A script that declares a top-level `processForm`.
    NamedFunction(String),
}

impl ScriptForm {
    /// Pick the shape for `code` given whether it declares the entry function.
    pub fn new(code: &str, declares_entry: bool) -> Self {
        if declares_entry {
            Self::NamedFunction(code.to_string())
        } else {
            Self::RawStatements(code.to_string())
        }
    }

    /// The original script source.
    pub fn source(&self) -> &str {
        match self {
            Self::RawStatements(code) | Self::NamedFunction(code) => code,
        }
    }

    /// Build a function body that evaluates to the return value of `processForm()`.
    ///
    /// User code always sits on its own lines so a trailing line comment
    /// cannot swallow the generated call.
    pub fn entry_body(&self) -> String {
        match self {
            Self::RawStatements(code) => format!(
                "function {ENTRY_FUNCTION}() {{\n{code}\n}}\nreturn {ENTRY_FUNCTION}();"
            ),
            Self::NamedFunction(code) => format!("{code}\nreturn {ENTRY_FUNCTION}();"),
        }
    }
}
