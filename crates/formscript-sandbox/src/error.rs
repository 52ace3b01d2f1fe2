//! Error types for the formscript sandbox.

use serde::Serialize;
use thiserror::Error;

/// The four failure classes a caller can distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The script failed to parse.
    Syntax,
    /// The script threw, returned nothing usable, or exhausted a runtime limit.
    Runtime,
    /// The wall-clock budget was exceeded.
    Timeout,
    /// The script attempted to use a disabled capability.
    Violation,
}

impl ErrorKind {
    /// Stable lowercase name, used in HTTP bodies, metrics labels and audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Runtime => "runtime",
            Self::Timeout => "timeout",
            Self::Violation => "violation",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while executing a form script.
///
/// Every variant maps onto exactly one [`ErrorKind`] via [`ExecutionError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutionError {
    /// The script does not parse.
    #[error("syntax error: {message}")]
    Syntax {
        /// Parser or compiler message.
        message: String,
    },

    /// The script threw during execution.
    #[error("{name}: {message}")]
    Runtime {
        /// JavaScript error class name (`TypeError`, `ReferenceError`, ...).
        name: String,
        /// The error message from JavaScript.
        message: String,
    },

    /// `processForm()` completed without producing a value.
    #[error("processForm returned no value")]
    NoResult,

    /// `processForm()` returned something `JSON.stringify` cannot represent.
    #[error("processForm returned a value that is not JSON-serializable")]
    NotSerializable,

    /// Execution timed out (watchdog or host deadline).
    #[error("execution timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// A disabled capability was referenced in the source.
    #[error("sandbox violation: {description}")]
    Violation {
        /// What was attempted.
        description: String,
    },

    /// A capability trap fired inside the isolate.
    #[error("sandbox violation: {description} is not available in the sandbox")]
    CapabilityTrap {
        /// The trapped capability, e.g. `eval()` or `require()`.
        description: String,
    },

    /// Script source exceeds the configured maximum size.
    #[error("script exceeds maximum size of {max} bytes (got {actual})")]
    CodeTooLarge {
        /// Maximum allowed size.
        max: usize,
        /// Actual size.
        actual: usize,
    },

    /// Serialized result exceeds the configured maximum size.
    #[error("result exceeds maximum size of {max} bytes")]
    OutputTooLarge {
        /// Maximum allowed size.
        max: usize,
    },

    /// V8 heap limit was exceeded.
    #[error("script exceeded the memory limit")]
    HeapLimitExceeded,

    /// A binding uses a name the executor reserves for itself.
    #[error("binding name '{name}' is reserved")]
    ReservedBinding {
        /// The offending binding key.
        name: String,
    },

    /// Host-side failure (thread spawn, runtime construction, serialization).
    #[error("sandbox execution failed: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ExecutionError {
    /// Classify this error into one of the four caller-visible kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax { .. } => ErrorKind::Syntax,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Violation { .. } | Self::CapabilityTrap { .. } | Self::CodeTooLarge { .. } => {
                ErrorKind::Violation
            }
            Self::Runtime { .. }
            | Self::NoResult
            | Self::NotSerializable
            | Self::OutputTooLarge { .. }
            | Self::HeapLimitExceeded
            | Self::ReservedBinding { .. }
            | Self::Internal(_) => ErrorKind::Runtime,
        }
    }

    pub(crate) fn runtime(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ExecutionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(anyhow::Error::new(e).context("result serialization failed"))
    }
}

// ExecutionError crosses thread and task boundaries.
const _: fn() = || {
    fn assert_bounds<T: Send + Sync + 'static>() {}
    assert_bounds::<ExecutionError>();
};
