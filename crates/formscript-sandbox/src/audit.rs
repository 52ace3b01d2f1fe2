//! Audit logging for script executions.
//!
//! Every execution emits an [`AuditEntry`] containing:
//! - Execution ID (UUID)
//! - SHA-256 hash of the script (never the full script in logs)
//! - A redacted preview of the first 500 bytes of the script
//! - Binding and console-call counts (never their values)
//! - Duration and outcome
//!
//! The [`AuditLogger`] trait allows pluggable backends.
//! [`JsonLinesAuditLogger`] writes newline-delimited JSON to any `AsyncWrite`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{ErrorKind, ExecutionError};

/// Maximum length of the code preview in audit entries.
const CODE_PREVIEW_MAX: usize = 500;

/// A complete audit record for a single script execution.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// Unique execution identifier.
    pub execution_id: String,
    /// ISO-8601 timestamp of when execution started.
    pub timestamp: DateTime<Utc>,
    /// SHA-256 hash of the submitted script.
    pub code_hash: String,
    /// First N bytes of the script, redacted (for human review).
    pub code_preview: String,
    /// Number of form fields bound into the isolate.
    pub binding_count: usize,
    /// Number of console calls the script attempted.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub console_calls: u32,
    /// Total execution duration in milliseconds.
    pub duration_ms: u64,
    /// Size of the JSON result in bytes.
    pub result_size_bytes: usize,
    /// Final outcome.
    pub outcome: AuditOutcome,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// The outcome of a script execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AuditOutcome {
    /// Execution completed successfully.
    Success,
    /// Execution failed with an error.
    Error {
        /// Error classification.
        kind: ErrorKind,
        /// The error message.
        message: String,
    },
    /// Execution was terminated due to timeout.
    Timeout,
}

impl AuditOutcome {
    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error { kind, .. } => kind.as_str(),
            Self::Timeout => "timeout",
        }
    }
}

/// Trait for audit log backends.
#[async_trait::async_trait]
pub trait AuditLogger: Send + Sync {
    /// Write an audit entry.
    async fn log(&self, entry: &AuditEntry);
}

/// Writes audit entries as newline-delimited JSON to an `AsyncWrite` sink.
pub struct JsonLinesAuditLogger<W: AsyncWrite + Unpin + Send> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesAuditLogger<W> {
    /// Create a new JSON lines audit logger writing to the given sink.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> AuditLogger for JsonLinesAuditLogger<W> {
    async fn log(&self, entry: &AuditEntry) {
        let mut line = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize audit entry");
                return;
            }
        };
        line.push('\n');

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            tracing::warn!(error = %e, "failed to write audit entry");
        }
        let _ = writer.flush().await;
    }
}

/// Compute the SHA-256 hash of a string, returned as a hex string.
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    let result = hasher.finalize();
    hex_encode(&result)
}

/// Encode bytes as a hex string.
fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Create a code preview (first N bytes, with ellipsis if truncated).
///
/// Truncates at a valid UTF-8 char boundary to avoid panics on multibyte characters.
pub fn code_preview(code: &str) -> String {
    if code.len() <= CODE_PREVIEW_MAX {
        code.to_string()
    } else {
        let mut end = CODE_PREVIEW_MAX;
        while !code.is_char_boundary(end) {
            end -= 1;
        }
        let mut preview = code[..end].to_string();
        preview.push_str("...");
        preview
    }
}

/// Builder for constructing audit entries during execution.
pub struct AuditEntryBuilder {
    execution_id: String,
    timestamp: DateTime<Utc>,
    code_hash: String,
    code_preview: String,
    binding_count: usize,
    console_calls: u32,
    start: Instant,
}

impl AuditEntryBuilder {
    /// Start building an audit entry for an execution.
    pub fn new(code: &str, binding_count: usize) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            code_hash: sha256_hex(code),
            code_preview: crate::redact::redact_error_message(&code_preview(code)),
            binding_count,
            console_calls: 0,
            start: Instant::now(),
        }
    }

    /// Record how many console calls the script attempted.
    pub fn console_calls(&mut self, calls: u32) {
        self.console_calls = calls;
    }

    /// Finalize the audit entry with the execution result.
    pub fn finish(self, result: &Result<serde_json::Value, ExecutionError>) -> AuditEntry {
        let duration_ms = self.start.elapsed().as_millis() as u64;
        let (result_size_bytes, outcome) = match result {
            Ok(value) => {
                let size = serde_json::to_string(value).map(|s| s.len()).unwrap_or(0);
                (size, AuditOutcome::Success)
            }
            Err(ExecutionError::Timeout { .. }) => (0, AuditOutcome::Timeout),
            Err(e) => (
                0,
                AuditOutcome::Error {
                    kind: e.kind(),
                    message: crate::redact::redact_error_message(&e.to_string()),
                },
            ),
        };

        AuditEntry {
            execution_id: self.execution_id,
            timestamp: self.timestamp,
            code_hash: self.code_hash,
            code_preview: self.code_preview,
            binding_count: self.binding_count,
            console_calls: self.console_calls,
            duration_ms,
            result_size_bytes,
            outcome,
        }
    }
}

/// A no-op audit logger for when auditing is not needed.
pub struct NoopAuditLogger;

#[async_trait::async_trait]
impl AuditLogger for NoopAuditLogger {
    async fn log(&self, _entry: &AuditEntry) {}
}

/// An audit logger that emits structured events via the [`tracing`] framework.
///
/// Audit entries are logged at `INFO` level with `audit = true` for easy
/// filtering. Use `RUST_LOG=formscript=info` to capture all audit events.
pub struct TracingAuditLogger;

#[async_trait::async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, entry: &AuditEntry) {
        tracing::info!(
            audit = true,
            execution_id = %entry.execution_id,
            code_hash = %entry.code_hash,
            binding_count = entry.binding_count,
            console_calls = entry.console_calls,
            duration_ms = entry.duration_ms,
            result_size_bytes = entry.result_size_bytes,
            outcome = entry.outcome.label(),
            "audit"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(outcome: AuditOutcome) -> AuditEntry {
        AuditEntry {
            execution_id: "test-id".into(),
            timestamp: Utc::now(),
            code_hash: "abc123".into(),
            code_preview: "return 1;".into(),
            binding_count: 2,
            console_calls: 0,
            duration_ms: 42,
            result_size_bytes: 10,
            outcome,
        }
    }

    #[test]
    fn sha256_hex_produces_correct_hash() {
        // Known SHA-256 of "hello"
        let hash = sha256_hex("hello");
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn code_preview_short_code_unchanged() {
        let code = "return { sum: a + b };";
        assert_eq!(code_preview(code), code);
    }

    #[test]
    fn code_preview_long_code_truncated() {
        let code = "x".repeat(1000);
        let preview = code_preview(&code);
        assert_eq!(preview.len(), 503); // 500 + "..."
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn code_preview_multibyte_emoji_boundary() {
        // 499 ASCII bytes + U+1F600 (4 bytes) crosses the 500 boundary
        let mut code = "a".repeat(499);
        code.push('\u{1F600}');
        code.push_str(&"b".repeat(100));
        let preview = code_preview(&code);
        assert!(preview.ends_with("..."));
        assert!(preview.starts_with(&"a".repeat(499)));
    }

    #[test]
    fn code_preview_cjk_boundary() {
        // CJK chars are 3 bytes each: 600 bytes total
        let code: String = "\u{4E00}".repeat(200);
        let preview = code_preview(&code);
        assert!(preview.ends_with("..."));
        let _ = preview.chars().count();
    }

    #[test]
    fn code_preview_exact_500_ascii() {
        let code = "a".repeat(500);
        assert_eq!(code_preview(&code), code);
    }

    #[test]
    fn audit_entry_builder_success() {
        let code = "return 1;";
        let builder = AuditEntryBuilder::new(code, 3);
        let entry = builder.finish(&Ok(serde_json::json!(1)));

        assert!(!entry.execution_id.is_empty());
        assert_eq!(entry.code_preview, code);
        assert_eq!(entry.binding_count, 3);
        assert!(matches!(entry.outcome, AuditOutcome::Success));
        assert_eq!(entry.result_size_bytes, 1);
    }

    #[test]
    fn audit_entry_builder_error_records_kind() {
        let builder = AuditEntryBuilder::new("return missing;", 0);
        let err = ExecutionError::Runtime {
            name: "ReferenceError".into(),
            message: "missing is not defined".into(),
        };
        let entry = builder.finish(&Err(err));

        match &entry.outcome {
            AuditOutcome::Error { kind, message } => {
                assert_eq!(*kind, ErrorKind::Runtime);
                assert!(message.contains("missing is not defined"));
            }
            other => panic!("expected error outcome, got {other:?}"),
        }
        assert_eq!(entry.outcome.label(), "runtime");
    }

    #[test]
    fn audit_entry_builder_timeout() {
        let builder = AuditEntryBuilder::new("while(true) {}", 0);
        let entry = builder.finish(&Err(ExecutionError::Timeout { timeout_ms: 1000 }));
        assert!(matches!(entry.outcome, AuditOutcome::Timeout));
    }

    #[test]
    fn audit_entry_records_console_calls() {
        let mut builder = AuditEntryBuilder::new("console.log(1); return 1;", 0);
        builder.console_calls(4);
        let entry = builder.finish(&Ok(serde_json::json!(1)));
        assert_eq!(entry.console_calls, 4);
    }

    #[tokio::test]
    async fn json_lines_logger_writes_valid_json() {
        let logger = JsonLinesAuditLogger::new(Vec::<u8>::new());
        logger.log(&entry(AuditOutcome::Success)).await;

        let writer = logger.writer.lock().await;
        let output = String::from_utf8(writer.clone()).unwrap();
        assert!(output.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(parsed["execution_id"], "test-id");
        assert_eq!(parsed["duration_ms"], 42);
        assert_eq!(parsed["binding_count"], 2);
        assert_eq!(parsed["outcome"], "success");
        assert!(parsed.get("console_calls").is_none(), "zero count is omitted");
    }

    #[tokio::test]
    async fn json_lines_logger_serializes_error_outcome() {
        let logger = JsonLinesAuditLogger::new(Vec::<u8>::new());
        logger
            .log(&entry(AuditOutcome::Error {
                kind: ErrorKind::Violation,
                message: "sandbox violation: eval()".into(),
            }))
            .await;

        let writer = logger.writer.lock().await;
        let output = String::from_utf8(writer.clone()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(parsed["outcome"]["error"]["kind"], "violation");
    }

    #[tokio::test]
    async fn tracing_audit_logger_does_not_panic() {
        let logger = TracingAuditLogger;
        logger.log(&entry(AuditOutcome::Success)).await;
        logger.log(&entry(AuditOutcome::Timeout)).await;
    }

    #[test]
    fn audit_entry_never_contains_raw_code() {
        let secret_code = "const API_KEY = 'sk-secret-12345'; return API_KEY;";
        let entry = AuditEntryBuilder::new(secret_code, 0).finish(&Ok(serde_json::json!("ok")));

        let json = serde_json::to_string(&entry).expect("serialize");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert!(parsed.get("code").is_none());
        assert_eq!(entry.code_hash, sha256_hex(secret_code));
        assert_eq!(entry.code_hash.len(), 64);
        assert!(entry.code_hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn audit_preview_is_redacted() {
        let code = r#"const url = "https://internal.example.com/hook"; return url;"#;
        let entry = AuditEntryBuilder::new(code, 0).finish(&Ok(serde_json::json!(1)));
        assert!(!entry.code_preview.contains("internal.example.com"));
    }
}
