//! Error redaction for messages shown to form submitters.
//!
//! Strips sensitive details (URLs, IPs, file paths, credentials, stack traces)
//! from error messages before they leave the server, while preserving the
//! actionable part such as `ReferenceError: total is not defined`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExecutionError;

// --- Compiled regex patterns (initialized once) ---

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s'")\]}>]+"#).unwrap());

static IP_PORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}(:\d+)?").unwrap());

static UNIX_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(home|Users|etc|var|tmp|opt|usr|root|mnt|srv|proc|sys|dev|run|boot|snap|nix)(/[\w.\-]+)+").unwrap()
});

static WINDOWS_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]:\\[\w.\\\-]+").unwrap());

static CREDENTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(Bearer\s+\S+|api_key\s*=\s*\S+|token\s*=\s*\S+|password\s*=\s*\S+|secret\s*=\s*\S+)",
    )
    .unwrap()
});

/// AWS access key IDs.
static AWS_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:AKIA|ABIA|ACCA|ASIA)[0-9A-Z]{16}").unwrap());

/// JWT tokens (three base64url-encoded segments separated by dots).
static JWT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[a-zA-Z0-9_-]+\.eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+").unwrap()
});

/// Long hex strings that look like secret keys.
static HEX_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9a-fA-F]{64,}\b").unwrap());

/// V8 stack frames and the internal script names the executor uses.
static STACK_TRACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(at\s+.+|Caused by:.*|\.{3}\s*\d+\s*more)$").unwrap()
});

static SCRIPT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[formscript:\w+\](:\d+(:\d+)?)?").unwrap());

/// Redact sensitive patterns from an error message.
///
/// - URLs and connection strings become `[url]`
/// - IP:port addresses become `[addr]`
/// - Unix/Windows file paths become `[path]`
/// - Credentials (Bearer tokens, api_key=, JWTs, ...) become `[REDACTED]`
/// - Stack trace lines are removed entirely
pub fn redact_error_message(error: &str) -> String {
    let mut msg = error.to_string();

    // Order matters: strip credential patterns first, then URLs
    // (credentials may contain URLs).
    msg = JWT_RE.replace_all(&msg, "[REDACTED]").to_string();
    msg = AWS_KEY_RE.replace_all(&msg, "[REDACTED]").to_string();
    msg = CREDENTIAL_RE.replace_all(&msg, "[REDACTED]").to_string();
    msg = HEX_TOKEN_RE.replace_all(&msg, "[REDACTED]").to_string();
    msg = URL_RE.replace_all(&msg, "[url]").to_string();
    msg = IP_PORT_RE.replace_all(&msg, "[addr]").to_string();
    msg = WINDOWS_PATH_RE.replace_all(&msg, "[path]").to_string();
    msg = UNIX_PATH_RE.replace_all(&msg, "[path]").to_string();
    msg = STACK_TRACE_RE.replace_all(&msg, "").to_string();
    msg = SCRIPT_NAME_RE.replace_all(&msg, "script").to_string();

    // Clean up blank lines left by stack trace removal
    let lines: Vec<&str> = msg.lines().filter(|l| !l.trim().is_empty()).collect();
    lines.join("\n")
}

/// The reason shown to the person who submitted the form.
///
/// Host-side failures are replaced by a generic message; everything else is
/// the error's display text passed through [`redact_error_message`].
pub fn user_facing_reason(err: &ExecutionError) -> String {
    match err {
        ExecutionError::Internal(_) => "internal sandbox error".to_string(),
        other => redact_error_message(&other.to_string()),
    }
}
