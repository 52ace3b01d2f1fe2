#![warn(missing_docs)]

//! # formscript-config
//!
//! Configuration loading for the formscript server.
//!
//! Supports TOML configuration files with environment variable expansion.
//!
//! ## Example
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//! audit_log = "${FORMSCRIPT_HOME}/audit.jsonl"
//!
//! [sandbox]
//! timeout_ms = 1000
//! max_heap_mb = 32
//!
//! [forms.1]
//! title = "Contact"
//! script = "return { email: email.toLowerCase() };"
//!
//! [forms.2]
//! title = "Order"
//! script_file = "scripts/order.js"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Errors from config parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level formscript configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormscriptConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Sandbox execution settings.
    #[serde(default)]
    pub sandbox: SandboxOverrides,

    /// Forms to seed the in-memory repository with, keyed by numeric id.
    #[serde(default)]
    pub forms: BTreeMap<String, FormSeed>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Where to append JSON-lines audit records. Audit goes to tracing when unset.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            audit_log: None,
        }
    }
}

/// Sandbox configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SandboxOverrides {
    /// Execution timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Maximum V8 heap size in megabytes.
    #[serde(default)]
    pub max_heap_mb: Option<usize>,

    /// Maximum script size in kilobytes.
    #[serde(default)]
    pub max_code_kb: Option<usize>,

    /// Maximum result size in kilobytes.
    #[serde(default)]
    pub max_output_kb: Option<usize>,
}

/// A form to preload, with its script given inline or as a file.
#[derive(Debug, Clone, Deserialize)]
pub struct FormSeed {
    /// Display title.
    pub title: String,

    /// Inline script source.
    #[serde(default)]
    pub script: Option<String>,

    /// Path to a script file, relative to the config file.
    #[serde(default)]
    pub script_file: Option<PathBuf>,
}

impl FormSeed {
    /// Resolve the script source, reading `script_file` relative to `base_dir`.
    ///
    /// Returns `None` for forms that carry no script.
    pub fn load_script(&self, base_dir: &Path) -> Result<Option<String>, ConfigError> {
        match (&self.script, &self.script_file) {
            (Some(script), _) => Ok(Some(script.clone())),
            (None, Some(file)) => {
                let path = if file.is_absolute() {
                    file.clone()
                } else {
                    base_dir.join(file)
                };
                Ok(Some(std::fs::read_to_string(path)?))
            }
            (None, None) => Ok(None),
        }
    }
}

impl FormscriptConfig {
    /// Parse a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: FormscriptConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string, expanding `${ENV_VAR}` references.
    pub fn from_toml_with_env(toml_str: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(toml_str);
        Self::from_toml(&expanded)
    }

    /// Load config from a file path, expanding environment variables.
    pub fn from_file_with_env(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_with_env(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("server.bind must not be empty".into()));
        }
        if self.sandbox.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "sandbox.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.sandbox.max_heap_mb == Some(0) {
            return Err(ConfigError::Invalid(
                "sandbox.max_heap_mb must be greater than zero".into(),
            ));
        }
        for (field, value, unit) in [
            ("max_heap_mb", self.sandbox.max_heap_mb, 1024 * 1024),
            ("max_code_kb", self.sandbox.max_code_kb, 1024),
            ("max_output_kb", self.sandbox.max_output_kb, 1024),
        ] {
            if value.is_some_and(|v| v.checked_mul(unit).is_none()) {
                return Err(ConfigError::Invalid(format!(
                    "sandbox.{field} is too large"
                )));
            }
        }
        for (id, form) in &self.forms {
            if !matches!(id.parse::<u32>(), Ok(n) if n > 0) {
                return Err(ConfigError::Invalid(format!(
                    "form '{}': id must be a positive integer",
                    id
                )));
            }
            if form.script.is_some() && form.script_file.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "form '{}': set either 'script' or 'script_file', not both",
                    id
                )));
            }
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string using environment variables.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(value) => result.push_str(&value),
                Err(_) => {
                    // Leave the placeholder if env var not found
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}
