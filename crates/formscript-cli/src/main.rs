#![warn(missing_docs)]

//! formscript: run untrusted form scripts on submission.
//!
//! ```text
//! formscript                                 serve the HTTP API
//! formscript run <script.js> [bindings.json] run one script and print its result
//! formscript --version
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use formscript_config::{FormscriptConfig, SandboxOverrides, ServerSection};
use formscript_sandbox::audit::{AuditLogger, JsonLinesAuditLogger, TracingAuditLogger};
use formscript_sandbox::bindings::{self, Bindings};
use formscript_sandbox::{ExecutionError, SandboxConfig, ScriptExecutor};
use formscript_server::{build_app_router, AppState, InMemoryRepository};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: formscript [run <script.js> [bindings.json]] [--version]";

/// Build SandboxConfig from config overrides.
fn build_sandbox_config(overrides: &SandboxOverrides) -> SandboxConfig {
    let mut config = SandboxConfig::default();
    if let Some(ms) = overrides.timeout_ms {
        config.timeout = Duration::from_millis(ms);
    }
    if let Some(heap) = overrides.max_heap_mb {
        config.max_heap_size = heap.saturating_mul(1024 * 1024);
    }
    if let Some(kb) = overrides.max_code_kb {
        config.max_code_size = kb.saturating_mul(1024);
    }
    if let Some(kb) = overrides.max_output_kb {
        config.max_output_size = kb.saturating_mul(1024);
    }
    config
}

/// Locate the config file.
///
/// Search order:
/// 1. `FORMSCRIPT_CONFIG` environment variable
/// 2. `./formscript.toml` in the current directory
/// 3. None (no config file found, not an error)
fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("FORMSCRIPT_CONFIG") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    let cwd = PathBuf::from("formscript.toml");
    if cwd.exists() {
        return Some(cwd);
    }

    None
}

/// Load the config and the directory that relative script paths resolve against.
fn load_config() -> Result<(FormscriptConfig, PathBuf)> {
    match find_config_file() {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            let config = FormscriptConfig::from_file_with_env(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            Ok((config, base_dir))
        }
        None => {
            tracing::info!("no config file found, using defaults");
            Ok((FormscriptConfig::default(), PathBuf::from(".")))
        }
    }
}

/// Audit to a JSON-lines file when configured, otherwise to tracing.
async fn build_audit_logger(server: &ServerSection) -> Result<Arc<dyn AuditLogger>> {
    match &server.audit_log {
        Some(path) => {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("failed to open audit log {}", path.display()))?;
            tracing::info!(path = %path.display(), "writing audit records to file");
            Ok(Arc::new(JsonLinesAuditLogger::new(file)))
        }
        None => Ok(Arc::new(TracingAuditLogger)),
    }
}

/// Preload the configured forms and their scripts.
async fn seed_repository(config: &FormscriptConfig, base_dir: &Path) -> Result<InMemoryRepository> {
    let repo = InMemoryRepository::new();
    for (id, seed) in &config.forms {
        let form_id: u32 = id
            .parse()
            .with_context(|| format!("form id '{id}' is not a number"))?;
        repo.insert_form(form_id, &seed.title).await;
        let script = seed
            .load_script(base_dir)
            .with_context(|| format!("failed to load script for form {id}"))?;
        if let Some(code) = script {
            repo.insert_script(form_id, code).await;
        }
    }
    tracing::info!(forms = config.forms.len(), "seeded forms");
    Ok(repo)
}

/// Read bindings from a JSON file, or start empty.
async fn read_bindings(path: Option<&Path>) -> Result<Bindings> {
    let Some(path) = path else {
        return Ok(Bindings::new());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read bindings from {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    bindings::from_value(value)
        .map_err(|kind| anyhow::anyhow!("bindings must be a JSON object, got {kind}"))
}

/// Run a script file once.
///
/// The outer `Result` covers host problems such as unreadable files; the
/// inner one is the script's own outcome.
async fn execute_file(
    executor: &ScriptExecutor,
    script: &Path,
    bindings_path: Option<&Path>,
) -> Result<Result<Value, ExecutionError>> {
    let code = tokio::fs::read_to_string(script)
        .await
        .with_context(|| format!("failed to read script {}", script.display()))?;
    let bindings = read_bindings(bindings_path).await?;
    Ok(executor.execute(&code, &bindings).await)
}

async fn serve(config: &FormscriptConfig, base_dir: &Path, executor: ScriptExecutor) -> Result<()> {
    let repository = Arc::new(seed_repository(config, base_dir).await?);
    let app = build_app_router(AppState::new(executor, repository));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "formscript listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal, stopping gracefully");
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Handle --version / -V before anything else
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("formscript {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (config, base_dir) = load_config()?;
    let audit_logger = build_audit_logger(&config.server).await?;
    let executor =
        ScriptExecutor::new(build_sandbox_config(&config.sandbox)).with_audit_logger(audit_logger);

    match args.first().map(String::as_str) {
        None => {
            serve(&config, &base_dir, executor).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some("run") => {
            let script = args.get(1).context(USAGE)?;
            let bindings_path = args.get(2).map(|p| Path::new(p.as_str()));
            match execute_file(&executor, Path::new(script), bindings_path).await? {
                Ok(value) => {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("{} error: {e}", e.kind());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Some(other) => anyhow::bail!("unknown command '{other}'\n{USAGE}"),
    }
}
