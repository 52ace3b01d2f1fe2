use std::sync::Arc;

use formscript_sandbox::{SandboxMetrics, ScriptExecutor};
use prometheus_client::registry::Registry;

use crate::repository::FormRepository;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Sandbox used for every script run.
    pub executor: Arc<ScriptExecutor>,
    /// Form storage.
    pub repository: Arc<dyn FormRepository>,
    /// Metrics registry exposed on `/metrics`.
    pub registry: Arc<Registry>,
}

impl AppState {
    /// Build state around an executor, registering sandbox metrics on a fresh registry.
    pub fn new(executor: ScriptExecutor, repository: Arc<dyn FormRepository>) -> Self {
        let mut registry = Registry::default();
        let metrics = Arc::new(SandboxMetrics::new(&mut registry));
        Self {
            executor: Arc::new(executor.with_metrics(metrics)),
            repository,
            registry: Arc::new(registry),
        }
    }
}
