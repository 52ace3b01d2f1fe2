//! Prometheus metrics for the formscript sandbox.
//!
//! Provides counters and a duration histogram for execution observability.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use serde_json::Value;

use crate::error::ExecutionError;

/// Label set for execution metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ExecutionLabels {
    /// `ok` or `error`.
    pub outcome: String,
}

/// Label set for error metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// One of `syntax`, `runtime`, `timeout`, `violation`.
    pub kind: String,
}

/// Prometheus metrics for the formscript sandbox.
pub struct SandboxMetrics {
    /// Total number of executions.
    pub executions_total: Family<ExecutionLabels, Counter>,
    /// Execution duration in seconds.
    pub execution_duration_seconds: Family<ExecutionLabels, Histogram>,
    /// Total number of errors by kind.
    pub errors_total: Family<ErrorLabels, Counter>,
}

impl SandboxMetrics {
    /// Create a new `SandboxMetrics` and register all metrics with the given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let executions_total = Family::default();
        registry.register(
            "formscript_executions_total",
            "Total script executions",
            executions_total.clone(),
        );

        let execution_duration_seconds =
            Family::<ExecutionLabels, Histogram>::new_with_constructor(|| {
                Histogram::new([0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5].into_iter())
            });
        registry.register(
            "formscript_execution_duration_seconds",
            "Script execution duration",
            execution_duration_seconds.clone(),
        );

        let errors_total = Family::default();
        registry.register(
            "formscript_errors_total",
            "Total script errors by kind",
            errors_total.clone(),
        );

        Self {
            executions_total,
            execution_duration_seconds,
            errors_total,
        }
    }

    /// Record one finished execution.
    pub fn record(&self, result: &Result<Value, ExecutionError>, duration_secs: f64) {
        let outcome = if result.is_ok() { "ok" } else { "error" };
        let labels = ExecutionLabels {
            outcome: outcome.to_string(),
        };
        self.executions_total.get_or_create(&labels).inc();
        self.execution_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);

        if let Err(e) = result {
            let labels = ErrorLabels {
                kind: e.kind().as_str().to_string(),
            };
            self.errors_total.get_or_create(&labels).inc();
        }
    }
}
