use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use prometheus_client::encoding::text::encode;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// GET /metrics -- Prometheus text exposition of the sandbox metrics.
async fn metrics(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let mut body = String::new();
    encode(&mut body, &state.registry)
        .map_err(|e| AppError::Internal(format!("metrics encoding failed: {e}")))?;
    Ok(([(CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body))
}

/// Mount the metrics route.
pub fn router() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}
