//! Form script endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use formscript_sandbox::bindings::{self, Bindings};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::{NewSubmission, Submission};
use crate::state::AppState;

/// Body of `POST /api/forms/test/execute`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestExecuteRequest {
    /// Script source.
    #[serde(default)]
    pub code: Option<String>,
    /// Bindings for the script; defaults to `{}`.
    #[serde(default)]
    pub form_data: Option<Value>,
}

/// Body returned by a successful submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// The stored submission.
    pub submission: Submission,
    /// Value returned by the form script.
    pub script_output: Value,
}

fn form_data_bindings(form_data: Value) -> AppResult<Bindings> {
    bindings::from_value(form_data)
        .map_err(|kind| AppError::BadRequest(format!("Form data must be an object, got {kind}")))
}

/// POST /api/forms/test/execute -- run a script without saving it.
async fn test_execute(
    State(state): State<AppState>,
    payload: Result<Json<TestExecuteRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let code = match request.code {
        Some(code) if !code.is_empty() => code,
        _ => return Err(AppError::BadRequest("No code provided".into())),
    };
    let bindings = match request.form_data {
        None | Some(Value::Null) => Bindings::new(),
        Some(form_data) => form_data_bindings(form_data)?,
    };

    match state.executor.execute(&code, &bindings).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            tracing::info!(kind = %e.kind(), "test execute: script failed");
            Err(e.into())
        }
    }
}

/// POST /api/forms/{id}/submit -- run the form's script and store the submission.
async fn submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let form_id: u32 = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid form ID".into()))?;

    tracing::info!(form_id, "submit: starting");

    if state.repository.get_form(form_id).await?.is_none() {
        return Err(AppError::NotFound("Form not found".into()));
    }
    let script = state
        .repository
        .get_script(form_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Script not found for this form".into()))?;

    let Json(form_data) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let bindings = form_data_bindings(form_data.clone())?;

    let script_output = match state.executor.execute(&script.code, &bindings).await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(form_id, kind = %e.kind(), "submit: script failed");
            return Err(e.into());
        }
    };

    let submission = state
        .repository
        .create_submission(NewSubmission {
            form_id,
            form_data,
            script_output: script_output.clone(),
        })
        .await?;

    tracing::info!(form_id, submission_id = submission.id, "submit: complete");

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            submission,
            script_output,
        }),
    ))
}

/// Mount the form script routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/forms/test/execute", post(test_execute))
        .route("/api/forms/{id}/submit", post(submit))
}
