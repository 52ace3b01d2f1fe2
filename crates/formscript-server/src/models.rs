//! Records stored by a [`FormRepository`](crate::repository::FormRepository).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A form that accepts submissions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    /// Numeric form identifier.
    pub id: u32,
    /// Display title.
    pub title: String,
    /// When the form was created.
    pub created_at: DateTime<Utc>,
}

/// The script attached to a form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    /// The form this script belongs to.
    pub form_id: u32,
    /// JavaScript source run on every submission.
    pub code: String,
}

/// Fields for a submission that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    /// The submitted form.
    pub form_id: u32,
    /// Raw submitted fields.
    pub form_data: Value,
    /// Value returned by the form script.
    pub script_output: Value,
}

/// A stored form submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Submission identifier, assigned by the repository.
    pub id: u64,
    /// The submitted form.
    pub form_id: u32,
    /// Raw submitted fields.
    pub form_data: Value,
    /// Value returned by the form script.
    pub script_output: Value,
    /// When the submission was stored.
    pub submitted_at: DateTime<Utc>,
}
