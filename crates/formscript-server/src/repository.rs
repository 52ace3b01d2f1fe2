//! Storage seam for forms, scripts and submissions.
//!
//! Handlers only see the [`FormRepository`] trait. [`InMemoryRepository`] is
//! the built-in backend, seeded from configuration at startup.

use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::{Form, NewSubmission, Script, Submission};

/// Errors raised by a repository backend.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The backend could not be reached or refused the operation.
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Form storage used by the HTTP handlers.
#[async_trait::async_trait]
pub trait FormRepository: Send + Sync {
    /// Look up a form by id.
    async fn get_form(&self, id: u32) -> Result<Option<Form>, RepositoryError>;

    /// Look up the script attached to a form.
    async fn get_script(&self, form_id: u32) -> Result<Option<Script>, RepositoryError>;

    /// Store a submission and return it with its assigned id.
    async fn create_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<Submission, RepositoryError>;
}

#[derive(Debug, Default)]
struct Inner {
    forms: BTreeMap<u32, Form>,
    scripts: BTreeMap<u32, Script>,
    submissions: Vec<Submission>,
}

/// Process-local repository backed by ordered maps.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    inner: Mutex<Inner>,
}

impl InMemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a form.
    pub async fn insert_form(&self, id: u32, title: impl Into<String>) -> Form {
        let form = Form {
            id,
            title: title.into(),
            created_at: Utc::now(),
        };
        self.inner.lock().await.forms.insert(id, form.clone());
        form
    }

    /// Attach a script to a form, replacing any previous one.
    pub async fn insert_script(&self, form_id: u32, code: impl Into<String>) {
        let script = Script {
            form_id,
            code: code.into(),
        };
        self.inner.lock().await.scripts.insert(form_id, script);
    }

    /// All stored submissions, oldest first.
    pub async fn submissions(&self) -> Vec<Submission> {
        self.inner.lock().await.submissions.clone()
    }
}

#[async_trait::async_trait]
impl FormRepository for InMemoryRepository {
    async fn get_form(&self, id: u32) -> Result<Option<Form>, RepositoryError> {
        Ok(self.inner.lock().await.forms.get(&id).cloned())
    }

    async fn get_script(&self, form_id: u32) -> Result<Option<Script>, RepositoryError> {
        Ok(self.inner.lock().await.scripts.get(&form_id).cloned())
    }

    async fn create_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<Submission, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let stored = Submission {
            id: inner.submissions.len() as u64 + 1,
            form_id: submission.form_id,
            form_data: submission.form_data,
            script_output: submission.script_output,
            submitted_at: Utc::now(),
        };
        inner.submissions.push(stored.clone());
        Ok(stored)
    }
}
