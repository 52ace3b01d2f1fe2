#![warn(missing_docs)]

//! # formscript-server
//!
//! HTTP API for form scripts.
//!
//! - `POST /api/forms/test/execute` runs an ad-hoc script against `formData`
//! - `POST /api/forms/{id}/submit` runs the form's stored script against the
//!   submitted fields and records the submission
//! - `GET /health` and `GET /metrics` for operators
//!
//! Every script runs in a fresh [`formscript_sandbox::ScriptExecutor`]
//! isolate. Script failures always map to `400`, storage failures to `500`.

pub mod error;
pub mod models;
pub mod repository;
pub mod router;
pub mod routes;
pub mod state;

pub use error::{AppError, AppResult};
pub use repository::{FormRepository, InMemoryRepository, RepositoryError};
pub use router::build_app_router;
pub use state::AppState;
