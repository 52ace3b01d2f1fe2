//! Route groups merged by [`build_app_router`](crate::router::build_app_router).

pub mod forms;
pub mod health;
pub mod metrics;
