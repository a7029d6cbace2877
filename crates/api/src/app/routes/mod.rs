use axum::{Router, routing::get};

pub mod admin;
pub mod jobs;
pub mod notifications;
pub mod payments;
pub mod system;

/// Router for everything except `/health`.
///
/// Auth is resolved by middleware; handlers that need a caller extract
/// [`crate::context::PrincipalContext`].
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/jobs", jobs::router())
        .nest("/admin", admin::router())
        .nest("/notifications", notifications::router())
        .nest("/payments", payments::router())
}
