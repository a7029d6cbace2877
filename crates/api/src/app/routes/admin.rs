//! Admin moderation: submissions without payment, approve/reject, listings.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;

use jobboard_core::JobId;
use jobboard_infra::store::JobFilter;

use crate::app::{dto, errors, services::AppServices};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/:id/approve", post(approve_job))
        .route("/jobs/:id/reject", post(reject_job))
}

/// POST /admin/jobs - Submit a job that skips checkout and awaits moderation
pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    principal: PrincipalContext,
    Json(body): Json<dto::SubmitJobRequest>,
) -> axum::response::Response {
    if let Err(e) = principal.require_admin() {
        return errors::authz_error_to_response(e);
    }
    let (new_job, _) = match body.into_new_job(&principal) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.submissions.submit_as_admin(new_job, Utc::now()).await {
        Ok(receipt) => (StatusCode::CREATED, Json(dto::receipt_to_json(&receipt))).into_response(),
        Err(e) => errors::submission_error_to_response(e),
    }
}

/// GET /admin/jobs?status=pending|published|rejected
pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    principal: PrincipalContext,
    Query(query): Query<dto::ListJobsQuery>,
) -> axum::response::Response {
    if let Err(e) = principal.require_admin() {
        return errors::authz_error_to_response(e);
    }
    let status = match dto::parse_job_status(query.status.as_deref()) {
        Ok(s) => s,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let filter = JobFilter {
        status,
        limit: query.limit.unwrap_or(JobFilter::DEFAULT_LIMIT),
        ..JobFilter::default()
    };
    match services.store.list_jobs(filter).await {
        Ok(jobs) => {
            let items = jobs.iter().map(dto::job_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn approve_job(
    Extension(services): Extension<Arc<AppServices>>,
    principal: PrincipalContext,
    Path(id): Path<String>,
    body: Option<Json<dto::ModerationRequest>>,
) -> axum::response::Response {
    moderate(services, principal, id, true, body.map(|Json(b)| b).unwrap_or_default()).await
}

pub async fn reject_job(
    Extension(services): Extension<Arc<AppServices>>,
    principal: PrincipalContext,
    Path(id): Path<String>,
    body: Option<Json<dto::ModerationRequest>>,
) -> axum::response::Response {
    moderate(services, principal, id, false, body.map(|Json(b)| b).unwrap_or_default()).await
}

async fn moderate(
    services: Arc<AppServices>,
    principal: PrincipalContext,
    id: String,
    approve: bool,
    body: dto::ModerationRequest,
) -> axum::response::Response {
    if let Err(e) = principal.require_admin() {
        return errors::authz_error_to_response(e);
    }
    let job_id: JobId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    tracing::info!(job_id = %job_id, approve, admin = %principal.user_id(), "moderation decision");
    match services.reconciler.moderate(job_id, approve, body.reason).await {
        Ok(report) => (StatusCode::OK, Json(dto::report_to_json(&report))).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}
