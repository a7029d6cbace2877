use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use jobboard_core::JobId;
use jobboard_infra::store::JobFilter;

use crate::app::{dto, errors, services::AppServices};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_job).get(list_jobs))
        .route("/:id", get(get_job))
        .route("/:id/checkout", post(checkout))
}

/// POST /jobs - Submit a job and start its checkout
pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    principal: PrincipalContext,
    Json(body): Json<dto::SubmitJobRequest>,
) -> axum::response::Response {
    let (new_job, provider) = match body.into_new_job(&principal) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let provider = match dto::parse_checkout_provider(provider.as_deref()) {
        Ok(p) => p,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.submissions.submit(new_job, provider, Utc::now()).await {
        Ok(receipt) => (StatusCode::CREATED, Json(dto::receipt_to_json(&receipt))).into_response(),
        Err(e) => errors::submission_error_to_response(e),
    }
}

/// GET /jobs - Published jobs whose deadline has not passed
pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListJobsQuery>,
) -> axum::response::Response {
    let mut filter = JobFilter::publicly_visible(Utc::now());
    filter.limit = query.limit.unwrap_or(JobFilter::DEFAULT_LIMIT);

    match services.store.list_jobs(filter).await {
        Ok(jobs) => {
            let items = jobs.iter().map(dto::job_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /jobs/:id - Public if visible; otherwise only to the owner or an admin
pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: JobId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let job = match services.store.get_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "job not found"),
        Err(e) => return errors::store_error_to_response(e),
    };

    let privileged = principal
        .as_ref()
        .is_some_and(|p| p.is_admin() || p.user_id() == job.owner_id);
    if !job.is_publicly_visible(Utc::now()) && !privileged {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "job not found");
    }

    (StatusCode::OK, Json(dto::job_to_json(&job))).into_response()
}

/// POST /jobs/:id/checkout - New checkout after a cancelled attempt
pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    principal: PrincipalContext,
    Path(id): Path<String>,
    Json(body): Json<dto::CheckoutRequest>,
) -> axum::response::Response {
    let job_id: JobId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let provider = match dto::parse_checkout_provider(Some(&body.provider)) {
        Ok(p) => p,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .submissions
        .retry_checkout(job_id, principal.user_id(), provider, Utc::now())
        .await
    {
        Ok(receipt) => (StatusCode::CREATED, Json(dto::receipt_to_json(&receipt))).into_response(),
        Err(e) => errors::submission_error_to_response(e),
    }
}
