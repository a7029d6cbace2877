use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use jobboard_auth::AuthzError;
use jobboard_core::DomainError;
use jobboard_infra::providers::GatewayError;
use jobboard_infra::{ReconcileError, StoreError, SubmissionError};

pub fn submission_error_to_response(err: SubmissionError) -> axum::response::Response {
    match err {
        SubmissionError::Validation(e) => domain_error_to_response(e),
        SubmissionError::NotFound(id) => json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found")),
        SubmissionError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        SubmissionError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        SubmissionError::Gateway(e) => gateway_error_to_response(e),
        SubmissionError::Store(e) => store_error_to_response(e),
    }
}

pub fn reconcile_error_to_response(err: ReconcileError) -> axum::response::Response {
    match err {
        e @ (ReconcileError::NotFound { .. } | ReconcileError::JobNotFound(_)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", e.to_string())
        }
        ReconcileError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ReconcileError::Invalid(e) => domain_error_to_response(e),
        ReconcileError::Store(e) => store_error_to_response(e),
        ReconcileError::Gateway(e) => gateway_error_to_response(e),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Storage(msg) => {
            tracing::error!(error = %msg, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage unavailable, retry later")
        }
    }
}

pub fn gateway_error_to_response(err: GatewayError) -> axum::response::Response {
    match err {
        GatewayError::Unsupported(provider) => json_error(
            StatusCode::BAD_REQUEST,
            "unsupported_provider",
            format!("{provider} is not available"),
        ),
        other => {
            tracing::warn!(error = %other, "payment provider call failed");
            json_error(StatusCode::BAD_GATEWAY, "gateway_error", other.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
    }
}

pub fn authz_error_to_response(err: AuthzError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
