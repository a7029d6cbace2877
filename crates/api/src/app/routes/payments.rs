//! Provider entry paths: browser redirects, signed webhooks/IPN, and polling.
//!
//! Each path only extracts the transaction id, authenticates what needs
//! authenticating, and maps the provider vocabulary. The state change itself
//! always goes through the reconciler.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    body::Bytes,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;

use jobboard_infra::{ReconcileError, ReconcileReport};
use jobboard_payments::{
    OutcomeReport, PaymentProvider, ProviderEvent, ReportSource, ReportedOutcome, SslcommerzEvent, StripeEvent,
    TransactionId,
};

use crate::app::{dto, errors, services::AppServices};

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router {
    Router::new()
        .route("/stripe/success", get(stripe_success))
        .route("/stripe/cancel", get(stripe_cancel))
        .route("/stripe/webhook", post(stripe_webhook))
        .route("/sslcommerz/success", get(sslcommerz_success).post(sslcommerz_success))
        .route("/sslcommerz/fail", get(sslcommerz_fail).post(sslcommerz_fail))
        .route("/sslcommerz/cancel", get(sslcommerz_cancel).post(sslcommerz_cancel))
        .route("/sslcommerz/ipn", post(sslcommerz_ipn))
        .route("/:provider/:transaction_id/status", get(payment_status))
}

// -------------------------
// Browser redirects
// -------------------------

/// GET /payments/stripe/success?session_id=
///
/// The redirect is unauthenticated, so the outcome comes from a session lookup.
pub async fn stripe_success(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::StripeRedirectQuery>,
) -> Redirect {
    confirm_redirect(&services, PaymentProvider::Stripe, &query.session_id).await
}

pub async fn stripe_cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::StripeRedirectQuery>,
) -> Redirect {
    report_redirect(&services, PaymentProvider::Stripe, &query.session_id, ReportedOutcome::Cancelled).await
}

pub async fn sslcommerz_success(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SslcommerzRedirectQuery>,
) -> Redirect {
    confirm_redirect(&services, PaymentProvider::Sslcommerz, &query.tran_id).await
}

pub async fn sslcommerz_fail(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SslcommerzRedirectQuery>,
) -> Redirect {
    report_redirect(&services, PaymentProvider::Sslcommerz, &query.tran_id, ReportedOutcome::Failed).await
}

pub async fn sslcommerz_cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SslcommerzRedirectQuery>,
) -> Redirect {
    report_redirect(&services, PaymentProvider::Sslcommerz, &query.tran_id, ReportedOutcome::Cancelled).await
}

async fn confirm_redirect(services: &AppServices, provider: PaymentProvider, raw_tx: &str) -> Redirect {
    let result = match TransactionId::new(raw_tx) {
        Ok(tx) => services.reconciler.confirm(provider, &tx, ReportSource::Redirect).await,
        Err(e) => Err(ReconcileError::Invalid(e)),
    };
    status_page(services, provider, result)
}

async fn report_redirect(
    services: &AppServices,
    provider: PaymentProvider,
    raw_tx: &str,
    outcome: ReportedOutcome,
) -> Redirect {
    let result = match TransactionId::new(raw_tx) {
        Ok(tx) => {
            services
                .reconciler
                .reconcile(OutcomeReport::new(provider, tx, outcome, ReportSource::Redirect))
                .await
        }
        Err(e) => Err(ReconcileError::Invalid(e)),
    };
    status_page(services, provider, result)
}

/// Browser paths always land on the status page with the best known state.
fn status_page(
    services: &AppServices,
    provider: PaymentProvider,
    result: Result<ReconcileReport, ReconcileError>,
) -> Redirect {
    let base = format!("{}/payment/status?provider={}", services.config.app_base_url, provider.slug());
    let target = match result {
        Ok(report) => format!(
            "{base}&status={}&job_id={}",
            dto::status_flag(report.payment_status),
            report.job_id
        ),
        Err(ReconcileError::NotFound { .. } | ReconcileError::Invalid(_)) => format!("{base}&status=not_found"),
        Err(e) => {
            tracing::warn!(error = %e, "redirect reconciliation failed");
            format!("{base}&status=error")
        }
    };
    Redirect::to(&target)
}

// -------------------------
// Server-to-server callbacks
// -------------------------

/// POST /payments/stripe/webhook
pub async fn stripe_webhook(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if let Err(e) = services.stripe_signatures.verify(&body, signature, Utc::now()) {
        tracing::warn!(error = %e, "rejected stripe webhook");
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_signature", e.to_string());
    }

    let event: StripeEvent = match serde_json::from_slice(&body) {
        Ok(ev) => ev,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_payload", e.to_string()),
    };
    let event_id = event.id.clone();

    match ProviderEvent::Stripe(event).into_report(ReportSource::Webhook) {
        Ok(Some(report)) => acknowledge(&services, report).await,
        Ok(None) => {
            tracing::debug!(event_id = %event_id, "ignored stripe event type");
            ack("ignored", None)
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// POST /payments/sslcommerz/ipn
pub async fn sslcommerz_ipn(
    Extension(services): Extension<Arc<AppServices>>,
    Form(fields): Form<BTreeMap<String, String>>,
) -> axum::response::Response {
    if let Err(e) = services.sslcommerz_signatures.verify(&fields) {
        tracing::warn!(error = %e, "rejected sslcommerz ipn");
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_signature", e.to_string());
    }

    match ProviderEvent::Sslcommerz(SslcommerzEvent::new(fields)).into_report(ReportSource::Webhook) {
        Ok(Some(report)) => acknowledge(&services, report).await,
        Ok(None) => ack("ignored", None),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// Reconcile a callback and answer the provider.
///
/// Only failures worth a provider retry (store, gateway) are non-2xx.
async fn acknowledge(services: &AppServices, report: OutcomeReport) -> axum::response::Response {
    match services.reconciler.reconcile(report).await {
        Ok(r) => ack(if r.applied { "applied" } else { "unchanged" }, Some(&r)),
        Err(ReconcileError::NotFound {
            provider,
            transaction_id,
        }) => {
            tracing::warn!(provider = %provider, transaction_id = %transaction_id, "callback for unknown transaction");
            ack("not_found", None)
        }
        Err(e @ (ReconcileError::Store(_) | ReconcileError::Gateway(_))) => errors::reconcile_error_to_response(e),
        Err(e) => {
            tracing::warn!(error = %e, "callback not applied");
            ack("rejected", None)
        }
    }
}

fn ack(result: &'static str, report: Option<&ReconcileReport>) -> axum::response::Response {
    let mut body = json!({ "received": true, "result": result });
    if let Some(r) = report {
        body["payment_status"] = json!(r.payment_status.as_str());
        body["job_status"] = json!(r.job_status.as_str());
    }
    (StatusCode::OK, Json(body)).into_response()
}

// -------------------------
// Polling
// -------------------------

/// GET /payments/:provider/:transaction_id/status
pub async fn payment_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path((provider, transaction_id)): Path<(String, String)>,
) -> axum::response::Response {
    let provider: PaymentProvider = match provider.parse() {
        Ok(p) => p,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let tx = match TransactionId::new(&transaction_id) {
        Ok(tx) => tx,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.reconciler.refresh(provider, &tx, Utc::now()).await {
        Ok(report) => (StatusCode::OK, Json(dto::report_to_json(&report))).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}
