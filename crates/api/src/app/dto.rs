use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use jobboard_core::DomainError;
use jobboard_infra::notify::Notification;
use jobboard_infra::{ReconcileReport, SubmissionReceipt};
use jobboard_jobs::{Job, JobStatus, NewJob};
use jobboard_payments::{PaymentProvider, PaymentStatus};

use crate::context::PrincipalContext;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub title: String,
    pub company: String,
    pub description: String,
    pub location: Option<String>,
    pub deadline: String, // RFC3339
    /// `stripe` or `sslcommerz`; ignored for admin submissions.
    pub provider: Option<String>,
}

impl SubmitJobRequest {
    pub fn into_new_job(self, principal: &PrincipalContext) -> Result<(NewJob, Option<String>), DomainError> {
        let deadline = parse_rfc3339("deadline", &self.deadline)?;
        Ok((
            NewJob {
                owner_id: principal.user_id(),
                owner_email: principal.email().to_string(),
                title: self.title,
                company: self.company,
                description: self.description,
                location: self.location,
                deadline,
            },
            self.provider,
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub provider: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModerationRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StripeRedirectQuery {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SslcommerzRedirectQuery {
    pub tran_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListNotificationsQuery {
    pub limit: Option<usize>,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DomainError::validation(format!("{field} must be RFC3339: {e}")))
}

/// Checkout provider chosen by a user: `stripe` or `sslcommerz`.
pub fn parse_checkout_provider(value: Option<&str>) -> Result<PaymentProvider, DomainError> {
    let value = value.ok_or_else(|| DomainError::validation("provider is required"))?;
    match value.parse::<PaymentProvider>()? {
        PaymentProvider::Admin => Err(DomainError::validation("provider must be stripe or sslcommerz")),
        provider => Ok(provider),
    }
}

pub fn parse_job_status(value: Option<&str>) -> Result<Option<JobStatus>, DomainError> {
    value.map(str::parse::<JobStatus>).transpose()
}

// -------------------------
// Response mapping
// -------------------------

pub fn job_to_json(job: &Job) -> serde_json::Value {
    json!({
        "id": job.id.to_string(),
        "owner_id": job.owner_id.to_string(),
        "title": job.title,
        "company": job.company,
        "description": job.description,
        "location": job.location,
        "deadline": job.deadline.to_rfc3339(),
        "status": job.status.as_str(),
        "created_at": job.created_at.to_rfc3339(),
        "updated_at": job.updated_at.to_rfc3339(),
    })
}

pub fn receipt_to_json(receipt: &SubmissionReceipt) -> serde_json::Value {
    json!({
        "job_id": receipt.job_id.to_string(),
        "payment_id": receipt.payment_id.to_string(),
        "transaction_id": receipt.transaction_id.as_str(),
        "redirect_url": receipt.redirect_url,
    })
}

pub fn report_to_json(report: &ReconcileReport) -> serde_json::Value {
    json!({
        "payment_id": report.payment_id.to_string(),
        "job_id": report.job_id.to_string(),
        "provider": report.provider.as_str(),
        "transaction_id": report.transaction_id.as_str(),
        "payment_status": report.payment_status.as_str(),
        "job_status": report.job_status.as_str(),
        "applied": report.applied,
    })
}

pub fn notification_to_json(n: &Notification) -> serde_json::Value {
    json!({
        "id": n.id.to_string(),
        "job_id": n.job_id.to_string(),
        "kind": n.kind.as_str(),
        "title": n.title,
        "body": n.body,
        "read": n.read,
        "created_at": n.created_at.to_rfc3339(),
    })
}

/// Human-readable flag for the frontend status page.
pub fn status_flag(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "pending",
        PaymentStatus::Success => "success",
        PaymentStatus::Failed => "failed",
        PaymentStatus::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_provider_excludes_admin() {
        assert_eq!(parse_checkout_provider(Some("Stripe")), Ok(PaymentProvider::Stripe));
        assert_eq!(parse_checkout_provider(Some("sslcommerz")), Ok(PaymentProvider::Sslcommerz));
        assert!(parse_checkout_provider(Some("admin")).is_err());
        assert!(parse_checkout_provider(Some("paypal")).is_err());
        assert!(parse_checkout_provider(None).is_err());
    }

    #[test]
    fn deadline_must_be_rfc3339() {
        assert!(parse_rfc3339("deadline", "2030-01-01T00:00:00Z").is_ok());
        assert!(parse_rfc3339("deadline", "2030-01-01T00:00:00+06:00").is_ok());
        assert!(parse_rfc3339("deadline", "next tuesday").is_err());
    }

    #[test]
    fn job_status_filter_is_optional() {
        assert_eq!(parse_job_status(None), Ok(None));
        assert_eq!(parse_job_status(Some("pending")), Ok(Some(JobStatus::Pending)));
        assert!(parse_job_status(Some("archived")).is_err());
    }
}
