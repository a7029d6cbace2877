//! Job submission: the only place a PENDING job/payment pair is created.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use jobboard_core::{DomainError, JobId, Money, PaymentId, UserId};
use jobboard_jobs::{Job, NewJob};
use jobboard_payments::{Payment, PaymentProvider, TransactionId};

use crate::providers::{CheckoutRequest, GatewayError, Gateways};
use crate::store::{JobBoardStore, StoreError};

/// Currency recorded on zero-amount admin payments.
const ADMIN_CURRENCY: &str = "USD";

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub job_id: JobId,
    pub payment_id: PaymentId,
    pub transaction_id: TransactionId,
    /// Where to send the browser; `None` for admin submissions.
    pub redirect_url: Option<String>,
}

#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn JobBoardStore>,
    gateways: Gateways,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn JobBoardStore>, gateways: Gateways) -> Self {
        Self { store, gateways }
    }

    /// Validate, open a provider checkout, then persist the pending pair.
    ///
    /// Nothing is stored when the provider call fails.
    #[instrument(skip_all, fields(provider = %provider, owner_id = %new_job.owner_id), err)]
    pub async fn submit(
        &self,
        new_job: NewJob,
        provider: PaymentProvider,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        if provider == PaymentProvider::Admin {
            return Err(DomainError::validation("provider must be stripe or sslcommerz").into());
        }
        let job = new_job.into_job(now)?;
        let (payment, redirect_url) = self.open_checkout(&job, provider, now).await?;

        let receipt = SubmissionReceipt {
            job_id: job.id,
            payment_id: payment.id,
            transaction_id: payment.transaction_id.clone(),
            redirect_url: Some(redirect_url),
        };
        self.store.create_submission(job, payment).await?;

        tracing::info!(job_id = %receipt.job_id, transaction_id = %receipt.transaction_id, "job submitted");
        Ok(receipt)
    }

    /// Submission by an admin: no checkout, a zero-amount ADMIN payment
    /// waits for moderation.
    #[instrument(skip_all, fields(owner_id = %new_job.owner_id), err)]
    pub async fn submit_as_admin(
        &self,
        new_job: NewJob,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let job = new_job.into_job(now)?;
        let transaction_id = TransactionId::new(format!("admin-{}", Uuid::now_v7()))?;
        let payment = Payment::open(
            job.id,
            PaymentProvider::Admin,
            transaction_id,
            Money::zero(ADMIN_CURRENCY)?,
            now,
        );

        let receipt = SubmissionReceipt {
            job_id: job.id,
            payment_id: payment.id,
            transaction_id: payment.transaction_id.clone(),
            redirect_url: None,
        };
        self.store.create_submission(job, payment).await?;

        tracing::info!(job_id = %receipt.job_id, "admin submission stored");
        Ok(receipt)
    }

    /// New checkout for a job whose previous attempt was cancelled.
    #[instrument(skip(self, now), err)]
    pub async fn retry_checkout(
        &self,
        job_id: JobId,
        owner_id: UserId,
        provider: PaymentProvider,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        if provider == PaymentProvider::Admin {
            return Err(DomainError::validation("provider must be stripe or sslcommerz").into());
        }
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(SubmissionError::NotFound(job_id))?;
        if job.owner_id != owner_id {
            return Err(SubmissionError::Forbidden("only the job owner can pay for it".to_string()));
        }
        if !job.accepts_payment() {
            return Err(SubmissionError::Conflict(format!("job is {}", job.status)));
        }
        if let Some(live) = self.store.live_payment_for_job(job_id).await? {
            return Err(SubmissionError::Conflict(format!(
                "payment {} is still pending",
                live.transaction_id
            )));
        }

        let (payment, redirect_url) = self.open_checkout(&job, provider, now).await?;
        let receipt = SubmissionReceipt {
            job_id,
            payment_id: payment.id,
            transaction_id: payment.transaction_id.clone(),
            redirect_url: Some(redirect_url),
        };
        self.store.create_payment(payment).await.map_err(|err| match err {
            StoreError::Conflict(msg) => SubmissionError::Conflict(msg),
            other => SubmissionError::Store(other),
        })?;

        tracing::info!(job_id = %job_id, transaction_id = %receipt.transaction_id, "checkout reopened");
        Ok(receipt)
    }

    async fn open_checkout(
        &self,
        job: &Job,
        provider: PaymentProvider,
        now: DateTime<Utc>,
    ) -> Result<(Payment, String), SubmissionError> {
        let gateway = self.gateways.get(provider)?;
        let amount = gateway.price().clone();
        let session = gateway
            .create_checkout(&CheckoutRequest {
                job_id: job.id,
                job_title: job.title.clone(),
                customer_email: job.owner_email.clone(),
                amount: amount.clone(),
            })
            .await?;
        let payment = Payment::open(job.id, provider, session.transaction_id, amount, now);
        Ok((payment, session.redirect_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::Duration;
    use jobboard_jobs::JobStatus;
    use jobboard_payments::{PaymentStatus, ReportedOutcome};

    use crate::providers::{CheckoutGateway, CheckoutSession, SandboxGateway};
    use crate::store::{InMemoryJobBoardStore, JobFilter, Settlement};

    struct DownGateway {
        price: Money,
    }

    #[async_trait]
    impl CheckoutGateway for DownGateway {
        fn provider(&self) -> PaymentProvider {
            PaymentProvider::Sslcommerz
        }

        fn price(&self) -> &Money {
            &self.price
        }

        async fn create_checkout(&self, _request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
            Err(GatewayError::Transport("connection refused".to_string()))
        }

        async fn lookup_status(&self, _tx: &TransactionId) -> Result<ReportedOutcome, GatewayError> {
            Err(GatewayError::Transport("connection refused".to_string()))
        }
    }

    fn service() -> (Arc<InMemoryJobBoardStore>, SubmissionService) {
        let store = Arc::new(InMemoryJobBoardStore::new());
        let gateways = Gateways::new()
            .with(Arc::new(SandboxGateway::new(
                PaymentProvider::Stripe,
                Money::new(1000, "USD").unwrap(),
                "http://api",
            )))
            .with(Arc::new(DownGateway {
                price: Money::new(50_000, "BDT").unwrap(),
            }));
        (store.clone(), SubmissionService::new(store, gateways))
    }

    fn new_job(owner_id: UserId) -> NewJob {
        NewJob {
            owner_id,
            owner_email: "owner@example.com".to_string(),
            title: "Rust Engineer".to_string(),
            company: "Acme".to_string(),
            description: "Build payment plumbing".to_string(),
            location: Some("Remote".to_string()),
            deadline: Utc::now() + Duration::days(14),
        }
    }

    #[tokio::test]
    async fn submit_persists_pending_pair_with_gateway_price() {
        let (store, service) = service();
        let receipt = service
            .submit(new_job(UserId::new()), PaymentProvider::Stripe, Utc::now())
            .await
            .unwrap();

        let job = store.get_job(receipt.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        let payment = store
            .find_payment(PaymentProvider::Stripe, &receipt.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount.amount_minor(), 1000);
        assert!(receipt.redirect_url.unwrap().contains("/payments/stripe/success"));
    }

    #[tokio::test]
    async fn gateway_failure_persists_nothing() {
        let (store, service) = service();
        let err = service
            .submit(new_job(UserId::new()), PaymentProvider::Sslcommerz, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Gateway(_)));
        assert!(store.list_jobs(JobFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_checkout() {
        let (_, service) = service();
        let mut job = new_job(UserId::new());
        job.title = "   ".to_string();
        let err = service
            .submit(job, PaymentProvider::Stripe, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Validation(_)));

        let err = service
            .submit(new_job(UserId::new()), PaymentProvider::Admin, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Validation(_)));
    }

    #[tokio::test]
    async fn admin_submission_has_zero_amount_admin_payment() {
        let (store, service) = service();
        let receipt = service
            .submit_as_admin(new_job(UserId::new()), Utc::now())
            .await
            .unwrap();
        assert!(receipt.redirect_url.is_none());
        assert!(receipt.transaction_id.as_str().starts_with("admin-"));

        let payment = store.live_payment_for_job(receipt.job_id).await.unwrap().unwrap();
        assert_eq!(payment.provider, PaymentProvider::Admin);
        assert!(payment.amount.is_zero());
    }

    #[tokio::test]
    async fn retry_requires_owner_and_no_live_payment() {
        let (store, service) = service();
        let owner = UserId::new();
        let receipt = service
            .submit(new_job(owner), PaymentProvider::Stripe, Utc::now())
            .await
            .unwrap();

        let err = service
            .retry_checkout(receipt.job_id, UserId::new(), PaymentProvider::Stripe, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Forbidden(_)));

        let err = service
            .retry_checkout(receipt.job_id, owner, PaymentProvider::Stripe, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Conflict(_)));

        store
            .settle(Settlement {
                payment_id: receipt.payment_id,
                job_id: receipt.job_id,
                payment_status: PaymentStatus::Cancelled,
                job_status: None,
                metadata: serde_json::Value::Null,
                settled_at: Utc::now(),
            })
            .await
            .unwrap();

        let retry = service
            .retry_checkout(receipt.job_id, owner, PaymentProvider::Stripe, Utc::now())
            .await
            .unwrap();
        assert_eq!(retry.job_id, receipt.job_id);
        assert_ne!(retry.transaction_id, receipt.transaction_id);

        let err = service
            .retry_checkout(JobId::new(), owner, PaymentProvider::Stripe, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::NotFound(_)));
    }
}
