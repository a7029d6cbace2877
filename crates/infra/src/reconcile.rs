//! Applies provider outcomes to payments and jobs.
//!
//! Every entry path (redirect, webhook/IPN, poll, admin, lazy expiry) funnels
//! into [`Reconciler::reconcile`]. The first terminal outcome for a payment
//! wins; later ones are acknowledged and change nothing.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use jobboard_core::{DomainError, JobId, PaymentId};
use jobboard_jobs::{Job, JobStatus};
use jobboard_payments::{
    AdminDecision, Decision, OutcomeReport, Payment, PaymentProvider, PaymentStatus, ProviderEvent, ReportSource,
    ReportedOutcome, TransactionId, decide,
};

use crate::notify::Notifier;
use crate::providers::{GatewayError, Gateways};
use crate::store::{JobBoardStore, SettleOutcome, Settlement, StoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("payment not found: {provider} {transaction_id}")]
    NotFound {
        provider: PaymentProvider,
        transaction_id: TransactionId,
    },

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// State after reconciliation, whether or not this call changed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub payment_id: PaymentId,
    pub job_id: JobId,
    pub provider: PaymentProvider,
    pub transaction_id: TransactionId,
    pub payment_status: PaymentStatus,
    pub job_status: JobStatus,
    /// `true` only for the call that moved the payment out of `Pending`.
    pub applied: bool,
}

impl ReconcileReport {
    fn of(payment: &Payment, job: &Job, applied: bool) -> Self {
        Self {
            payment_id: payment.id,
            job_id: job.id,
            provider: payment.provider,
            transaction_id: payment.transaction_id.clone(),
            payment_status: payment.status,
            job_status: job.status,
            applied,
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn JobBoardStore>,
    notifier: Notifier,
    gateways: Gateways,
    pending_ttl: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn JobBoardStore>, notifier: Notifier, gateways: Gateways, pending_ttl: Duration) -> Self {
        Self {
            store,
            notifier,
            gateways,
            pending_ttl,
        }
    }

    async fn load(&self, provider: PaymentProvider, tx: &TransactionId) -> Result<(Payment, Job), ReconcileError> {
        let payment = self
            .store
            .find_payment(provider, tx)
            .await?
            .ok_or_else(|| ReconcileError::NotFound {
                provider,
                transaction_id: tx.clone(),
            })?;
        let job = self
            .store
            .get_job(payment.job_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("job {}", payment.job_id)))?;
        Ok((payment, job))
    }

    /// Apply one reported outcome, exactly once per payment.
    #[instrument(
        skip(self, report),
        fields(
            provider = %report.provider,
            transaction_id = %report.transaction_id,
            outcome = %report.outcome,
            source = report.source.as_str()
        ),
        err
    )]
    pub async fn reconcile(&self, report: OutcomeReport) -> Result<ReconcileReport, ReconcileError> {
        let (payment, job) = self.load(report.provider, &report.transaction_id).await?;

        let transition = match decide(payment.status, report.outcome) {
            Decision::Apply(t) => t,
            Decision::AlreadySettled(status) => {
                tracing::debug!(payment_id = %payment.id, status = %status, "stale callback ignored");
                return Ok(ReconcileReport::of(&payment, &job, false));
            }
            Decision::Undetermined => {
                tracing::debug!(payment_id = %payment.id, "undetermined outcome; payment stays pending");
                return Ok(ReconcileReport::of(&payment, &job, false));
            }
        };

        let now = Utc::now();
        let outcome = self
            .store
            .settle(Settlement {
                payment_id: payment.id,
                job_id: payment.job_id,
                payment_status: transition.payment_status,
                job_status: transition.job_status,
                metadata: audit_metadata(&report, now),
                settled_at: now,
            })
            .await?;

        match outcome {
            SettleOutcome::Applied { payment: settled, job } => {
                tracing::info!(
                    payment_id = %settled.id,
                    job_id = %job.id,
                    provider = %settled.provider,
                    from = %payment.status,
                    to = %settled.status,
                    job_status = %job.status,
                    "payment settled"
                );
                if transition.job_status.is_some() {
                    self.notifier.job_finalized(&job, now).await;
                }
                Ok(ReconcileReport::of(&settled, &job, true))
            }
            SettleOutcome::AlreadySettled { payment, job } => {
                tracing::debug!(payment_id = %payment.id, status = %payment.status, "lost settlement race");
                Ok(ReconcileReport::of(&payment, &job, false))
            }
        }
    }

    /// Ask the provider for a pending payment's outcome, then reconcile it.
    ///
    /// Browser success redirects go through here instead of trusting the
    /// redirect itself.
    #[instrument(skip_all, fields(provider = %provider, transaction_id = %tx), err)]
    pub async fn confirm(
        &self,
        provider: PaymentProvider,
        tx: &TransactionId,
        source: ReportSource,
    ) -> Result<ReconcileReport, ReconcileError> {
        let (payment, job) = self.load(provider, tx).await?;
        if !payment.is_live() {
            return Ok(ReconcileReport::of(&payment, &job, false));
        }

        let outcome = self.gateways.get(provider)?.lookup_status(tx).await?;
        self.reconcile(
            OutcomeReport::new(provider, tx.clone(), outcome, source)
                .with_payload(serde_json::json!({ "lookup": outcome.as_str() })),
        )
        .await
    }

    /// Polling path: [`Self::confirm`], then lazy expiry.
    ///
    /// A payment still undetermined after the pending TTL is settled as
    /// `Cancelled`, which frees the job for a new checkout.
    #[instrument(skip_all, fields(provider = %provider, transaction_id = %tx), err)]
    pub async fn refresh(
        &self,
        provider: PaymentProvider,
        tx: &TransactionId,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let (payment, job) = self.load(provider, tx).await?;
        if !payment.is_live() {
            return Ok(ReconcileReport::of(&payment, &job, false));
        }
        // Admin payments wait for a moderator, not a provider.
        if provider == PaymentProvider::Admin {
            return Ok(ReconcileReport::of(&payment, &job, false));
        }

        let report = match self.confirm(provider, tx, ReportSource::Poll).await {
            Ok(report) => report,
            Err(ReconcileError::Gateway(err)) if payment.is_stale(now, self.pending_ttl) => {
                tracing::warn!(error = %err, "provider lookup failed for stale payment; expiring");
                ReconcileReport::of(&payment, &job, false)
            }
            Err(err) => return Err(err),
        };

        if report.payment_status == PaymentStatus::Pending && payment.is_stale(now, self.pending_ttl) {
            tracing::info!(payment_id = %payment.id, age_minutes = (now - payment.created_at).num_minutes(), "expiring abandoned payment");
            return self
                .reconcile(
                    OutcomeReport::new(provider, tx.clone(), ReportedOutcome::Cancelled, ReportSource::Expiry)
                        .with_payload(serde_json::json!({ "expired_after_minutes": self.pending_ttl.num_minutes() })),
                )
                .await;
        }
        Ok(report)
    }

    /// Admin approve/reject of a job's live payment, whatever its provider.
    #[instrument(skip_all, fields(job_id = %job_id, approve), err)]
    pub async fn moderate(
        &self,
        job_id: JobId,
        approve: bool,
        reason: Option<String>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(ReconcileError::JobNotFound(job_id))?;
        let payment = self
            .store
            .live_payment_for_job(job_id)
            .await?
            .ok_or_else(|| ReconcileError::Conflict(format!("job {job_id} is {} with no pending payment", job.status)))?;

        let decision = AdminDecision {
            transaction_id: payment.transaction_id.to_string(),
            approve,
            reason,
        };
        let mut report = ProviderEvent::Admin(decision)
            .into_report(ReportSource::Admin)?
            .ok_or_else(|| ReconcileError::Conflict("admin decision carried no outcome".to_string()))?;
        report.provider = payment.provider;
        self.reconcile(report).await
    }
}

fn audit_metadata(report: &OutcomeReport, at: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "source": report.source.as_str(),
        "outcome": report.outcome.as_str(),
        "received_at": at,
        "payload": report.payload,
    })
}
