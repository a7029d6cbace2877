//! Persistence boundary for jobs, payments and notifications.
//!
//! Two implementations share one contract: [`InMemoryJobBoardStore`] for
//! tests/dev and [`PostgresJobBoardStore`] for production. Both apply a
//! settlement as a single check-and-set over the payment and its job.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use jobboard_core::{JobId, NotificationId, PaymentId, UserId};
use jobboard_jobs::{Job, JobStatus};
use jobboard_payments::{Payment, PaymentProvider, PaymentStatus, TransactionId};

use crate::notify::Notification;

pub use in_memory::InMemoryJobBoardStore;
pub use postgres::PostgresJobBoardStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness or state precondition failed (duplicate transaction id,
    /// second live payment, job no longer pending).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Filter for job listings. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub owner_id: Option<UserId>,
    /// Only jobs whose deadline is strictly after this instant.
    pub deadline_after: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl JobFilter {
    pub const DEFAULT_LIMIT: usize = 100;

    /// Jobs the public may see at `now`.
    pub fn publicly_visible(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Published),
            owner_id: None,
            deadline_after: Some(now),
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.owner_id.is_none_or(|o| job.owner_id == o)
            && self.deadline_after.is_none_or(|t| job.deadline > t)
    }

    pub(crate) fn effective_limit(&self) -> usize {
        if self.limit == 0 { Self::DEFAULT_LIMIT } else { self.limit }
    }
}

/// One terminal transition, applied only if the payment is still pending.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub payment_id: PaymentId,
    pub job_id: JobId,
    pub payment_status: PaymentStatus,
    /// `None` leaves the job untouched.
    pub job_status: Option<JobStatus>,
    pub metadata: serde_json::Value,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// This call moved the payment out of `Pending` (and the job, if asked).
    Applied { payment: Payment, job: Job },
    /// Another caller got there first; rows are returned as found.
    AlreadySettled { payment: Payment, job: Job },
}

#[async_trait]
pub trait JobBoardStore: Send + Sync {
    /// Persist a new pending job together with its first payment.
    async fn create_submission(&self, job: Job, payment: Payment) -> Result<(), StoreError>;

    /// Open another payment for an existing job.
    ///
    /// Fails with `Conflict` unless the job is still pending and has no live payment.
    async fn create_payment(&self, payment: Payment) -> Result<(), StoreError>;

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, StoreError>;

    async fn find_payment(
        &self,
        provider: PaymentProvider,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>, StoreError>;

    async fn live_payment_for_job(&self, job_id: JobId) -> Result<Option<Payment>, StoreError>;

    /// Atomically apply a settlement: payment and job change together or not at all.
    async fn settle(&self, settlement: Settlement) -> Result<SettleOutcome, StoreError>;

    async fn insert_notification(&self, notification: Notification) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_notifications(&self, user_id: UserId, limit: usize) -> Result<Vec<Notification>, StoreError>;

    /// Returns `false` when no such notification belongs to `user_id`.
    async fn mark_notification_read(&self, user_id: UserId, id: NotificationId) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S> JobBoardStore for Arc<S>
where
    S: JobBoardStore + ?Sized,
{
    async fn create_submission(&self, job: Job, payment: Payment) -> Result<(), StoreError> {
        (**self).create_submission(job, payment).await
    }

    async fn create_payment(&self, payment: Payment) -> Result<(), StoreError> {
        (**self).create_payment(payment).await
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        (**self).get_job(id).await
    }

    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, StoreError> {
        (**self).list_jobs(filter).await
    }

    async fn find_payment(
        &self,
        provider: PaymentProvider,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>, StoreError> {
        (**self).find_payment(provider, transaction_id).await
    }

    async fn live_payment_for_job(&self, job_id: JobId) -> Result<Option<Payment>, StoreError> {
        (**self).live_payment_for_job(job_id).await
    }

    async fn settle(&self, settlement: Settlement) -> Result<SettleOutcome, StoreError> {
        (**self).settle(settlement).await
    }

    async fn insert_notification(&self, notification: Notification) -> Result<(), StoreError> {
        (**self).insert_notification(notification).await
    }

    async fn list_notifications(&self, user_id: UserId, limit: usize) -> Result<Vec<Notification>, StoreError> {
        (**self).list_notifications(user_id, limit).await
    }

    async fn mark_notification_read(&self, user_id: UserId, id: NotificationId) -> Result<bool, StoreError> {
        (**self).mark_notification_read(user_id, id).await
    }
}
