use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use jobboard_core::{JobId, NotificationId, PaymentId, UserId};
use jobboard_jobs::Job;
use jobboard_payments::{Payment, PaymentProvider, TransactionId};

use super::{JobBoardStore, JobFilter, SettleOutcome, Settlement, StoreError};
use crate::notify::Notification;

#[derive(Debug, Default)]
struct Tables {
    jobs: HashMap<JobId, Job>,
    payments: HashMap<PaymentId, Payment>,
    by_transaction: HashMap<(PaymentProvider, TransactionId), PaymentId>,
    notifications: Vec<Notification>,
}

impl Tables {
    fn live_payment(&self, job_id: JobId) -> Option<&Payment> {
        self.payments.values().find(|p| p.job_id == job_id && p.is_live())
    }

    fn check_new_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let key = (payment.provider, payment.transaction_id.clone());
        if self.by_transaction.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "transaction {} already recorded for {}",
                payment.transaction_id, payment.provider
            )));
        }
        if self.live_payment(payment.job_id).is_some() {
            return Err(StoreError::Conflict(format!(
                "job {} already has a pending payment",
                payment.job_id
            )));
        }
        Ok(())
    }

    fn insert_payment(&mut self, payment: Payment) {
        self.by_transaction
            .insert((payment.provider, payment.transaction_id.clone()), payment.id);
        self.payments.insert(payment.id, payment);
    }
}

/// In-memory store for tests/dev.
///
/// One lock covers every table, so a settlement is a single critical section.
#[derive(Debug, Default)]
pub struct InMemoryJobBoardStore {
    tables: RwLock<Tables>,
}

impl InMemoryJobBoardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

#[async_trait]
impl JobBoardStore for InMemoryJobBoardStore {
    async fn create_submission(&self, job: Job, payment: Payment) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        if tables.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job {} already exists", job.id)));
        }
        if payment.job_id != job.id {
            return Err(StoreError::Conflict("payment does not reference the submitted job".to_string()));
        }
        tables.check_new_payment(&payment)?;

        tables.jobs.insert(job.id, job);
        tables.insert_payment(payment);
        Ok(())
    }

    async fn create_payment(&self, payment: Payment) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let job = tables
            .jobs
            .get(&payment.job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", payment.job_id)))?;
        if !job.accepts_payment() {
            return Err(StoreError::Conflict(format!("job {} is {}", job.id, job.status)));
        }
        tables.check_new_payment(&payment)?;
        tables.insert_payment(payment);
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut jobs: Vec<Job> = tables.jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(filter.effective_limit());
        Ok(jobs)
    }

    async fn find_payment(
        &self,
        provider: PaymentProvider,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .by_transaction
            .get(&(provider, transaction_id.clone()))
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn live_payment_for_job(&self, job_id: JobId) -> Result<Option<Payment>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.live_payment(job_id).cloned())
    }

    async fn settle(&self, s: Settlement) -> Result<SettleOutcome, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let tables = &mut *tables;

        let payment = tables
            .payments
            .get(&s.payment_id)
            .ok_or_else(|| StoreError::NotFound(format!("payment {}", s.payment_id)))?;
        let job = tables
            .jobs
            .get(&s.job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", s.job_id)))?;
        if payment.job_id != job.id {
            return Err(StoreError::Conflict("payment does not belong to job".to_string()));
        }

        if !payment.is_live() {
            return Ok(SettleOutcome::AlreadySettled {
                payment: payment.clone(),
                job: job.clone(),
            });
        }

        // Stage both rows, then write both.
        let mut next_job = job.clone();
        if let Some(status) = s.job_status {
            next_job
                .transition_to(status, s.settled_at)
                .map_err(|e| StoreError::Conflict(e.to_string()))?;
        }
        let mut next_payment = payment.clone();
        next_payment.status = s.payment_status;
        next_payment.metadata = s.metadata;
        next_payment.updated_at = s.settled_at;

        tables.payments.insert(next_payment.id, next_payment.clone());
        tables.jobs.insert(next_job.id, next_job.clone());

        Ok(SettleOutcome::Applied {
            payment: next_payment,
            job: next_job,
        })
    }

    async fn insert_notification(&self, notification: Notification) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.notifications.push(notification);
        Ok(())
    }

    async fn list_notifications(&self, user_id: UserId, limit: usize) -> Result<Vec<Notification>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut out: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn mark_notification_read(&self, user_id: UserId, id: NotificationId) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        match tables
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
