//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate `(provider, transaction_id)` or a second live payment for a job |
//! | Database (foreign key violation) | `23503` | `NotFound` | Payment or notification references a missing job |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | Other | N/A | `Storage` | Pool closed, network errors, etc. |
//!
//! ## Settlement
//!
//! `settle` runs in one transaction and never reads-then-writes the payment
//! status: the `UPDATE ... WHERE status = 'PENDING'` is the check-and-set, and
//! zero affected rows means another caller already settled it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use jobboard_core::{JobId, Money, NotificationId, PaymentId, UserId};
use jobboard_jobs::{Job, JobStatus};
use jobboard_payments::{Payment, PaymentProvider, PaymentStatus, TransactionId};

use super::{JobBoardStore, JobFilter, SettleOutcome, Settlement, StoreError};
use crate::notify::{Notification, NotificationKind};

const JOB_COLUMNS: &str = "id, owner_id, owner_email, title, company, description, location, deadline, status, created_at, updated_at";
const PAYMENT_COLUMNS: &str =
    "id, job_id, provider, transaction_id, status, amount_minor, currency, metadata, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresJobBoardStore {
    pool: Arc<PgPool>,
}

impl PostgresJobBoardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Storage(format!("migration failed: {e}")))?;

        Ok(Self::new(pool))
    }

    async fn insert_payment(tx: &mut Transaction<'_, Postgres>, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, job_id, provider, transaction_id, status,
                amount_minor, currency, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.job_id.as_uuid())
        .bind(payment.provider.as_str())
        .bind(payment.transaction_id.as_str())
        .bind(payment.status.as_str())
        .bind(payment.amount.amount_minor())
        .bind(payment.amount.currency())
        .bind(&payment.metadata)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "job {} already has a pending payment or transaction {} is taken",
                    payment.job_id, payment.transaction_id
                ))
            } else {
                map_sqlx_error("insert_payment", e)
            }
        })?;
        Ok(())
    }

    async fn fetch_job(tx: &mut Transaction<'_, Postgres>, id: JobId) -> Result<Job, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_job", e))?
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        job_from_row(&row)
    }
}

#[async_trait]
impl JobBoardStore for PostgresJobBoardStore {
    #[instrument(skip(self, job, payment), fields(job_id = %job.id, transaction_id = %payment.transaction_id), err)]
    async fn create_submission(&self, job: Job, payment: Payment) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, owner_id, owner_email, title, company, description,
                location, deadline, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.owner_id.as_uuid())
        .bind(&job.owner_email)
        .bind(&job.title)
        .bind(&job.company)
        .bind(&job.description)
        .bind(&job.location)
        .bind(job.deadline)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_job", e))?;

        Self::insert_payment(&mut tx, &payment).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self, payment), fields(job_id = %payment.job_id, transaction_id = %payment.transaction_id), err)]
    async fn create_payment(&self, payment: Payment) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Row lock keeps the job from settling underneath us.
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(payment.job_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_job", e))?;

        let status = match status {
            Some(raw) => parse_job_status(&raw)?,
            None => {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::NotFound(format!("job {}", payment.job_id)));
            }
        };
        if status != JobStatus::Pending {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!("job {} is {}", payment.job_id, status)));
        }

        Self::insert_payment(&mut tx, &payment).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?;
        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), fields(row_count = tracing::field::Empty), err)]
    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR owner_id = $2)
              AND ($3::timestamptz IS NULL OR deadline > $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.owner_id.map(|o| *o.as_uuid()))
        .bind(filter.deadline_after)
        .bind(filter.effective_limit() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_jobs", e))?;

        Span::current().record("row_count", rows.len());
        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), fields(provider = %provider, transaction_id = %transaction_id), err)]
    async fn find_payment(
        &self,
        provider: PaymentProvider,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider = $1 AND transaction_id = $2"
        ))
        .bind(provider.as_str())
        .bind(transaction_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_payment", e))?;
        row.as_ref().map(payment_from_row).transpose()
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn live_payment_for_job(&self, job_id: JobId) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE job_id = $1 AND status = 'PENDING'"
        ))
        .bind(job_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("live_payment_for_job", e))?;
        row.as_ref().map(payment_from_row).transpose()
    }

    #[instrument(
        skip(self, s),
        fields(
            payment_id = %s.payment_id,
            job_id = %s.job_id,
            payment_status = %s.payment_status,
            result = tracing::field::Empty
        ),
        err
    )]
    async fn settle(&self, s: Settlement) -> Result<SettleOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let updated = sqlx::query(&format!(
            r#"
            UPDATE payments
            SET status = $2, metadata = $3, updated_at = $4
            WHERE id = $1 AND job_id = $5 AND status = 'PENDING'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(s.payment_id.as_uuid())
        .bind(s.payment_status.as_str())
        .bind(&s.metadata)
        .bind(s.settled_at)
        .bind(s.job_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("settle_payment", e))?;

        let Some(row) = updated else {
            // Lost the race (or the payment was never pending): report rows as found.
            let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
                .bind(s.payment_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("load_payment", e))?
                .ok_or_else(|| StoreError::NotFound(format!("payment {}", s.payment_id)))?;
            let payment = payment_from_row(&row)?;
            let job = Self::fetch_job(&mut tx, payment.job_id).await?;
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            Span::current().record("result", "already_settled");
            return Ok(SettleOutcome::AlreadySettled { payment, job });
        };
        let payment = payment_from_row(&row)?;

        let job = match s.job_status {
            Some(status) => {
                let row = sqlx::query(&format!(
                    r#"
                    UPDATE jobs
                    SET status = $2, updated_at = $3
                    WHERE id = $1 AND status = 'PENDING'
                    RETURNING {JOB_COLUMNS}
                    "#
                ))
                .bind(s.job_id.as_uuid())
                .bind(status.as_str())
                .bind(s.settled_at)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("settle_job", e))?;

                match row {
                    Some(row) => job_from_row(&row)?,
                    None => {
                        tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                        return Err(StoreError::Conflict(format!("job {} is no longer pending", s.job_id)));
                    }
                }
            }
            None => Self::fetch_job(&mut tx, s.job_id).await?,
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("result", "applied");
        Ok(SettleOutcome::Applied { payment, job })
    }

    #[instrument(skip(self, n), fields(notification_id = %n.id, user_id = %n.user_id), err)]
    async fn insert_notification(&self, n: Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, job_id, kind, title, body, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(n.id.as_uuid())
        .bind(n.user_id.as_uuid())
        .bind(n.job_id.as_uuid())
        .bind(n.kind.as_str())
        .bind(&n.title)
        .bind(&n.body)
        .bind(n.read)
        .bind(n.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_notification", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn list_notifications(&self, user_id: UserId, limit: usize) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, job_id, kind, title, body, read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_notifications", e))?;
        rows.iter().map(notification_from_row).collect()
    }

    #[instrument(skip(self), fields(user_id = %user_id, notification_id = %id), err)]
    async fn mark_notification_read(&self, user_id: UserId, id: NotificationId) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2")
            .bind(id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("mark_notification_read", e))?;
        Ok(result.rows_affected() == 1)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Storage(format!("connection pool closed in {operation}")),
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn corrupt(column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(format!("failed to decode column '{column}': {err}"))
}

fn parse_job_status(raw: &str) -> Result<JobStatus, StoreError> {
    raw.parse().map_err(|e| corrupt("status", e))
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::Storage(format!("failed to deserialize job row: {e}"));
    let status: String = row.try_get("status").map_err(get_err)?;
    Ok(Job {
        id: JobId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get_err)?),
        owner_id: UserId::from_uuid(row.try_get::<Uuid, _>("owner_id").map_err(get_err)?),
        owner_email: row.try_get("owner_email").map_err(get_err)?,
        title: row.try_get("title").map_err(get_err)?,
        company: row.try_get("company").map_err(get_err)?,
        description: row.try_get("description").map_err(get_err)?,
        location: row.try_get("location").map_err(get_err)?,
        deadline: row.try_get::<DateTime<Utc>, _>("deadline").map_err(get_err)?,
        status: parse_job_status(&status)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::Storage(format!("failed to deserialize payment row: {e}"));
    let provider: String = row.try_get("provider").map_err(get_err)?;
    let status: String = row.try_get("status").map_err(get_err)?;
    let transaction_id: String = row.try_get("transaction_id").map_err(get_err)?;
    let amount_minor: i64 = row.try_get("amount_minor").map_err(get_err)?;
    let currency: String = row.try_get("currency").map_err(get_err)?;

    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get_err)?),
        job_id: JobId::from_uuid(row.try_get::<Uuid, _>("job_id").map_err(get_err)?),
        provider: provider.parse::<PaymentProvider>().map_err(|e| corrupt("provider", e))?,
        transaction_id: TransactionId::new(transaction_id).map_err(|e| corrupt("transaction_id", e))?,
        status: status.parse::<PaymentStatus>().map_err(|e| corrupt("status", e))?,
        amount: Money::new(amount_minor, currency).map_err(|e| corrupt("amount_minor", e))?,
        metadata: row.try_get("metadata").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::Storage(format!("failed to deserialize notification row: {e}"));
    let kind: String = row.try_get("kind").map_err(get_err)?;
    Ok(Notification {
        id: NotificationId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get_err)?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id").map_err(get_err)?),
        job_id: JobId::from_uuid(row.try_get::<Uuid, _>("job_id").map_err(get_err)?),
        kind: kind.parse::<NotificationKind>().map_err(|e| corrupt("kind", e))?,
        title: row.try_get("title").map_err(get_err)?,
        body: row.try_get("body").map_err(get_err)?,
        read: row.try_get("read").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
    })
}
