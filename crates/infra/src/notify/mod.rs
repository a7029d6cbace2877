//! Best-effort owner notifications: a stored row, an email, and a realtime push.
//!
//! Nothing here can fail the caller. Every step logs at `warn` on error and
//! the next step still runs.

pub mod mailer;
pub mod relay;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use jobboard_core::{DomainError, JobId, NotificationId, UserId};
use jobboard_jobs::{Job, JobStatus};

use crate::store::JobBoardStore;

pub use mailer::{LogMailer, Mailer, OutgoingEmail, SmtpMailer};
pub use relay::{HttpRealtimeRelay, NoopRelay, RealtimeRelay};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("mail error: {0}")]
    Mail(String),

    #[error("relay error: {0}")]
    Relay(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    JobPublished,
    JobRejected,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::JobPublished => "job_published",
            NotificationKind::JobRejected => "job_rejected",
        }
    }

    /// Kind for a job that just reached `status`; `None` for `Pending`.
    pub fn for_job_status(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Published => Some(NotificationKind::JobPublished),
            JobStatus::Rejected => Some(NotificationKind::JobRejected),
            JobStatus::Pending => None,
        }
    }
}

impl core::str::FromStr for NotificationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job_published" => Ok(NotificationKind::JobPublished),
            "job_rejected" => Ok(NotificationKind::JobRejected),
            other => Err(DomainError::validation(format!("unknown notification kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub job_id: JobId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        job_id: JobId,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            job_id,
            kind,
            title: title.into(),
            body: body.into(),
            read: false,
            created_at: now,
        }
    }

    /// Owner-facing notification for a job's final status.
    pub fn for_job(job: &Job, now: DateTime<Utc>) -> Option<Self> {
        let kind = NotificationKind::for_job_status(job.status)?;
        let (title, body) = match kind {
            NotificationKind::JobPublished => (
                "Your job is live".to_string(),
                format!(
                    "\"{}\" at {} is now published and visible until {}.",
                    job.title,
                    job.company,
                    job.deadline.format("%Y-%m-%d")
                ),
            ),
            NotificationKind::JobRejected => (
                "Your job was not published".to_string(),
                format!(
                    "\"{}\" at {} was rejected because its payment did not complete.",
                    job.title, job.company
                ),
            ),
        };
        Some(Self::new(job.owner_id, job.id, kind, title, body, now))
    }
}

/// Fans a job outcome out to the store, the mailer and the relay.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn JobBoardStore>,
    mailer: Arc<dyn Mailer>,
    relay: Arc<dyn RealtimeRelay>,
}

impl Notifier {
    pub fn new(store: Arc<dyn JobBoardStore>, mailer: Arc<dyn Mailer>, relay: Arc<dyn RealtimeRelay>) -> Self {
        Self { store, mailer, relay }
    }

    /// Notify the owner that `job` reached a final status. Never fails.
    pub async fn job_finalized(&self, job: &Job, now: DateTime<Utc>) {
        let Some(notification) = Notification::for_job(job, now) else {
            return;
        };

        let stored = match self.store.insert_notification(notification.clone()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "failed to store notification");
                false
            }
        };

        let email = OutgoingEmail {
            to: job.owner_email.clone(),
            subject: notification.title.clone(),
            body: notification.body.clone(),
        };
        if let Err(err) = self.mailer.send(&email).await {
            tracing::warn!(job_id = %job.id, error = %err, "failed to send job status email");
        }

        // The relay pushes a stored row; skip it if the row never landed.
        if stored {
            if let Err(err) = self.relay.publish(&notification).await {
                tracing::warn!(job_id = %job.id, error = %err, "realtime relay unreachable");
            }
        }
    }
}
