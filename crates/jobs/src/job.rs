use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobboard_core::{DomainError, DomainResult, JobId, UserId};

/// Maximum accepted title length (characters).
pub const MAX_TITLE_LEN: usize = 200;

/// Publish status of a job posting.
///
/// A job leaves `Pending` at most once per payment attempt; `Published` and
/// `Rejected` are final for that job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Published,
    Rejected,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Published => "PUBLISHED",
            JobStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PUBLISHED" => Ok(JobStatus::Published),
            "REJECTED" => Ok(JobStatus::Rejected),
            other => Err(DomainError::validation(format!("unknown job status '{other}'"))),
        }
    }
}

/// Submission input, validated into a [`Job`] by [`NewJob::into_job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub owner_id: UserId,
    pub owner_email: String,
    pub title: String,
    pub company: String,
    pub description: String,
    pub location: Option<String>,
    pub deadline: DateTime<Utc>,
}

impl NewJob {
    /// Validate and create a `Pending` job.
    pub fn into_job(self, now: DateTime<Utc>) -> DomainResult<Job> {
        let title = required("title", &self.title)?;
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(DomainError::validation(format!(
                "title must be at most {MAX_TITLE_LEN} characters"
            )));
        }
        let company = required("company", &self.company)?;
        let description = required("description", &self.description)?;
        let owner_email = required("owner_email", &self.owner_email)?;
        if !owner_email.contains('@') {
            return Err(DomainError::validation("owner_email must be an email address"));
        }
        if self.deadline <= now {
            return Err(DomainError::validation("deadline must be in the future"));
        }

        let location = self
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        Ok(Job {
            id: JobId::new(),
            owner_id: self.owner_id,
            owner_email,
            title,
            company,
            description,
            location,
            deadline: self.deadline,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }
}

fn required(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// A job posting.
///
/// Fields are public for persistence mapping; status changes go through
/// [`Job::transition_to`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner_id: UserId,
    pub owner_email: String,
    pub title: String,
    pub company: String,
    pub description: String,
    pub location: Option<String>,
    pub deadline: DateTime<Utc>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Visibility gate: listed publicly only when published and not past its deadline.
    pub fn is_publicly_visible(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Published && self.deadline > now
    }

    /// Move a pending job to a final status.
    ///
    /// Invariant: only `Pending` jobs change status, and only to a final one.
    pub fn transition_to(&mut self, next: JobStatus, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status.is_final() {
            return Err(DomainError::invariant(format!(
                "job {} is already {}",
                self.id, self.status
            )));
        }
        if !next.is_final() {
            return Err(DomainError::invariant("job can only move to PUBLISHED or REJECTED"));
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// Whether the job can receive a new payment attempt.
    pub fn accepts_payment(&self) -> bool {
        self.status == JobStatus::Pending
    }
}
