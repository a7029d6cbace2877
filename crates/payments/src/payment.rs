use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use jobboard_core::{DomainError, DomainResult, JobId, Money, PaymentId};

/// Who collected (or waived) the money for a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProvider {
    Stripe,
    Sslcommerz,
    /// Admin submission or moderation; amount is zero.
    Admin,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "STRIPE",
            PaymentProvider::Sslcommerz => "SSLCOMMERZ",
            PaymentProvider::Admin => "ADMIN",
        }
    }

    /// Lower-case form used in URLs (`/payments/stripe/...`).
    pub fn slug(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Sslcommerz => "sslcommerz",
            PaymentProvider::Admin => "admin",
        }
    }
}

impl core::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PaymentProvider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(PaymentProvider::Stripe),
            "sslcommerz" => Ok(PaymentProvider::Sslcommerz),
            "admin" => Ok(PaymentProvider::Admin),
            other => Err(DomainError::validation(format!("unknown payment provider '{other}'"))),
        }
    }
}

/// Payment status. Everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown payment status '{other}'"))),
        }
    }
}

/// Provider-assigned opaque id of one checkout attempt.
///
/// Unique per provider, not globally: lookups always pair it with a
/// [`PaymentProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub const MAX_LEN: usize = 255;

    pub fn new(raw: impl AsRef<str>) -> DomainResult<Self> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err(DomainError::validation("transaction id must not be empty"));
        }
        if raw.len() > Self::MAX_LEN {
            return Err(DomainError::validation("transaction id is too long"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One payment attempt for a job. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub job_id: JobId,
    pub provider: PaymentProvider,
    pub transaction_id: TransactionId,
    pub status: PaymentStatus,
    pub amount: Money,
    /// Opaque provider payload of the event that settled this payment.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A new live (`Pending`) attempt.
    pub fn open(
        job_id: JobId,
        provider: PaymentProvider,
        transaction_id: TransactionId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            job_id,
            provider,
            transaction_id,
            status: PaymentStatus::Pending,
            amount,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    /// Pending for longer than `ttl`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.is_live() && now - self.created_at > ttl
    }
}
