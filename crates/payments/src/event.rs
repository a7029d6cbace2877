//! Provider payloads, parsed at the boundary into a tagged union and then
//! normalized into an [`OutcomeReport`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use jobboard_core::{DomainError, DomainResult};

use crate::outcome::ReportedOutcome;
use crate::payment::{PaymentProvider, TransactionId};

/// Which entry path delivered an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    Redirect,
    Webhook,
    Poll,
    Admin,
    Expiry,
}

impl ReportSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportSource::Redirect => "redirect",
            ReportSource::Webhook => "webhook",
            ReportSource::Poll => "poll",
            ReportSource::Admin => "admin",
            ReportSource::Expiry => "expiry",
        }
    }
}

/// Provider-neutral input to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeReport {
    pub provider: PaymentProvider,
    pub transaction_id: TransactionId,
    pub outcome: ReportedOutcome,
    pub source: ReportSource,
    /// Raw provider payload, stored on the payment for audit.
    pub payload: serde_json::Value,
}

impl OutcomeReport {
    pub fn new(
        provider: PaymentProvider,
        transaction_id: TransactionId,
        outcome: ReportedOutcome,
        source: ReportSource,
    ) -> Self {
        Self {
            provider,
            transaction_id,
            outcome,
            source,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", content = "event", rename_all = "lowercase")]
pub enum ProviderEvent {
    Stripe(StripeEvent),
    Sslcommerz(SslcommerzEvent),
    Admin(AdminDecision),
}

impl ProviderEvent {
    pub fn provider(&self) -> PaymentProvider {
        match self {
            ProviderEvent::Stripe(_) => PaymentProvider::Stripe,
            ProviderEvent::Sslcommerz(_) => PaymentProvider::Sslcommerz,
            ProviderEvent::Admin(_) => PaymentProvider::Admin,
        }
    }

    /// Normalize into an [`OutcomeReport`].
    ///
    /// `Ok(None)` means the event is valid but carries nothing to reconcile
    /// (for example a Stripe event type this service does not handle).
    pub fn into_report(self, source: ReportSource) -> DomainResult<Option<OutcomeReport>> {
        let provider = self.provider();
        let payload = serde_json::to_value(&self)
            .map_err(|e| DomainError::validation(format!("unserializable payload: {e}")))?;

        let (transaction_id, outcome) = match &self {
            ProviderEvent::Stripe(event) => {
                let Some(outcome) = event.outcome()? else {
                    return Ok(None);
                };
                (event.checkout_session()?.id, outcome)
            }
            ProviderEvent::Sslcommerz(event) => {
                let tran_id = event
                    .tran_id()
                    .ok_or_else(|| DomainError::validation("missing tran_id"))?;
                (tran_id.to_string(), event.outcome())
            }
            ProviderEvent::Admin(decision) => {
                (decision.transaction_id.clone(), decision.outcome())
            }
        };

        let report = OutcomeReport::new(provider, TransactionId::new(transaction_id)?, outcome, source)
            .with_payload(payload);
        Ok(Some(report))
    }
}

/// The subset of a Stripe webhook event this service reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub created: i64,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    pub fn checkout_session(&self) -> DomainResult<StripeCheckoutSession> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| DomainError::validation(format!("malformed checkout session: {e}")))
    }

    /// `None` for event types that are acknowledged and ignored.
    pub fn outcome(&self) -> DomainResult<Option<ReportedOutcome>> {
        let outcome = match self.kind.as_str() {
            "checkout.session.completed" => {
                if self.checkout_session()?.is_paid() {
                    ReportedOutcome::Success
                } else {
                    // Async payment methods complete the session before funds settle.
                    ReportedOutcome::Unknown
                }
            }
            "checkout.session.async_payment_succeeded" => ReportedOutcome::Success,
            "checkout.session.async_payment_failed" => ReportedOutcome::Failed,
            "checkout.session.expired" => ReportedOutcome::Expired,
            _ => return Ok(None),
        };
        Ok(Some(outcome))
    }
}

/// Stripe Checkout Session, as embedded in events and returned by lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl StripeCheckoutSession {
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }

    /// Outcome of a session lookup (success redirect or poll).
    pub fn lookup_outcome(&self) -> ReportedOutcome {
        if self.is_paid() {
            ReportedOutcome::Success
        } else if self.status.as_deref() == Some("expired") {
            ReportedOutcome::Expired
        } else {
            ReportedOutcome::Unknown
        }
    }
}

/// SSLCommerz IPN or validation payload: a flat string map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SslcommerzEvent {
    pub fields: BTreeMap<String, String>,
}

impl SslcommerzEvent {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn tran_id(&self) -> Option<&str> {
        self.get("tran_id")
    }

    pub fn status(&self) -> Option<&str> {
        self.get("status")
    }

    pub fn val_id(&self) -> Option<&str> {
        self.get("val_id")
    }

    pub fn outcome(&self) -> ReportedOutcome {
        self.status()
            .map(Self::outcome_for_status)
            .unwrap_or(ReportedOutcome::Unknown)
    }

    /// SSLCommerz status vocabulary (IPN and transaction-query API).
    pub fn outcome_for_status(status: &str) -> ReportedOutcome {
        match status.trim().to_ascii_uppercase().as_str() {
            "VALID" | "VALIDATED" => ReportedOutcome::Success,
            "FAILED" => ReportedOutcome::Failed,
            "CANCELLED" => ReportedOutcome::Cancelled,
            "EXPIRED" | "UNATTEMPTED" => ReportedOutcome::Expired,
            _ => ReportedOutcome::Unknown,
        }
    }
}

/// Admin approve/reject of a pending job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminDecision {
    pub transaction_id: String,
    pub approve: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AdminDecision {
    pub fn outcome(&self) -> ReportedOutcome {
        if self.approve {
            ReportedOutcome::Success
        } else {
            ReportedOutcome::Failed
        }
    }
}
