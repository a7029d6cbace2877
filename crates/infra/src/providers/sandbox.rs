//! Local stand-in for a provider when no credentials are configured.
//!
//! Checkout redirects straight to this service's own success route, and
//! lookups answer with a fixed outcome.

use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use jobboard_core::Money;
use jobboard_payments::{PaymentProvider, ReportedOutcome, TransactionId};

use super::{CheckoutGateway, CheckoutRequest, CheckoutSession, GatewayError};

pub struct SandboxGateway {
    provider: PaymentProvider,
    price: Money,
    callback_base: String,
    lookup: RwLock<ReportedOutcome>,
}

impl SandboxGateway {
    pub fn new(provider: PaymentProvider, price: Money, callback_base: &str) -> Self {
        Self {
            provider,
            price,
            callback_base: callback_base.to_string(),
            lookup: RwLock::new(ReportedOutcome::Success),
        }
    }

    /// Outcome every later lookup reports.
    pub fn set_lookup_outcome(&self, outcome: ReportedOutcome) {
        if let Ok(mut slot) = self.lookup.write() {
            *slot = outcome;
        }
    }

    fn transaction_id(&self) -> String {
        match self.provider {
            PaymentProvider::Stripe => format!("cs_sandbox_{}", Uuid::now_v7().simple()),
            PaymentProvider::Sslcommerz => format!("ssl-{}", Uuid::now_v7()),
            PaymentProvider::Admin => format!("admin-{}", Uuid::now_v7()),
        }
    }

    fn success_url(&self, tx: &str) -> String {
        match self.provider {
            PaymentProvider::Stripe => {
                format!("{}/payments/stripe/success?session_id={tx}", self.callback_base)
            }
            _ => format!(
                "{}/payments/{}/success?tran_id={tx}",
                self.callback_base,
                self.provider.slug()
            ),
        }
    }
}

#[async_trait]
impl CheckoutGateway for SandboxGateway {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    fn price(&self) -> &Money {
        &self.price
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let tx = self.transaction_id();
        let transaction_id = TransactionId::new(&tx).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        tracing::debug!(job_id = %request.job_id, transaction_id = %transaction_id, provider = %self.provider, "sandbox checkout");
        Ok(CheckoutSession {
            redirect_url: self.success_url(&tx),
            transaction_id,
        })
    }

    async fn lookup_status(&self, _transaction_id: &TransactionId) -> Result<ReportedOutcome, GatewayError> {
        self.lookup
            .read()
            .map(|o| *o)
            .map_err(|_| GatewayError::Transport("sandbox lock poisoned".to_string()))
    }
}
