//! Outbound payment provider clients.
//!
//! Each gateway initiates checkout and answers status lookups in the shared
//! [`ReportedOutcome`] vocabulary. Clients are built once from config and
//! injected; nothing here is global.

pub mod sandbox;
pub mod sslcommerz;
pub mod stripe;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use jobboard_core::{JobId, Money};
use jobboard_payments::{PaymentProvider, ReportedOutcome, TransactionId};

use crate::config::AppConfig;

pub use sandbox::SandboxGateway;
pub use sslcommerz::SslcommerzGateway;
pub use stripe::StripeGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider rejected request: {0}")]
    Rejected(String),

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("no gateway configured for {0}")]
    Unsupported(PaymentProvider),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub job_id: JobId,
    pub job_title: String,
    pub customer_email: String,
    pub amount: Money,
}

/// Where to send the browser, and the id callbacks will carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub transaction_id: TransactionId,
    pub redirect_url: String,
}

#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Price charged for one posting.
    fn price(&self) -> &Money;

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError>;

    /// Ask the provider for the current outcome of a transaction.
    async fn lookup_status(&self, transaction_id: &TransactionId) -> Result<ReportedOutcome, GatewayError>;
}

/// Gateway per provider.
#[derive(Clone, Default)]
pub struct Gateways {
    by_provider: HashMap<PaymentProvider, Arc<dyn CheckoutGateway>>,
}

impl Gateways {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: Arc<dyn CheckoutGateway>) -> Self {
        self.by_provider.insert(gateway.provider(), gateway);
        self
    }

    pub fn get(&self, provider: PaymentProvider) -> Result<Arc<dyn CheckoutGateway>, GatewayError> {
        self.by_provider
            .get(&provider)
            .cloned()
            .ok_or(GatewayError::Unsupported(provider))
    }

    /// Real clients where credentials exist, sandbox otherwise.
    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        let stripe: Arc<dyn CheckoutGateway> = match &config.stripe.secret_key {
            Some(_) => Arc::new(StripeGateway::new(&config.stripe, &config.api_base_url)?),
            None => {
                tracing::warn!("STRIPE_SECRET_KEY not set; stripe checkout runs in sandbox mode");
                Arc::new(SandboxGateway::new(
                    PaymentProvider::Stripe,
                    config.stripe.price.clone(),
                    &config.api_base_url,
                ))
            }
        };

        let sslcommerz: Arc<dyn CheckoutGateway> = match config.sslcommerz.credentials() {
            Some(_) => Arc::new(SslcommerzGateway::new(&config.sslcommerz, &config.api_base_url)?),
            None => {
                tracing::warn!("SSLCommerz credentials not set; sslcommerz checkout runs in sandbox mode");
                Arc::new(SandboxGateway::new(
                    PaymentProvider::Sslcommerz,
                    config.sslcommerz.price.clone(),
                    &config.api_base_url,
                ))
            }
        };

        Ok(Self::new().with(stripe).with(sslcommerz))
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()
        .map_err(GatewayError::from)
}
