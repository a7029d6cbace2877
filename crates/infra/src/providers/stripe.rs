//! Stripe Checkout Sessions client.

use async_trait::async_trait;
use serde::Deserialize;

use jobboard_core::Money;
use jobboard_payments::{PaymentProvider, ReportedOutcome, StripeCheckoutSession, TransactionId};

use super::{CheckoutGateway, CheckoutRequest, CheckoutSession, GatewayError, http_client};
use crate::config::StripeConfig;

pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    price: Money,
    callback_base: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: String,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig, callback_base: &str) -> Result<Self, GatewayError> {
        let secret_key = config
            .secret_key
            .clone()
            .ok_or(GatewayError::Unsupported(PaymentProvider::Stripe))?;
        Ok(Self {
            client: http_client()?,
            api_base: config.api_base.clone(),
            secret_key,
            price: config.price.clone(),
            callback_base: callback_base.to_string(),
        })
    }

    /// Form body for `POST /v1/checkout/sessions`.
    pub(crate) fn checkout_form(&self, request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("client_reference_id", request.job_id.to_string()),
            ("customer_email", request.customer_email.clone()),
            ("metadata[job_id]", request.job_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                request.amount.currency().to_ascii_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                request.amount.amount_minor().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                format!("Job posting: {}", request.job_title),
            ),
            (
                "success_url",
                format!(
                    "{}/payments/stripe/success?session_id={{CHECKOUT_SESSION_ID}}",
                    self.callback_base
                ),
            ),
            (
                "cancel_url",
                format!(
                    "{}/payments/stripe/cancel?session_id={{CHECKOUT_SESSION_ID}}",
                    self.callback_base
                ),
            ),
        ]
    }

    async fn read_session(response: reqwest::Response) -> Result<StripeCheckoutSession, GatewayError> {
        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<StripeErrorBody>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(GatewayError::Rejected(message));
        }
        Ok(response.json::<StripeCheckoutSession>().await?)
    }
}

#[async_trait]
impl CheckoutGateway for StripeGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    fn price(&self) -> &Money {
        &self.price
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&self.checkout_form(request))
            .send()
            .await?;
        let session = Self::read_session(response).await?;

        let redirect_url = session
            .url
            .clone()
            .ok_or_else(|| GatewayError::InvalidResponse("checkout session has no url".to_string()))?;
        let transaction_id =
            TransactionId::new(&session.id).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        tracing::info!(job_id = %request.job_id, transaction_id = %transaction_id, "stripe checkout session created");
        Ok(CheckoutSession {
            transaction_id,
            redirect_url,
        })
    }

    async fn lookup_status(&self, transaction_id: &TransactionId) -> Result<ReportedOutcome, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, transaction_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let session = Self::read_session(response).await?;
        Ok(session.lookup_outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobboard_core::JobId;

    #[test]
    fn checkout_form_carries_reference_and_callbacks() {
        let gateway = StripeGateway::new(
            &StripeConfig {
                secret_key: Some("sk_test".to_string()),
                webhook_secret: None,
                api_base: "https://api.stripe.com".to_string(),
                price: Money::new(1000, "USD").unwrap(),
            },
            "https://api.example.com",
        )
        .unwrap();
        let job_id = JobId::new();
        let form = gateway.checkout_form(&CheckoutRequest {
            job_id,
            job_title: "Rust Engineer".to_string(),
            customer_email: "owner@example.com".to_string(),
            amount: Money::new(1000, "USD").unwrap(),
        });
        let get = |k: &str| form.iter().find(|(key, _)| *key == k).map(|(_, v)| v.clone()).unwrap();

        assert_eq!(get("client_reference_id"), job_id.to_string());
        assert_eq!(get("line_items[0][price_data][currency]"), "usd");
        assert_eq!(get("line_items[0][price_data][unit_amount]"), "1000");
        assert_eq!(
            get("success_url"),
            "https://api.example.com/payments/stripe/success?session_id={CHECKOUT_SESSION_ID}"
        );
    }

    #[test]
    fn gateway_requires_secret_key() {
        let err = StripeGateway::new(
            &StripeConfig {
                secret_key: None,
                webhook_secret: None,
                api_base: "https://api.stripe.com".to_string(),
                price: Money::new(1000, "USD").unwrap(),
            },
            "http://localhost:8080",
        )
        .err()
        .unwrap();
        assert!(matches!(err, GatewayError::Unsupported(PaymentProvider::Stripe)));
    }
}
