//! SSLCommerz hosted checkout (gwprocess v4) and transaction query API.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use jobboard_core::Money;
use jobboard_payments::{PaymentProvider, ReportedOutcome, SslcommerzEvent, TransactionId};

use super::{CheckoutGateway, CheckoutRequest, CheckoutSession, GatewayError, http_client};
use crate::config::SslcommerzConfig;

pub struct SslcommerzGateway {
    client: reqwest::Client,
    gateway_base: String,
    store_id: String,
    store_password: String,
    price: Money,
    callback_base: String,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    status: String,
    #[serde(rename = "GatewayPageURL", default)]
    gateway_page_url: Option<String>,
    #[serde(default)]
    failedreason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "APIConnect", default)]
    api_connect: Option<String>,
    #[serde(default)]
    element: Vec<QueryElement>,
}

#[derive(Debug, Deserialize)]
struct QueryElement {
    #[serde(default)]
    status: String,
}

impl SslcommerzGateway {
    pub fn new(config: &SslcommerzConfig, callback_base: &str) -> Result<Self, GatewayError> {
        let (store_id, store_password) = config
            .credentials()
            .ok_or(GatewayError::Unsupported(PaymentProvider::Sslcommerz))?;
        Ok(Self {
            client: http_client()?,
            gateway_base: config.gateway_base().to_string(),
            store_id: store_id.to_string(),
            store_password: store_password.to_string(),
            price: config.price.clone(),
            callback_base: callback_base.to_string(),
        })
    }

    pub(crate) fn new_transaction_id() -> String {
        format!("ssl-{}", Uuid::now_v7())
    }

    pub(crate) fn init_form(&self, tran_id: &str, request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        let callback = |path: &str| format!("{}/payments/sslcommerz/{path}?tran_id={tran_id}", self.callback_base);
        vec![
            ("store_id", self.store_id.clone()),
            ("store_passwd", self.store_password.clone()),
            ("total_amount", request.amount.major_units()),
            ("currency", request.amount.currency().to_string()),
            ("tran_id", tran_id.to_string()),
            ("success_url", callback("success")),
            ("fail_url", callback("fail")),
            ("cancel_url", callback("cancel")),
            ("ipn_url", format!("{}/payments/sslcommerz/ipn", self.callback_base)),
            ("product_name", format!("Job posting: {}", request.job_title)),
            ("product_category", "job-posting".to_string()),
            ("product_profile", "non-physical-goods".to_string()),
            ("shipping_method", "NO".to_string()),
            ("num_of_item", "1".to_string()),
            ("cus_name", request.customer_email.clone()),
            ("cus_email", request.customer_email.clone()),
            ("cus_add1", "N/A".to_string()),
            ("cus_city", "N/A".to_string()),
            ("cus_country", "Bangladesh".to_string()),
            ("cus_phone", "N/A".to_string()),
            ("value_a", request.job_id.to_string()),
        ]
    }
}

/// Best outcome across all attempts recorded for one `tran_id`.
fn outcome_of(elements: &[QueryElement]) -> ReportedOutcome {
    let outcomes: Vec<ReportedOutcome> = elements
        .iter()
        .map(|e| SslcommerzEvent::outcome_for_status(&e.status))
        .collect();
    if outcomes.contains(&ReportedOutcome::Success) {
        return ReportedOutcome::Success;
    }
    outcomes
        .into_iter()
        .find(|o| *o != ReportedOutcome::Unknown)
        .unwrap_or(ReportedOutcome::Unknown)
}

#[async_trait]
impl CheckoutGateway for SslcommerzGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Sslcommerz
    }

    fn price(&self) -> &Money {
        &self.price
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let tran_id = Self::new_transaction_id();
        let response = self
            .client
            .post(format!("{}/gwprocess/v4/api.php", self.gateway_base))
            .form(&self.init_form(&tran_id, request))
            .send()
            .await?
            .error_for_status()?
            .json::<InitResponse>()
            .await?;

        if !response.status.eq_ignore_ascii_case("SUCCESS") {
            return Err(GatewayError::Rejected(
                response
                    .failedreason
                    .unwrap_or_else(|| format!("status {}", response.status)),
            ));
        }
        let redirect_url = response
            .gateway_page_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("missing GatewayPageURL".to_string()))?;

        let transaction_id =
            TransactionId::new(&tran_id).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        tracing::info!(job_id = %request.job_id, transaction_id = %transaction_id, "sslcommerz session created");
        Ok(CheckoutSession {
            transaction_id,
            redirect_url,
        })
    }

    async fn lookup_status(&self, transaction_id: &TransactionId) -> Result<ReportedOutcome, GatewayError> {
        let response = self
            .client
            .get(format!(
                "{}/validator/api/merchantTransIDvalidationAPI.php",
                self.gateway_base
            ))
            .query(&[
                ("tran_id", transaction_id.as_str()),
                ("store_id", self.store_id.as_str()),
                ("store_passwd", self.store_password.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<QueryResponse>()
            .await?;

        if response.api_connect.as_deref() != Some("DONE") {
            return Err(GatewayError::Rejected(format!(
                "transaction query answered {:?}",
                response.api_connect
            )));
        }
        Ok(outcome_of(&response.element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobboard_core::JobId;

    fn element(status: &str) -> QueryElement {
        QueryElement {
            status: status.to_string(),
        }
    }

    #[test]
    fn any_valid_attempt_wins() {
        assert_eq!(outcome_of(&[element("FAILED"), element("VALID")]), ReportedOutcome::Success);
        assert_eq!(outcome_of(&[element("PENDING"), element("FAILED")]), ReportedOutcome::Failed);
        assert_eq!(outcome_of(&[]), ReportedOutcome::Unknown);
    }

    #[test]
    fn init_form_uses_major_units_and_tran_id_callbacks() {
        let gateway = SslcommerzGateway::new(
            &SslcommerzConfig {
                store_id: Some("store".to_string()),
                store_password: Some("pw".to_string()),
                sandbox: true,
                price: Money::new(50_000, "BDT").unwrap(),
            },
            "https://api.example.com",
        )
        .unwrap();
        let tran_id = SslcommerzGateway::new_transaction_id();
        assert!(tran_id.starts_with("ssl-"));

        let form = gateway.init_form(
            &tran_id,
            &CheckoutRequest {
                job_id: JobId::new(),
                job_title: "Rust Engineer".to_string(),
                customer_email: "owner@example.com".to_string(),
                amount: Money::new(50_000, "BDT").unwrap(),
            },
        );
        let get = |k: &str| form.iter().find(|(key, _)| *key == k).map(|(_, v)| v.clone()).unwrap();
        assert_eq!(get("total_amount"), "500.00");
        assert_eq!(get("currency"), "BDT");
        assert_eq!(
            get("fail_url"),
            format!("https://api.example.com/payments/sslcommerz/fail?tran_id={tran_id}")
        );
        assert_eq!(get("ipn_url"), "https://api.example.com/payments/sslcommerz/ipn");
    }
}
