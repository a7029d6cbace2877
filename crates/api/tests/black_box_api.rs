use std::collections::{BTreeMap, HashMap};

use chrono::{Duration as ChronoDuration, Utc};
use jobboard_auth::{JwtClaims, Role};
use jobboard_core::UserId;
use jobboard_infra::AppConfig;
use jobboard_payments::{SslcommerzSignatureVerifier, StripeSignatureVerifier};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

const JWT_SECRET: &str = "test-secret";
const STRIPE_WEBHOOK_SECRET: &str = "whsec_test";
const SSLCOMMERZ_PASSWORD: &str = "ssl-pass";
const FRONTEND: &str = "http://frontend.test";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod (in-memory store, sandbox gateways), on an ephemeral port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let env: HashMap<&str, String> = HashMap::from([
            ("JWT_SECRET", JWT_SECRET.to_string()),
            ("APP_BASE_URL", FRONTEND.to_string()),
            ("API_BASE_URL", base_url.clone()),
            ("STRIPE_WEBHOOK_SECRET", STRIPE_WEBHOOK_SECRET.to_string()),
            ("SSLCOMMERZ_STORE_PASSWORD", SSLCOMMERZ_PASSWORD.to_string()),
        ]);
        let config = AppConfig::from_lookup(|key| env.get(key).cloned()).unwrap();
        let app = jobboard_api::app::build_app(config).await.unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            base_url,
            client,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn submit_job(&self, token: &str, provider: &str) -> serde_json::Value {
        let res = self
            .client
            .post(self.url("/jobs"))
            .bearer_auth(token)
            .json(&json!({
                "title": "Senior Rust Engineer",
                "company": "Acme",
                "description": "Payments and reconciliation",
                "location": "Remote",
                "deadline": (Utc::now() + ChronoDuration::days(30)).to_rfc3339(),
                "provider": provider,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        res.json().await.unwrap()
    }

    async fn get_json(&self, path: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(serde_json::Value::Null))
    }

    /// Follow one browser redirect and return the `Location` it sends.
    async fn redirect_location(&self, url: &str) -> String {
        let res = self.client.get(url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        res.headers()[reqwest::header::LOCATION].to_str().unwrap().to_string()
    }

    async fn stripe_webhook(&self, event: &serde_json::Value, sign: bool) -> reqwest::Response {
        let body = serde_json::to_vec(event).unwrap();
        let mut req = self
            .client
            .post(self.url("/payments/stripe/webhook"))
            .header("content-type", "application/json");
        if sign {
            let header = StripeSignatureVerifier::new(Some(STRIPE_WEBHOOK_SECRET.to_string()), 300)
                .sign(&body, Utc::now().timestamp())
                .unwrap();
            req = req.header("stripe-signature", header);
        }
        req.body(body).send().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct TestUser {
    id: UserId,
    token: String,
}

fn mint_jwt(roles: Vec<Role>) -> TestUser {
    let now = Utc::now();
    let id = UserId::new();
    let claims = JwtClaims {
        sub: id,
        email: format!("{id}@example.com"),
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt");
    TestUser { id, token }
}

fn checkout_completed(session_id: &str, payment_status: &str) -> serde_json::Value {
    json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "created": Utc::now().timestamp(),
        "data": { "object": {
            "id": session_id,
            "object": "checkout.session",
            "status": "complete",
            "payment_status": payment_status,
        }}
    })
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .post(srv.url("/jobs"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .get(srv.url("/whoami"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(vec![Role::ADMIN]);

    let (status, body) = srv.get_json("/whoami", Some(&admin.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"].as_str().unwrap(), admin.id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn stripe_success_redirect_publishes_job_and_notifies_owner() {
    let srv = TestServer::spawn().await;
    let owner = mint_jwt(vec![]);

    let receipt = srv.submit_job(&owner.token, "stripe").await;
    let job_id = receipt["job_id"].as_str().unwrap().to_string();
    let redirect_url = receipt["redirect_url"].as_str().unwrap();
    assert!(redirect_url.starts_with(&srv.url("/payments/stripe/success?session_id=cs_sandbox_")));

    // Pending jobs are hidden from the public but visible to their owner.
    let (status, _) = srv.get_json(&format!("/jobs/{job_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, job) = srv.get_json(&format!("/jobs/{job_id}"), Some(&owner.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "PENDING");

    let location = srv.redirect_location(redirect_url).await;
    assert_eq!(
        location,
        format!("{FRONTEND}/payment/status?provider=stripe&status=success&job_id={job_id}")
    );

    let (_, listing) = srv.get_json("/jobs", None).await;
    let items = listing["items"].as_array().unwrap();
    assert!(items.iter().any(|j| j["id"] == job_id.as_str() && j["status"] == "PUBLISHED"));

    // A second visit to the success page changes nothing.
    let again = srv.redirect_location(redirect_url).await;
    assert!(again.contains("status=success"));

    let (status, notifications) = srv.get_json("/notifications", Some(&owner.token)).await;
    assert_eq!(status, StatusCode::OK);
    let items = notifications["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["kind"], "job_published");

    let res = srv
        .client
        .post(srv.url(&format!("/notifications/{}/read", items[0]["id"].as_str().unwrap())))
        .bearer_auth(&owner.token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn stripe_webhook_requires_signature_and_applies_once() {
    let srv = TestServer::spawn().await;
    let owner = mint_jwt(vec![]);
    let receipt = srv.submit_job(&owner.token, "stripe").await;
    let session_id = receipt["transaction_id"].as_str().unwrap();
    let event = checkout_completed(session_id, "paid");

    let res = srv.stripe_webhook(&event, false).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv.stripe_webhook(&event, true).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["result"], "applied");
    assert_eq!(body["job_status"], "PUBLISHED");

    let res = srv.stripe_webhook(&event, true).await;
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["result"], "unchanged");
    assert_eq!(body["payment_status"], "SUCCESS");

    let (_, notifications) = srv.get_json("/notifications", Some(&owner.token)).await;
    assert_eq!(notifications["items"].as_array().unwrap().len(), 1);

    // Unknown sessions are acknowledged so the provider stops retrying.
    let res = srv.stripe_webhook(&checkout_completed("cs_unknown", "paid"), true).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["result"], "not_found");
}

#[tokio::test]
async fn cancelled_checkout_ignores_late_success_and_allows_retry() {
    let srv = TestServer::spawn().await;
    let owner = mint_jwt(vec![]);
    let stranger = mint_jwt(vec![]);

    let receipt = srv.submit_job(&owner.token, "sslcommerz").await;
    let job_id = receipt["job_id"].as_str().unwrap().to_string();
    let tran_id = receipt["transaction_id"].as_str().unwrap().to_string();

    let location = srv
        .redirect_location(&srv.url(&format!("/payments/sslcommerz/cancel?tran_id={tran_id}")))
        .await;
    assert!(location.contains("status=cancelled"));

    // A signed IPN reporting success after the cancel is acknowledged but ignored.
    let mut fields = BTreeMap::from([
        ("tran_id".to_string(), tran_id.clone()),
        ("status".to_string(), "VALID".to_string()),
        ("val_id".to_string(), "val-1".to_string()),
        ("amount".to_string(), "500.00".to_string()),
    ]);
    SslcommerzSignatureVerifier::new(Some(SSLCOMMERZ_PASSWORD.to_string()))
        .sign(&mut fields)
        .unwrap();
    let res = srv
        .client
        .post(srv.url("/payments/sslcommerz/ipn"))
        .form(&fields)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["result"], "unchanged");
    assert_eq!(body["payment_status"], "CANCELLED");
    assert_eq!(body["job_status"], "PENDING");

    let (status, polled) = srv
        .get_json(&format!("/payments/sslcommerz/{tran_id}/status"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(polled["payment_status"], "CANCELLED");

    let res = srv
        .client
        .post(srv.url(&format!("/jobs/{job_id}/checkout")))
        .bearer_auth(&stranger.token)
        .json(&json!({ "provider": "stripe" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .post(srv.url(&format!("/jobs/{job_id}/checkout")))
        .bearer_auth(&owner.token)
        .json(&json!({ "provider": "stripe" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let retry: serde_json::Value = res.json().await.unwrap();
    assert_eq!(retry["job_id"], job_id.as_str());
    assert_ne!(retry["transaction_id"], tran_id.as_str());

    // Only one live attempt at a time.
    let res = srv
        .client
        .post(srv.url(&format!("/jobs/{job_id}/checkout")))
        .bearer_auth(&owner.token)
        .json(&json!({ "provider": "stripe" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn forged_ipn_is_rejected() {
    let srv = TestServer::spawn().await;
    let owner = mint_jwt(vec![]);
    let receipt = srv.submit_job(&owner.token, "sslcommerz").await;

    let res = srv
        .client
        .post(srv.url("/payments/sslcommerz/ipn"))
        .form(&[
            ("tran_id", receipt["transaction_id"].as_str().unwrap()),
            ("status", "VALID"),
            ("verify_key", "status,tran_id"),
            ("verify_sign", "0000"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let (_, job) = srv
        .get_json(&format!("/jobs/{}", receipt["job_id"].as_str().unwrap()), Some(&owner.token))
        .await;
    assert_eq!(job["status"], "PENDING");
}

#[tokio::test]
async fn admin_moderation_obeys_terminal_state() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(vec![Role::ADMIN]);
    let user = mint_jwt(vec![]);

    let body = json!({
        "title": "Staff Engineer",
        "company": "Acme",
        "description": "Posted by staff",
        "deadline": (Utc::now() + ChronoDuration::days(10)).to_rfc3339(),
    });
    let res = srv
        .client
        .post(srv.url("/admin/jobs"))
        .bearer_auth(&user.token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .post(srv.url("/admin/jobs"))
        .bearer_auth(&admin.token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let receipt: serde_json::Value = res.json().await.unwrap();
    assert!(receipt["redirect_url"].is_null());
    let job_id = receipt["job_id"].as_str().unwrap().to_string();

    let (status, pending) = srv.get_json("/admin/jobs?status=pending", Some(&admin.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(pending["items"].as_array().unwrap().iter().any(|j| j["id"] == job_id.as_str()));

    let res = srv
        .client
        .post(srv.url(&format!("/admin/jobs/{job_id}/approve")))
        .bearer_auth(&admin.token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["payment_status"], "SUCCESS");
    assert_eq!(report["job_status"], "PUBLISHED");
    assert_eq!(report["provider"], "ADMIN");

    let res = srv
        .client
        .post(srv.url(&format!("/admin/jobs/{job_id}/reject")))
        .bearer_auth(&admin.token)
        .json(&json!({ "reason": "too late" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let (_, job) = srv.get_json(&format!("/jobs/{job_id}"), None).await;
    assert_eq!(job["status"], "PUBLISHED");
}

#[tokio::test]
async fn polling_unknown_transaction_is_not_found() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.get_json("/payments/stripe/cs_missing/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = srv.get_json("/payments/paypal/tx-1/status", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let location = srv
        .redirect_location(&srv.url("/payments/stripe/cancel?session_id=cs_missing"))
        .await;
    assert_eq!(location, format!("{FRONTEND}/payment/status?provider=stripe&status=not_found"));
}
