use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{Notification, NotifyError};
use crate::config::RelayConfig;

/// Out-of-process push service that forwards notifications to connected clients.
#[async_trait]
pub trait RealtimeRelay: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Default, Clone)]
pub struct NoopRelay;

#[async_trait]
impl RealtimeRelay for NoopRelay {
    async fn publish(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// `POST {url}/notify` with `{"user_id", "notification"}`.
pub struct HttpRealtimeRelay {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpRealtimeRelay {
    pub fn new(config: &RelayConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| NotifyError::Relay(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/notify", config.url),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl RealtimeRelay for HttpRealtimeRelay {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "user_id": notification.user_id,
            "notification": notification,
        }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Relay(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Relay(format!("relay answered {}", response.status())));
        }
        Ok(())
    }
}
