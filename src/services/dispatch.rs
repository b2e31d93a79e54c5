use std::time::Duration;

use async_trait::async_trait;

use super::transport_error;
use crate::error::TransportError;
use crate::escalation::EmergencyPayload;

pub const DISPATCH_SERVICE: &str = "dispatch";

/// Hospital notification channel.
#[async_trait]
pub trait DispatchClient: Send + Sync {
    /// Send one emergency notification. `Ok` carries the 2xx status.
    async fn send_emergency(&self, payload: &EmergencyPayload) -> Result<u16, TransportError>;
}

/// HTTP client for `POST /emergency-email`.
pub struct HttpDispatchClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpDispatchClient {
    pub fn new(base_url: &str, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        }
    }
}

#[async_trait]
impl DispatchClient for HttpDispatchClient {
    async fn send_emergency(&self, payload: &EmergencyPayload) -> Result<u16, TransportError> {
        let url = format!("{}/emergency-email", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| transport_error(DISPATCH_SERVICE, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                service: DISPATCH_SERVICE,
                status: status.as_u16(),
                body,
            });
        }
        Ok(status.as_u16())
    }
}
