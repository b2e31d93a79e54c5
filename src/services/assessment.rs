use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::transport_error;
use crate::error::TransportError;

pub const ASSESSMENT_SERVICE: &str = "assessment";
pub const SUMMARY_SERVICE: &str = "summary";

/// The AI assessment model: one reply per patient message, plus a
/// summary of a whole session for clinicians.
#[async_trait]
pub trait AssessmentClient: Send + Sync {
    async fn chat(&self, message: &str) -> Result<String, TransportError>;
    async fn summarize(&self, history: &str) -> Result<String, TransportError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    history: &'a str,
}

#[derive(Deserialize)]
struct ServiceReply {
    response: String,
}

/// HTTP client for `POST /chat` and `POST /summarize`.
pub struct HttpAssessmentClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpAssessmentClient {
    pub fn new(base_url: &str, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        }
    }

    async fn post<B: Serialize + Sync>(
        &self,
        service: &'static str,
        path: &str,
        body: &B,
    ) -> Result<String, TransportError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(service, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                service,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ServiceReply = response
            .json()
            .await
            .map_err(|e| transport_error(service, self.timeout, e))?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl AssessmentClient for HttpAssessmentClient {
    async fn chat(&self, message: &str) -> Result<String, TransportError> {
        self.post(ASSESSMENT_SERVICE, "/chat", &ChatRequest { message })
            .await
    }

    async fn summarize(&self, history: &str) -> Result<String, TransportError> {
        self.post(SUMMARY_SERVICE, "/summarize", &SummarizeRequest { history })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::http_client;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let timeout = Duration::from_secs(5);
        let client = HttpAssessmentClient::new(
            "http://localhost:8000/",
            http_client(timeout).unwrap(),
            timeout,
        );
        assert_eq!(client.base_url, "http://localhost:8000");
    }

    #[tokio::test]
    async fn unreachable_service_maps_to_transport_error() {
        let timeout = Duration::from_secs(2);
        // Port 9 (discard) on loopback is closed in test environments.
        let client =
            HttpAssessmentClient::new("http://127.0.0.1:9", http_client(timeout).unwrap(), timeout);
        let err = client.chat("hello").await.unwrap_err();
        assert_eq!(err.service(), ASSESSMENT_SERVICE);
        assert!(matches!(
            err,
            TransportError::Unreachable { .. } | TransportError::Timeout { .. }
        ));
    }

    #[test]
    fn request_bodies_match_service_contract() {
        let chat = serde_json::to_value(ChatRequest { message: "fever" }).unwrap();
        assert_eq!(chat, serde_json::json!({ "message": "fever" }));
        let summary = serde_json::to_value(SummarizeRequest { history: "a\nb" }).unwrap();
        assert_eq!(summary, serde_json::json!({ "history": "a\nb" }));
    }
}
