//! In-process stand-ins for the external services.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{AssessmentClient, DispatchClient, ASSESSMENT_SERVICE, DISPATCH_SERVICE};
use crate::error::TransportError;
use crate::escalation::EmergencyPayload;

/// Mock assessment service: returns a fixed reply or a fixed failure.
pub struct MockAssessmentClient {
    reply: Result<String, TransportError>,
    summary: Result<String, TransportError>,
    calls: AtomicUsize,
    received: Mutex<Vec<String>>,
}

impl MockAssessmentClient {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            summary: Ok("Patient reports symptoms; see transcript.".to_string()),
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails as if the service were down.
    pub fn unreachable() -> Self {
        let err = TransportError::Unreachable {
            service: ASSESSMENT_SERVICE,
            detail: "connection refused".to_string(),
        };
        Self {
            reply: Err(err.clone()),
            summary: Err(err),
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn with_summary(mut self, summary: Result<String, TransportError>) -> Self {
        self.summary = summary;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Inputs seen so far, chat and summary alike.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(&self, input: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut received) = self.received.lock() {
            received.push(input.to_string());
        }
    }
}

#[async_trait]
impl AssessmentClient for MockAssessmentClient {
    async fn chat(&self, message: &str) -> Result<String, TransportError> {
        self.record(message);
        self.reply.clone()
    }

    async fn summarize(&self, history: &str) -> Result<String, TransportError> {
        self.record(history);
        self.summary.clone()
    }
}

/// Mock dispatch service with scripted outcomes.
///
/// Outcomes are consumed in order; the last one repeats.
pub struct MockDispatchClient {
    outcomes: Mutex<VecDeque<Result<u16, TransportError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    payloads: Mutex<Vec<EmergencyPayload>>,
}

impl MockDispatchClient {
    pub fn new(outcome: Result<u16, TransportError>) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::from([outcome])),
            delay: None,
            calls: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn ok() -> Self {
        Self::new(Ok(200))
    }

    /// Non-2xx response from the dispatch service.
    pub fn status(status: u16) -> Self {
        Self::new(Err(TransportError::Status {
            service: DISPATCH_SERVICE,
            status,
            body: String::new(),
        }))
    }

    pub fn then(self, outcome: Result<u16, TransportError>) -> Self {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
        self
    }

    /// Hold every call open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<EmergencyPayload> {
        self.payloads.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_outcome(&self) -> Result<u16, TransportError> {
        let mut outcomes = match self.outcomes.lock() {
            Ok(outcomes) => outcomes,
            Err(poisoned) => poisoned.into_inner(),
        };
        if outcomes.len() > 1 {
            outcomes.pop_front().unwrap_or(Ok(200))
        } else {
            outcomes.front().cloned().unwrap_or(Ok(200))
        }
    }
}

#[async_trait]
impl DispatchClient for MockDispatchClient {
    async fn send_emergency(&self, payload: &EmergencyPayload) -> Result<u16, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut payloads) = self.payloads.lock() {
            payloads.push(payload.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_outcome()
    }
}
