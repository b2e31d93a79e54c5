//! External HTTP collaborators: assessment, summary and dispatch.
//!
//! Each one sits behind an `async_trait` seam so the coordinator and the
//! chat flow can be driven by mocks in tests.

mod assessment;
mod dispatch;
mod mock;

use std::time::Duration;

pub use assessment::*;
pub use dispatch::*;
pub use mock::*;

use crate::error::TransportError;

/// Build the shared outbound client with a hard per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("remedi/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Map a reqwest failure onto the transport taxonomy.
pub(crate) fn transport_error(
    service: &'static str,
    timeout: Duration,
    err: reqwest::Error,
) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            service,
            secs: timeout.as_secs(),
        }
    } else if err.is_connect() {
        TransportError::Unreachable {
            service,
            detail: err.to_string(),
        }
    } else if err.is_decode() {
        TransportError::InvalidResponse {
            service,
            detail: err.to_string(),
        }
    } else {
        TransportError::Unreachable {
            service,
            detail: err.to_string(),
        }
    }
}
