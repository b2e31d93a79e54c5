//! HTTP and WebSocket surface.
//!
//! Patient and clinician routes share one router. Identity comes from the
//! authenticating reverse proxy (see `middleware::identity`); each handler
//! then asks the `AccessGate` for the role it needs.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;
pub mod websocket;

pub use error::ApiError;
pub use router::build_router;
pub use server::{start_server, ApiServer, ServerError, ServerInfo};
pub use types::ApiContext;
