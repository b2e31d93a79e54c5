//! Emergency escalation protocol.
//!
//! Two independent paths share one per-session state machine:
//! - manual: the patient asks for a specialist and a ticket is queued;
//! - automatic: the assessment reply carries the emergency marker and,
//!   once the patient confirms, the hospital is notified exactly once.

mod coordinator;
mod payload;
mod queue;
mod state;

pub use coordinator::*;
pub use payload::*;
pub use queue::*;
pub use state::*;

use crate::error::{AuthorizationError, ConcurrencyConflict, ValidationError};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    #[error(transparent)]
    Store(#[from] StoreError),
}
