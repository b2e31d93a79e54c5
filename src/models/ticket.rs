use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::TicketStatus;

/// A request for clinician review of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationTicket {
    pub id: Uuid,
    /// Client-generated idempotency key; unique across tickets.
    pub request_id: String,
    pub patient_id: String,
    pub patient_email: String,
    pub session_id: Uuid,
    pub preview: String,
    pub status: TicketStatus,
    pub resolved_by: Option<String>,
    /// Incremented on every status write; used for compare-and-set.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EscalationTicket {
    pub fn is_pending(&self) -> bool {
        self.status == TicketStatus::Pending
    }
}
