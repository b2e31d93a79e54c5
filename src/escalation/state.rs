use serde::Serialize;
use uuid::Uuid;

use super::payload::ManualChannel;

/// Per-session escalation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EscalationState {
    Idle,
    SymptomsCollected,
    ManualRequest,
    /// The assessment service flagged an emergency; awaiting dispatch.
    AutoDetected,
    TicketOpen { ticket_id: Uuid },
    Notifying,
    Notified,
    /// Dispatch failed; the patient must use the manual channel.
    NotifiedFallback { channel: ManualChannel },
    Resolved { ticket_id: Uuid, resolved_by: String },
}

impl EscalationState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SymptomsCollected => "symptoms_collected",
            Self::ManualRequest => "manual_request",
            Self::AutoDetected => "auto_detected",
            Self::TicketOpen { .. } => "ticket_open",
            Self::Notifying => "notifying",
            Self::Notified => "notified",
            Self::NotifiedFallback { .. } => "notified_fallback",
            Self::Resolved { .. } => "resolved",
        }
    }

    /// States owned by the emergency dispatch path. The manual ticket flow
    /// does not overwrite them.
    pub fn is_emergency_path(&self) -> bool {
        matches!(
            self,
            Self::AutoDetected | Self::Notifying | Self::Notified | Self::NotifiedFallback { .. }
        )
    }
}

/// Recorded result of the one dispatch attempt for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Notified { status: u16 },
    Fallback { channel: ManualChannel, reason: String },
}

impl DispatchOutcome {
    pub fn state(&self) -> EscalationState {
        match self {
            Self::Notified { .. } => EscalationState::Notified,
            Self::Fallback { channel, .. } => EscalationState::NotifiedFallback {
                channel: channel.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_value(EscalationState::AutoDetected).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "auto_detected" }));

        let id = Uuid::new_v4();
        let json = serde_json::to_value(EscalationState::TicketOpen { ticket_id: id }).unwrap();
        assert_eq!(json["state"], "ticket_open");
        assert_eq!(json["ticket_id"], id.to_string());
    }

    #[test]
    fn manual_flow_yields_to_emergency_states() {
        assert!(EscalationState::Notified.is_emergency_path());
        assert!(!EscalationState::SymptomsCollected.is_emergency_path());
        assert_eq!(EscalationState::Notifying.name(), "notifying");
    }
}
