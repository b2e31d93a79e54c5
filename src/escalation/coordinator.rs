use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use super::payload::{EmergencyPayload, ManualChannel};
use super::state::{DispatchOutcome, EscalationState};
use super::EscalationError;
use crate::access::ClinicianGrant;
use crate::db::{self, DatabaseError};
use crate::error::{AuthorizationError, ConcurrencyConflict, ValidationError};
use crate::models::enums::{MessageRole, TicketStatus};
use crate::models::{EscalationTicket, Identity, Message, Session};
use crate::services::DispatchClient;
use crate::store::{Store, StoreError, Topic};

/// Appended to the session once a specialist request is recorded.
pub const ACKNOWLEDGEMENT_TEXT: &str =
    "✅ **REQUEST SENT:** A specialist has been notified. You will receive a response here shortly.";

/// Prefix of the clinician's reply in the patient's session.
pub const CLINICIAN_NOTE_PREFIX: &str = "👨‍⚕️ **DOCTOR'S NOTE:** ";

pub const MAX_REQUEST_ID_LEN: usize = 128;

/// Result of a specialist request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialistRequest {
    pub ticket: EscalationTicket,
    /// `false` when the request id had already been used.
    pub created: bool,
}

/// Assessment reply after marker inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectedReply {
    pub text: String,
    pub emergency: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The ticket moved to completed. `note` is `None` when the session
    /// had been deleted by its owner.
    Resolved {
        ticket: EscalationTicket,
        note: Option<Message>,
    },
    AlreadyResolved { ticket: EscalationTicket },
}

#[derive(Debug, Clone)]
struct Instance {
    state: EscalationState,
    outcome: Option<DispatchOutcome>,
}

/// Drives escalation for every session. Instances are independent and
/// created on first use from what the store already knows.
pub struct EscalationCoordinator {
    store: Arc<Store>,
    dispatch: Arc<dyn DispatchClient>,
    marker: String,
    instances: Mutex<HashMap<Uuid, Instance>>,
}

impl EscalationCoordinator {
    pub fn new(store: Arc<Store>, dispatch: Arc<dyn DispatchClient>, marker: &str) -> Self {
        Self {
            store,
            dispatch,
            marker: marker.to_string(),
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Current state of a session's escalation.
    pub fn state(&self, session_id: &Uuid) -> Result<EscalationState, EscalationError> {
        self.ensure_instance(session_id)?;
        Ok(self
            .lock()
            .get(session_id)
            .map(|i| i.state.clone())
            .unwrap_or(EscalationState::Idle))
    }

    /// A patient message landed in the session.
    pub fn note_symptoms(&self, session_id: &Uuid) -> Result<(), EscalationError> {
        self.ensure_instance(session_id)?;
        let mut instances = self.lock();
        if let Some(instance) = instances.get_mut(session_id) {
            if instance.state == EscalationState::Idle {
                transition(session_id, instance, EscalationState::SymptomsCollected);
            }
        }
        Ok(())
    }

    /// Strip the emergency marker from an assessment reply and, if it was
    /// present, move the session to `AutoDetected`.
    pub fn inspect_reply(
        &self,
        session_id: &Uuid,
        reply: &str,
    ) -> Result<InspectedReply, EscalationError> {
        if self.marker.is_empty() || !reply.contains(&self.marker) {
            return Ok(InspectedReply {
                text: reply.to_string(),
                emergency: false,
            });
        }
        let text = reply.replace(&self.marker, "").trim().to_string();

        self.ensure_instance(session_id)?;
        let mut instances = self.lock();
        if let Some(instance) = instances.get_mut(session_id) {
            if matches!(
                instance.state,
                EscalationState::Notifying
                    | EscalationState::Notified
                    | EscalationState::NotifiedFallback { .. }
            ) {
                tracing::info!(
                    session_id = %session_id,
                    state = instance.state.name(),
                    "Emergency marker seen again; hospital already contacted"
                );
            } else {
                tracing::warn!(session_id = %session_id, "Emergency detected in assessment reply");
                transition(session_id, instance, EscalationState::AutoDetected);
            }
        }
        Ok(InspectedReply {
            text,
            emergency: true,
        })
    }

    /// Open a clinician ticket for the session.
    ///
    /// Idempotent on `request_id`: a repeat returns the original ticket and
    /// appends nothing.
    pub fn request_specialist(
        &self,
        patient: &Identity,
        session_id: &Uuid,
        request_id: &str,
    ) -> Result<SpecialistRequest, EscalationError> {
        let request_id = request_id.trim();
        if request_id.is_empty() || request_id.chars().count() > MAX_REQUEST_ID_LEN {
            return Err(ValidationError::InvalidRequestId {
                max: MAX_REQUEST_ID_LEN,
            }
            .into());
        }
        self.owned_session(patient, session_id)?;
        self.ensure_instance(session_id)?;
        self.update(session_id, |state| {
            (!state.is_emergency_path()).then_some(EscalationState::ManualRequest)
        });

        enum Recorded {
            Existing(EscalationTicket),
            EmptySession,
            Created(EscalationTicket),
        }

        let recorded = self.store.write(
            &[
                Topic::Tickets,
                Topic::Messages {
                    session: *session_id,
                },
            ],
            |conn| {
                let tx = conn.transaction()?;
                if let Some(existing) = db::get_ticket_by_request_id(&tx, &patient.id, request_id)? {
                    return Ok(Recorded::Existing(existing));
                }
                let Some(first) = db::first_message_text(&tx, session_id)? else {
                    return Ok(Recorded::EmptySession);
                };
                let ticket = EscalationTicket {
                    id: Uuid::new_v4(),
                    request_id: request_id.to_string(),
                    patient_id: patient.id.clone(),
                    patient_email: patient.email.clone(),
                    session_id: *session_id,
                    preview: first,
                    status: TicketStatus::Pending,
                    resolved_by: None,
                    version: 0,
                    created_at: Utc::now(),
                    resolved_at: None,
                };
                db::insert_ticket(&tx, &ticket)?;
                db::insert_message(
                    &tx,
                    session_id,
                    Uuid::new_v4(),
                    MessageRole::Assistant,
                    ACKNOWLEDGEMENT_TEXT,
                )?;
                tx.commit()?;
                Ok(Recorded::Created(ticket))
            },
        );

        let recorded = match recorded {
            Ok(recorded) => recorded,
            Err(err) => {
                self.revert_manual_request(session_id);
                return Err(err.into());
            }
        };

        match recorded {
            Recorded::Existing(ticket) => {
                self.revert_manual_request(session_id);
                if ticket.session_id != *session_id {
                    return Err(ValidationError::InvalidRequestId {
                        max: MAX_REQUEST_ID_LEN,
                    }
                    .into());
                }
                tracing::info!(
                    session_id = %session_id,
                    ticket_id = %ticket.id,
                    request_id,
                    "Duplicate specialist request; returning existing ticket"
                );
                Ok(SpecialistRequest {
                    ticket,
                    created: false,
                })
            }
            Recorded::EmptySession => {
                self.revert_manual_request(session_id);
                tracing::info!(session_id = %session_id, "Specialist request refused: no symptoms yet");
                Err(ValidationError::EmptySession.into())
            }
            Recorded::Created(ticket) => {
                let ticket_id = ticket.id;
                self.update(session_id, |state| {
                    (*state == EscalationState::ManualRequest)
                        .then_some(EscalationState::TicketOpen { ticket_id })
                });
                tracing::info!(
                    session_id = %session_id,
                    ticket_id = %ticket.id,
                    "Specialist ticket opened"
                );
                Ok(SpecialistRequest {
                    ticket,
                    created: true,
                })
            }
        }
    }

    /// Notify the hospital about a detected emergency, at most once.
    ///
    /// A failed dispatch is not an error: the outcome carries a manual
    /// channel the patient can use instead.
    pub async fn dispatch(
        &self,
        patient: &Identity,
        session_id: &Uuid,
    ) -> Result<DispatchOutcome, EscalationError> {
        self.owned_session(patient, session_id)?;
        let profile = self
            .store
            .read(|conn| db::get_emergency_profile(conn, &patient.id))?;
        self.ensure_instance(session_id)?;

        let payload = {
            let mut instances = self.lock();
            let instance = instances
                .entry(*session_id)
                .or_insert_with(|| Instance::new(EscalationState::Idle));
            if let Some(outcome) = &instance.outcome {
                tracing::info!(session_id = %session_id, "Dispatch already recorded; not resending");
                return Ok(outcome.clone());
            }
            match instance.state {
                EscalationState::AutoDetected => {}
                EscalationState::Notifying => {
                    return Err(ConcurrencyConflict::DispatchInFlight {
                        session_id: session_id.to_string(),
                    }
                    .into())
                }
                _ => return Err(ValidationError::NoEmergencyPending.into()),
            }
            let payload = match EmergencyPayload::compose(&patient.email, profile.as_ref()) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(session_id = %session_id, error = %err, "Dispatch blocked by incomplete profile");
                    return Err(err.into());
                }
            };
            transition(session_id, instance, EscalationState::Notifying);
            payload
        };

        let mut in_flight = InFlight {
            coordinator: self,
            session_id: *session_id,
            armed: true,
        };
        let outcome = match self.dispatch.send_emergency(&payload).await {
            Ok(status) => {
                tracing::info!(session_id = %session_id, status, "Hospital notified");
                DispatchOutcome::Notified { status }
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %session_id,
                    service = err.service(),
                    error = %err,
                    "Dispatch failed; offering manual channel"
                );
                DispatchOutcome::Fallback {
                    channel: ManualChannel::for_payload(&payload),
                    reason: err.to_string(),
                }
            }
        };
        in_flight.armed = false;

        if let Some(instance) = self.lock().get_mut(session_id) {
            instance.outcome = Some(outcome.clone());
            transition(session_id, instance, outcome.state());
        }
        Ok(outcome)
    }

    /// Close a ticket with a clinician note, exactly once.
    pub fn resolve(
        &self,
        grant: &ClinicianGrant,
        ticket_id: &Uuid,
        note: &str,
    ) -> Result<ResolveOutcome, EscalationError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(ValidationError::EmptyNote.into());
        }
        let ticket = self
            .store
            .read(|conn| db::get_ticket(conn, ticket_id))?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Ticket".into(),
                id: ticket_id.to_string(),
            })?;
        self.complete(grant, ticket, note)
    }

    /// Write the resolution of `ticket` as read by the caller. Loses to any
    /// writer that moved the ticket since that read.
    fn complete(
        &self,
        grant: &ClinicianGrant,
        ticket: EscalationTicket,
        note: &str,
    ) -> Result<ResolveOutcome, EscalationError> {
        let ticket_id = ticket.id;
        if !ticket.is_pending() {
            tracing::info!(ticket_id = %ticket_id, "Ticket already resolved; ignoring note");
            return Ok(ResolveOutcome::AlreadyResolved { ticket });
        }

        enum Applied {
            Done(EscalationTicket, Option<Message>),
            Lost(EscalationTicket),
        }

        let resolver = grant.email();
        let session_id = ticket.session_id;
        let applied = self.store.write(
            &[Topic::Tickets, Topic::Messages { session: session_id }],
            |conn| {
                let tx = conn.transaction()?;
                let won = db::complete_ticket(
                    &tx,
                    &ticket_id,
                    ticket.version,
                    resolver,
                    Utc::now().timestamp_micros(),
                )?;
                let current = db::get_ticket(&tx, &ticket_id)?
                    .ok_or_else(|| DatabaseError::not_found("Ticket", &ticket_id))?;
                if !won {
                    return Ok(Applied::Lost(current));
                }
                let message = match db::get_session(&tx, &session_id)? {
                    Some(_) => Some(db::insert_message(
                        &tx,
                        &session_id,
                        Uuid::new_v4(),
                        MessageRole::Clinician,
                        &format!("{CLINICIAN_NOTE_PREFIX}{note}"),
                    )?),
                    None => None,
                };
                tx.commit()?;
                Ok(Applied::Done(current, message))
            },
        )?;

        match applied {
            Applied::Lost(current) if !current.is_pending() => {
                tracing::info!(ticket_id = %ticket_id, "Ticket resolved concurrently; ignoring note");
                Ok(ResolveOutcome::AlreadyResolved { ticket: current })
            }
            Applied::Lost(current) => Err(ConcurrencyConflict::TicketVersion {
                ticket_id: ticket_id.to_string(),
                expected: ticket.version,
                found: current.version,
            }
            .into()),
            Applied::Done(ticket, note) => {
                if note.is_none() {
                    tracing::warn!(
                        ticket_id = %ticket_id,
                        session_id = %session_id,
                        "Session no longer exists; ticket closed without a note"
                    );
                }
                let resolved_by = resolver.to_string();
                let ticket_id = ticket.id;
                if note.is_some() {
                    self.ensure_instance(&session_id)?;
                    self.update(&session_id, |state| {
                        (!state.is_emergency_path()).then(|| EscalationState::Resolved {
                            ticket_id,
                            resolved_by: resolved_by.clone(),
                        })
                    });
                }
                tracing::info!(ticket_id = %ticket.id, resolved_by = resolver, "Ticket resolved");
                Ok(ResolveOutcome::Resolved { ticket, note })
            }
        }
    }

    /// A clinician dismissed `ticket`. A session still pointing at it falls
    /// back to what the store now says.
    pub fn ticket_dismissed(&self, ticket: &EscalationTicket) -> Result<(), EscalationError> {
        let session_id = ticket.session_id;
        if !self.lock().contains_key(&session_id) {
            return Ok(());
        }
        let rebuilt = self.stored_state(&session_id)?;
        self.update(&session_id, |state| match state {
            EscalationState::TicketOpen { ticket_id }
            | EscalationState::Resolved { ticket_id, .. }
                if *ticket_id == ticket.id =>
            {
                Some(rebuilt)
            }
            _ => None,
        });
        Ok(())
    }

    /// Drop everything held for a deleted session.
    pub fn forget(&self, session_id: &Uuid) {
        if let Some(instance) = self.lock().remove(session_id) {
            tracing::debug!(
                session_id = %session_id,
                state = instance.state.name(),
                "Escalation instance dropped"
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_sessions(&self) -> usize {
        self.lock().len()
    }

    fn owned_session(&self, patient: &Identity, session_id: &Uuid) -> Result<Session, EscalationError> {
        let session = self
            .store
            .read(|conn| db::get_session(conn, session_id))?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Session".into(),
                id: session_id.to_string(),
            })?;
        if session.owner_id != patient.id {
            return Err(AuthorizationError::NotOwner {
                session_id: session_id.to_string(),
            }
            .into());
        }
        Ok(session)
    }

    /// Make sure an instance exists, rebuilding it from stored tickets and
    /// messages after a restart.
    fn ensure_instance(&self, session_id: &Uuid) -> Result<(), StoreError> {
        if self.lock().contains_key(session_id) {
            return Ok(());
        }
        let state = self.stored_state(session_id)?;
        self.lock()
            .entry(*session_id)
            .or_insert_with(|| Instance::new(state));
        Ok(())
    }

    /// State implied by the stored tickets and messages alone.
    fn stored_state(&self, session_id: &Uuid) -> Result<EscalationState, StoreError> {
        self.store.read(|conn| {
            if let Some(ticket) = db::latest_ticket_for_session(conn, session_id)? {
                return Ok(match ticket.status {
                    TicketStatus::Pending => EscalationState::TicketOpen {
                        ticket_id: ticket.id,
                    },
                    TicketStatus::Completed => EscalationState::Resolved {
                        ticket_id: ticket.id,
                        resolved_by: ticket.resolved_by.unwrap_or_default(),
                    },
                });
            }
            Ok(match db::first_message_text(conn, session_id)? {
                Some(_) => EscalationState::SymptomsCollected,
                None => EscalationState::Idle,
            })
        })
    }

    /// Apply `next` to the session's state; `None` leaves it unchanged.
    fn update<F>(&self, session_id: &Uuid, next: F)
    where
        F: FnOnce(&EscalationState) -> Option<EscalationState>,
    {
        let mut instances = self.lock();
        if let Some(instance) = instances.get_mut(session_id) {
            if let Some(to) = next(&instance.state) {
                transition(session_id, instance, to);
            }
        }
    }

    /// A manual request that produced no ticket returns to collecting symptoms.
    fn revert_manual_request(&self, session_id: &Uuid) {
        let has_messages = match self
            .store
            .read(|conn| db::first_message_text(conn, session_id))
        {
            Ok(first) => first.is_some(),
            Err(err) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %err,
                    "Could not read session while reverting manual request"
                );
                false
            }
        };
        self.update(session_id, |state| {
            (*state == EscalationState::ManualRequest).then_some(if has_messages {
                EscalationState::SymptomsCollected
            } else {
                EscalationState::Idle
            })
        });
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Instance>> {
        match self.instances.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Instance {
    fn new(state: EscalationState) -> Self {
        Self {
            state,
            outcome: None,
        }
    }
}

fn transition(session_id: &Uuid, instance: &mut Instance, to: EscalationState) {
    if instance.state == to {
        return;
    }
    tracing::info!(
        session_id = %session_id,
        from = instance.state.name(),
        to = to.name(),
        "Escalation state changed"
    );
    instance.state = to;
}

/// Returns a session to `AutoDetected` if the dispatch future is dropped
/// before the network call completes.
struct InFlight<'a> {
    coordinator: &'a EscalationCoordinator,
    session_id: Uuid,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(session_id = %self.session_id, "Dispatch cancelled before completion");
        self.coordinator.update(&self.session_id, |state| {
            (*state == EscalationState::Notifying).then_some(EscalationState::AutoDetected)
        });
    }
}
