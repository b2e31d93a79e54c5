//! Clinician ticket queue projections.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::access::ClinicianGrant;
use crate::db;
use crate::models::enums::TicketStatus;
use crate::models::EscalationTicket;
use crate::store::{Store, StoreError, Topic};
use crate::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueView {
    /// Only tickets still waiting for a clinician.
    #[default]
    PendingOnly,
    /// Every ticket, badged with its status.
    All,
}

impl FromStr for QueueView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" | "pending_only" => Ok(Self::PendingOnly),
            "all" => Ok(Self::All),
            other => Err(format!("unknown queue view: {other}")),
        }
    }
}

/// One row of the queue as the console shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    #[serde(flatten)]
    pub ticket: EscalationTicket,
    pub badge: &'static str,
}

impl From<EscalationTicket> for QueueEntry {
    fn from(ticket: EscalationTicket) -> Self {
        let badge = match ticket.status {
            TicketStatus::Pending => "PENDING",
            TicketStatus::Completed => "COMPLETED",
        };
        Self { ticket, badge }
    }
}

#[derive(Clone)]
pub struct TicketQueue {
    store: Arc<Store>,
}

impl TicketQueue {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn list(
        &self,
        _grant: &ClinicianGrant,
        view: QueueView,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        query(&self.store, view)
    }

    pub fn get(
        &self,
        _grant: &ClinicianGrant,
        ticket_id: &uuid::Uuid,
    ) -> Result<EscalationTicket, StoreError> {
        self.store
            .read(|conn| db::get_ticket(conn, ticket_id))?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Ticket".into(),
                id: ticket_id.to_string(),
            })
    }

    /// Live queue; re-pushed whenever any ticket changes.
    pub fn subscribe(&self, grant: &ClinicianGrant, view: QueueView) -> Subscription<QueueEntry> {
        tracing::debug!(clinician = grant.email(), ?view, "Ticket queue subscription");
        Subscription::open(self.store.clone(), Topic::Tickets, move |store| {
            query(store, view)
        })
    }
}

fn query(store: &Store, view: QueueView) -> Result<Vec<QueueEntry>, StoreError> {
    let status = match view {
        QueueView::PendingOnly => Some(TicketStatus::Pending),
        QueueView::All => None,
    };
    let tickets = store.read(|conn| db::list_tickets(conn, status))?;
    Ok(tickets.into_iter().map(QueueEntry::from).collect())
}
