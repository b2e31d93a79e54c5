use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::TicketStatus;
use crate::models::*;

const TICKET_COLUMNS: &str = "id, request_id, patient_id, patient_email, session_id, preview,
     status, resolved_by, version, created_at_us, resolved_at_us";

pub fn insert_ticket(conn: &Connection, ticket: &EscalationTicket) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO escalation_tickets (id, request_id, patient_id, patient_email, session_id,
                                         preview, status, resolved_by, version, created_at_us,
                                         resolved_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            ticket.id.to_string(),
            ticket.request_id,
            ticket.patient_id,
            ticket.patient_email,
            ticket.session_id.to_string(),
            ticket.preview,
            ticket.status.as_str(),
            ticket.resolved_by,
            ticket.version,
            ticket.created_at.timestamp_micros(),
            ticket.resolved_at.map(|t| t.timestamp_micros()),
        ],
    )?;
    Ok(())
}

/// A live ticket by id. Dismissed tickets are not returned.
pub fn get_ticket(conn: &Connection, id: &Uuid) -> Result<Option<EscalationTicket>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {TICKET_COLUMNS} FROM escalation_tickets
                 WHERE id = ?1 AND dismissed_at_us IS NULL"
            ),
            params![id.to_string()],
            ticket_row,
        )
        .optional()?;
    row.map(ticket_from_row).transpose()
}

/// Look up a ticket by the patient's idempotency key, dismissed or not.
pub fn get_ticket_by_request_id(
    conn: &Connection,
    patient_id: &str,
    request_id: &str,
) -> Result<Option<EscalationTicket>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {TICKET_COLUMNS} FROM escalation_tickets
                 WHERE patient_id = ?1 AND request_id = ?2"
            ),
            params![patient_id, request_id],
            ticket_row,
        )
        .optional()?;
    row.map(ticket_from_row).transpose()
}

/// Tickets newest first, optionally restricted to one status.
pub fn list_tickets(
    conn: &Connection,
    status: Option<TicketStatus>,
) -> Result<Vec<EscalationTicket>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TICKET_COLUMNS} FROM escalation_tickets
         WHERE (?1 IS NULL OR status = ?1) AND dismissed_at_us IS NULL
         ORDER BY created_at_us DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map(params![status.map(|s| s.as_str())], ticket_row)?;

    let mut tickets = Vec::new();
    for row in rows {
        tickets.push(ticket_from_row(row?)?);
    }
    Ok(tickets)
}

/// Most recent live ticket opened for a session, if any.
pub fn latest_ticket_for_session(
    conn: &Connection,
    session_id: &Uuid,
) -> Result<Option<EscalationTicket>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {TICKET_COLUMNS} FROM escalation_tickets
                 WHERE session_id = ?1 AND dismissed_at_us IS NULL
                 ORDER BY created_at_us DESC, rowid DESC LIMIT 1"
            ),
            params![session_id.to_string()],
            ticket_row,
        )
        .optional()?;
    row.map(ticket_from_row).transpose()
}

/// Compare-and-set a pending ticket to completed.
///
/// Returns `false` when no row matched: the ticket is already completed,
/// its version moved, or it does not exist. Callers re-read to tell which.
pub fn complete_ticket(
    conn: &Connection,
    id: &Uuid,
    expected_version: i64,
    resolved_by: &str,
    resolved_at_us: i64,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE escalation_tickets
         SET status = 'completed', resolved_by = ?3, resolved_at_us = ?4, version = version + 1
         WHERE id = ?1 AND status = 'pending' AND version = ?2",
        params![id.to_string(), expected_version, resolved_by, resolved_at_us],
    )?;
    Ok(updated == 1)
}

/// Take a ticket off the clinician queue. The row is kept so its
/// request id still deduplicates. Returns `None` when no live ticket matched.
pub fn dismiss_ticket(
    conn: &Connection,
    id: &Uuid,
    dismissed_by: &str,
    dismissed_at_us: i64,
) -> Result<Option<EscalationTicket>, DatabaseError> {
    let Some(ticket) = get_ticket(conn, id)? else {
        return Ok(None);
    };
    conn.execute(
        "UPDATE escalation_tickets SET dismissed_by = ?2, dismissed_at_us = ?3
         WHERE id = ?1 AND dismissed_at_us IS NULL",
        params![id.to_string(), dismissed_by, dismissed_at_us],
    )?;
    Ok(Some(ticket))
}

struct TicketRow {
    id: String,
    request_id: String,
    patient_id: String,
    patient_email: String,
    session_id: String,
    preview: String,
    status: String,
    resolved_by: Option<String>,
    version: i64,
    created_at_us: i64,
    resolved_at_us: Option<i64>,
}

fn ticket_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TicketRow> {
    Ok(TicketRow {
        id: row.get(0)?,
        request_id: row.get(1)?,
        patient_id: row.get(2)?,
        patient_email: row.get(3)?,
        session_id: row.get(4)?,
        preview: row.get(5)?,
        status: row.get(6)?,
        resolved_by: row.get(7)?,
        version: row.get(8)?,
        created_at_us: row.get(9)?,
        resolved_at_us: row.get(10)?,
    })
}

fn ticket_from_row(row: TicketRow) -> Result<EscalationTicket, DatabaseError> {
    Ok(EscalationTicket {
        id: parse_uuid("escalation_tickets.id", &row.id)?,
        request_id: row.request_id,
        patient_id: row.patient_id,
        patient_email: row.patient_email,
        session_id: parse_uuid("escalation_tickets.session_id", &row.session_id)?,
        preview: row.preview,
        status: TicketStatus::from_str(&row.status)?,
        resolved_by: row.resolved_by,
        version: row.version,
        created_at: micros_to_utc(row.created_at_us),
        resolved_at: row.resolved_at_us.map(micros_to_utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn ticket(request_id: &str, micros: i64) -> EscalationTicket {
        EscalationTicket {
            id: Uuid::new_v4(),
            request_id: request_id.into(),
            patient_id: "patient-1".into(),
            patient_email: "patient@example.com".into(),
            session_id: Uuid::new_v4(),
            preview: "Chest pain since morning".into(),
            status: TicketStatus::Pending,
            resolved_by: None,
            version: 0,
            created_at: micros_to_utc(micros),
            resolved_at: None,
        }
    }

    #[test]
    fn insert_and_lookup_by_request_id() {
        let conn = open_memory_database().unwrap();
        let t = ticket("req-1", 1_000);
        insert_ticket(&conn, &t).unwrap();

        assert_eq!(get_ticket(&conn, &t.id).unwrap().unwrap(), t);
        assert_eq!(
            get_ticket_by_request_id(&conn, "patient-1", "req-1").unwrap().unwrap().id,
            t.id
        );
        assert!(get_ticket_by_request_id(&conn, "patient-1", "req-2").unwrap().is_none());
        assert!(get_ticket_by_request_id(&conn, "patient-2", "req-1").unwrap().is_none());
    }

    #[test]
    fn request_id_is_unique_per_patient() {
        let conn = open_memory_database().unwrap();
        insert_ticket(&conn, &ticket("req-1", 1_000)).unwrap();
        assert!(insert_ticket(&conn, &ticket("req-1", 2_000)).is_err());

        let mut other = ticket("req-1", 3_000);
        other.patient_id = "patient-2".into();
        insert_ticket(&conn, &other).unwrap();
    }

    #[test]
    fn list_filters_by_status() {
        let conn = open_memory_database().unwrap();
        let a = ticket("req-a", 1_000);
        let b = ticket("req-b", 2_000);
        insert_ticket(&conn, &a).unwrap();
        insert_ticket(&conn, &b).unwrap();
        assert!(complete_ticket(&conn, &a.id, 0, "doctor@remedi.ng", 3_000).unwrap());

        let pending = list_tickets(&conn, Some(TicketStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);

        let all = list_tickets(&conn, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, b.id);
    }

    #[test]
    fn complete_is_compare_and_set() {
        let conn = open_memory_database().unwrap();
        let t = ticket("req-1", 1_000);
        insert_ticket(&conn, &t).unwrap();

        assert!(!complete_ticket(&conn, &t.id, 7, "doctor@remedi.ng", 2_000).unwrap());
        assert!(complete_ticket(&conn, &t.id, 0, "doctor@remedi.ng", 2_000).unwrap());
        assert!(!complete_ticket(&conn, &t.id, 1, "other@remedi.ng", 3_000).unwrap());

        let done = get_ticket(&conn, &t.id).unwrap().unwrap();
        assert_eq!(done.status, TicketStatus::Completed);
        assert_eq!(done.version, 1);
        assert_eq!(done.resolved_by.as_deref(), Some("doctor@remedi.ng"));
        assert_eq!(done.resolved_at, Some(micros_to_utc(2_000)));
    }

    #[test]
    fn completed_ticket_cannot_reopen() {
        let conn = open_memory_database().unwrap();
        let t = ticket("req-1", 1_000);
        insert_ticket(&conn, &t).unwrap();
        complete_ticket(&conn, &t.id, 0, "doctor@remedi.ng", 2_000).unwrap();

        let result = conn.execute(
            "UPDATE escalation_tickets SET status = 'pending' WHERE id = ?1",
            params![t.id.to_string()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn latest_ticket_for_session_prefers_newest() {
        let conn = open_memory_database().unwrap();
        let first = ticket("req-1", 1_000);
        let mut second = ticket("req-2", 2_000);
        second.session_id = first.session_id;
        insert_ticket(&conn, &first).unwrap();
        insert_ticket(&conn, &second).unwrap();

        let latest = latest_ticket_for_session(&conn, &first.session_id).unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert!(latest_ticket_for_session(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn dismissed_ticket_leaves_queue_but_keeps_request_id() {
        let conn = open_memory_database().unwrap();
        let t = ticket("req-1", 1_000);
        insert_ticket(&conn, &t).unwrap();

        let dismissed = dismiss_ticket(&conn, &t.id, "doctor@remedi.ng", 2_000).unwrap();
        assert_eq!(dismissed.unwrap().id, t.id);
        assert!(dismiss_ticket(&conn, &t.id, "doctor@remedi.ng", 3_000).unwrap().is_none());

        assert!(get_ticket(&conn, &t.id).unwrap().is_none());
        assert!(list_tickets(&conn, None).unwrap().is_empty());
        assert!(latest_ticket_for_session(&conn, &t.session_id).unwrap().is_none());
        assert_eq!(
            get_ticket_by_request_id(&conn, "patient-1", "req-1").unwrap().unwrap().id,
            t.id
        );
        assert!(insert_ticket(&conn, &ticket("req-1", 4_000)).is_err());
    }
}
