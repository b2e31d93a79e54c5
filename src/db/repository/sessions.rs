use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_session(conn: &Connection, session: &Session) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sessions (id, owner_id, created_at_us, preview) VALUES (?1, ?2, ?3, ?4)",
        params![
            session.id.to_string(),
            session.owner_id,
            session.created_at.timestamp_micros(),
            session.preview,
        ],
    )?;
    Ok(())
}

pub fn get_session(conn: &Connection, id: &Uuid) -> Result<Option<Session>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, owner_id, created_at_us, preview FROM sessions WHERE id = ?1",
            params![id.to_string()],
            session_row,
        )
        .optional()?;
    row.map(session_from_row).transpose()
}

/// Sessions owned by `owner_id`, newest first.
pub fn list_sessions_by_owner(
    conn: &Connection,
    owner_id: &str,
) -> Result<Vec<Session>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, created_at_us, preview FROM sessions
         WHERE owner_id = ?1 ORDER BY created_at_us DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![owner_id], session_row)?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(session_from_row(row?)?);
    }
    Ok(sessions)
}

pub fn update_session_preview(
    conn: &Connection,
    id: &Uuid,
    preview: &str,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE sessions SET preview = ?2 WHERE id = ?1",
        params![id.to_string(), preview],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("Session", id));
    }
    Ok(())
}

/// Counts removed by a session deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDeletion {
    pub messages: usize,
}

/// Delete a session and every message in it as one unit.
///
/// Tickets referencing the session are left in place for the clinician
/// queue's history.
pub fn delete_session(conn: &mut Connection, id: &Uuid) -> Result<SessionDeletion, DatabaseError> {
    let tx = conn.transaction()?;
    let messages = tx.execute(
        "DELETE FROM messages WHERE session_id = ?1",
        params![id.to_string()],
    )?;
    let sessions = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id.to_string()])?;
    if sessions == 0 {
        return Err(DatabaseError::not_found("Session", id));
    }
    tx.commit()?;
    Ok(SessionDeletion { messages })
}

struct SessionRow {
    id: String,
    owner_id: String,
    created_at_us: i64,
    preview: String,
}

fn session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        created_at_us: row.get(2)?,
        preview: row.get(3)?,
    })
}

fn session_from_row(row: SessionRow) -> Result<Session, DatabaseError> {
    Ok(Session {
        id: parse_uuid("sessions.id", &row.id)?,
        owner_id: row.owner_id,
        created_at: micros_to_utc(row.created_at_us),
        preview: row.preview,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::db::repository::{get_messages_by_session, insert_message};
    use crate::models::enums::MessageRole;

    fn session(owner: &str, micros: i64) -> Session {
        Session {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            created_at: micros_to_utc(micros),
            preview: String::new(),
        }
    }

    #[test]
    fn insert_and_get_session() {
        let conn = open_memory_database().unwrap();
        let s = session("patient-1", 1_000);
        insert_session(&conn, &s).unwrap();

        let loaded = get_session(&conn, &s.id).unwrap().unwrap();
        assert_eq!(loaded, s);
        assert!(get_session(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn list_is_owner_scoped_and_newest_first() {
        let conn = open_memory_database().unwrap();
        let older = session("patient-1", 1_000);
        let newer = session("patient-1", 2_000);
        let other = session("patient-2", 3_000);
        for s in [&older, &newer, &other] {
            insert_session(&conn, s).unwrap();
        }

        let list = list_sessions_by_owner(&conn, "patient-1").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, newer.id);
        assert_eq!(list[1].id, older.id);
    }

    #[test]
    fn preview_update_requires_existing_session() {
        let conn = open_memory_database().unwrap();
        let s = session("patient-1", 1_000);
        insert_session(&conn, &s).unwrap();

        update_session_preview(&conn, &s.id, "I have a headache...").unwrap();
        assert_eq!(
            get_session(&conn, &s.id).unwrap().unwrap().preview,
            "I have a headache..."
        );

        let err = update_session_preview(&conn, &Uuid::new_v4(), "x").unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn delete_session_removes_messages() {
        let mut conn = open_memory_database().unwrap();
        let s = session("patient-1", 1_000);
        insert_session(&conn, &s).unwrap();
        for text in ["one", "two"] {
            insert_message(&conn, &s.id, Uuid::new_v4(), MessageRole::Patient, text).unwrap();
        }

        let deleted = delete_session(&mut conn, &s.id).unwrap();
        assert_eq!(deleted.messages, 2);
        assert!(get_session(&conn, &s.id).unwrap().is_none());
        assert!(get_messages_by_session(&conn, &s.id).unwrap().is_empty());
    }

    #[test]
    fn delete_missing_session_is_not_found() {
        let mut conn = open_memory_database().unwrap();
        let err = delete_session(&mut conn, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
