use std::str::FromStr;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::MessageRole;
use crate::models::*;

/// Next store timestamp for a session: wall clock, bumped past the
/// session's latest message so ordering is strictly increasing.
pub fn next_message_timestamp(conn: &Connection, session_id: &Uuid) -> Result<i64, DatabaseError> {
    let last: Option<i64> = conn.query_row(
        "SELECT MAX(created_at_us) FROM messages WHERE session_id = ?1",
        params![session_id.to_string()],
        |row| row.get(0),
    )?;
    let now = Utc::now().timestamp_micros();
    Ok(match last {
        Some(last) if last >= now => last + 1,
        _ => now,
    })
}

/// Append a message. The timestamp is assigned here, never by the caller.
pub fn insert_message(
    conn: &Connection,
    session_id: &Uuid,
    id: Uuid,
    role: MessageRole,
    text: &str,
) -> Result<Message, DatabaseError> {
    let created_at_us = next_message_timestamp(conn, session_id)?;
    conn.execute(
        "INSERT INTO messages (id, session_id, role, text, created_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id.to_string(),
            session_id.to_string(),
            role.as_str(),
            text,
            created_at_us,
        ],
    )?;
    Ok(Message {
        id,
        session_id: *session_id,
        role,
        text: text.to_string(),
        created_at: micros_to_utc(created_at_us),
    })
}

/// Messages in a session, ascending by store timestamp.
pub fn get_messages_by_session(
    conn: &Connection,
    session_id: &Uuid,
) -> Result<Vec<Message>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, role, text, created_at_us
         FROM messages WHERE session_id = ?1 ORDER BY created_at_us ASC, seq ASC",
    )?;

    let rows = stmt.query_map(params![session_id.to_string()], |row| {
        Ok(MessageRow {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role: row.get(2)?,
            text: row.get(3)?,
            created_at_us: row.get(4)?,
        })
    })?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(message_from_row(row?)?);
    }
    Ok(messages)
}

/// Text of the earliest message in a session, if any.
pub fn first_message_text(
    conn: &Connection,
    session_id: &Uuid,
) -> Result<Option<String>, DatabaseError> {
    let text = conn
        .query_row(
            "SELECT text FROM messages WHERE session_id = ?1
             ORDER BY created_at_us ASC, seq ASC LIMIT 1",
            params![session_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(text)
}

struct MessageRow {
    id: String,
    session_id: String,
    role: String,
    text: String,
    created_at_us: i64,
}

fn message_from_row(row: MessageRow) -> Result<Message, DatabaseError> {
    Ok(Message {
        id: parse_uuid("messages.id", &row.id)?,
        session_id: parse_uuid("messages.session_id", &row.session_id)?,
        role: MessageRole::from_str(&row.role)?,
        text: row.text,
        created_at: micros_to_utc(row.created_at_us),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_session;
    use crate::db::sqlite::open_memory_database;

    fn seeded() -> (Connection, Uuid) {
        let conn = open_memory_database().unwrap();
        let session = Session {
            id: Uuid::new_v4(),
            owner_id: "patient-1".into(),
            created_at: Utc::now(),
            preview: String::new(),
        };
        insert_session(&conn, &session).unwrap();
        (conn, session.id)
    }

    #[test]
    fn timestamps_strictly_increase_within_session() {
        let (conn, sid) = seeded();
        let mut previous = None;
        for i in 0..50 {
            let msg =
                insert_message(&conn, &sid, Uuid::new_v4(), MessageRole::Patient, &format!("m{i}"))
                    .unwrap();
            if let Some(prev) = previous {
                assert!(msg.created_at > prev);
            }
            previous = Some(msg.created_at);
        }
    }

    #[test]
    fn timestamp_moves_past_future_dated_rows() {
        let (conn, sid) = seeded();
        let future = Utc::now().timestamp_micros() + 60_000_000;
        conn.execute(
            "INSERT INTO messages (id, session_id, role, text, created_at_us)
             VALUES (?1, ?2, 'assistant', 'later', ?3)",
            params![Uuid::new_v4().to_string(), sid.to_string(), future],
        )
        .unwrap();

        assert_eq!(next_message_timestamp(&conn, &sid).unwrap(), future + 1);
    }

    #[test]
    fn messages_return_in_insertion_order() {
        let (conn, sid) = seeded();
        insert_message(&conn, &sid, Uuid::new_v4(), MessageRole::Patient, "headache").unwrap();
        insert_message(&conn, &sid, Uuid::new_v4(), MessageRole::Assistant, "how long?").unwrap();
        insert_message(&conn, &sid, Uuid::new_v4(), MessageRole::Patient, "two days").unwrap();

        let texts: Vec<_> = get_messages_by_session(&conn, &sid)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["headache", "how long?", "two days"]);
        assert_eq!(first_message_text(&conn, &sid).unwrap().as_deref(), Some("headache"));
    }

    #[test]
    fn message_requires_existing_session() {
        let conn = open_memory_database().unwrap();
        let result = insert_message(&conn, &Uuid::new_v4(), Uuid::new_v4(), MessageRole::Patient, "x");
        assert!(matches!(result, Err(DatabaseError::Sqlite(_))));
    }

    #[test]
    fn empty_session_has_no_first_message() {
        let (conn, sid) = seeded();
        assert!(first_message_text(&conn, &sid).unwrap().is_none());
    }
}
