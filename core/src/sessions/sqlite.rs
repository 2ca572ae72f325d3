use r2d2_sqlite::rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use super::{
    from_millis, now_millis, to_millis, ChatSession, ChatTurn, Role, SessionStore, SessionSummary,
};
use crate::db::DbPool;
use crate::errors::StudioError;

/// SQLite-backed store. Turns are ordered by their autoincrement `seq`.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: DbPool,
}

impl SqliteSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SessionStore for SqliteSessionStore {
    fn create(&self) -> Result<String, StudioError> {
        let conn = self.pool.get()?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO chat_sessions (id, created_at) VALUES (?1, ?2)",
            params![id, to_millis(now_millis())],
        )?;
        Ok(id)
    }

    fn append(&self, session_id: &str, role: Role, text: &str) -> Result<ChatTurn, StudioError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !session_exists(&tx, session_id)? {
            return Err(StudioError::SessionNotFound(session_id.to_string()));
        }
        let turn = insert_turn(&tx, session_id, role, text)?;
        tx.commit()?;
        Ok(turn)
    }

    fn append_exchange(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(ChatTurn, ChatTurn), StudioError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !session_exists(&tx, session_id)? {
            return Err(StudioError::SessionNotFound(session_id.to_string()));
        }
        let user = insert_turn(&tx, session_id, Role::User, user_text)?;
        let assistant = insert_turn(&tx, session_id, Role::Assistant, assistant_text)?;
        tx.commit()?;
        Ok((user, assistant))
    }

    fn get(&self, session_id: &str) -> Result<ChatSession, StudioError> {
        let conn = self.pool.get()?;
        let created_at: Option<i64> = conn
            .query_row(
                "SELECT created_at FROM chat_sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        let created_at =
            created_at.ok_or_else(|| StudioError::SessionNotFound(session_id.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT role, body, created_at FROM chat_turns WHERE session_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let mut messages = Vec::new();
        for row in rows {
            let (role, body, ts) = row?;
            let role = Role::parse(&role)
                .ok_or_else(|| StudioError::Storage(format!("unknown stored role `{role}`")))?;
            messages.push(ChatTurn {
                role,
                text: body,
                timestamp: from_millis(ts),
            });
        }

        Ok(ChatSession {
            id: session_id.to_string(),
            created_at: from_millis(created_at),
            messages,
        })
    }

    fn delete(&self, session_id: &str) -> Result<bool, StudioError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM chat_turns WHERE session_id = ?1",
            params![session_id],
        )?;
        let removed = tx.execute(
            "DELETE FROM chat_sessions WHERE id = ?1",
            params![session_id],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn list(&self) -> Result<Vec<SessionSummary>, StudioError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.created_at, (SELECT COUNT(1) FROM chat_turns t WHERE t.session_id = s.id)
             FROM chat_sessions s
             ORDER BY s.created_at DESC, s.id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionSummary {
                id: row.get(0)?,
                created_at: from_millis(row.get(1)?),
                turn_count: row.get::<_, i64>(2)? as usize,
            })
        })?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }
}

fn insert_turn(
    conn: &Connection,
    session_id: &str,
    role: Role,
    text: &str,
) -> Result<ChatTurn, StudioError> {
    let timestamp = now_millis();
    conn.execute(
        "INSERT INTO chat_turns (session_id, role, body, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![session_id, role.as_str(), text, to_millis(timestamp)],
    )?;
    Ok(ChatTurn {
        role,
        text: text.to_string(),
        timestamp,
    })
}

fn session_exists(conn: &Connection, session_id: &str) -> Result<bool, StudioError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM chat_sessions WHERE id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> (tempfile::TempDir, SqliteSessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_db(dir.path().join("studio.db")).unwrap();
        (dir, SqliteSessionStore::new(pool))
    }

    #[test]
    fn turns_survive_round_trip_in_order() {
        let (_dir, store) = store();
        let id = store.create().unwrap();
        let first = store.append(&id, Role::User, "open on the harbour").unwrap();
        store.append(&id, Role::Assistant, "EXT. HARBOUR - DAWN").unwrap();
        store.append(&id, Role::User, "make it night").unwrap();

        let session = store.get(&id).unwrap();
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.messages[0], first);
        assert_eq!(session.messages[1].role, Role::Assistant);
        assert_eq!(session.messages[2].text, "make it night");
    }

    #[test]
    fn unknown_sessions_are_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.get("missing"), Err(StudioError::SessionNotFound(_))));
        assert!(matches!(
            store.append("missing", Role::User, "hi"),
            Err(StudioError::SessionNotFound(_))
        ));
        assert!(!store.delete("missing").unwrap());
    }

    #[test]
    fn delete_removes_session_and_turns() {
        let (_dir, store) = store();
        let id = store.create().unwrap();
        store.append(&id, Role::User, "hello").unwrap();
        assert!(store.delete(&id).unwrap());
        assert!(matches!(store.get(&id), Err(StudioError::SessionNotFound(_))));
        let conn = store.pool.get().unwrap();
        let orphans: i64 = conn
            .query_row("SELECT COUNT(1) FROM chat_turns", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn concurrent_exchanges_on_separate_sessions_all_commit() {
        let (_dir, store) = store();
        let ids: Vec<String> = (0..4).map(|_| store.create().unwrap()).collect();

        std::thread::scope(|scope| {
            for id in &ids {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..10 {
                        store
                            .append_exchange(id, &format!("beat {i}"), &format!("reply {i}"))
                            .unwrap();
                    }
                });
            }
        });

        for id in &ids {
            let session = store.get(id).unwrap();
            assert_eq!(session.messages.len(), 20);
            for chunk in session.messages.chunks(2) {
                assert_eq!(chunk[0].role, Role::User);
                assert_eq!(chunk[1].role, Role::Assistant);
                assert_eq!(chunk[1].text, chunk[0].text.replace("beat", "reply"));
            }
        }
    }

    #[test]
    fn exchange_on_unknown_session_writes_nothing() {
        let (_dir, store) = store();
        assert!(matches!(
            store.append_exchange("missing", "hi", "hello"),
            Err(StudioError::SessionNotFound(_))
        ));
        let conn = store.pool.get().unwrap();
        let turns: i64 = conn
            .query_row("SELECT COUNT(1) FROM chat_turns", [], |row| row.get(0))
            .unwrap();
        assert_eq!(turns, 0);
    }

    #[test]
    fn list_counts_turns_per_session() {
        let (_dir, store) = store();
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        store.append(&b, Role::User, "one").unwrap();
        store.append(&b, Role::Assistant, "two").unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed.iter().find(|s| s.id == a).unwrap().turn_count, 0);
        assert_eq!(listed.iter().find(|s| s.id == b).unwrap().turn_count, 2);
    }
}
