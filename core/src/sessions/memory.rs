use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use super::{now_millis, ChatSession, ChatTurn, Role, SessionStore, SessionSummary};
use crate::errors::StudioError;

/// Process-local store used when no database path is configured.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, ChatSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, ChatSession>>, StudioError> {
        self.sessions
            .lock()
            .map_err(|_| StudioError::Storage("session map lock poisoned".into()))
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self) -> Result<String, StudioError> {
        let id = Uuid::new_v4().to_string();
        let session = ChatSession {
            id: id.clone(),
            created_at: now_millis(),
            messages: Vec::new(),
        };
        self.lock()?.insert(id.clone(), session);
        Ok(id)
    }

    fn append(&self, session_id: &str, role: Role, text: &str) -> Result<ChatTurn, StudioError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StudioError::SessionNotFound(session_id.to_string()))?;
        let turn = ChatTurn {
            role,
            text: text.to_string(),
            timestamp: now_millis(),
        };
        session.messages.push(turn.clone());
        Ok(turn)
    }

    fn append_exchange(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(ChatTurn, ChatTurn), StudioError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StudioError::SessionNotFound(session_id.to_string()))?;
        let timestamp = now_millis();
        let user = ChatTurn {
            role: Role::User,
            text: user_text.to_string(),
            timestamp,
        };
        let assistant = ChatTurn {
            role: Role::Assistant,
            text: assistant_text.to_string(),
            timestamp,
        };
        session.messages.push(user.clone());
        session.messages.push(assistant.clone());
        Ok((user, assistant))
    }

    fn get(&self, session_id: &str) -> Result<ChatSession, StudioError> {
        self.lock()?
            .get(session_id)
            .cloned()
            .ok_or_else(|| StudioError::SessionNotFound(session_id.to_string()))
    }

    fn delete(&self, session_id: &str) -> Result<bool, StudioError> {
        Ok(self.lock()?.remove(session_id).is_some())
    }

    fn list(&self) -> Result<Vec<SessionSummary>, StudioError> {
        let mut summaries: Vec<SessionSummary> = self
            .lock()?
            .values()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                created_at: s.created_at,
                turn_count: s.messages.len(),
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }
}
