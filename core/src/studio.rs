//! Session-aware generation service.
//!
//! Every request that names a session takes that session's gate for the whole
//! read-context, generate, append sequence, so turns of one session never
//! interleave. Requests on different sessions run concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;

use crate::agents::{Domain, GenerationRequest, GenerationResult, StudioConfig};
use crate::db::DbPool;
use crate::errors::StudioError;
use crate::logging::{self, EventRecord};
use crate::model_manager::ModelManager;
use crate::sessions::{context_window, ChatSession, SessionStore, SessionSummary};

/// A generation result plus the session bookkeeping around it.
#[derive(Debug, Clone, Serialize)]
pub struct StudioReply {
    pub session_id: Option<String>,
    /// Turns stored in the session after this reply was appended.
    pub turn_count: Option<usize>,
    #[serde(flatten)]
    pub result: GenerationResult,
}

pub struct Studio {
    manager: Arc<ModelManager>,
    sessions: Arc<dyn SessionStore>,
    gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    context_turns: usize,
    context_token_budget: usize,
    pool: Option<DbPool>,
}

impl Studio {
    pub fn new(
        manager: Arc<ModelManager>,
        sessions: Arc<dyn SessionStore>,
        config: &StudioConfig,
        pool: Option<DbPool>,
    ) -> Self {
        Self {
            manager,
            sessions,
            gates: Mutex::new(HashMap::new()),
            context_turns: config.context_turns,
            context_token_budget: config.context_token_budget,
            pool,
        }
    }

    pub fn manager(&self) -> &Arc<ModelManager> {
        &self.manager
    }

    pub async fn create_session(&self) -> Result<String, StudioError> {
        let id = self.blocking(|store| store.create()).await?;
        logging::emit(
            self.pool.as_ref(),
            EventRecord {
                level: log::Level::Info,
                code: "SES-0001",
                module: "sessions",
                message: "chat session created",
                explain: None,
                data: Some(json!({ "session_id": id })),
            },
        );
        Ok(id)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<ChatSession, StudioError> {
        let id = session_id.to_string();
        self.blocking(move |store| store.get(&id)).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StudioError> {
        self.blocking(|store| store.list()).await
    }

    /// Waits for any in-flight turn on the session before removing it.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, StudioError> {
        let gate = self.gate(session_id)?;
        let _held = gate.lock().await;
        let id = session_id.to_string();
        let removed = self.blocking(move |store| store.delete(&id)).await?;
        self.forget_gate(session_id)?;
        if removed {
            logging::emit(
                self.pool.as_ref(),
                EventRecord {
                    level: log::Level::Info,
                    code: "SES-0002",
                    module: "sessions",
                    message: "chat session deleted",
                    explain: None,
                    data: Some(json!({ "session_id": session_id })),
                },
            );
        }
        Ok(removed)
    }

    /// Script chat always runs inside a session.
    pub async fn script_chat(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<StudioReply, StudioError> {
        self.run(Domain::Script, message, Some(session_id)).await
    }

    pub async fn storyboard(
        &self,
        instruction: &str,
        session_id: Option<&str>,
    ) -> Result<StudioReply, StudioError> {
        self.run(Domain::Storyboard, instruction, session_id).await
    }

    pub async fn video_review(
        &self,
        instruction: &str,
        session_id: Option<&str>,
    ) -> Result<StudioReply, StudioError> {
        self.run(Domain::Video, instruction, session_id).await
    }

    /// One generation turn. Without a session the request carries no context
    /// and nothing is stored.
    pub async fn run(
        &self,
        domain: Domain,
        instruction: &str,
        session_id: Option<&str>,
    ) -> Result<StudioReply, StudioError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(StudioError::InvalidInput(
                "instruction must not be empty".into(),
            ));
        }

        let Some(session_id) = session_id else {
            let request = GenerationRequest {
                context: Vec::new(),
                instruction: instruction.to_string(),
                domain,
            };
            let result = self.manager.generate(&request).await;
            return Ok(StudioReply {
                session_id: None,
                turn_count: None,
                result,
            });
        };

        let gate = self.gate(session_id)?;
        let outcome = {
            let _held = gate.lock().await;
            self.session_turn(domain, instruction, session_id).await
        };
        self.release_gate(session_id, gate)?;
        outcome
    }

    // Caller holds the session gate.
    async fn session_turn(
        &self,
        domain: Domain,
        instruction: &str,
        session_id: &str,
    ) -> Result<StudioReply, StudioError> {
        let id = session_id.to_string();
        let session = self.blocking(move |store| store.get(&id)).await?;

        let request = GenerationRequest {
            context: context_window(
                &session.messages,
                self.context_turns,
                self.context_token_budget,
            ),
            instruction: instruction.to_string(),
            domain,
        };
        log::debug!(
            "session {} turn with {} context turn(s)",
            session_id,
            request.context.len()
        );
        let result = self.manager.generate(&request).await;

        let id = session_id.to_string();
        let user_text = request.instruction;
        let reply_text = result.text.clone();
        self.blocking(move |store| store.append_exchange(&id, &user_text, &reply_text))
            .await?;

        Ok(StudioReply {
            session_id: Some(session_id.to_string()),
            turn_count: Some(session.messages.len() + 2),
            result,
        })
    }

    fn gate(&self, session_id: &str) -> Result<Arc<AsyncMutex<()>>, StudioError> {
        let mut gates = self
            .gates
            .lock()
            .map_err(|_| StudioError::Storage("session gate map poisoned".into()))?;
        Ok(Arc::clone(gates.entry(session_id.to_string()).or_default()))
    }

    /// Drop the map entry once no other request holds or waits on `gate`.
    fn release_gate(
        &self,
        session_id: &str,
        gate: Arc<AsyncMutex<()>>,
    ) -> Result<(), StudioError> {
        let mut gates = self
            .gates
            .lock()
            .map_err(|_| StudioError::Storage("session gate map poisoned".into()))?;
        let idle = gates
            .get(session_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &gate) && Arc::strong_count(&gate) == 2);
        if idle {
            gates.remove(session_id);
        }
        Ok(())
    }

    fn forget_gate(&self, session_id: &str) -> Result<(), StudioError> {
        self.gates
            .lock()
            .map_err(|_| StudioError::Storage("session gate map poisoned".into()))?
            .remove(session_id);
        Ok(())
    }

    // Store implementations are synchronous; keep them off the async workers.
    async fn blocking<T, F>(&self, work: F) -> Result<T, StudioError>
    where
        F: FnOnce(&dyn SessionStore) -> Result<T, StudioError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.sessions);
        tokio::task::spawn_blocking(move || work(store.as_ref()))
            .await
            .map_err(|err| StudioError::Storage(format!("session task failed: {err}")))?
    }
}
