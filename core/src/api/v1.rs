//! Version 1 of the studio command surface.
//!
//! Handlers are thin wrappers that validate input, run blocking work off the
//! async workers, and return JSON-friendly payloads. Every failure a caller
//! can see is an [`ApiError`]; provider failures never reach this layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::agents::{
    CredentialChain, Domain, HttpProviderClient, ProviderFamily, ProviderUsed, StudioConfig,
};
use crate::db::{init_db, DbPool};
use crate::errors::{ApiError, StudioError};
use crate::model_manager::{ModelManager, ProbeReport};
use crate::sessions::{
    ChatSession, MemorySessionStore, SessionStore, SessionSummary, SqliteSessionStore,
};
use crate::studio::{Studio, StudioReply};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub studio: Arc<Studio>,
    pub db: Option<DbPool>,
}

impl ApiState {
    pub fn new(studio: Arc<Studio>, db: Option<DbPool>) -> Self {
        Self { studio, db }
    }

    /// Wire the database (when configured), the credential chain, the HTTP
    /// client and the session store from one configuration value.
    pub fn from_config(config: StudioConfig) -> anyhow::Result<Self> {
        let db = config.database_path.clone().map(init_db).transpose()?;
        let chain = CredentialChain::from_config(&config);
        let client = Arc::new(HttpProviderClient::from_config(&config)?);
        let manager = ModelManager::new(chain, client, db.clone());
        let sessions: Arc<dyn SessionStore> = match &db {
            Some(pool) => Arc::new(SqliteSessionStore::new(pool.clone())),
            None => Arc::new(MemorySessionStore::new()),
        };
        let studio = Arc::new(Studio::new(manager, sessions, &config, db.clone()));
        Ok(Self::new(studio, db))
    }

    fn mode(&self) -> &'static str {
        if self.studio.manager().chain().has_live() {
            "live"
        } else {
            "offline"
        }
    }
}

/// Health check. `mode` is `live` when any provider credential is configured.
pub fn ping(state: &ApiState) -> serde_json::Value {
    json!({
        "ok": true,
        "ts": OffsetDateTime::now_utc().unix_timestamp(),
        "mode": state.mode(),
    })
}

#[derive(Serialize)]
pub struct CreateSessionOutput {
    pub session_id: String,
}

pub async fn create_session(state: &ApiState) -> Result<CreateSessionOutput, ApiError> {
    let session_id = state.studio.create_session().await?;
    Ok(CreateSessionOutput { session_id })
}

pub async fn get_session(state: &ApiState, session_id: &str) -> Result<ChatSession, ApiError> {
    Ok(state.studio.get_session(session_id).await?)
}

pub async fn list_sessions(state: &ApiState) -> Result<Vec<SessionSummary>, ApiError> {
    Ok(state.studio.list_sessions().await?)
}

/// Deleting an unknown session is a not-found outcome, not a silent success.
pub async fn delete_session(
    state: &ApiState,
    session_id: &str,
) -> Result<serde_json::Value, ApiError> {
    if !state.studio.delete_session(session_id).await? {
        return Err(StudioError::SessionNotFound(session_id.to_string()).into());
    }
    Ok(json!({ "ok": true, "session_id": session_id }))
}

#[derive(Debug, Deserialize)]
pub struct ScriptChatInput {
    pub session_id: String,
    pub message: String,
}

pub async fn script_chat(state: &ApiState, input: ScriptChatInput) -> Result<StudioReply, ApiError> {
    Ok(state
        .studio
        .script_chat(&input.session_id, &input.message)
        .await?)
}

#[derive(Debug, Deserialize)]
pub struct InstructionInput {
    pub instruction: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn storyboard_suggest(
    state: &ApiState,
    input: InstructionInput,
) -> Result<StudioReply, ApiError> {
    Ok(state
        .studio
        .storyboard(&input.instruction, input.session_id.as_deref())
        .await?)
}

pub async fn video_review(
    state: &ApiState,
    input: InstructionInput,
) -> Result<StudioReply, ApiError> {
    Ok(state
        .studio
        .video_review(&input.instruction, input.session_id.as_deref())
        .await?)
}

#[derive(Debug, Deserialize)]
pub struct GenerateInput {
    pub domain: Domain,
    pub instruction: String,
}

/// Sessionless `{domain, instruction}` generation.
pub async fn generate(state: &ApiState, input: GenerateInput) -> Result<StudioReply, ApiError> {
    Ok(state
        .studio
        .run(input.domain, &input.instruction, None)
        .await?)
}

/// One candidate as shown to operators. The key is always redacted.
#[derive(Debug, Serialize)]
pub struct ProviderView {
    pub priority: u32,
    pub provider: ProviderUsed,
    pub base_url: String,
    pub model: String,
    pub family: Option<ProviderFamily>,
    pub api_key: Option<String>,
    pub is_offline: bool,
}

pub fn list_providers(state: &ApiState) -> Vec<ProviderView> {
    state
        .studio
        .manager()
        .chain()
        .candidates()
        .iter()
        .map(|candidate| ProviderView {
            priority: candidate.priority,
            provider: candidate.used(),
            base_url: candidate.base_url.clone(),
            model: candidate.model.clone(),
            family: candidate.family,
            api_key: candidate.redacted_key(),
            is_offline: candidate.is_offline,
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct ConnectionTestOutput {
    pub ok: bool,
    pub mode: &'static str,
    pub results: Vec<ProbeReport>,
}

/// Probe every live candidate once. `ok` is true when at least one answered.
pub async fn test_connection(state: &ApiState) -> ConnectionTestOutput {
    let results = state.studio.manager().probe().await;
    ConnectionTestOutput {
        ok: results.iter().any(|report| report.ok),
        mode: state.mode(),
        results,
    }
}

/// Structured AI runtime event for diagnostics.
#[derive(Debug, Serialize)]
pub struct AiRuntimeEvent {
    pub id: String,
    pub ts: i64,
    pub level: String,
    pub code: Option<String>,
    pub message: String,
    pub explain: Option<String>,
    pub data: Option<serde_json::Value>,
}

/// Most recent `ai.runtime` events first. Empty when no database is configured.
pub async fn list_ai_events(
    state: &ApiState,
    limit: Option<usize>,
) -> Result<Vec<AiRuntimeEvent>, ApiError> {
    let Some(pool) = state.db.clone() else {
        return Ok(Vec::new());
    };
    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit.map_or(-1, |n| n as i64);
    let events = tokio::task::spawn_blocking(move || -> Result<_, StudioError> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, ts, level, code, message, explain, data FROM event_log
             WHERE module = 'ai.runtime' ORDER BY ts DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], map_ai_event)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    })
    .await
    .map_err(|err| StudioError::Storage(format!("event query task failed: {err}")))??;
    Ok(events)
}

fn map_ai_event(row: &rusqlite::Row) -> rusqlite::Result<AiRuntimeEvent> {
    let data_str: Option<String> = row.get(6)?;
    let data = data_str.and_then(|raw| serde_json::from_str(&raw).ok());
    Ok(AiRuntimeEvent {
        id: row.get(0)?,
        ts: row.get(1)?,
        level: row.get(2)?,
        code: row.get(3)?,
        message: row.get(4)?,
        explain: row.get(5)?,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::offline;
    use crate::logging::{self, EventRecord};

    fn offline_state() -> ApiState {
        ApiState::from_config(StudioConfig::default()).unwrap()
    }

    fn config_with_key(key: &str) -> StudioConfig {
        StudioConfig::from_vars([
            ("OPENAI_API_KEY", key),
            // nothing listens on the discard port
            ("OPENAI_BASE_URL", "http://127.0.0.1:9/v1"),
            ("IFS_PROVIDER_TIMEOUT_SECS", "2"),
        ])
        .unwrap()
    }

    #[test]
    fn ping_reports_offline_without_credentials() {
        let state = offline_state();
        let body = ping(&state);
        assert_eq!(body["ok"], true);
        assert_eq!(body["mode"], "offline");
    }

    #[tokio::test]
    async fn generate_without_credentials_is_deterministic() {
        let state = offline_state();
        let input = || GenerateInput {
            domain: Domain::Script,
            instruction: "suggest an opening scene".into(),
        };
        let first = generate(&state, input()).await.unwrap();
        let second = generate(&state, input()).await.unwrap();
        assert_eq!(first.result.provider_used, ProviderUsed::Offline);
        assert!(first.result.degraded);
        assert_eq!(first.result.text, second.result.text);
        assert_eq!(
            first.result.text,
            offline::generate(Domain::Script, "suggest an opening scene", 0)
        );
    }

    #[tokio::test]
    async fn session_lifecycle_through_handlers() {
        let state = offline_state();
        let created = create_session(&state).await.unwrap();
        let reply = script_chat(
            &state,
            ScriptChatInput {
                session_id: created.session_id.clone(),
                message: "a courier loses the package".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(reply.turn_count, Some(2));

        let session = get_session(&state, &created.session_id).await.unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(list_sessions(&state).await.unwrap().len(), 1);

        delete_session(&state, &created.session_id).await.unwrap();
        let err = get_session(&state, &created.session_id).await.unwrap_err();
        assert_eq!(err.code, "SES-1001");
        let err = delete_session(&state, &created.session_id)
            .await
            .unwrap_err();
        assert_eq!(err.code, "SES-1001");
    }

    #[tokio::test]
    async fn empty_storyboard_instruction_is_invalid_input() {
        let state = offline_state();
        let err = storyboard_suggest(
            &state,
            InstructionInput {
                instruction: String::new(),
                session_id: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "GEN-1001");
    }

    #[tokio::test]
    async fn unreachable_provider_degrades_instead_of_failing() {
        let state = ApiState::from_config(config_with_key("sk-test-unreachable-0001")).unwrap();
        assert_eq!(ping(&state)["mode"], "live");
        let reply = video_review(
            &state,
            InstructionInput {
                instruction: "the middle drags and the ending is weak".into(),
                session_id: None,
            },
        )
        .await
        .unwrap();
        assert!(reply.result.degraded);
        assert_eq!(reply.result.provider_used, ProviderUsed::Offline);

        let probe = test_connection(&state).await;
        assert!(!probe.ok);
        assert_eq!(probe.results.len(), 1);
    }

    #[test]
    fn providers_are_listed_with_redacted_keys() {
        let state = ApiState::from_config(config_with_key("sk-test-unreachable-0001")).unwrap();
        let providers = list_providers(&state);
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].api_key.as_deref(), Some("****0001"));
        assert_eq!(providers[0].provider, ProviderUsed::Primary);
        assert!(providers[1].is_offline);
        assert_eq!(providers[1].api_key, None);
    }

    #[tokio::test]
    async fn ai_events_come_back_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StudioConfig::default();
        config.database_path = Some(dir.path().join("studio.db"));
        let state = ApiState::from_config(config).unwrap();

        for code in ["AI-0201", "AI-0200"] {
            logging::record(
                state.db.as_ref(),
                EventRecord {
                    level: log::Level::Info,
                    code,
                    module: "ai.runtime",
                    message: "test event",
                    explain: None,
                    data: None,
                },
            );
        }

        let events = list_ai_events(&state, Some(2)).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].code.as_deref(), Some("AI-0200"));
        assert_eq!(events[1].code.as_deref(), Some("AI-0201"));
    }

    #[tokio::test]
    async fn ai_events_are_empty_without_a_database() {
        let state = offline_state();
        assert!(list_ai_events(&state, None).await.unwrap().is_empty());
    }
}
