//! Chat session storage and prompt context windows.
//!
//! Stores only guarantee that each individual operation is atomic. Whole
//! request turns on one session are serialized one level up, in
//! [`crate::studio::Studio`].

mod memory;
mod sqlite;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::errors::StudioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub messages: Vec<ChatTurn>,
}

/// Listing row returned by [`SessionStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub turn_count: usize,
}

pub trait SessionStore: Send + Sync {
    /// Create an empty session and return its id.
    fn create(&self) -> Result<String, StudioError>;

    /// Append a turn. Fails with `SessionNotFound` for unknown ids.
    fn append(&self, session_id: &str, role: Role, text: &str) -> Result<ChatTurn, StudioError>;

    /// Append a user turn and the assistant reply as one atomic write, so a
    /// session never holds a user turn without its answer.
    fn append_exchange(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(ChatTurn, ChatTurn), StudioError>;

    fn get(&self, session_id: &str) -> Result<ChatSession, StudioError>;

    /// Returns `false` when no session had that id.
    fn delete(&self, session_id: &str) -> Result<bool, StudioError>;

    /// Sessions ordered newest first.
    fn list(&self) -> Result<Vec<SessionSummary>, StudioError>;
}

/// Current UTC time truncated to milliseconds, the precision both stores keep.
pub(crate) fn now_millis() -> OffsetDateTime {
    from_millis(to_millis(OffsetDateTime::now_utc()))
}

pub(crate) fn to_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Estimate tokens using a simple character based heuristic.
pub fn approx_tokens(text: &str) -> usize {
    let chars = text.chars().count() as f32;
    let words = text.split_whitespace().count() as f32;
    let char_est = (chars / 4.0).ceil();
    let word_est = (words * 1.1).ceil();
    char_est.max(word_est).max(1.0) as usize
}

/// The most recent turns that fit both `max_turns` and `token_budget`,
/// oldest dropped first, returned in chronological order.
///
/// When the newest turn alone is over budget it is still kept, cut to
/// roughly `token_budget` tokens, so a follow-up never loses the turn it
/// answers.
pub fn context_window(turns: &[ChatTurn], max_turns: usize, token_budget: usize) -> Vec<ChatTurn> {
    let mut window = Vec::new();
    let mut spent = 0usize;
    for turn in turns.iter().rev().take(max_turns) {
        let cost = approx_tokens(&turn.text);
        if spent + cost > token_budget {
            break;
        }
        spent += cost;
        window.push(turn.clone());
    }
    if window.is_empty() && max_turns > 0 && token_budget > 0 {
        if let Some(newest) = turns.last() {
            let mut clipped = newest.clone();
            clipped.text = newest.text.chars().take(token_budget * 4).collect();
            window.push(clipped);
        }
    }
    window.reverse();
    window
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, text: &str) -> ChatTurn {
        ChatTurn {
            role,
            text: text.to_string(),
            timestamp: now_millis(),
        }
    }

    #[test]
    fn approx_tokens_scales_with_length() {
        assert!(approx_tokens("short") > 0);
        assert!(approx_tokens(&"word".repeat(40)) > approx_tokens("hello"));
    }

    #[test]
    fn window_keeps_the_newest_turns_in_order() {
        let turns: Vec<ChatTurn> = (0..20)
            .map(|i| turn(if i % 2 == 0 { Role::User } else { Role::Assistant }, &format!("turn {i}")))
            .collect();
        let window = context_window(&turns, 12, 10_000);
        assert_eq!(window.len(), 12);
        assert_eq!(window.first().unwrap().text, "turn 8");
        assert_eq!(window.last().unwrap().text, "turn 19");
    }

    #[test]
    fn window_drops_oldest_when_over_budget() {
        let turns = vec![
            turn(Role::User, &"long ".repeat(200)),
            turn(Role::Assistant, "short reply"),
            turn(Role::User, "follow up"),
        ];
        let window = context_window(&turns, 12, 20);
        let texts: Vec<&str> = window.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["short reply", "follow up"]);
    }

    #[test]
    fn oversized_newest_turn_is_clipped_not_dropped() {
        let huge = "x".repeat(1000);
        let turns = vec![turn(Role::User, "earlier"), turn(Role::Assistant, &huge)];
        let window = context_window(&turns, 12, 50);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].role, Role::Assistant);
        assert_eq!(window[0].text.chars().count(), 200);
        assert!(huge.starts_with(&window[0].text));
        assert!(context_window(&turns, 12, 0).is_empty());
        assert!(context_window(&[], 12, 50).is_empty());
    }

    #[test]
    fn millisecond_round_trip_is_lossless() {
        let ts = now_millis();
        assert_eq!(from_millis(to_millis(ts)), ts);
    }

    #[test]
    fn roles_parse_from_storage_strings() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse(Role::Assistant.as_str()), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), None);
    }
}
