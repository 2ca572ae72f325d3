use serde::{Deserialize, Serialize};

use super::orchestrator::{AiChatMessage, GenerationRequest};

/// Creative area a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Script,
    Storyboard,
    Video,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Storyboard => "storyboard",
            Self::Video => "video",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Script => "You are a film development copilot. Return clear markdown sections.",
            Self::Storyboard => {
                "You are a storyboard supervisor. Return practical markdown shot plans."
            }
            Self::Video => {
                "You are a senior film editor. Return concise high-leverage notes in markdown."
            }
        }
    }
}

/// System prompt, then prior turns oldest first, then the new instruction.
pub fn build_messages(request: &GenerationRequest) -> Vec<AiChatMessage> {
    let mut messages = Vec::with_capacity(request.context.len() + 2);
    messages.push(AiChatMessage {
        role: "system".into(),
        content: request.domain.system_prompt().into(),
    });
    for turn in &request.context {
        messages.push(AiChatMessage {
            role: turn.role.as_str().into(),
            content: turn.text.clone(),
        });
    }
    messages.push(AiChatMessage {
        role: "user".into(),
        content: request.instruction.clone(),
    });
    messages
}
