//! Credential chain resolution.
//!
//! The chain is built once from [`StudioConfig`] and is read-only afterwards.
//! Live candidates carry priorities `0..n` in attempt order; the offline
//! pseudo-candidate always sits last with priority `n`.

use std::fmt;

use serde::{Serialize, Serializer};

use super::config::{ProviderFamily, StudioConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const OFFLINE_MODEL: &str = "demo-fallback";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub priority: u32,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub is_offline: bool,
    pub family: Option<ProviderFamily>,
}

impl ProviderConfig {
    fn offline(priority: u32) -> Self {
        Self {
            priority,
            base_url: String::new(),
            api_key: None,
            model: OFFLINE_MODEL.to_string(),
            is_offline: true,
            family: None,
        }
    }

    pub fn used(&self) -> ProviderUsed {
        if self.is_offline {
            ProviderUsed::Offline
        } else if self.priority == 0 {
            ProviderUsed::Primary
        } else {
            ProviderUsed::Fallback(self.priority)
        }
    }

    /// Key with everything but the last four characters masked.
    pub fn redacted_key(&self) -> Option<String> {
        self.api_key.as_deref().map(|key| {
            let chars: Vec<char> = key.chars().collect();
            if chars.len() <= 8 {
                "****".to_string()
            } else {
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("****{tail}")
            }
        })
    }
}

/// Which candidate produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderUsed {
    Primary,
    Fallback(u32),
    Offline,
}

impl fmt::Display for ProviderUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback(n) => write!(f, "fallback_{n}"),
            Self::Offline => f.write_str("offline"),
        }
    }
}

impl Serialize for ProviderUsed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone)]
pub struct CredentialChain {
    candidates: Vec<ProviderConfig>,
}

impl CredentialChain {
    pub fn from_config(config: &StudioConfig) -> Self {
        let mut candidates: Vec<ProviderConfig> = config
            .slots
            .iter()
            .zip(0u32..)
            .map(|(slot, priority)| ProviderConfig {
                priority,
                base_url: slot
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                api_key: Some(slot.api_key.clone()),
                model: slot.model.clone(),
                is_offline: false,
                family: Some(slot.family),
            })
            .collect();
        let offline_priority = candidates.len() as u32;
        candidates.push(ProviderConfig::offline(offline_priority));
        Self { candidates }
    }

    /// Every candidate in attempt order, offline last.
    pub fn candidates(&self) -> &[ProviderConfig] {
        &self.candidates
    }

    pub fn live(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.candidates.iter().filter(|c| !c.is_offline)
    }

    pub fn has_live(&self) -> bool {
        self.live().next().is_some()
    }

    pub fn offline(&self) -> &ProviderConfig {
        // from_config always appends the offline candidate
        &self.candidates[self.candidates.len() - 1]
    }

    /// Next untried candidate after `after`, or the first one when `after`
    /// is `None`. Returns `None` once the offline candidate has been passed.
    pub fn resolve_next(&self, after: Option<u32>) -> Option<&ProviderConfig> {
        self.candidates
            .iter()
            .find(|candidate| after.map_or(true, |prev| candidate.priority > prev))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(vars: &[(&str, &str)]) -> CredentialChain {
        let cfg = StudioConfig::from_vars(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())))
            .unwrap();
        CredentialChain::from_config(&cfg)
    }

    #[test]
    fn empty_config_resolves_straight_to_offline() {
        let chain = chain(&[]);
        assert!(!chain.has_live());
        let first = chain.resolve_next(None).unwrap();
        assert!(first.is_offline);
        assert_eq!(first.used(), ProviderUsed::Offline);
        assert!(chain.resolve_next(Some(first.priority)).is_none());
    }

    #[test]
    fn walking_the_chain_is_strictly_ascending_and_ends_offline() {
        let chain = chain(&[
            ("OPENAI_API_KEY", "key-primary"),
            ("OPENAI_API_KEY_FALLBACK", "key-legacy"),
            ("OPENAI_API_KEY_FALLBACK_1", "key-one"),
            ("OPENAI_API_KEY_FALLBACK_7", "key-seven"),
        ]);
        let mut visited = Vec::new();
        let mut cursor = None;
        while let Some(candidate) = chain.resolve_next(cursor) {
            visited.push(candidate.clone());
            cursor = Some(candidate.priority);
        }
        let priorities: Vec<u32> = visited.iter().map(|c| c.priority).collect();
        assert_eq!(priorities, vec![0, 1, 2, 3, 4]);
        assert!(visited.last().unwrap().is_offline);
        assert_eq!(visited.iter().filter(|c| c.is_offline).count(), 1);
        assert_eq!(visited[0].api_key.as_deref(), Some("key-primary"));
        assert_eq!(visited[2].api_key.as_deref(), Some("key-one"));
    }

    #[test]
    fn missing_base_url_defaults_to_openai() {
        let chain = chain(&[("OPENAI_API_KEY", "key-primary")]);
        assert_eq!(chain.candidates()[0].base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn provider_used_labels() {
        assert_eq!(ProviderUsed::Primary.to_string(), "primary");
        assert_eq!(ProviderUsed::Fallback(2).to_string(), "fallback_2");
        assert_eq!(
            serde_json::to_value(ProviderUsed::Offline).unwrap(),
            serde_json::json!("offline")
        );
    }

    #[test]
    fn redacted_key_keeps_only_the_tail() {
        let chain = chain(&[("OPENAI_API_KEY", "sk-abcdefghijkl")]);
        assert_eq!(chain.candidates()[0].redacted_key().as_deref(), Some("****ijkl"));
        assert_eq!(chain.offline().redacted_key(), None);
    }
}
