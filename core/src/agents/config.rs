//! Start-up configuration for the provider chain.
//!
//! Credentials arrive as environment-style key/value pairs. They are parsed
//! once into a [`StudioConfig`] which is then passed explicitly to the
//! components that need it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::errors::StudioError;

pub const DEFAULT_CHAT_MODEL: &str = "google/gemini-2.5-flash-lite-preview-09-2025";
pub const DEFAULT_OPENAI_FALLBACK_MODEL: &str = "gpt-4.1-mini";
pub const HACKCLUB_BASE_URL: &str = "https://ai.hackclub.com/proxy/v1";

const NUMBERED_KEY_PREFIX: &str = "OPENAI_API_KEY_FALLBACK_";

/// Where a slot was declared in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum SlotSource {
    Primary,
    LegacyFallback,
    Numbered(u32),
}

/// Provider family, used for optional family ordering and for model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    HackClub,
    OpenAi,
    Other,
}

impl ProviderFamily {
    pub fn detect(api_key: &str, base_url: Option<&str>) -> Self {
        let base_lower = base_url.map(str::to_lowercase);
        if api_key.starts_with("sk-hc-")
            || base_lower
                .as_deref()
                .is_some_and(|url| url.contains("hackclub.com"))
        {
            return Self::HackClub;
        }
        let is_openai = match base_lower.as_deref() {
            Some(url) => url.contains("openai.com"),
            None => api_key.starts_with("sk-"),
        };
        if is_openai {
            Self::OpenAi
        } else {
            Self::Other
        }
    }
}

/// How the resolved slots are ordered before priorities are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainOrdering {
    /// Primary, legacy fallback, then numbered slots ascending.
    Slot,
    /// Hack Club, then OpenAI, then everything else; slot order within a family.
    Family,
}

/// A credential slot after trimming, base-url resolution and model selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSlot {
    pub source: SlotSource,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub family: ProviderFamily,
}

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub slots: Vec<ProviderSlot>,
    pub default_chat_model: String,
    pub openai_fallback_model: String,
    pub ordering: ChainOrdering,
    pub request_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub context_turns: usize,
    pub context_token_budget: usize,
    pub database_path: Option<PathBuf>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            default_chat_model: DEFAULT_CHAT_MODEL.to_string(),
            openai_fallback_model: DEFAULT_OPENAI_FALLBACK_MODEL.to_string(),
            ordering: ChainOrdering::Slot,
            request_timeout: Duration::from_secs(45),
            max_tokens: 1024,
            temperature: 0.7,
            context_turns: 12,
            context_token_budget: 3000,
            database_path: None,
        }
    }
}

impl StudioConfig {
    /// Read the process environment, after loading a `.env` file if one is
    /// present. Values already set in the environment win over `.env`.
    pub fn from_env() -> Result<Self, StudioError> {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("loaded environment from {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => log::warn!("ignoring unreadable .env file: {err}"),
        }
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, StudioError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(k, v)| {
                let value = v.into().trim().to_string();
                (!value.is_empty()).then(|| (k.into(), value))
            })
            .collect();
        let get = |name: &str| env.get(name).cloned();

        let defaults = Self::default();
        let default_chat_model = get("OPENAI_DEFAULT_CHAT_MODEL").unwrap_or(defaults.default_chat_model);
        let openai_fallback_model =
            get("OPENAI_FALLBACK_OPENAI_MODEL").unwrap_or(defaults.openai_fallback_model);

        let ordering = match get("IFS_PROVIDER_ORDER").as_deref() {
            None | Some("slot") => ChainOrdering::Slot,
            Some("family") => ChainOrdering::Family,
            Some(other) => {
                return Err(StudioError::InvalidConfig(format!(
                    "IFS_PROVIDER_ORDER must be `slot` or `family`, got `{other}`"
                )))
            }
        };

        let timeout_secs: u64 = parse_or(&env, "IFS_PROVIDER_TIMEOUT_SECS", 45)?;
        if timeout_secs == 0 {
            return Err(StudioError::InvalidConfig(
                "IFS_PROVIDER_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }

        let mut builder = SlotBuilder {
            default_chat_model: &default_chat_model,
            openai_fallback_model: &openai_fallback_model,
            seen: HashSet::new(),
            slots: Vec::new(),
        };
        builder.push(
            SlotSource::Primary,
            get("OPENAI_API_KEY"),
            get("OPENAI_BASE_URL"),
            None,
        );
        builder.push(
            SlotSource::LegacyFallback,
            get("OPENAI_API_KEY_FALLBACK"),
            get("OPENAI_BASE_URL_FALLBACK"),
            get("OPENAI_MODEL_FALLBACK"),
        );
        for (index, api_key) in numbered_slots(&env) {
            builder.push(
                SlotSource::Numbered(index),
                Some(api_key),
                get(&format!("OPENAI_BASE_URL_FALLBACK_{index}")),
                get(&format!("OPENAI_MODEL_FALLBACK_{index}")),
            );
        }

        let mut slots = builder.slots;
        if ordering == ChainOrdering::Family {
            // stable sort keeps slot order inside each family
            slots.sort_by_key(|slot| match slot.family {
                ProviderFamily::HackClub => 0,
                ProviderFamily::OpenAi => 1,
                ProviderFamily::Other => 2,
            });
        }

        Ok(Self {
            slots,
            default_chat_model,
            openai_fallback_model,
            ordering,
            request_timeout: Duration::from_secs(timeout_secs),
            max_tokens: parse_or(&env, "IFS_MAX_TOKENS", defaults.max_tokens)?,
            temperature: parse_or(&env, "IFS_TEMPERATURE", defaults.temperature)?,
            context_turns: parse_or(&env, "IFS_CONTEXT_TURNS", defaults.context_turns)?,
            context_token_budget: parse_or(
                &env,
                "IFS_CONTEXT_TOKEN_BUDGET",
                defaults.context_token_budget,
            )?,
            database_path: get("IFS_DATABASE_PATH").map(PathBuf::from),
        })
    }
}

struct SlotBuilder<'a> {
    default_chat_model: &'a str,
    openai_fallback_model: &'a str,
    seen: HashSet<(String, Option<String>, String)>,
    slots: Vec<ProviderSlot>,
}

impl SlotBuilder<'_> {
    fn push(
        &mut self,
        source: SlotSource,
        api_key: Option<String>,
        base_url: Option<String>,
        model_override: Option<String>,
    ) {
        let Some(api_key) = api_key else {
            return;
        };
        let base_url = base_url.or_else(|| {
            api_key
                .starts_with("sk-hc-")
                .then(|| HACKCLUB_BASE_URL.to_string())
        });
        let family = ProviderFamily::detect(&api_key, base_url.as_deref());
        let model = model_override.unwrap_or_else(|| {
            let default_lower = self.default_chat_model.to_lowercase();
            let google_default =
                default_lower.starts_with("google/") || default_lower.contains("gemini");
            if family == ProviderFamily::OpenAi && google_default {
                self.openai_fallback_model.to_string()
            } else {
                self.default_chat_model.to_string()
            }
        });

        let marker = (api_key.clone(), base_url.clone(), model.clone());
        if !self.seen.insert(marker) {
            log::debug!("skipping duplicate provider slot {source:?}");
            return;
        }
        self.slots.push(ProviderSlot {
            source,
            api_key,
            base_url,
            model,
            family,
        });
    }
}

/// Collect `OPENAI_API_KEY_FALLBACK_<n>` entries sorted by `n`.
fn numbered_slots(env: &HashMap<String, String>) -> Vec<(u32, String)> {
    let mut indexed = BTreeMap::new();
    for (name, value) in env {
        let Some(suffix) = name.strip_prefix(NUMBERED_KEY_PREFIX) else {
            continue;
        };
        match suffix.parse::<u32>() {
            Ok(index) if suffix.bytes().all(|b| b.is_ascii_digit()) => {
                indexed.insert(index, value.clone());
            }
            _ => log::warn!("ignoring provider key with non-numeric suffix: {name}"),
        }
    }
    indexed.into_iter().collect()
}

fn parse_or<T: std::str::FromStr>(
    env: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, StudioError> {
    match env.get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| StudioError::InvalidConfig(format!("{key} has invalid value `{raw}`"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(vars: &[(&str, &str)]) -> StudioConfig {
        StudioConfig::from_vars(vars.iter().map(|(k, v)| (k.to_string(), v.to_string()))).unwrap()
    }

    #[test]
    fn empty_environment_has_no_slots() {
        let cfg = config(&[]);
        assert!(cfg.slots.is_empty());
        assert_eq!(cfg.default_chat_model, DEFAULT_CHAT_MODEL);
        assert_eq!(cfg.request_timeout, Duration::from_secs(45));
    }

    #[test]
    fn slots_follow_primary_legacy_numbered_order() {
        let cfg = config(&[
            ("OPENAI_API_KEY_FALLBACK_10", "key-ten"),
            ("OPENAI_API_KEY_FALLBACK_2", "key-two"),
            ("OPENAI_API_KEY_FALLBACK", "key-legacy"),
            ("OPENAI_API_KEY", "key-primary"),
            ("OPENAI_BASE_URL", "https://example.test/v1"),
        ]);
        let sources: Vec<_> = cfg.slots.iter().map(|s| s.source).collect();
        assert_eq!(
            sources,
            vec![
                SlotSource::Primary,
                SlotSource::LegacyFallback,
                SlotSource::Numbered(2),
                SlotSource::Numbered(10),
            ]
        );
    }

    #[test]
    fn blank_keys_and_non_numeric_suffixes_are_skipped() {
        let cfg = config(&[
            ("OPENAI_API_KEY", "   "),
            ("OPENAI_API_KEY_FALLBACK_x1", "key-bad"),
            ("OPENAI_API_KEY_FALLBACK_3", " key-three "),
        ]);
        assert_eq!(cfg.slots.len(), 1);
        assert_eq!(cfg.slots[0].api_key, "key-three");
        assert_eq!(cfg.slots[0].source, SlotSource::Numbered(3));
    }

    #[test]
    fn hackclub_keys_get_default_base_url() {
        let cfg = config(&[("OPENAI_API_KEY", "sk-hc-123")]);
        assert_eq!(cfg.slots[0].base_url.as_deref(), Some(HACKCLUB_BASE_URL));
        assert_eq!(cfg.slots[0].family, ProviderFamily::HackClub);
        assert_eq!(cfg.slots[0].model, DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn openai_endpoints_swap_away_from_gemini_default() {
        let cfg = config(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("OPENAI_API_KEY_FALLBACK_1", "sk-other"),
            ("OPENAI_MODEL_FALLBACK_1", "custom-model"),
        ]);
        assert_eq!(cfg.slots[0].family, ProviderFamily::OpenAi);
        assert_eq!(cfg.slots[0].model, DEFAULT_OPENAI_FALLBACK_MODEL);
        assert_eq!(cfg.slots[1].model, "custom-model");
    }

    #[test]
    fn duplicate_triples_are_dropped() {
        let cfg = config(&[
            ("OPENAI_API_KEY", "key-a"),
            ("OPENAI_API_KEY_FALLBACK_1", "key-a"),
            ("OPENAI_API_KEY_FALLBACK_2", "key-a"),
            ("OPENAI_MODEL_FALLBACK_2", "other-model"),
        ]);
        assert_eq!(cfg.slots.len(), 2);
        assert_eq!(cfg.slots[1].source, SlotSource::Numbered(2));
    }

    #[test]
    fn family_ordering_puts_hackclub_before_openai() {
        let cfg = config(&[
            ("IFS_PROVIDER_ORDER", "family"),
            ("OPENAI_API_KEY", "sk-openai-primary"),
            ("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            ("OPENAI_API_KEY_FALLBACK_1", "third-party"),
            ("OPENAI_BASE_URL_FALLBACK_1", "https://llm.example.test/v1"),
            ("OPENAI_API_KEY_FALLBACK_2", "sk-hc-secondary"),
        ]);
        let families: Vec<_> = cfg.slots.iter().map(|s| s.family).collect();
        assert_eq!(
            families,
            vec![
                ProviderFamily::HackClub,
                ProviderFamily::OpenAi,
                ProviderFamily::Other
            ]
        );
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = StudioConfig::from_vars([("IFS_MAX_TOKENS", "lots")]).unwrap_err();
        assert!(matches!(err, StudioError::InvalidConfig(_)));
        let err = StudioConfig::from_vars([("IFS_PROVIDER_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(matches!(err, StudioError::InvalidConfig(_)));
        let err = StudioConfig::from_vars([("IFS_PROVIDER_ORDER", "random")]).unwrap_err();
        assert!(matches!(err, StudioError::InvalidConfig(_)));
    }
}
