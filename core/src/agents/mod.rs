//! Provider configuration, credential chain resolution and generation.

pub mod config;
pub mod offline;
pub mod orchestrator;
pub mod prompts;
pub mod resolver;

pub use config::{ChainOrdering, ProviderFamily, ProviderSlot, SlotSource, StudioConfig};
pub use orchestrator::{
    AiChatMessage, AiUsageMetrics, GenerationRequest, GenerationResult, HttpProviderClient,
    ProviderClient,
};
pub use prompts::Domain;
pub use resolver::{CredentialChain, ProviderConfig, ProviderUsed, DEFAULT_BASE_URL, OFFLINE_MODEL};
