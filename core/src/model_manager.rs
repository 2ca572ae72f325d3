//! Runs a generation request down the credential chain.
//!
//! Candidates are tried once each in priority order. Every provider failure
//! is logged and swallowed; when the live candidates are exhausted (or none
//! exist) the offline generator answers, so callers always get a result.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::agents::offline;
use crate::agents::{
    CredentialChain, Domain, GenerationRequest, GenerationResult, ProviderClient, ProviderConfig,
    ProviderUsed, OFFLINE_MODEL,
};
use crate::db::DbPool;
use crate::errors::{ProviderError, StudioError};
use crate::logging::{self, EventRecord};

pub const PROBE_INSTRUCTION: &str = "Reply with: connection ok";

/// Outcome of probing one live candidate.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub priority: u32,
    pub provider: ProviderUsed,
    pub base_url: String,
    pub model: String,
    pub ok: bool,
    pub detail: String,
}

pub struct ModelManager {
    chain: CredentialChain,
    client: Arc<dyn ProviderClient>,
    pool: Option<DbPool>,
}

impl ModelManager {
    pub fn new(
        chain: CredentialChain,
        client: Arc<dyn ProviderClient>,
        pool: Option<DbPool>,
    ) -> Arc<Self> {
        if !chain.has_live() {
            let err = StudioError::ConfigurationMissing;
            logging::record(
                pool.as_ref(),
                EventRecord {
                    level: log::Level::Warn,
                    code: "AI-0203",
                    module: "ai.runtime",
                    message: "No AI provider is configured",
                    explain: Some(err.explain()),
                    data: None,
                },
            );
        }
        Arc::new(Self {
            chain,
            client,
            pool,
        })
    }

    pub fn chain(&self) -> &CredentialChain {
        &self.chain
    }

    /// Walk the chain until a candidate answers. Never fails.
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let mut cursor = None;
        while let Some(candidate) = self.chain.resolve_next(cursor) {
            cursor = Some(candidate.priority);
            if candidate.is_offline {
                break;
            }
            match self.client.generate(candidate, request).await {
                Ok(result) => {
                    self.log_success(candidate, request.domain, &result);
                    return result;
                }
                Err(err) => self.log_failure(candidate, request.domain, &err),
            }
        }
        self.offline_result(request)
    }

    /// Send a fixed instruction to every live candidate once and report how
    /// each one answered. Unlike [`generate`](Self::generate) this does not
    /// stop at the first success.
    pub async fn probe(&self) -> Vec<ProbeReport> {
        let request = GenerationRequest {
            context: Vec::new(),
            instruction: PROBE_INSTRUCTION.to_string(),
            domain: Domain::Script,
        };
        let mut reports = Vec::new();
        for candidate in self.chain.live() {
            let (ok, detail) = match self.client.generate(candidate, &request).await {
                Ok(result) => (true, result.text.chars().take(80).collect()),
                Err(err) => (false, err.to_string()),
            };
            reports.push(ProbeReport {
                priority: candidate.priority,
                provider: candidate.used(),
                base_url: candidate.base_url.clone(),
                model: candidate.model.clone(),
                ok,
                detail,
            });
        }
        reports
    }

    fn offline_result(&self, request: &GenerationRequest) -> GenerationResult {
        let text = offline::generate(request.domain, &request.instruction, request.context.len());
        self.emit(EventRecord {
            level: log::Level::Info,
            code: "AI-0202",
            module: "ai.runtime",
            message: "Answered from offline generator",
            explain: Some("No provider candidate produced a completion"),
            data: Some(json!({
                "domain": request.domain.as_str(),
                "live_candidates": self.chain.live().count(),
            })),
        });
        GenerationResult {
            text,
            provider_used: ProviderUsed::Offline,
            degraded: true,
            model: OFFLINE_MODEL.to_string(),
            usage: None,
        }
    }

    fn log_success(&self, candidate: &ProviderConfig, domain: Domain, result: &GenerationResult) {
        let preview = result.text.chars().take(200).collect::<String>();
        self.emit(EventRecord {
            level: log::Level::Info,
            code: "AI-0200",
            module: "ai.runtime",
            message: "AI chat invocation succeeded",
            explain: Some("Credential chain resolved a provider"),
            data: Some(json!({
                "provider": candidate.used().to_string(),
                "model": result.model,
                "domain": domain.as_str(),
                "preview": preview,
            })),
        });
    }

    fn log_failure(&self, candidate: &ProviderConfig, domain: Domain, error: &ProviderError) {
        self.emit(EventRecord {
            level: log::Level::Warn,
            code: "AI-0201",
            module: "ai.runtime",
            message: "AI provider invocation failed",
            explain: Some("Attempting fallback"),
            data: Some(json!({
                "provider": candidate.used().to_string(),
                "model": candidate.model,
                "domain": domain.as_str(),
                "error_code": error.code(),
                "error": error.to_string(),
            })),
        });
    }

    fn emit(&self, event: EventRecord<'static>) {
        logging::emit(self.pool.as_ref(), event);
    }
}
