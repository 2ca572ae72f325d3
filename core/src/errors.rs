use serde::Serialize;
use thiserror::Error;

/// Failures reported by a single provider attempt. The chain treats both
/// kinds the same way: advance to the next candidate.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider rejected credentials: {0}")]
    Auth(String),
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "AI-1001",
            Self::Auth(_) => "AI-1002",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return Self::Auth(err.to_string());
            }
        }
        Self::Unavailable(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("No AI provider is configured")]
    ConfigurationMissing,
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StudioError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing => "CFG-1001",
            Self::InvalidConfig(_) => "CFG-1002",
            Self::SessionNotFound(_) => "SES-1001",
            Self::InvalidInput(_) => "GEN-1001",
            Self::Storage(_) => "DB-1001",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing => {
                "No provider credentials were supplied; answers come from the offline generator."
            }
            Self::InvalidConfig(_) => "A configuration value could not be parsed at start-up.",
            Self::SessionNotFound(_) => "No chat session exists for the requested ID.",
            Self::InvalidInput(_) => "The request was missing a required field or was empty.",
            Self::Storage(_) => "The session store could not complete the operation.",
        }
    }
}

impl From<rusqlite::Error> for StudioError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<r2d2::Error> for StudioError {
    fn from(err: r2d2::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// JSON-friendly error payload handed back to API callers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub explain: String,
}

impl From<StudioError> for ApiError {
    fn from(err: StudioError) -> Self {
        Self {
            code: err.code().to_string(),
            explain: err.explain().to_string(),
            message: err.to_string(),
        }
    }
}
