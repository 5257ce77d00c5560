//! Shared data model, stage names, and errors for the reqflow analysis pipeline.
//!
//! This crate provides the foundational types used across all other reqflow crates:
//! - `ReqflowError`: unified error taxonomy
//! - `Chunk`, `Story`, `Issue`, `Requirement`: the values each stage produces
//! - `Report`, `PipelineResult`: terminal artifacts of one pipeline run
//! - `Stage`: names used to tag stage failures

mod model;
mod stage;

pub use model::*;
pub use stage::Stage;

/// Unified error type for all reqflow subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ReqflowError {
    // === LLM Capability Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    #[error("Capability '{0}' is not configured")]
    CapabilityUnavailable(String),

    // === Stage Errors ===
    #[error("Invalid input for stage '{stage}': {message}")]
    InvalidInput { stage: Stage, message: String },

    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: Stage, message: String },

    // === Dispatch Errors ===
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown method {0}")]
    UnknownMethod(String),

    #[error("Tool iteration limit reached: {iterations} iterations")]
    IterationLimitReached { iterations: usize },

    // === Storage ===
    #[error("Persistence error: {0}")]
    Persistence(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ReqflowError {
    /// Shorthand for an input error attributed to `stage`.
    pub fn invalid_input(stage: Stage, message: impl Into<String>) -> Self {
        ReqflowError::InvalidInput {
            stage,
            message: message.into(),
        }
    }

    /// The stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ReqflowError::InvalidInput { stage, .. } | ReqflowError::StageFailed { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }

    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReqflowError::RateLimited { .. }
                | ReqflowError::RequestTimeout { .. }
                | ReqflowError::ProviderError { retryable: true, .. }
        )
    }

    /// Returns `true` if the error means an optional capability is missing or
    /// broken, so callers on optional paths should degrade instead of failing.
    pub fn is_capability_failure(&self) -> bool {
        matches!(
            self,
            ReqflowError::CapabilityUnavailable(_)
                | ReqflowError::ProviderError { .. }
                | ReqflowError::RateLimited { .. }
                | ReqflowError::AuthError { .. }
                | ReqflowError::RequestTimeout { .. }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReqflowError::AuthError { .. }
                | ReqflowError::InvalidInput { .. }
                | ReqflowError::UnknownTool(_)
                | ReqflowError::UnknownMethod(_)
        )
    }

    /// Maps the error to an HTTP status code for server mode.
    pub fn http_status(&self) -> u16 {
        match self {
            ReqflowError::InvalidInput { .. } | ReqflowError::Json(_) => 400,
            ReqflowError::UnknownTool(_) | ReqflowError::UnknownMethod(_) => 404,
            ReqflowError::RateLimited { .. } => 429,
            ReqflowError::StageFailed { .. } | ReqflowError::ProviderError { .. } => 502,
            ReqflowError::CapabilityUnavailable(_) => 503,
            ReqflowError::RequestTimeout { .. } => 504,
            _ => 500,
        }
    }
}

/// A convenience alias for `Result<T, ReqflowError>`.
pub type Result<T> = std::result::Result<T, ReqflowError>;
