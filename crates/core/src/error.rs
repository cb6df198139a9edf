//! Error types shared by the translation pipeline and the job orchestrator.
//! Glue code (file IO, parsing, configuration) uses `anyhow` instead.

use crate::jobs::JobKind;
use thiserror::Error;

/// Failure reported by an inference client for a single request.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The remote service asked us to slow down. Safe to retry.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Anything else. Never retried.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InferenceError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, InferenceError::RateLimited(_))
    }
}

/// Terminal failure of one translation unit (a batch or a single line).
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Every attempt was rate limited.
    #[error("rate limited after {attempts} attempts: {message}")]
    RateLimited { attempts: u32, message: String },

    /// The response did not contain one line per requested line.
    #[error("expected {expected} translated lines, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// A response line had no `:` separating header and text.
    #[error("missing ':' delimiter in response line: {line:?}")]
    MissingDelimiter { line: String },

    /// Non rate-limit failure from the inference client.
    #[error("inference failed: {0}")]
    Inference(anyhow::Error),
}

/// Why a job submission was refused. No task is spawned in either case.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("{0} is already running")]
    AlreadyRunning(JobKind),

    #[error("{0} client is not loaded")]
    ClientNotReady(JobKind),
}

/// Failure to bring a managed client up.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("client is already loading")]
    AlreadyLoading,

    #[error("no backend is configured for this client")]
    Unavailable,

    #[error("failed to initialize client: {0}")]
    Connect(#[from] anyhow::Error),
}
