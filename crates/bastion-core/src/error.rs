use thiserror::Error;

/// Errors surfaced by the opaque LLM collaborator.
///
/// This crate does not implement a provider — it only defines the shape
/// an implementation must fail in, so the retry wrapper in `bastion-agent`
/// can tell a rate limit apart from a hard failure.
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("transport error: {0}")]
    HttpError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
