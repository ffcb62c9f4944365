//! Rate-limit retry wrapper around the LLM collaborator, and the
//! cancel-racing primitive the conversation loop uses everywhere it waits
//! on a synchronous-in-spirit call.
//!
//! Mirrors the shape of a synchronous-SDK retry wrapper: isolate the
//! blocking call, race it against cancellation rather than trying to
//! interrupt it, and surface rate limits as a transparent, logged retry.

use tokio_util::sync::CancellationToken;

use bastion_core::{AssistantTurn, LLMError, LLMProvider, Message, Tool};

use crate::config::RateLimitConfig;

/// What the retry wrapper reports back to the caller for user-visible
/// notices (the conversation loop renders these as interim text).
#[derive(Debug, Clone)]
pub enum RetryNotice {
    RateLimited { attempt: usize, max_attempts: usize, wait_secs: u64 },
}

/// Outcome of [`call_with_retry`].
pub enum RetryOutcome {
    Ok(AssistantTurn),
    Cancelled,
    Failed(LLMError),
}

/// Call the LLM collaborator, retrying up to `rate_limit.max_retries` times
/// on [`LLMError::RateLimited`] with delay `base_delay_secs * 2^attempt`.
/// Races the call (and any backoff sleep) against `cancel`; the loser is
/// simply dropped, not interrupted.
pub async fn call_with_retry(
    provider: &dyn LLMProvider,
    messages: &[Message],
    tools: &[Tool],
    rate_limit: &RateLimitConfig,
    cancel: &CancellationToken,
    mut on_notice: impl FnMut(RetryNotice),
) -> RetryOutcome {
    let mut attempt = 0usize;
    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled;
        }

        let call = provider.chat(messages, tools);
        tokio::pin!(call);

        let result = tokio::select! {
            r = &mut call => r,
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
        };

        match result {
            Ok(turn) => return RetryOutcome::Ok(turn),
            Err(LLMError::RateLimited { message, retry_after_secs }) => {
                attempt += 1;
                if attempt > rate_limit.max_retries {
                    return RetryOutcome::Failed(LLMError::RateLimited {
                        message,
                        retry_after_secs,
                    });
                }
                let wait_secs =
                    retry_after_secs.unwrap_or(rate_limit.base_delay_secs * 2u64.pow(attempt as u32));
                tracing::warn!(attempt, wait_secs, "rate_limited");
                on_notice(RetryNotice::RateLimited {
                    attempt,
                    max_attempts: rate_limit.max_retries,
                    wait_secs,
                });

                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(wait_secs)) => {}
                    _ = cancel.cancelled() => return RetryOutcome::Cancelled,
                }
            }
            Err(other) => return RetryOutcome::Failed(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bastion_core::StopReason;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FlakyProvider {
        calls: Arc<AtomicUsize>,
        fail_times: usize,
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        async fn chat(&self, _messages: &[Message], _tools: &[Tool]) -> Result<AssistantTurn, LLMError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(LLMError::RateLimited {
                    message: "slow down".to_string(),
                    retry_after_secs: Some(0),
                })
            } else {
                Ok(AssistantTurn {
                    content: vec![],
                    stop_reason: StopReason::EndTurn,
                })
            }
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_rate_limits() {
        let provider = FlakyProvider {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_times: 2,
        };
        let rate_limit = RateLimitConfig {
            max_retries: 3,
            base_delay_secs: 0,
        };
        let cancel = CancellationToken::new();
        let mut notices = Vec::new();
        let outcome = call_with_retry(&provider, &[], &[], &rate_limit, &cancel, |n| notices.push(n)).await;
        assert!(matches!(outcome, RetryOutcome::Ok(_)));
        assert_eq!(notices.len(), 2);
    }

    #[tokio::test]
    async fn exhausts_retries_and_fails() {
        let provider = FlakyProvider {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_times: 100,
        };
        let rate_limit = RateLimitConfig {
            max_retries: 2,
            base_delay_secs: 0,
        };
        let cancel = CancellationToken::new();
        let outcome = call_with_retry(&provider, &[], &[], &rate_limit, &cancel, |_| {}).await;
        assert!(matches!(outcome, RetryOutcome::Failed(LLMError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn cancel_before_call_short_circuits() {
        let provider = FlakyProvider {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_times: 0,
        };
        let rate_limit = RateLimitConfig::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = call_with_retry(&provider, &[], &[], &rate_limit, &cancel, |_| {}).await;
        assert!(matches!(outcome, RetryOutcome::Cancelled));
    }
}
