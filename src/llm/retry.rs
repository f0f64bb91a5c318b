//! Bounded retries with exponential backoff around a single provider call.

use std::time::Duration;

use rand::Rng;

use crate::error::LlmError;
use crate::llm::provider::{LlmProvider, ProviderRequest, ProviderResponse};

/// How hard to try before giving up on the provider.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Applied to every attempt independently.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn delay_for(&self, retry: u32, error: &LlmError) -> Duration {
        if let LlmError::RateLimited {
            retry_after: Some(after),
            ..
        } = error
        {
            return (*after).min(self.max_delay);
        }
        let base = self.backoff(retry);
        let jitter_cap = (base.as_millis() as u64) / 4;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        base + Duration::from_millis(jitter)
    }
}

/// Call the provider, retrying transient failures under `policy`.
///
/// Non-retryable errors are returned immediately.
pub(crate) async fn send_with_retry(
    llm: &dyn LlmProvider,
    request: &ProviderRequest,
    policy: &RetryPolicy,
) -> Result<ProviderResponse, LlmError> {
    let mut retry = 0;
    loop {
        let attempt =
            tokio::time::timeout(policy.attempt_timeout, llm.send(request.clone())).await;
        let error = match attempt {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => e,
            Err(_) => LlmError::Timeout {
                provider: llm.name().to_string(),
                timeout: policy.attempt_timeout,
            },
        };

        if !error.is_retryable() {
            tracing::warn!(provider = llm.name(), error = %error, "Provider call failed");
            return Err(error);
        }
        if retry >= policy.max_retries {
            tracing::warn!(
                provider = llm.name(),
                attempts = retry + 1,
                error = %error,
                "Provider retries exhausted"
            );
            return Err(error);
        }

        retry += 1;
        let delay = policy.delay_for(retry, &error);
        tracing::info!(
            provider = llm.name(),
            attempt = retry,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying provider call"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        retryable: bool,
    }

    #[async_trait]
    impl LlmProvider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }
        fn model_name(&self) -> &str {
            "flaky-1"
        }
        async fn send(&self, _request: ProviderRequest) -> Result<ProviderResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.retryable {
                    Err(LlmError::Unavailable {
                        provider: "flaky".into(),
                        reason: "503".into(),
                    })
                } else {
                    Err(LlmError::Protocol {
                        provider: "flaky".into(),
                        reason: "garbage".into(),
                    })
                }
            } else {
                Ok(ProviderResponse::text("ok"))
            }
        }
    }

    struct Slow;

    #[async_trait]
    impl LlmProvider for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn model_name(&self) -> &str {
            "slow-1"
        }
        async fn send(&self, _request: ProviderRequest) -> Result<ProviderResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ProviderResponse::text("too late"))
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            system_prompt: String::new(),
            history: Vec::new(),
            tools: Vec::new(),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn succeeds_on_last_allowed_attempt() {
        let llm = Flaky {
            failures: 3,
            calls: AtomicU32::new(0),
            retryable: true,
        };
        let response = send_with_retry(&llm, &request(), &fast_policy(3))
            .await
            .unwrap();
        assert_eq!(response.joined_text(), "ok");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let llm = Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
            retryable: true,
        };
        let err = send_with_retry(&llm, &request(), &fast_policy(3))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Unavailable { .. }));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn protocol_error_is_not_retried() {
        let llm = Flaky {
            failures: 1,
            calls: AtomicU32::new(0),
            retryable: false,
        };
        let err = send_with_retry(&llm, &request(), &fast_policy(3))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Protocol { .. }));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let err = send_with_retry(&Slow, &request(), &fast_policy(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout { .. }));
    }
}
