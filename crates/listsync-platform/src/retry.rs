//! Retry with exponential backoff and per-request timeouts.
//!
//! [`Resilient`] wraps any adapter. Every call is bounded by the request
//! timeout; timeouts, transient failures and rate limits are retried up to
//! `max_attempts` total attempts. Authorization and permanent rejections are
//! returned on the first occurrence.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use listsync_core::{Credential, LocalSnapshot, Platform, PlatformSnapshot};

use crate::adapter::{PlatformAdapter, PushAck};
use crate::error::{AdapterError, Result};

/// Retry and timeout configuration. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each subsequent retry.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, including platform retry-after hints.
    pub max_delay_ms: u64,
    /// Timeout applied to each individual attempt.
    pub request_timeout_ms: u64,
    /// Add up to 25% random jitter to computed backoff.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            request_timeout_ms: 10_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A single attempt with the default timeout.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Backoff before retry number `retry` (0-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// The delay to wait after `error` on retry number `retry`.
    ///
    /// A platform retry-after hint wins over computed backoff, capped at
    /// `max_delay_ms`.
    pub fn delay_for(&self, retry: u32, error: &AdapterError) -> Duration {
        let cap = Duration::from_millis(self.max_delay_ms);
        if let AdapterError::RateLimited {
            retry_after: Some(hint),
        } = error
        {
            return (*hint).min(cap);
        }

        let backoff = self.backoff(retry);
        if !self.jitter {
            return backoff;
        }
        let ms = backoff.as_millis() as u64;
        let extra = rand::thread_rng().gen_range(0..=ms / 4);
        Duration::from_millis(ms + extra).min(cap)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// An adapter wrapped with timeouts and retries.
pub struct Resilient<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: PlatformAdapter> Resilient<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn call<T, F, Fut>(&self, op: &'static str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let timeout = self.policy.request_timeout();
        let attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(timeout, attempt_fn()).await {
                Ok(result) => result,
                Err(_) => Err(AdapterError::Timeout(timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < attempts => {
                    let delay = self.policy.delay_for(attempt - 1, &error);
                    tracing::warn!(
                        platform = %self.inner.platform(),
                        op,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "adapter call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    if attempt > 1 {
                        tracing::warn!(
                            platform = %self.inner.platform(),
                            op,
                            attempt,
                            error = %error,
                            "adapter call failed, giving up"
                        );
                    }
                    return Err(error);
                }
            }
        }
    }
}

#[async_trait]
impl<A: PlatformAdapter> PlatformAdapter for Resilient<A> {
    fn platform(&self) -> Platform {
        self.inner.platform()
    }

    async fn fetch(&self, credential: &Credential, external_id: &str) -> Result<PlatformSnapshot> {
        self.call("fetch", || self.inner.fetch(credential, external_id))
            .await
    }

    async fn push(
        &self,
        credential: &Credential,
        external_id: Option<&str>,
        local: &LocalSnapshot,
    ) -> Result<PushAck> {
        self.call("push", || self.inner.push(credential, external_id, local))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPlatform;
    use listsync_core::{Field, FieldValues};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 10,
            request_timeout_ms: 1_000,
            jitter: false,
        }
    }

    fn credential() -> Credential {
        Credential::new("c1", "ws-1", Platform::Google, "acct-1", "token")
    }

    fn seeded() -> Arc<MemoryPlatform> {
        let platform = Arc::new(MemoryPlatform::new(Platform::Google));
        platform.insert_object("g-1", FieldValues::default().with(Field::Name, "Cafe"));
        platform
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay_ms: 100,
            max_delay_ms: 350,
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let policy = fast_policy(3);
        let hint = AdapterError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(policy.delay_for(0, &hint), Duration::from_millis(10));
    }

    #[test]
    fn test_jitter_stays_within_cap() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };
        for retry in 0..8 {
            let delay = policy.delay_for(retry, &AdapterError::Transient("x".into()));
            assert!(delay >= policy.backoff(retry));
            assert!(delay <= Duration::from_millis(policy.max_delay_ms));
        }
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay_ms, 200);
        assert_eq!(policy.request_timeout_ms, 10_000);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let platform = seeded();
        platform.fail_next(AdapterError::Transient("502".into()));
        platform.fail_next(AdapterError::RateLimited { retry_after: None });

        let adapter = Resilient::new(platform.clone(), fast_policy(3));
        let snapshot = adapter.fetch(&credential(), "g-1").await.unwrap();

        assert_eq!(snapshot.get(Field::Name), "Cafe");
        assert_eq!(platform.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let platform = seeded();
        for _ in 0..5 {
            platform.fail_next(AdapterError::Transient("503".into()));
        }

        let adapter = Resilient::new(platform.clone(), fast_policy(3));
        let err = adapter.fetch(&credential(), "g-1").await.unwrap_err();

        assert!(matches!(err, AdapterError::Transient(_)));
        assert_eq!(platform.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_never_retried() {
        let platform = seeded();
        platform.fail_next(AdapterError::Unauthorized("token expired".into()));

        let adapter = Resilient::new(platform.clone(), fast_policy(5));
        let err = adapter.fetch(&credential(), "g-1").await.unwrap_err();

        assert!(matches!(err, AdapterError::Unauthorized(_)));
        assert_eq!(platform.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_call_becomes_timeout() {
        let platform = Arc::new(
            MemoryPlatform::new(Platform::Google).with_delay(Duration::from_millis(200)),
        );
        platform.insert_object("g-1", FieldValues::default());

        let policy = RetryPolicy {
            request_timeout_ms: 20,
            ..fast_policy(2)
        };
        let adapter = Resilient::new(platform.clone(), policy);
        let err = adapter.fetch(&credential(), "g-1").await.unwrap_err();

        assert_eq!(err, AdapterError::Timeout(Duration::from_millis(20)));
        assert_eq!(platform.fetch_count(), 2);
    }
}
