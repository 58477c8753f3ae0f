//! Engine configuration.
//!
//! Every struct deserializes with `#[serde(default)]`, so a host can load a
//! partial JSON document and get defaults for the rest. Durations are in
//! milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use listsync_platform::RetryPolicy;

/// What an operation does when its listing is already locked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPolicy {
    /// Fail immediately with `Conflict`.
    #[default]
    Reject,
    /// Wait up to `lock_wait_ms`, then fail with `Conflict`.
    Wait,
}

/// Configuration for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum listings processed at once by a bulk operation.
    pub concurrency: usize,
    pub lock_policy: LockPolicy,
    pub lock_wait_ms: u64,
    /// Trailing window for `recently_synced` in stats.
    pub recent_window_ms: i64,
    /// Applied to adapters registered through the engine.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            lock_policy: LockPolicy::Reject,
            lock_wait_ms: 5_000,
            recent_window_ms: 24 * 60 * 60 * 1000,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document, filling omitted fields with defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    /// Worker count, never zero.
    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }
}
