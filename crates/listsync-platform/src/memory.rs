//! In-memory platform for tests.
//!
//! Holds platform objects in a map and lets tests script failures, add
//! latency, and inspect what was pushed.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use listsync_core::{Credential, CredentialId, FieldValues, LocalSnapshot, Platform, PlatformSnapshot};

use crate::adapter::{PlatformAdapter, PushAck};
use crate::error::{AdapterError, Result};

/// One recorded push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRecord {
    pub credential_id: CredentialId,
    /// The external id the caller supplied (`None` on first publish).
    pub requested_id: Option<String>,
    /// The external id the push landed on.
    pub external_id: String,
    pub fields: FieldValues,
}

/// A scriptable in-memory platform.
pub struct MemoryPlatform {
    platform: Platform,
    delay: Option<Duration>,
    inner: Mutex<MemoryPlatformInner>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Default)]
struct MemoryPlatformInner {
    objects: HashMap<String, FieldValues>,
    /// Failures consumed one per call, in order.
    queued: VecDeque<AdapterError>,
    /// Failures returned on every call touching one object.
    sticky: HashMap<String, AdapterError>,
    pushes: Vec<PushRecord>,
    fetches: usize,
    next_id: u64,
}

/// Tracks concurrent calls for the lifetime of one call, including
/// calls abandoned by a timeout.
struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(platform: &'a MemoryPlatform) -> Self {
        let now = platform.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        platform.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self {
            counter: &platform.in_flight,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryPlatform {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            delay: None,
            inner: Mutex::new(MemoryPlatformInner::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryPlatformInner> {
        // A panicking test thread must not hide the platform state from the rest.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed or replace a platform object.
    pub fn insert_object(&self, external_id: impl Into<String>, fields: FieldValues) {
        self.lock().objects.insert(external_id.into(), fields);
    }

    /// Current platform-side data for `external_id`.
    pub fn object(&self, external_id: &str) -> Option<FieldValues> {
        self.lock().objects.get(external_id).cloned()
    }

    /// Fail the next call (fetch or push) with `error`.
    pub fn fail_next(&self, error: AdapterError) {
        self.lock().queued.push_back(error);
    }

    /// Fail every call touching `external_id` with `error`.
    pub fn fail_always(&self, external_id: impl Into<String>, error: AdapterError) {
        self.lock().sticky.insert(external_id.into(), error);
    }

    /// Stop failing calls touching `external_id`.
    pub fn recover(&self, external_id: &str) {
        self.lock().sticky.remove(external_id);
    }

    pub fn pushes(&self) -> Vec<PushRecord> {
        self.lock().pushes.clone()
    }

    pub fn push_count(&self) -> usize {
        self.lock().pushes.len()
    }

    /// Fetch attempts, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self, external_id: Option<&str>) -> Option<AdapterError> {
        let mut inner = self.lock();
        if let Some(error) = inner.queued.pop_front() {
            return Some(error);
        }
        external_id.and_then(|id| inner.sticky.get(id).cloned())
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PlatformAdapter for MemoryPlatform {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(&self, _credential: &Credential, external_id: &str) -> Result<PlatformSnapshot> {
        let _in_flight = InFlight::enter(self);
        self.lock().fetches += 1;
        self.pause().await;

        if let Some(error) = self.scripted_failure(Some(external_id)) {
            return Err(error);
        }

        let fields = self
            .lock()
            .objects
            .get(external_id)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(external_id.to_string()))?;
        Ok(PlatformSnapshot::new(self.platform, external_id, fields))
    }

    async fn push(
        &self,
        credential: &Credential,
        external_id: Option<&str>,
        local: &LocalSnapshot,
    ) -> Result<PushAck> {
        let _in_flight = InFlight::enter(self);
        self.pause().await;

        if let Some(error) = self.scripted_failure(external_id) {
            return Err(error);
        }

        let mut inner = self.lock();
        let target = match external_id {
            Some(id) => id.to_string(),
            None => {
                inner.next_id += 1;
                format!("{}-{}", self.platform, inner.next_id)
            }
        };

        inner.objects.insert(target.clone(), local.fields.clone());
        inner.pushes.push(PushRecord {
            credential_id: credential.id.clone(),
            requested_id: external_id.map(str::to_string),
            external_id: target.clone(),
            fields: local.fields.clone(),
        });

        Ok(PushAck::full(target))
    }
}
