//! The Engine: unified API over sync, publish, credentials and stats.
//!
//! The engine owns nothing global. It is handed a [`Store`] and an
//! [`AdapterRegistry`], and shares them with the coordinators it hands out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use listsync_core::{CredentialId, Listing, ListingId, LocationId, Platform, WorkspaceId};
use listsync_platform::{AdapterRegistry, PlatformAdapter};
use listsync_store::{ListingFilter, Store};

use crate::bulk::BulkResult;
use crate::config::EngineConfig;
use crate::credentials::CredentialResolver;
use crate::error::{EngineError, Result};
use crate::locks::{ListingGuard, ListingLocks};
use crate::publish::PublishCoordinator;
use crate::stats::{Stats, StatsAggregator};
use crate::sync::SyncCoordinator;

/// State shared by the engine and every coordinator.
pub(crate) struct Shared<S: Store> {
    pub(crate) store: Arc<S>,
    pub(crate) adapters: AdapterRegistry,
    pub(crate) locks: ListingLocks,
    pub(crate) config: EngineConfig,
}

impl<S: Store> Shared<S> {
    pub(crate) fn adapter(&self, platform: Platform) -> Result<Arc<dyn PlatformAdapter>> {
        self.adapters
            .get(platform)
            .ok_or(EngineError::Unsupported(platform))
    }

    /// Take the per-listing lock under the configured policy.
    pub(crate) async fn lock(&self, id: ListingId) -> Result<ListingGuard> {
        self.locks
            .acquire(id, self.config.lock_policy, self.config.lock_wait())
            .await
    }

    pub(crate) fn resolver(&self) -> CredentialResolver<S> {
        CredentialResolver::new(self.store.clone())
    }
}

/// The listing reconciliation engine.
///
/// Cheap to clone; clones share the store, adapters and lock table.
pub struct Engine<S: Store> {
    shared: Arc<Shared<S>>,
}

impl<S: Store> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S: Store + 'static> Engine<S> {
    /// Create a new engine.
    ///
    /// Every adapter is wrapped with `config.retry`, so each platform call
    /// is bounded by its request timeout.
    pub fn new(store: S, adapters: AdapterRegistry, config: EngineConfig) -> Self {
        Self::with_store(Arc::new(store), adapters, config)
    }

    /// Create an engine over a store the caller keeps a handle to.
    ///
    /// Adapters are wrapped with `config.retry` as in [`Engine::new`].
    pub fn with_store(store: Arc<S>, adapters: AdapterRegistry, config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                adapters: adapters.resilient(&config.retry),
                locks: ListingLocks::new(),
                config,
            }),
        }
    }

    /// Start building an engine.
    pub fn builder(store: S) -> EngineBuilder<S> {
        EngineBuilder {
            store: Arc::new(store),
            adapters: AdapterRegistry::new(),
            config: EngineConfig::default(),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.shared.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn locks(&self) -> &ListingLocks {
        &self.shared.locks
    }

    pub fn sync(&self) -> SyncCoordinator<S> {
        SyncCoordinator::new(self.shared.clone())
    }

    pub fn publisher(&self) -> PublishCoordinator<S> {
        PublishCoordinator::new(self.shared.clone())
    }

    pub fn credentials(&self) -> CredentialResolver<S> {
        self.shared.resolver()
    }

    pub fn stats(&self) -> StatsAggregator<S> {
        StatsAggregator::new(self.shared.store.clone(), self.shared.config.recent_window_ms)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listing Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_listing(&self, id: &ListingId) -> Result<Listing> {
        self.shared
            .store
            .get_listing(id)
            .await?
            .ok_or(EngineError::ListingNotFound(*id))
    }

    pub async fn list_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        Ok(self.shared.store.list_listings(filter).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Operations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn sync_one(&self, listing_id: &ListingId) -> Result<Listing> {
        self.sync().sync_one(listing_id).await
    }

    pub async fn sync_all_for_location(
        &self,
        location_id: &LocationId,
        cancel: &CancellationToken,
    ) -> Result<BulkResult> {
        self.sync().sync_all_for_location(location_id, cancel).await
    }

    pub async fn sync_location_platform(
        &self,
        location_id: &LocationId,
        platform: Platform,
        cancel: &CancellationToken,
    ) -> Result<BulkResult> {
        self.sync()
            .sync_location_platform(location_id, platform, cancel)
            .await
    }

    pub async fn sync_all_in_workspace(
        &self,
        workspace_id: &WorkspaceId,
        cancel: &CancellationToken,
    ) -> Result<BulkResult> {
        self.sync().sync_all_in_workspace(workspace_id, cancel).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Publish Operations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn publish(
        &self,
        location_id: &LocationId,
        platform: Platform,
        credential_id: &CredentialId,
    ) -> Result<Listing> {
        self.publisher()
            .publish(location_id, platform, credential_id)
            .await
    }

    pub async fn publish_to_all_platforms(
        &self,
        location_id: &LocationId,
        cancel: &CancellationToken,
    ) -> Result<BulkResult> {
        self.publisher()
            .publish_to_all_platforms(location_id, cancel)
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stats
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn compute_stats(&self, workspace_id: &WorkspaceId) -> Result<Stats> {
        self.stats().compute_stats(workspace_id).await
    }

    pub async fn compute_stats_at(&self, workspace_id: &WorkspaceId, now: i64) -> Result<Stats> {
        self.stats().compute_stats_at(workspace_id, now).await
    }
}

/// Builder for [`Engine`].
///
/// Adapters are wrapped with the final config's retry policy at `build`.
pub struct EngineBuilder<S: Store> {
    store: Arc<S>,
    adapters: AdapterRegistry,
    config: EngineConfig,
}

impl<S: Store + 'static> EngineBuilder<S> {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn adapter<A: PlatformAdapter + 'static>(mut self, adapter: A) -> Self {
        self.adapters.register(Arc::new(adapter));
        self
    }

    /// Add an adapter the caller keeps a handle to.
    pub fn shared_adapter(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapters.register(adapter);
        self
    }

    pub fn build(self) -> Engine<S> {
        Engine::with_store(self.store, self.adapters, self.config)
    }
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
