//! Sync coordinator: pull platform data and record discrepancies.
//!
//! Syncing one listing:
//!
//! 1. Take the listing's lock, then re-read the listing
//! 2. Resolve its credential (`CredentialNotFound` marks it `error`)
//! 3. Fetch the platform snapshot through the adapter
//! 4. Diff against the location's current canonical fields
//! 5. Replace the discrepancy set and move to `synced` or `discrepant`
//!
//! An adapter failure marks the listing `error` and records the reason;
//! discrepancies and `last_synced_at` keep their previous values.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use listsync_core::{diff, Listing, ListingId, LocationId, Platform, WorkspaceId};
use listsync_store::{ListingFilter, Store, StoreExt};

use crate::bulk::{self, BulkResult, JobKind, JobReport};
use crate::engine::{now_millis, Shared};
use crate::error::{EngineError, ErrorKind, Result};

/// Runs syncs for single listings and batches.
pub struct SyncCoordinator<S: Store> {
    shared: Arc<Shared<S>>,
}

impl<S: Store + 'static> SyncCoordinator<S> {
    pub(crate) fn new(shared: Arc<Shared<S>>) -> Self {
        Self { shared }
    }

    /// Sync one listing and return its updated record.
    pub async fn sync_one(&self, listing_id: &ListingId) -> Result<Listing> {
        sync_listing(&self.shared, *listing_id).await
    }

    /// Sync every listing of a location.
    pub async fn sync_all_for_location(
        &self,
        location_id: &LocationId,
        cancel: &CancellationToken,
    ) -> Result<BulkResult> {
        self.require_location(location_id).await?;
        let listings = self.shared.store.listings_for_location(location_id).await?;
        Ok(self.sync_many("sync_location", listings, cancel).await)
    }

    /// Sync the listings of a location on one platform.
    pub async fn sync_location_platform(
        &self,
        location_id: &LocationId,
        platform: Platform,
        cancel: &CancellationToken,
    ) -> Result<BulkResult> {
        self.require_location(location_id).await?;
        let filter = ListingFilter::location(location_id).platform(platform);
        let listings = self.shared.store.list_listings(&filter).await?;
        Ok(self.sync_many("sync_location_platform", listings, cancel).await)
    }

    /// Sync every listing in a workspace.
    pub async fn sync_all_in_workspace(
        &self,
        workspace_id: &WorkspaceId,
        cancel: &CancellationToken,
    ) -> Result<BulkResult> {
        let listings = self.shared.store.listings_in_workspace(workspace_id).await?;
        Ok(self.sync_many("sync_workspace", listings, cancel).await)
    }

    async fn require_location(&self, location_id: &LocationId) -> Result<()> {
        match self.shared.store.get_location(location_id).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::LocationNotFound(location_id.clone())),
        }
    }

    /// Fan out over `listings`. Every listing gets a report; one never
    /// published fails with `NotLinked` and is left unchanged.
    async fn sync_many(
        &self,
        op: &'static str,
        listings: Vec<Listing>,
        cancel: &CancellationToken,
    ) -> BulkResult {
        let targets: Vec<(JobReport, ListingId)> = listings
            .iter()
            .map(|l| (JobReport::for_listing(JobKind::Sync, l), l.id))
            .collect();

        let shared = self.shared.clone();
        bulk::run(
            op,
            targets,
            self.shared.config.workers(),
            cancel,
            move |report, id| {
                let shared = shared.clone();
                async move {
                    let started_at = now_millis();
                    let result = sync_listing(&shared, id).await;
                    report.complete(started_at, &result)
                }
            },
        )
        .await
    }
}

pub(crate) async fn sync_listing<S: Store>(shared: &Shared<S>, id: ListingId) -> Result<Listing> {
    let _guard = shared.lock(id).await?;

    // Re-read under the lock so a queued operation sees the previous one's result.
    let mut listing = shared
        .store
        .get_listing(&id)
        .await?
        .ok_or(EngineError::ListingNotFound(id))?;

    let Some(external_id) = listing.external_id.clone() else {
        return Err(EngineError::NotLinked(id));
    };

    let location = shared
        .store
        .get_location(&listing.location_id)
        .await?
        .ok_or_else(|| EngineError::LocationNotFound(listing.location_id.clone()))?;

    let credential = match shared.resolver().resolve(&listing).await {
        Ok(credential) => credential,
        Err(error) if error.kind() == ErrorKind::CredentialNotFound => {
            return Err(record_failure(shared, listing, error).await);
        }
        Err(error) => return Err(error),
    };

    let adapter = shared.adapter(listing.platform)?;
    let local = location.snapshot();

    let snapshot = match adapter.fetch(&credential, &external_id).await {
        Ok(snapshot) => snapshot,
        Err(error) => return Err(record_failure(shared, listing, error.into()).await),
    };

    let discrepancies = diff(&local, &snapshot);
    let digest = snapshot.digest();
    if listing.snapshot_digest.as_deref() != Some(digest.as_str()) {
        tracing::debug!(listing_id = %id, platform = %listing.platform, "platform data changed since last sync");
    }

    listing.apply_sync(&snapshot, discrepancies, now_millis())?;
    shared.store.put_listing(&listing).await?;

    tracing::info!(
        listing_id = %id,
        platform = %listing.platform,
        status = %listing.status,
        discrepancies = listing.discrepancies.len(),
        "listing synced"
    );
    Ok(listing)
}

/// Mark `listing` as `error` with `error` as the reason, and hand the error back.
///
/// Discrepancies and `last_synced_at` are left as they were.
pub(crate) async fn record_failure<S: Store>(
    shared: &Shared<S>,
    mut listing: Listing,
    error: EngineError,
) -> EngineError {
    tracing::warn!(
        listing_id = %listing.id,
        platform = %listing.platform,
        error = %error,
        "listing operation failed"
    );
    listing.record_failure(error.to_string(), now_millis());
    match shared.store.put_listing(&listing).await {
        Ok(()) => error,
        Err(store_error) => store_error.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, LockPolicy};
    use crate::engine::Engine;
    use listsync_core::{Credential, Field, FieldValues, ListingStatus, Location};
    use listsync_platform::{AdapterError, AdapterRegistry, MemoryPlatform};
    use listsync_store::MemoryStore;
    use std::time::Duration;

    struct Fixture {
        engine: Engine<MemoryStore>,
        google: Arc<MemoryPlatform>,
        listing_id: ListingId,
    }

    fn location() -> Location {
        let mut loc = Location::new("loc-1", "ws-1", "Blue Door Cafe", 0);
        loc.phone = "+1 217 555 0100".into();
        loc.website = "https://bluedoor.example".into();
        loc
    }

    fn matching_fields() -> FieldValues {
        FieldValues::default()
            .with(Field::Name, "Blue Door Cafe")
            .with(Field::Phone, "+1 217 555 0100")
            .with(Field::Website, "https://bluedoor.example")
    }

    async fn fixture(config: EngineConfig, google: MemoryPlatform) -> Fixture {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();

        let store = Arc::new(MemoryStore::new());
        let google = Arc::new(google);
        google.insert_object("g-1", matching_fields());

        let loc = location();
        let cred = Credential::new("c1", "ws-1", Platform::Google, "acct", "token");
        let listing = Listing::linked(&loc, &cred, "g-1", 0);
        store.put_location(&loc).await.unwrap();
        store.put_credential(&cred).await.unwrap();
        store.put_listing(&listing).await.unwrap();

        let adapters = AdapterRegistry::new().with(google.clone());
        Fixture {
            engine: Engine::with_store(store, adapters, config),
            google,
            listing_id: listing.id,
        }
    }

    #[tokio::test]
    async fn test_sync_matching_data_is_synced() {
        let fx = fixture(EngineConfig::default(), MemoryPlatform::new(Platform::Google)).await;
        let listing = fx.engine.sync_one(&fx.listing_id).await.unwrap();

        assert_eq!(listing.status, ListingStatus::Synced);
        assert!(!listing.has_discrepancies());
        assert!(listing.last_synced_at.is_some());
        assert!(listing.snapshot_digest.is_some());
    }

    #[tokio::test]
    async fn test_sync_records_discrepancy() {
        let fx = fixture(EngineConfig::default(), MemoryPlatform::new(Platform::Google)).await;
        fx.google.insert_object(
            "g-1",
            matching_fields().with(Field::Phone, "+44 20 7946 0000"),
        );

        let listing = fx.engine.sync_one(&fx.listing_id).await.unwrap();
        assert_eq!(listing.status, ListingStatus::Discrepant);
        let d = listing.discrepancies.get(Field::Phone).unwrap();
        assert_eq!(d.local, "+1 217 555 0100");
        assert_eq!(d.platform, "+44 20 7946 0000");

        let stored = fx.engine.get_listing(&fx.listing_id).await.unwrap();
        assert_eq!(stored, listing);
    }

    #[tokio::test]
    async fn test_adapter_failure_is_non_destructive() {
        let fx = fixture(EngineConfig::default(), MemoryPlatform::new(Platform::Google)).await;
        fx.google.insert_object("g-1", matching_fields().with(Field::City, "Chicago"));
        let before = fx.engine.sync_one(&fx.listing_id).await.unwrap();

        fx.google.fail_next(AdapterError::Rejected("page disabled".into()));
        let err = fx.engine.sync_one(&fx.listing_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);

        let after = fx.engine.get_listing(&fx.listing_id).await.unwrap();
        assert_eq!(after.status, ListingStatus::Error);
        assert_eq!(after.discrepancies, before.discrepancies);
        assert_eq!(after.last_synced_at, before.last_synced_at);
        assert!(after.last_error.unwrap().contains("page disabled"));
    }

    #[tokio::test]
    async fn test_error_recovers_on_next_success() {
        let fx = fixture(EngineConfig::default(), MemoryPlatform::new(Platform::Google)).await;
        fx.google.fail_next(AdapterError::Unauthorized("expired".into()));
        assert!(fx.engine.sync_one(&fx.listing_id).await.is_err());

        let listing = fx.engine.sync_one(&fx.listing_id).await.unwrap();
        assert_eq!(listing.status, ListingStatus::Synced);
        assert_eq!(listing.last_error, None);
    }

    #[tokio::test]
    async fn test_unlinked_listing_is_not_linked() {
        let fx = fixture(EngineConfig::default(), MemoryPlatform::new(Platform::Google)).await;
        let cred = Credential::new("c2", "ws-1", Platform::Google, "acct-2", "t");
        let pending = Listing::pending(&location(), &cred, 0);
        fx.engine.store().put_credential(&cred).await.unwrap();
        fx.engine.store().put_listing(&pending).await.unwrap();

        let err = fx.engine.sync_one(&pending.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotLinked);
        assert_eq!(fx.engine.get_listing(&pending.id).await.unwrap(), pending);
        assert_eq!(fx.google.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_listing() {
        let fx = fixture(EngineConfig::default(), MemoryPlatform::new(Platform::Google)).await;
        let err = fx
            .engine
            .sync_one(&ListingId::from_bytes([9; 32]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ListingNotFound);
    }

    #[tokio::test]
    async fn test_concurrent_sync_rejected() {
        let fx = fixture(
            EngineConfig::default(),
            MemoryPlatform::new(Platform::Google).with_delay(Duration::from_millis(100)),
        )
        .await;

        let (a, b) = tokio::join!(
            fx.engine.sync_one(&fx.listing_id),
            fx.engine.sync_one(&fx.listing_id)
        );
        let conflicts = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(EngineError::Conflict(_))))
            .count();
        assert_eq!(conflicts, 1);
        assert!(a.is_ok() || b.is_ok());
        assert_eq!(fx.google.fetch_count(), 1);
        assert_eq!(fx.engine.locks().active(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_sync_waits() {
        let config = EngineConfig {
            lock_policy: LockPolicy::Wait,
            ..EngineConfig::default()
        };
        let fx = fixture(
            config,
            MemoryPlatform::new(Platform::Google).with_delay(Duration::from_millis(30)),
        )
        .await;

        let (a, b) = tokio::join!(
            fx.engine.sync_one(&fx.listing_id),
            fx.engine.sync_one(&fx.listing_id)
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(fx.google.fetch_count(), 2);
        assert_eq!(fx.google.max_in_flight(), 1);
    }
}
