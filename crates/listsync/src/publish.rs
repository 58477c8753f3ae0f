//! Publish coordinator: push canonical location data outward.
//!
//! Publishing is a one-directional overwrite. The location's canonical
//! fields are pushed as-is; nothing observed on the platform is merged back.
//! Existing discrepancies do not block a publish.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use listsync_core::{
    validate_location, CredentialId, Listing, ListingId, ListingStatus, Location, LocationId,
    Platform,
};
use listsync_store::{InsertResult, Store, StoreExt};

use crate::bulk::{self, BulkResult, JobKind, JobReport};
use crate::engine::{now_millis, Shared};
use crate::error::{EngineError, ErrorKind, Result};
use crate::sync::record_failure;

/// Runs publishes for one target or every platform of a location.
pub struct PublishCoordinator<S: Store> {
    shared: Arc<Shared<S>>,
}

/// One resolved publish target.
#[derive(Debug, Clone)]
struct Target {
    platform: Platform,
    credential_id: CredentialId,
}

impl<S: Store + 'static> PublishCoordinator<S> {
    pub(crate) fn new(shared: Arc<Shared<S>>) -> Self {
        Self { shared }
    }

    /// Publish `location_id` to `platform` through `credential_id`.
    ///
    /// Creates the listing in `pending_sync` on first publish.
    pub async fn publish(
        &self,
        location_id: &LocationId,
        platform: Platform,
        credential_id: &CredentialId,
    ) -> Result<Listing> {
        let location = load_valid_location(&self.shared, location_id).await?;
        publish_target(&self.shared, &location, platform, credential_id).await
    }

    /// Publish a location to every platform it is, or can be, listed on.
    ///
    /// Targets are every existing listing of the location (through its pinned
    /// credential), plus every platform without a listing that has exactly
    /// one active credential in the workspace. Platforms with several active
    /// credentials are reported as `CredentialAmbiguous` without a push.
    pub async fn publish_to_all_platforms(
        &self,
        location_id: &LocationId,
        cancel: &CancellationToken,
    ) -> Result<BulkResult> {
        let location = load_valid_location(&self.shared, location_id).await?;
        let existing = self.shared.store.listings_for_location(location_id).await?;

        let mut targets: Vec<Target> = existing
            .iter()
            .map(|l| Target {
                platform: l.platform,
                credential_id: l.credential_id.clone(),
            })
            .collect();
        let covered: BTreeSet<Platform> = existing.iter().map(|l| l.platform).collect();

        let resolver = self.shared.resolver();
        let mut ambiguous = Vec::new();
        for platform in Platform::ALL {
            if covered.contains(&platform) {
                continue;
            }
            let mut candidates = resolver.candidates_for(&location, platform).await?;
            match candidates.len() {
                0 => {}
                1 => targets.push(Target {
                    platform,
                    credential_id: candidates.remove(0).id,
                }),
                _ => {
                    let error = EngineError::CredentialAmbiguous {
                        platform,
                        candidates: candidates.into_iter().map(|c| c.id).collect(),
                    };
                    tracing::info!(location_id = %location.id, %platform, "publish target ambiguous");
                    ambiguous.push(
                        JobReport::pending(JobKind::Publish, location.id.clone(), platform, None)
                            .rejected(&error),
                    );
                }
            }
        }

        let jobs: Vec<(JobReport, Target)> = targets
            .into_iter()
            .map(|t| {
                let report = JobReport::pending(
                    JobKind::Publish,
                    location.id.clone(),
                    t.platform,
                    Some(t.credential_id.clone()),
                );
                (report, t)
            })
            .collect();

        let shared = self.shared.clone();
        let location = Arc::new(location);
        let mut result = bulk::run(
            "publish_to_all",
            jobs,
            self.shared.config.workers(),
            cancel,
            move |report, target| {
                let shared = shared.clone();
                let location = location.clone();
                async move {
                    let started_at = now_millis();
                    let result =
                        publish_target(&shared, &location, target.platform, &target.credential_id)
                            .await;
                    report.complete(started_at, &result)
                }
            },
        )
        .await;
        result.extend(ambiguous);
        Ok(result)
    }
}

async fn load_valid_location<S: Store>(
    shared: &Shared<S>,
    location_id: &LocationId,
) -> Result<Location> {
    let location = shared
        .store
        .get_location(location_id)
        .await?
        .ok_or_else(|| EngineError::LocationNotFound(location_id.clone()))?;
    validate_location(&location)?;
    Ok(location)
}

/// Push `location` to one (platform, credential) target.
async fn publish_target<S: Store>(
    shared: &Shared<S>,
    location: &Location,
    platform: Platform,
    credential_id: &CredentialId,
) -> Result<Listing> {
    let adapter = shared.adapter(platform)?;
    let id = ListingId::derive(&location.id, platform, credential_id);
    let _guard = shared.lock(id).await?;

    let existing = shared.store.get_listing(&id).await?;

    let credential = match shared
        .resolver()
        .resolve_for(location, platform, credential_id)
        .await
    {
        Ok(credential) => credential,
        Err(error) => {
            return Err(match existing {
                Some(listing) if error.kind() == ErrorKind::CredentialNotFound => {
                    record_failure(shared, listing, error).await
                }
                _ => error,
            });
        }
    };

    let now = now_millis();
    let mut listing = match existing {
        Some(listing) => listing,
        None => {
            let listing = Listing::pending(location, &credential, now);
            if shared.store.insert_listing(&listing).await? == InsertResult::AlreadyExists {
                shared
                    .store
                    .get_listing(&id)
                    .await?
                    .ok_or(EngineError::ListingNotFound(id))?
            } else {
                tracing::debug!(listing_id = %id, %platform, "listing created by first publish");
                listing
            }
        }
    };

    if listing.status == ListingStatus::Unlinked {
        listing.transition(ListingStatus::PendingSync, now)?;
    }

    let local = location.snapshot();
    match adapter
        .push(&credential, listing.external_id.as_deref(), &local)
        .await
    {
        Ok(ack) => {
            listing.apply_publish(ack.external_id, &local, &ack.applied, now_millis())?;
            shared.store.put_listing(&listing).await?;
            tracing::info!(
                listing_id = %id,
                %platform,
                external_id = listing.external_id.as_deref().unwrap_or_default(),
                "listing published"
            );
            Ok(listing)
        }
        Err(error) => Err(record_failure(shared, listing, error.into()).await),
    }
}
