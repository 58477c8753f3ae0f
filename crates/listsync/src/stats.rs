//! Workspace statistics: a pure projection over one snapshot of listings.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use listsync_core::{Listing, ListingStatus, Platform, WorkspaceId};
use listsync_store::{Store, StoreExt};

use crate::engine::now_millis;
use crate::error::Result;

/// Aggregate counts for one workspace.
///
/// `by_platform` and `by_status` carry every key, with zero counts included,
/// so their values always sum to `total_listings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_listings: usize,
    pub by_platform: BTreeMap<Platform, usize>,
    pub by_status: BTreeMap<ListingStatus, usize>,
    pub with_discrepancies: usize,
    pub recently_synced: usize,
}

impl Stats {
    /// Project `listings` as of `now`. Recently synced means
    /// `now - last_synced_at <= window_ms`.
    pub fn from_listings(listings: &[Listing], now: i64, window_ms: i64) -> Self {
        let mut by_platform: BTreeMap<Platform, usize> =
            Platform::ALL.into_iter().map(|p| (p, 0)).collect();
        let mut by_status: BTreeMap<ListingStatus, usize> =
            ListingStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        let mut with_discrepancies = 0;
        let mut recently_synced = 0;

        for listing in listings {
            *by_platform.entry(listing.platform).or_default() += 1;
            *by_status.entry(listing.status).or_default() += 1;
            if listing.has_discrepancies() {
                with_discrepancies += 1;
            }
            if listing
                .last_synced_at
                .map_or(false, |t| now.saturating_sub(t) <= window_ms)
            {
                recently_synced += 1;
            }
        }

        Self {
            total_listings: listings.len(),
            by_platform,
            by_status,
            with_discrepancies,
            recently_synced,
        }
    }

    pub fn platform(&self, platform: Platform) -> usize {
        self.by_platform.get(&platform).copied().unwrap_or(0)
    }

    pub fn status(&self, status: ListingStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Computes [`Stats`] from the store.
pub struct StatsAggregator<S: Store> {
    store: Arc<S>,
    window_ms: i64,
}

impl<S: Store> StatsAggregator<S> {
    pub fn new(store: Arc<S>, window_ms: i64) -> Self {
        Self { store, window_ms }
    }

    pub async fn compute_stats(&self, workspace_id: &WorkspaceId) -> Result<Stats> {
        self.compute_stats_at(workspace_id, now_millis()).await
    }

    pub async fn compute_stats_at(&self, workspace_id: &WorkspaceId, now: i64) -> Result<Stats> {
        let listings = self.store.listings_in_workspace(workspace_id).await?;
        Ok(Stats::from_listings(&listings, now, self.window_ms))
    }
}
