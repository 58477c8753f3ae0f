//! Request/response layer for the dashboard endpoints.
//!
//! Transport-agnostic: every request and response is a serde type, and
//! [`Api`] maps each endpoint onto the engine. A host binds these to HTTP
//! routes however it likes.
//!
//! | endpoint               | handler                 |
//! |------------------------|-------------------------|
//! | `GET stats`            | [`Api::stats`]          |
//! | `GET listings`         | [`Api::list_listings`]  |
//! | `GET listings/{id}`    | [`Api::get_listing`]    |
//! | `POST sync`            | [`Api::sync`]           |
//! | `POST sync-all`        | [`Api::sync_all`]       |
//! | `POST publish`         | [`Api::publish`]        |
//! | `POST publish-to-all`  | [`Api::publish_to_all`] |

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use listsync_core::{
    CredentialId, DiscrepancySet, Listing, ListingId, ListingStatus, LocationId, Platform,
    WorkspaceId,
};
use listsync_store::{ListingFilter, Store};

use crate::bulk::{BulkResult, BulkSummary, JobKind, JobReport};
use crate::engine::{now_millis, Engine};
use crate::error::{EngineError, ErrorKind, Result};
use crate::stats::Stats;

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsQuery {
    pub workspace_id: WorkspaceId,
}

/// Filters for `GET listings`. Omitted fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingsQuery {
    pub workspace_id: Option<WorkspaceId>,
    pub location_id: Option<LocationId>,
    pub platform: Option<Platform>,
    pub status: Option<ListingStatus>,
    pub has_discrepancies: Option<bool>,
}

impl From<ListingsQuery> for ListingFilter {
    fn from(q: ListingsQuery) -> Self {
        ListingFilter {
            workspace_id: q.workspace_id,
            location_id: q.location_id,
            platform: q.platform,
            credential_id: None,
            status: q.status,
            has_discrepancies: q.has_discrepancies,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub location_id: LocationId,
    #[serde(default)]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAllRequest {
    pub workspace_id: WorkspaceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub location_id: LocationId,
    pub platform: Platform,
    pub credential_id: CredentialId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishToAllRequest {
    pub location_id: LocationId,
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub workspace_id: WorkspaceId,
    #[serde(flatten)]
    pub stats: Stats,
    pub recent_window_ms: i64,
}

/// A listing as the dashboard sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingView {
    pub id: ListingId,
    pub location_id: LocationId,
    pub workspace_id: WorkspaceId,
    pub platform: Platform,
    pub credential_id: CredentialId,
    pub external_id: Option<String>,
    pub status: ListingStatus,
    pub discrepancies: DiscrepancySet,
    pub has_discrepancies: bool,
    pub last_synced_at: Option<i64>,
    pub last_error: Option<String>,
    pub updated_at: i64,
}

impl From<Listing> for ListingView {
    fn from(l: Listing) -> Self {
        let has_discrepancies = l.has_discrepancies();
        Self {
            id: l.id,
            location_id: l.location_id,
            workspace_id: l.workspace_id,
            platform: l.platform,
            credential_id: l.credential_id,
            external_id: l.external_id,
            status: l.status,
            discrepancies: l.discrepancies,
            has_discrepancies,
            last_synced_at: l.last_synced_at,
            last_error: l.last_error,
            updated_at: l.updated_at,
        }
    }
}

/// Result of every mutating call: one entry per target plus counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub results: Vec<JobReport>,
    pub summary: BulkSummary,
}

impl From<BulkResult> for OperationResponse {
    fn from(result: BulkResult) -> Self {
        let summary = result.summary();
        Self {
            results: result.jobs,
            summary,
        }
    }
}

/// A request-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub message: String,
}

impl From<&EngineError> for ErrorResponse {
    fn from(e: &EngineError) -> Self {
        Self {
            error: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<EngineError> for ErrorResponse {
    fn from(e: EngineError) -> Self {
        Self::from(&e)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Endpoint handlers over an [`Engine`].
///
/// Mutating handlers take a cancellation token so a host can abort bulk work
/// when the client goes away.
pub struct Api<S: Store> {
    engine: Engine<S>,
}

impl<S: Store + 'static> Api<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    /// `GET stats`
    pub async fn stats(&self, query: StatsQuery) -> Result<StatsResponse> {
        let stats = self.engine.compute_stats(&query.workspace_id).await?;
        Ok(StatsResponse {
            workspace_id: query.workspace_id,
            stats,
            recent_window_ms: self.engine.config().recent_window_ms,
        })
    }

    /// `GET listings`
    pub async fn list_listings(&self, query: ListingsQuery) -> Result<Vec<ListingView>> {
        let listings = self.engine.list_listings(&query.into()).await?;
        Ok(listings.into_iter().map(ListingView::from).collect())
    }

    /// `GET listings/{id}`
    ///
    /// An id that is not 64 hex characters names no listing.
    pub async fn get_listing(&self, id: &str) -> Result<ListingView> {
        let id: ListingId = id
            .parse()
            .map_err(|_| EngineError::ListingNotFound(ListingId::from_bytes([0; 32])))?;
        Ok(self.engine.get_listing(&id).await?.into())
    }

    /// `POST sync`
    pub async fn sync(
        &self,
        request: SyncRequest,
        cancel: &CancellationToken,
    ) -> Result<OperationResponse> {
        let result = match request.platform {
            Some(platform) => {
                self.engine
                    .sync_location_platform(&request.location_id, platform, cancel)
                    .await?
            }
            None => {
                self.engine
                    .sync_all_for_location(&request.location_id, cancel)
                    .await?
            }
        };
        Ok(result.into())
    }

    /// `POST sync-all`
    pub async fn sync_all(
        &self,
        request: SyncAllRequest,
        cancel: &CancellationToken,
    ) -> Result<OperationResponse> {
        Ok(self
            .engine
            .sync_all_in_workspace(&request.workspace_id, cancel)
            .await?
            .into())
    }

    /// `POST publish`
    ///
    /// A missing or invalid location fails the request. Every other failure
    /// is reported in the single result entry.
    pub async fn publish(&self, request: PublishRequest) -> Result<OperationResponse> {
        let report = JobReport::pending(
            JobKind::Publish,
            request.location_id.clone(),
            request.platform,
            Some(request.credential_id.clone()),
        );
        let started_at = now_millis();
        let result = self
            .engine
            .publish(&request.location_id, request.platform, &request.credential_id)
            .await;

        // Same request-level failures as publish-to-all.
        if let Err(
            e @ (EngineError::LocationNotFound(_)
            | EngineError::Validation(_)
            | EngineError::Store(_)),
        ) = result
        {
            return Err(e);
        }

        Ok(BulkResult {
            jobs: vec![report.complete(started_at, &result)],
            cancelled: false,
        }
        .into())
    }

    /// `POST publish-to-all`
    pub async fn publish_to_all(
        &self,
        request: PublishToAllRequest,
        cancel: &CancellationToken,
    ) -> Result<OperationResponse> {
        Ok(self
            .engine
            .publish_to_all_platforms(&request.location_id, cancel)
            .await?
            .into())
    }
}
