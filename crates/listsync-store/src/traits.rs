//! Store trait: the abstract repository for locations, credentials and listings.
//!
//! The engine never touches ambient state; everything goes through this
//! trait so that a real database can be substituted for the in-memory one.

use async_trait::async_trait;
use listsync_core::{
    Credential, CredentialId, Listing, ListingId, ListingStatus, Location, LocationId, Platform,
    WorkspaceId,
};

use crate::error::Result;

/// Result of inserting a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Listing was inserted.
    Inserted,
    /// A listing with this id already exists; nothing was written.
    AlreadyExists,
}

/// Selection criteria for listing queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    pub workspace_id: Option<WorkspaceId>,
    pub location_id: Option<LocationId>,
    pub platform: Option<Platform>,
    pub credential_id: Option<CredentialId>,
    pub status: Option<ListingStatus>,
    pub has_discrepancies: Option<bool>,
}

impl ListingFilter {
    pub fn workspace(workspace_id: &WorkspaceId) -> Self {
        Self {
            workspace_id: Some(workspace_id.clone()),
            ..Self::default()
        }
    }

    pub fn location(location_id: &LocationId) -> Self {
        Self {
            location_id: Some(location_id.clone()),
            ..Self::default()
        }
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn status(mut self, status: ListingStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn has_discrepancies(mut self, flag: bool) -> Self {
        self.has_discrepancies = Some(flag);
        self
    }

    /// Whether `listing` satisfies every set criterion.
    pub fn matches(&self, listing: &Listing) -> bool {
        self.workspace_id
            .as_ref()
            .map_or(true, |w| &listing.workspace_id == w)
            && self
                .location_id
                .as_ref()
                .map_or(true, |l| &listing.location_id == l)
            && self.platform.map_or(true, |p| listing.platform == p)
            && self
                .credential_id
                .as_ref()
                .map_or(true, |c| &listing.credential_id == c)
            && self.status.map_or(true, |s| listing.status == s)
            && self
                .has_discrepancies
                .map_or(true, |d| listing.has_discrepancies() == d)
    }
}

/// The Store trait: async repository interface.
///
/// # Design Notes
///
/// - **Whole-record writes**: `put_listing` replaces the stored record in one
///   step, so readers never observe a half-written listing.
/// - **Slot uniqueness**: at most one listing per
///   `(location_id, platform, credential_id)`.
/// - **Cascades**: deleting a location or credential deletes its listings.
/// - **Ordering**: list operations return records ordered by id.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Location Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a location by id.
    async fn get_location(&self, id: &LocationId) -> Result<Option<Location>>;

    /// Insert or replace a location.
    async fn put_location(&self, location: &Location) -> Result<()>;

    /// Delete a location and its listings. Returns whether it existed.
    async fn delete_location(&self, id: &LocationId) -> Result<bool>;

    /// List locations owned by a workspace.
    async fn list_locations(&self, workspace_id: &WorkspaceId) -> Result<Vec<Location>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Credential Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a credential by id.
    async fn get_credential(&self, id: &CredentialId) -> Result<Option<Credential>>;

    /// Insert or replace a credential.
    async fn put_credential(&self, credential: &Credential) -> Result<()>;

    /// Delete a credential and the listings it backs. Returns whether it existed.
    async fn delete_credential(&self, id: &CredentialId) -> Result<bool>;

    /// List credentials in a workspace, optionally for one platform.
    ///
    /// Inactive credentials are included; callers filter on `is_active`.
    async fn list_credentials(
        &self,
        workspace_id: &WorkspaceId,
        platform: Option<Platform>,
    ) -> Result<Vec<Credential>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Listing Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a listing by id.
    async fn get_listing(&self, id: &ListingId) -> Result<Option<Listing>>;

    /// Insert a listing only if its id is free.
    async fn insert_listing(&self, listing: &Listing) -> Result<InsertResult>;

    /// Insert or replace a listing.
    async fn put_listing(&self, listing: &Listing) -> Result<()>;

    /// Delete a listing. Returns whether it existed.
    async fn delete_listing(&self, id: &ListingId) -> Result<bool>;

    /// List listings matching `filter`, as one consistent snapshot.
    async fn list_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Every listing of a location.
    fn listings_for_location(
        &self,
        location_id: &LocationId,
    ) -> impl std::future::Future<Output = Result<Vec<Listing>>> + Send;

    /// Every listing in a workspace.
    fn listings_in_workspace(
        &self,
        workspace_id: &WorkspaceId,
    ) -> impl std::future::Future<Output = Result<Vec<Listing>>> + Send;

    /// Active credentials in a workspace for one platform.
    fn active_credentials(
        &self,
        workspace_id: &WorkspaceId,
        platform: Platform,
    ) -> impl std::future::Future<Output = Result<Vec<Credential>>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn listings_for_location(&self, location_id: &LocationId) -> Result<Vec<Listing>> {
        self.list_listings(&ListingFilter::location(location_id))
            .await
    }

    async fn listings_in_workspace(&self, workspace_id: &WorkspaceId) -> Result<Vec<Listing>> {
        self.list_listings(&ListingFilter::workspace(workspace_id))
            .await
    }

    async fn active_credentials(
        &self,
        workspace_id: &WorkspaceId,
        platform: Platform,
    ) -> Result<Vec<Credential>> {
        let mut credentials = self.list_credentials(workspace_id, Some(platform)).await?;
        credentials.retain(|c| c.is_active);
        Ok(credentials)
    }
}
