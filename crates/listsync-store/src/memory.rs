//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use listsync_core::{
    Credential, CredentialId, Listing, ListingId, Location, LocationId, Platform, WorkspaceId,
};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, ListingFilter, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; every
/// call holds the lock for its whole duration, so list operations see one
/// consistent snapshot.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    locations: BTreeMap<LocationId, Location>,
    credentials: BTreeMap<CredentialId, Credential>,
    listings: BTreeMap<ListingId, Listing>,
}

impl MemoryStoreInner {
    fn slot_taken_by_other(&self, listing: &Listing) -> bool {
        self.listings.values().any(|l| {
            l.id != listing.id
                && l.location_id == listing.location_id
                && l.platform == listing.platform
                && l.credential_id == listing.credential_id
        })
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn duplicate(listing: &Listing) -> StoreError {
    StoreError::DuplicateListing {
        location_id: listing.location_id.to_string(),
        platform: listing.platform.to_string(),
        credential_id: listing.credential_id.to_string(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_location(&self, id: &LocationId) -> Result<Option<Location>> {
        Ok(self.read()?.locations.get(id).cloned())
    }

    async fn put_location(&self, location: &Location) -> Result<()> {
        self.write()?
            .locations
            .insert(location.id.clone(), location.clone());
        Ok(())
    }

    async fn delete_location(&self, id: &LocationId) -> Result<bool> {
        let mut inner = self.write()?;
        let existed = inner.locations.remove(id).is_some();
        inner.listings.retain(|_, l| &l.location_id != id);
        Ok(existed)
    }

    async fn list_locations(&self, workspace_id: &WorkspaceId) -> Result<Vec<Location>> {
        Ok(self
            .read()?
            .locations
            .values()
            .filter(|l| &l.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn get_credential(&self, id: &CredentialId) -> Result<Option<Credential>> {
        Ok(self.read()?.credentials.get(id).cloned())
    }

    async fn put_credential(&self, credential: &Credential) -> Result<()> {
        self.write()?
            .credentials
            .insert(credential.id.clone(), credential.clone());
        Ok(())
    }

    async fn delete_credential(&self, id: &CredentialId) -> Result<bool> {
        let mut inner = self.write()?;
        let existed = inner.credentials.remove(id).is_some();
        inner.listings.retain(|_, l| &l.credential_id != id);
        Ok(existed)
    }

    async fn list_credentials(
        &self,
        workspace_id: &WorkspaceId,
        platform: Option<Platform>,
    ) -> Result<Vec<Credential>> {
        Ok(self
            .read()?
            .credentials
            .values()
            .filter(|c| &c.workspace_id == workspace_id)
            .filter(|c| platform.map_or(true, |p| c.platform == p))
            .cloned()
            .collect())
    }

    async fn get_listing(&self, id: &ListingId) -> Result<Option<Listing>> {
        Ok(self.read()?.listings.get(id).cloned())
    }

    async fn insert_listing(&self, listing: &Listing) -> Result<InsertResult> {
        let mut inner = self.write()?;

        if inner.listings.contains_key(&listing.id) {
            return Ok(InsertResult::AlreadyExists);
        }
        if inner.slot_taken_by_other(listing) {
            return Err(duplicate(listing));
        }

        inner.listings.insert(listing.id, listing.clone());
        Ok(InsertResult::Inserted)
    }

    async fn put_listing(&self, listing: &Listing) -> Result<()> {
        let mut inner = self.write()?;
        if inner.slot_taken_by_other(listing) {
            return Err(duplicate(listing));
        }
        inner.listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn delete_listing(&self, id: &ListingId) -> Result<bool> {
        Ok(self.write()?.listings.remove(id).is_some())
    }

    async fn list_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        Ok(self
            .read()?
            .listings
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect())
    }
}
