//! Credential resolution: which authorization backs an operation.

use std::sync::Arc;

use listsync_core::{Credential, CredentialId, Listing, Location, LocationId, Platform};
use listsync_store::{Store, StoreExt};

use crate::error::{EngineError, Result};

/// Maps listings and (location, platform) pairs onto active credentials.
pub struct CredentialResolver<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for CredentialResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> CredentialResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The credential pinned by `listing`.
    ///
    /// Fails with `CredentialNotFound` if it was deleted, deactivated, or no
    /// longer matches the listing's platform or workspace.
    pub async fn resolve(&self, listing: &Listing) -> Result<Credential> {
        let credential = self
            .store
            .get_credential(&listing.credential_id)
            .await?
            .ok_or_else(|| {
                EngineError::CredentialNotFound(format!(
                    "credential {} was deleted",
                    listing.credential_id
                ))
            })?;

        check_usable(&credential, listing.platform, listing.workspace_id.as_str())?;
        Ok(credential)
    }

    /// A specific credential for publishing `location` to `platform`.
    pub async fn resolve_for(
        &self,
        location: &Location,
        platform: Platform,
        credential_id: &CredentialId,
    ) -> Result<Credential> {
        let credential = self
            .store
            .get_credential(credential_id)
            .await?
            .ok_or_else(|| {
                EngineError::CredentialNotFound(format!("credential {} does not exist", credential_id))
            })?;

        check_usable(&credential, platform, location.workspace_id.as_str())?;
        Ok(credential)
    }

    /// Every active credential that could serve `location_id` on `platform`.
    ///
    /// Multiple candidates are all returned; choosing is the caller's job.
    pub async fn candidates(
        &self,
        location_id: &LocationId,
        platform: Platform,
    ) -> Result<Vec<Credential>> {
        let location = self
            .store
            .get_location(location_id)
            .await?
            .ok_or_else(|| EngineError::LocationNotFound(location_id.clone()))?;
        self.candidates_for(&location, platform).await
    }

    pub(crate) async fn candidates_for(
        &self,
        location: &Location,
        platform: Platform,
    ) -> Result<Vec<Credential>> {
        Ok(self
            .store
            .active_credentials(&location.workspace_id, platform)
            .await?)
    }

    /// The only active credential for `location_id` on `platform`.
    ///
    /// Several candidates yield `CredentialAmbiguous` listing all of them.
    pub async fn resolve_unique(
        &self,
        location_id: &LocationId,
        platform: Platform,
    ) -> Result<Credential> {
        let mut candidates = self.candidates(location_id, platform).await?;
        match candidates.len() {
            0 => Err(EngineError::CredentialNotFound(format!(
                "no active {} credential in the workspace",
                platform
            ))),
            1 => Ok(candidates.remove(0)),
            _ => Err(EngineError::CredentialAmbiguous {
                platform,
                candidates: candidates.into_iter().map(|c| c.id).collect(),
            }),
        }
    }
}

fn check_usable(credential: &Credential, platform: Platform, workspace_id: &str) -> Result<()> {
    if !credential.is_active {
        return Err(EngineError::CredentialNotFound(format!(
            "credential {} is inactive",
            credential.id
        )));
    }
    if credential.platform != platform {
        return Err(EngineError::CredentialNotFound(format!(
            "credential {} is for {}, not {}",
            credential.id, credential.platform, platform
        )));
    }
    if credential.workspace_id.as_str() != workspace_id {
        return Err(EngineError::CredentialNotFound(format!(
            "credential {} belongs to another workspace",
            credential.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use listsync_store::MemoryStore;

    async fn setup() -> (CredentialResolver<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .put_location(&Location::new("loc-1", "ws-1", "Cafe", 0))
            .await
            .unwrap();
        (CredentialResolver::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_resolve_rejects_inactive_credential() {
        let (resolver, store) = setup().await;
        let location = store.get_location(&"loc-1".into()).await.unwrap().unwrap();
        let mut cred = Credential::new("c1", "ws-1", Platform::Google, "acct", "token");
        let listing = Listing::linked(&location, &cred, "g-1", 0);

        cred.is_active = false;
        store.put_credential(&cred).await.unwrap();

        let err = resolver.resolve(&listing).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialNotFound);
    }

    #[tokio::test]
    async fn test_resolve_deleted_credential() {
        let (resolver, store) = setup().await;
        let location = store.get_location(&"loc-1".into()).await.unwrap().unwrap();
        let cred = Credential::new("c1", "ws-1", Platform::Google, "acct", "token");
        let listing = Listing::linked(&location, &cred, "g-1", 0);

        let err = resolver.resolve(&listing).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialNotFound);
    }

    #[tokio::test]
    async fn test_resolve_for_wrong_platform() {
        let (resolver, store) = setup().await;
        let location = store.get_location(&"loc-1".into()).await.unwrap().unwrap();
        store
            .put_credential(&Credential::new("c1", "ws-1", Platform::Google, "acct", "t"))
            .await
            .unwrap();

        let err = resolver
            .resolve_for(&location, Platform::Bing, &"c1".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialNotFound);
    }

    #[tokio::test]
    async fn test_candidates_never_narrowed() {
        let (resolver, store) = setup().await;
        for id in ["c1", "c2"] {
            store
                .put_credential(&Credential::new(id, "ws-1", Platform::Facebook, id, "t"))
                .await
                .unwrap();
        }
        store
            .put_credential(&Credential::new("other", "ws-2", Platform::Facebook, "x", "t"))
            .await
            .unwrap();

        let candidates = resolver
            .candidates(&"loc-1".into(), Platform::Facebook)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 2);

        match resolver
            .resolve_unique(&"loc-1".into(), Platform::Facebook)
            .await
        {
            Err(EngineError::CredentialAmbiguous { candidates, .. }) => {
                assert_eq!(candidates, vec![CredentialId::new("c1"), CredentialId::new("c2")]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_unique_single_and_none() {
        let (resolver, store) = setup().await;
        let err = resolver
            .resolve_unique(&"loc-1".into(), Platform::Yelp)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialNotFound);

        store
            .put_credential(&Credential::new("y1", "ws-1", Platform::Yelp, "biz", "t"))
            .await
            .unwrap();
        let cred = resolver
            .resolve_unique(&"loc-1".into(), Platform::Yelp)
            .await
            .unwrap();
        assert_eq!(cred.id, CredentialId::new("y1"));
    }

    #[tokio::test]
    async fn test_candidates_unknown_location() {
        let (resolver, _store) = setup().await;
        let err = resolver
            .candidates(&"missing".into(), Platform::Google)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocationNotFound);
    }
}
