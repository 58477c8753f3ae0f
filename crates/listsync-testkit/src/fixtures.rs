//! Test fixtures and helpers.
//!
//! Common setup code for scenario tests: a memory store, one scriptable
//! platform per [`Platform`], and an engine wired to both.

use std::collections::BTreeMap;
use std::sync::Arc;

use listsync::{Engine, EngineConfig};
use listsync_core::{Credential, FieldValues, Listing, Location, Platform, WorkspaceId};
use listsync_platform::{AdapterRegistry, MemoryPlatform, RetryPolicy};
use listsync_store::{MemoryStore, Store};

/// Default workspace of a fixture.
pub const WORKSPACE: &str = "ws-test";

/// A location that passes validation.
pub fn cafe(id: &str, workspace: &str) -> Location {
    let mut location = Location::new(id, workspace, "Blue Door Cafe", 1_000);
    location.address = "12 Elm St".into();
    location.city = "Springfield".into();
    location.state = "IL".into();
    location.postal_code = "62701".into();
    location.country = "US".into();
    location.phone = "+1 217 555 0100".into();
    location.website = "https://bluedoor.example".into();
    location.category = Some("Cafe".into());
    location
}

/// A store, an engine, and one [`MemoryPlatform`] per platform.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub engine: Engine<MemoryStore>,
    pub workspace: WorkspaceId,
    platforms: BTreeMap<Platform, Arc<MemoryPlatform>>,
}

impl TestFixture {
    /// Create a fixture whose adapters get a single attempt, so scripted
    /// failures surface directly.
    pub fn new() -> Self {
        Self::with_config(single_attempt())
    }

    /// Create a fixture with `config`. The engine wraps every platform with
    /// `config.retry`.
    pub fn with_config(config: EngineConfig) -> Self {
        let platforms: BTreeMap<_, _> = Platform::ALL
            .into_iter()
            .map(|p| (p, Arc::new(MemoryPlatform::new(p))))
            .collect();
        Self::assemble(config, platforms)
    }

    /// Create a fixture whose platforms answer after `delay`.
    pub fn with_delay(config: EngineConfig, delay: std::time::Duration) -> Self {
        let platforms: BTreeMap<_, _> = Platform::ALL
            .into_iter()
            .map(|p| (p, Arc::new(MemoryPlatform::new(p).with_delay(delay))))
            .collect();
        Self::assemble(config, platforms)
    }

    fn assemble(config: EngineConfig, platforms: BTreeMap<Platform, Arc<MemoryPlatform>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mut adapters = AdapterRegistry::new();
        for platform in platforms.values() {
            adapters.register(platform.clone());
        }
        Self {
            engine: Engine::with_store(store.clone(), adapters, config),
            store,
            workspace: WORKSPACE.into(),
            platforms,
        }
    }

    /// The scriptable platform behind `platform`.
    pub fn platform(&self, platform: Platform) -> &Arc<MemoryPlatform> {
        &self.platforms[&platform]
    }

    /// Store a valid location in the fixture's workspace.
    pub async fn location(&self, id: &str) -> Location {
        let location = cafe(id, self.workspace.as_str());
        self.store
            .put_location(&location)
            .await
            .unwrap_or_else(|e| panic!("put_location({}): {}", id, e));
        location
    }

    /// Store an active credential in the fixture's workspace.
    pub async fn credential(&self, id: &str, platform: Platform) -> Credential {
        let credential = Credential::new(
            id,
            self.workspace.clone(),
            platform,
            format!("acct-{}", id),
            format!("token-{}", id),
        );
        self.store
            .put_credential(&credential)
            .await
            .unwrap_or_else(|e| panic!("put_credential({}): {}", id, e));
        credential
    }

    /// Store a listing already published as `external_id`, and seed the
    /// platform with an object that mirrors `location` exactly.
    pub async fn linked(
        &self,
        location: &Location,
        credential: &Credential,
        external_id: &str,
    ) -> Listing {
        let listing = Listing::linked(location, credential, external_id, 1_000);
        self.store
            .put_listing(&listing)
            .await
            .unwrap_or_else(|e| panic!("put_listing({}): {}", external_id, e));
        self.platform(credential.platform)
            .insert_object(external_id, mirror(location));
        listing
    }

    /// Re-read a listing from the store.
    pub async fn reload(&self, listing: &Listing) -> Listing {
        self.store
            .get_listing(&listing.id)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| panic!("listing {} vanished", listing.id))
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// The default engine config with one attempt per adapter call.
pub fn single_attempt() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy::no_retry(),
        ..EngineConfig::default()
    }
}

/// Platform-side fields identical to `location`'s canonical fields.
pub fn mirror(location: &Location) -> FieldValues {
    location.snapshot().fields
}
