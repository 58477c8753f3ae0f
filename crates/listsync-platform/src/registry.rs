//! Adapter registry: one adapter per platform.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use listsync_core::Platform;

use crate::adapter::PlatformAdapter;
use crate::retry::{Resilient, RetryPolicy};

/// Maps each platform to the adapter that serves it.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` for the platform it reports, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    /// A copy of this registry with every adapter wrapped in [`Resilient`].
    pub fn resilient(&self, policy: &RetryPolicy) -> Self {
        let adapters = self
            .adapters
            .iter()
            .map(|(platform, adapter)| {
                let wrapped: Arc<dyn PlatformAdapter> =
                    Arc::new(Resilient::new(adapter.clone(), policy.clone()));
                (*platform, wrapped)
            })
            .collect();
        Self { adapters }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn contains(&self, platform: Platform) -> bool {
        self.adapters.contains_key(&platform)
    }

    /// Registered platforms in canonical order.
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}
