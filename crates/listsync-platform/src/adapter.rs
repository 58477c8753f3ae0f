//! The uniform capability every platform integration provides.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use listsync_core::{Credential, Field, LocalSnapshot, Platform, PlatformSnapshot};

use crate::error::Result;

/// Acknowledgement of a successful push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAck {
    /// The platform object id that now carries the pushed data.
    pub external_id: String,
    /// Fields the platform overwrote. Anything else keeps its previous
    /// platform value.
    pub applied: Vec<Field>,
}

impl PushAck {
    pub fn new(external_id: impl Into<String>, applied: Vec<Field>) -> Self {
        Self {
            external_id: external_id.into(),
            applied,
        }
    }

    /// An ack for a push that overwrote every field.
    pub fn full(external_id: impl Into<String>) -> Self {
        Self::new(external_id, Field::ALL.to_vec())
    }
}

/// A platform integration.
///
/// Adapters own all platform-specific request and response shapes. They
/// normalize what the platform reports into a [`PlatformSnapshot`] and never
/// touch listing state.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// The platform this adapter talks to.
    fn platform(&self) -> Platform;

    /// Read the platform object `external_id` using `credential`.
    async fn fetch(&self, credential: &Credential, external_id: &str) -> Result<PlatformSnapshot>;

    /// Overwrite the platform object with `local`.
    ///
    /// `external_id` is `None` on a first publish; the adapter decides which
    /// object to create or claim and reports it in the ack.
    async fn push(
        &self,
        credential: &Credential,
        external_id: Option<&str>,
        local: &LocalSnapshot,
    ) -> Result<PushAck>;
}

#[async_trait]
impl<T: PlatformAdapter + ?Sized> PlatformAdapter for Arc<T> {
    fn platform(&self) -> Platform {
        (**self).platform()
    }

    async fn fetch(&self, credential: &Credential, external_id: &str) -> Result<PlatformSnapshot> {
        (**self).fetch(credential, external_id).await
    }

    async fn push(
        &self,
        credential: &Credential,
        external_id: Option<&str>,
        local: &LocalSnapshot,
    ) -> Result<PushAck> {
        (**self).push(credential, external_id, local).await
    }
}
