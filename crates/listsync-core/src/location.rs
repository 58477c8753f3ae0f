//! Locations and credentials: the records this core consumes but does not own.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::snapshot::{Field, FieldValues, LocalSnapshot};
use crate::types::{CredentialId, LocationId, Platform, WorkspaceId};

/// A business's canonical profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub address2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub website: String,
    /// Canonical value for platforms that display a category.
    #[serde(default)]
    pub category: Option<String>,
    /// Creation time (Unix ms).
    pub created_at: i64,
}

impl Location {
    /// A location with only the required fields set.
    pub fn new(
        id: impl Into<LocationId>,
        workspace_id: impl Into<WorkspaceId>,
        name: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            name: name.into(),
            address: String::new(),
            address2: String::new(),
            city: String::new(),
            state: String::new(),
            postal_code: String::new(),
            country: String::new(),
            phone: String::new(),
            website: String::new(),
            category: None,
            created_at,
        }
    }

    /// The canonical value of `field`.
    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Name => &self.name,
            Field::Address => &self.address,
            Field::Address2 => &self.address2,
            Field::City => &self.city,
            Field::State => &self.state,
            Field::PostalCode => &self.postal_code,
            Field::Country => &self.country,
            Field::Phone => &self.phone,
            Field::Website => &self.website,
            Field::Category => self.category.as_deref().unwrap_or(""),
        }
    }

    /// Capture the canonical fields for one sync or publish.
    pub fn snapshot(&self) -> LocalSnapshot {
        let mut fields = FieldValues::default();
        for field in Field::ALL {
            fields.set(field, self.field(field));
        }
        LocalSnapshot::new(fields)
    }
}

/// Display metadata for a credential, as shown in the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub follower_count: Option<u64>,
}

/// An authorization grant for one platform account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub workspace_id: WorkspaceId,
    pub platform: Platform,
    /// Platform account id (e.g. a Facebook Page id).
    pub external_account_id: String,
    pub is_active: bool,
    /// Opaque auth material (access token). Never logged.
    pub auth: String,
    #[serde(default)]
    pub metadata: CredentialMetadata,
}

impl Credential {
    pub fn new(
        id: impl Into<CredentialId>,
        workspace_id: impl Into<WorkspaceId>,
        platform: Platform,
        external_account_id: impl Into<String>,
        auth: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            platform,
            external_account_id: external_account_id.into(),
            is_active: true,
            auth: auth.into(),
            metadata: CredentialMetadata::default(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("workspace_id", &self.workspace_id)
            .field("platform", &self.platform)
            .field("external_account_id", &self.external_account_id)
            .field("is_active", &self.is_active)
            .field("auth", &"[REDACTED]")
            .field("metadata", &self.metadata)
            .finish()
    }
}
