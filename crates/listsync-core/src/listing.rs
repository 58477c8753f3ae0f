//! Listing: the mirror of one Location on one platform.
//!
//! A listing is bound to exactly one credential and identified by
//! [`ListingId::derive`] over `(location_id, platform, credential_id)`.
//!
//! Status lifecycle:
//!
//! ```text
//! unlinked ──> pending_sync ──> { synced <──> discrepant }
//!     │             │                  │
//!     └─────────────┴──> error <───────┘   (error recovers on success)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::diff::DiscrepancySet;
use crate::error::CoreError;
use crate::location::{Credential, Location};
use crate::snapshot::{Field, FieldValues, LocalSnapshot, PlatformSnapshot};
use crate::types::{CredentialId, ListingId, LocationId, Platform, WorkspaceId};

/// The status of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Known locally but never bound to a platform object.
    Unlinked,
    /// Bound to a credential; no successful operation yet.
    PendingSync,
    /// Last operation found no divergence.
    Synced,
    /// Last sync found at least one discrepancy.
    Discrepant,
    /// Last operation failed. Recoverable.
    Error,
}

impl ListingStatus {
    pub const ALL: [ListingStatus; 5] = [
        ListingStatus::Unlinked,
        ListingStatus::PendingSync,
        ListingStatus::Synced,
        ListingStatus::Discrepant,
        ListingStatus::Error,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Unlinked => "unlinked",
            ListingStatus::PendingSync => "pending_sync",
            ListingStatus::Synced => "synced",
            ListingStatus::Discrepant => "discrepant",
            ListingStatus::Error => "error",
        }
    }

    /// Parse the wire name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    /// Whether the state machine permits `self -> to`.
    ///
    /// Nothing returns to `unlinked`. `error` is reachable from anywhere.
    pub fn can_transition_to(&self, to: ListingStatus) -> bool {
        use ListingStatus::*;
        match (self, to) {
            (_, Unlinked) => false,
            (_, Error) => true,
            (Unlinked, PendingSync) => true,
            (Unlinked, _) => false,
            (_, PendingSync | Synced | Discrepant) => true,
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A listing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub location_id: LocationId,
    pub workspace_id: WorkspaceId,
    pub platform: Platform,
    pub credential_id: CredentialId,

    /// Platform-assigned id. `None` until the first successful publish.
    pub external_id: Option<String>,

    pub status: ListingStatus,

    /// Replaced wholesale by every successful sync.
    pub discrepancies: DiscrepancySet,

    /// Last successful sync or publish (Unix ms).
    pub last_synced_at: Option<i64>,

    /// Field values last observed on (or pushed to) the platform.
    pub observed: FieldValues,

    /// Digest of the last fetched platform snapshot.
    pub snapshot_digest: Option<String>,

    /// Reason of the last failure, cleared on success.
    pub last_error: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Listing {
    /// A listing that exists locally but is not bound to a platform object.
    pub fn unlinked(
        location: &Location,
        platform: Platform,
        credential_id: CredentialId,
        now: i64,
    ) -> Self {
        Self::with_status(location, platform, credential_id, None, ListingStatus::Unlinked, now)
    }

    /// A listing created by a first publish, bound to `credential`.
    pub fn pending(location: &Location, credential: &Credential, now: i64) -> Self {
        Self::with_status(
            location,
            credential.platform,
            credential.id.clone(),
            None,
            ListingStatus::PendingSync,
            now,
        )
    }

    /// A listing bound to an existing platform object, awaiting first sync.
    pub fn linked(
        location: &Location,
        credential: &Credential,
        external_id: impl Into<String>,
        now: i64,
    ) -> Self {
        Self::with_status(
            location,
            credential.platform,
            credential.id.clone(),
            Some(external_id.into()),
            ListingStatus::PendingSync,
            now,
        )
    }

    fn with_status(
        location: &Location,
        platform: Platform,
        credential_id: CredentialId,
        external_id: Option<String>,
        status: ListingStatus,
        now: i64,
    ) -> Self {
        Self {
            id: ListingId::derive(&location.id, platform, &credential_id),
            location_id: location.id.clone(),
            workspace_id: location.workspace_id.clone(),
            platform,
            credential_id,
            external_id,
            status,
            discrepancies: DiscrepancySet::new(),
            last_synced_at: None,
            observed: FieldValues::default(),
            snapshot_digest: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived: any discrepancy recorded.
    pub fn has_discrepancies(&self) -> bool {
        !self.discrepancies.is_empty()
    }

    /// Move to `to`, enforcing the state machine.
    pub fn transition(&mut self, to: ListingStatus, now: i64) -> Result<(), CoreError> {
        if !self.status.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Record a successful sync.
    ///
    /// The discrepancy set is replaced, never merged.
    pub fn apply_sync(
        &mut self,
        snapshot: &PlatformSnapshot,
        discrepancies: DiscrepancySet,
        now: i64,
    ) -> Result<(), CoreError> {
        let to = if discrepancies.is_empty() {
            ListingStatus::Synced
        } else {
            ListingStatus::Discrepant
        };
        self.transition(to, now)?;
        self.discrepancies = discrepancies;
        self.last_synced_at = Some(now);
        self.observed = snapshot.fields.clone();
        self.snapshot_digest = Some(snapshot.digest());
        self.last_error = None;
        Ok(())
    }

    /// Record a successful publish of `pushed`.
    ///
    /// Only the `applied` fields are known to match the platform now. Their
    /// discrepancies are cleared; those of other fields stay until the next
    /// sync re-reads them.
    pub fn apply_publish(
        &mut self,
        external_id: String,
        pushed: &LocalSnapshot,
        applied: &[Field],
        now: i64,
    ) -> Result<(), CoreError> {
        let mut remaining = DiscrepancySet::new();
        for (field, discrepancy) in self.discrepancies.iter() {
            if !applied.contains(&field) {
                remaining.insert(field, discrepancy.clone());
            }
        }

        let to = if remaining.is_empty() {
            ListingStatus::Synced
        } else {
            ListingStatus::Discrepant
        };
        self.transition(to, now)?;
        self.external_id = Some(external_id);
        self.discrepancies = remaining;
        self.last_synced_at = Some(now);
        for &field in applied {
            self.observed.set(field, pushed.get(field));
        }
        self.last_error = None;
        Ok(())
    }

    /// Record a failed operation.
    ///
    /// Discrepancies and `last_synced_at` keep their last-known-good values.
    pub fn record_failure(&mut self, reason: impl Into<String>, now: i64) {
        // error is reachable from every state
        self.status = ListingStatus::Error;
        self.last_error = Some(reason.into());
        self.updated_at = now;
    }
}
