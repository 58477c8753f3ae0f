//! # Listsync Core
//!
//! Pure primitives for listing reconciliation: locations, credentials,
//! listings, snapshots, and the diff engine.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Location`] - A business's canonical profile
//! - [`Credential`] - Authorization for one platform account
//! - [`Listing`] - The mirror of one Location on one platform
//! - [`ListingId`] - Identifier derived from (location, platform, credential)
//! - [`LocalSnapshot`] / [`PlatformSnapshot`] - The two sides of a comparison
//! - [`DiscrepancySet`] - Field-level divergence, keyed by [`Field`]
//!
//! ## Diffing
//!
//! [`diff`] is a pure function over two snapshots. See the [`diff`](mod@diff)
//! module for the comparison rules.

pub mod diff;
pub mod error;
pub mod listing;
pub mod location;
pub mod snapshot;
pub mod types;
pub mod validation;

pub use diff::{compared_fields, diff, Discrepancy, DiscrepancySet, DIFF_FIELDS_VERSION};
pub use error::{CoreError, ValidationError};
pub use listing::{Listing, ListingStatus};
pub use location::{Credential, CredentialMetadata, Location};
pub use snapshot::{Field, FieldValues, LocalSnapshot, PlatformSnapshot};
pub use types::{CredentialId, ListingId, LocationId, Platform, WorkspaceId};
pub use validation::validate_location;
