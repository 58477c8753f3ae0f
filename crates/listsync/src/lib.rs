//! # Listsync
//!
//! The listing reconciliation and publish engine.
//!
//! ## Overview
//!
//! A business keeps one canonical profile (a Location) and mirrors it onto
//! third-party platforms as Listings. This crate keeps the two sides honest:
//!
//! - **Sync**: fetch a listing from its platform, diff it against the
//!   Location, and record what diverges. Sync never writes to the platform.
//! - **Publish**: push the Location's canonical fields to a platform,
//!   creating the listing on first publish. Publish never reads local data
//!   from the platform.
//! - **Bulk**: run either operation over many targets with bounded
//!   concurrency, per-target isolation and cancellation.
//! - **Stats**: aggregate counts over a workspace's listings.
//!
//! ## Key Concepts
//!
//! - **Listing lock**: at most one sync or publish runs per listing.
//! - **Non-destructive failure**: a failed operation sets the listing to
//!   `error` but keeps its last known discrepancies and sync time.
//! - **Credential resolution**: a listing is only touched through an active
//!   credential of its own workspace and platform.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use listsync::{Engine, EngineConfig};
//! use listsync::platform::FacebookAdapter;
//! use listsync::store::SqliteStore;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() -> listsync::Result<()> {
//!     let store = SqliteStore::open("listsync.db")?;
//!     let engine = Engine::builder(store)
//!         .config(EngineConfig::default())
//!         .adapter(FacebookAdapter::new()?)
//!         .build();
//!
//!     let result = engine
//!         .sync_all_in_workspace(&"ws-1".into(), &CancellationToken::new())
//!         .await?;
//!     println!("{:?}", result.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `listsync::core` - Locations, listings, snapshots, diff
//! - `listsync::store` - Storage abstraction and SQLite
//! - `listsync::platform` - Platform adapters and retry policy

pub mod api;
pub mod bulk;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod locks;
pub mod publish;
pub mod stats;
pub mod sync;

// Re-export component crates
pub use listsync_core as core;
pub use listsync_platform as platform;
pub use listsync_store as store;

// Re-export main types for convenience
pub use api::{Api, ErrorResponse, ListingView, OperationResponse};
pub use bulk::{BulkResult, BulkSummary, JobKind, JobOutcome, JobReport};
pub use config::{EngineConfig, LockPolicy};
pub use credentials::CredentialResolver;
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, ErrorKind, Result};
pub use locks::{ListingGuard, ListingLocks};
pub use publish::PublishCoordinator;
pub use stats::{Stats, StatsAggregator};
pub use sync::SyncCoordinator;

// Re-export commonly used core types
pub use listsync_core::{
    Credential, CredentialId, Discrepancy, DiscrepancySet, Field, Listing, ListingId,
    ListingStatus, Location, LocationId, Platform, WorkspaceId,
};
