//! # Listsync Store
//!
//! Storage abstraction for listing reconciliation. Provides a trait-based
//! interface for locations, credentials and listings with SQLite and
//! in-memory implementations.
//!
//! ## Overview
//!
//! The engine reads and writes through the [`Store`] trait only, so it stays
//! storage-agnostic. The persistent implementation is [`SqliteStore`];
//! [`MemoryStore`] backs tests.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`ListingFilter`] - Criteria for listing queries
//! - [`InsertResult`] - Result of inserting a listing
//!
//! ## Usage
//!
//! ```rust,no_run
//! use listsync_store::{ListingFilter, SqliteStore, Store};
//! use listsync_core::{ListingStatus, WorkspaceId};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("listings.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     // Every failing listing in a workspace
//!     let filter = ListingFilter::workspace(&WorkspaceId::new("ws-1"))
//!         .status(ListingStatus::Error);
//!     let failing = store.list_listings(&filter).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: Inserting the same listing id twice returns `AlreadyExists`
//! - **Slot uniqueness**: a second listing for the same
//!   `(location, platform, credential)` returns `DuplicateListing`
//! - **Whole-record writes**: a listing is always replaced in one statement

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, ListingFilter, Store, StoreExt};
