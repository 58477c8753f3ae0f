//! # Listsync Testkit
//!
//! Testing utilities for listsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a memory store, scriptable platforms and an engine wired
//!   together, plus helpers to seed locations, credentials and listings
//! - **Generators**: Proptest strategies for property-based testing
//!
//! The end-to-end scenarios live in `tests/`.
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use listsync_testkit::generators::{listing_from_params, ListingParams};
//!
//! proptest! {
//!     #[test]
//!     fn listing_status_is_kept(params: ListingParams) {
//!         let listing = listing_from_params(&params);
//!         prop_assert_eq!(listing.status, params.status);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up test scenarios:
//!
//! ```rust,no_run
//! use listsync_core::Platform;
//! use listsync_testkit::TestFixture;
//!
//! async fn example() {
//!     let fx = TestFixture::new();
//!     let location = fx.location("loc-1").await;
//!     let credential = fx.credential("c1", Platform::Google).await;
//!     let listing = fx.linked(&location, &credential, "g-1").await;
//!     fx.engine.sync_one(&listing.id).await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{cafe, mirror, single_attempt, TestFixture, WORKSPACE};
