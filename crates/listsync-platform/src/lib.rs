//! # Listsync Platform
//!
//! The boundary between the reconciliation engine and third-party listing
//! platforms.
//!
//! ## Overview
//!
//! Every platform is reached through the [`PlatformAdapter`] trait: `fetch`
//! reads a platform object and normalizes it into a
//! [`PlatformSnapshot`](listsync_core::PlatformSnapshot); `push` overwrites
//! it with canonical local fields. Platform request and response shapes never
//! leave the adapter.
//!
//! ## Key Types
//!
//! - [`PlatformAdapter`] - The async capability each platform implements
//! - [`AdapterError`] - Failure taxonomy shared by all adapters
//! - [`Resilient`] / [`RetryPolicy`] - Timeouts, bounded retries, backoff
//! - [`AdapterRegistry`] - One adapter per [`Platform`](listsync_core::Platform)
//! - [`MemoryPlatform`] - Scriptable in-memory platform for tests
//! - [`FacebookAdapter`] - Reference adapter for Facebook Pages
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use listsync_platform::{AdapterRegistry, FacebookAdapter, RetryPolicy};
//!
//! fn example() {
//!     let registry = AdapterRegistry::new()
//!         .with(Arc::new(FacebookAdapter::new().unwrap()))
//!         .resilient(&RetryPolicy::default());
//! }
//! ```
//!
//! ## Retry Semantics
//!
//! | error           | retried | notes                                  |
//! |-----------------|---------|----------------------------------------|
//! | `Timeout`       | yes     | each attempt has its own timeout       |
//! | `Transient`     | yes     | 5xx, network, malformed response       |
//! | `RateLimited`   | yes     | retry-after honored up to the cap      |
//! | `Unauthorized`  | no      | the credential needs user attention    |
//! | `Rejected`      | no      | permanent 4xx                          |
//! | `NotFound`      | no      | platform object is gone                |

pub mod adapter;
pub mod error;
pub mod facebook;
pub mod memory;
pub mod registry;
pub mod retry;

pub use adapter::{PlatformAdapter, PushAck};
pub use error::{AdapterError, Result};
pub use facebook::FacebookAdapter;
pub use memory::{MemoryPlatform, PushRecord};
pub use registry::AdapterRegistry;
pub use retry::{Resilient, RetryPolicy};
