//! End-to-end scenarios over the engine, a memory store and scripted
//! platforms.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use listsync::{EngineConfig, ErrorKind, JobOutcome, ListingStatus, LockPolicy, Platform, Stats};
use listsync_core::{Field, FieldValues};
use listsync_platform::{AdapterError, AdapterRegistry, MemoryPlatform, RetryPolicy};
use listsync_store::{ListingFilter, MemoryStore, SqliteStore, Store};
use listsync_testkit::{mirror, single_attempt, TestFixture};

fn config(concurrency: usize) -> EngineConfig {
    EngineConfig {
        concurrency,
        ..single_attempt()
    }
}

async fn stats(fx: &TestFixture) -> Stats {
    fx.engine.compute_stats(&fx.workspace).await.unwrap()
}

#[tokio::test]
async fn test_partial_failure_is_isolated() {
    let fx = TestFixture::new();
    let location = fx.location("loc-1").await;

    let google = fx.credential("c-google", Platform::Google).await;
    let yelp = fx.credential("c-yelp", Platform::Yelp).await;
    let mut bing = fx.credential("c-bing", Platform::Bing).await;

    let a = fx.linked(&location, &google, "g-1").await;
    let b = fx.linked(&location, &yelp, "y-1").await;
    let c = fx.linked(&location, &bing, "b-1").await;

    fx.platform(Platform::Yelp)
        .insert_object("y-1", mirror(&location).with(Field::Phone, "+1 217 555 0199"));
    bing.is_active = false;
    fx.store.put_credential(&bing).await.unwrap();

    let result = fx
        .engine
        .sync_all_for_location(&location.id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.jobs.len(), 3);
    assert_eq!(result.job(&a.id).unwrap().outcome, JobOutcome::Synced);
    assert_eq!(
        result.job(&b.id).unwrap().outcome,
        JobOutcome::Discrepant {
            fields: vec![Field::Phone]
        }
    );
    match &result.job(&c.id).unwrap().outcome {
        JobOutcome::Failed { error, .. } => assert_eq!(*error, ErrorKind::CredentialNotFound),
        other => panic!("unexpected outcome {:?}", other),
    }

    assert_eq!(fx.reload(&a).await.status, ListingStatus::Synced);
    assert_eq!(fx.reload(&b).await.status, ListingStatus::Discrepant);
    let c = fx.reload(&c).await;
    assert_eq!(c.status, ListingStatus::Error);
    assert!(c.last_error.is_some());
    assert_eq!(fx.platform(Platform::Bing).fetch_count(), 0);

    let stats = stats(&fx).await;
    assert_eq!(stats.total_listings, 3);
    assert_eq!(stats.with_discrepancies, 1);
    assert_eq!(stats.status(ListingStatus::Error), 1);
    assert_eq!(stats.recently_synced, 2);
}

#[tokio::test]
async fn test_workspace_stats_are_consistent() {
    let fx = TestFixture::new();
    let facebook = fx.credential("c-fb", Platform::Facebook).await;
    let google = fx.credential("c-g", Platform::Google).await;
    let bing = fx.credential("c-b", Platform::Bing).await;

    for n in 0..6 {
        let location = fx.location(&format!("loc-{}", n)).await;
        fx.linked(&location, &facebook, &format!("fb-{}", n)).await;
        if n < 3 {
            fx.linked(&location, &google, &format!("g-{}", n)).await;
        }
        if n == 0 {
            fx.linked(&location, &bing, &format!("b-{}", n)).await;
        }
    }

    let fb = fx.platform(Platform::Facebook);
    fb.fail_always("fb-4", AdapterError::Transient("502 bad gateway".into()));
    fb.fail_always("fb-5", AdapterError::Unauthorized("token expired".into()));

    let result = fx
        .engine
        .sync_all_in_workspace(&fx.workspace, &CancellationToken::new())
        .await
        .unwrap();
    let summary = result.summary();
    assert_eq!(summary.total, 10);
    assert_eq!(summary.succeeded, 8);
    assert_eq!(summary.failed, 2);

    let stats = stats(&fx).await;
    assert_eq!(stats.total_listings, 10);
    assert_eq!(stats.platform(Platform::Facebook), 6);
    assert_eq!(stats.platform(Platform::Google), 3);
    assert_eq!(stats.platform(Platform::Bing), 1);
    assert_eq!(stats.platform(Platform::Yelp), 0);
    assert_eq!(stats.status(ListingStatus::Error), 2);
    assert_eq!(stats.status(ListingStatus::Synced), 8);
    assert_eq!(stats.by_platform.values().sum::<usize>(), stats.total_listings);
    assert_eq!(stats.by_status.values().sum::<usize>(), stats.total_listings);
    assert_eq!(stats.recently_synced, 8);
}

#[tokio::test]
async fn test_sync_is_idempotent_and_read_only() {
    let fx = TestFixture::new();
    let location = fx.location("loc-1").await;
    let cred = fx.credential("c1", Platform::Apple).await;
    let listing = fx.linked(&location, &cred, "a-1").await;
    fx.platform(Platform::Apple)
        .insert_object("a-1", mirror(&location).with(Field::City, "Shelbyville"));

    let first = fx.engine.sync_one(&listing.id).await.unwrap();
    let second = fx.engine.sync_one(&listing.id).await.unwrap();

    assert_eq!(first.status, ListingStatus::Discrepant);
    assert_eq!(first.status, second.status);
    assert_eq!(first.discrepancies, second.discrepancies);
    assert_eq!(first.snapshot_digest, second.snapshot_digest);
    assert_eq!(fx.platform(Platform::Apple).push_count(), 0);
}

#[tokio::test]
async fn test_workspace_sync_reports_unpublished_listing() {
    let fx = TestFixture::new();
    let location = fx.location("loc-1").await;
    let google = fx.credential("c-google", Platform::Google).await;
    let yelp = fx.credential("c-yelp", Platform::Yelp).await;
    let linked = fx.linked(&location, &google, "g-1").await;

    fx.platform(Platform::Yelp)
        .fail_next(AdapterError::Transient("503 service unavailable".into()));
    let err = fx
        .engine
        .publish(&location.id, Platform::Yelp, &yelp.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);

    let result = fx
        .engine
        .sync_all_in_workspace(&fx.workspace, &CancellationToken::new())
        .await
        .unwrap();

    let stats = stats(&fx).await;
    assert_eq!(stats.total_listings, 2);
    assert_eq!(result.jobs.len(), stats.total_listings);
    assert_eq!(result.job(&linked.id).unwrap().outcome, JobOutcome::Synced);

    let failures: Vec<_> = result.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].platform, Platform::Yelp);
    match &failures[0].outcome {
        JobOutcome::Failed { error, .. } => assert_eq!(*error, ErrorKind::NotLinked),
        other => panic!("unexpected outcome {:?}", other),
    }

    let summary = result.summary();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(fx.platform(Platform::Yelp).fetch_count(), 0);
}

#[tokio::test]
async fn test_transient_failure_keeps_last_known_state() {
    let fx = TestFixture::new();
    let location = fx.location("loc-1").await;
    let cred = fx.credential("c1", Platform::Google).await;
    let listing = fx.linked(&location, &cred, "g-1").await;
    let google = fx.platform(Platform::Google);
    google.insert_object("g-1", mirror(&location).with(Field::Website, ""));

    let synced = fx.engine.sync_one(&listing.id).await.unwrap();
    assert_eq!(synced.status, ListingStatus::Discrepant);

    google.fail_next(AdapterError::Timeout(Duration::from_secs(10)));
    let err = fx.engine.sync_one(&listing.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);

    let failed = fx.reload(&listing).await;
    assert_eq!(failed.status, ListingStatus::Error);
    assert_eq!(failed.discrepancies, synced.discrepancies);
    assert_eq!(failed.last_synced_at, synced.last_synced_at);
    assert!(failed.last_error.is_some());

    // Next successful sync recovers.
    google.insert_object("g-1", mirror(&location));
    let recovered = fx.engine.sync_one(&listing.id).await.unwrap();
    assert_eq!(recovered.status, ListingStatus::Synced);
    assert!(!recovered.has_discrepancies());
}

#[tokio::test]
async fn test_empty_platform_value_is_a_discrepancy() {
    let fx = TestFixture::new();
    let location = fx.location("loc-1").await;
    let cred = fx.credential("c1", Platform::Bing).await;
    let listing = fx.linked(&location, &cred, "b-1").await;
    fx.platform(Platform::Bing)
        .insert_object("b-1", mirror(&location).with(Field::Website, ""));

    let synced = fx.engine.sync_one(&listing.id).await.unwrap();
    let website = synced.discrepancies.get(Field::Website).unwrap();
    assert_eq!(website.local, "https://bluedoor.example");
    assert_eq!(website.platform, "");
}

#[tokio::test]
async fn test_publish_overwrites_platform_with_local_fields() {
    let fx = TestFixture::new();
    let location = fx.location("loc-1").await;
    let cred = fx.credential("c1", Platform::Yelp).await;
    let listing = fx.linked(&location, &cred, "y-1").await;
    let yelp = fx.platform(Platform::Yelp);
    yelp.insert_object("y-1", mirror(&location).with(Field::Name, "Blue Door"));

    let synced = fx.engine.sync_one(&listing.id).await.unwrap();
    assert!(synced.discrepancies.contains(Field::Name));

    let published = fx
        .engine
        .publish(&location.id, Platform::Yelp, &cred.id)
        .await
        .unwrap();
    assert_eq!(published.status, ListingStatus::Synced);
    assert!(!published.has_discrepancies());
    assert_eq!(published.external_id.as_deref(), Some("y-1"));

    let push = &yelp.pushes()[0];
    assert_eq!(push.requested_id.as_deref(), Some("y-1"));
    assert_eq!(push.fields, location.snapshot().fields);
    assert_eq!(yelp.object("y-1"), Some(mirror(&location)));

    // The local profile is untouched by what the platform had.
    let stored = fx.store.get_location(&location.id).await.unwrap().unwrap();
    assert_eq!(stored, location);

    let resynced = fx.engine.sync_one(&listing.id).await.unwrap();
    assert_eq!(resynced.status, ListingStatus::Synced);
}

#[tokio::test]
async fn test_concurrent_syncs_conflict() {
    let fx = TestFixture::with_delay(config(4), Duration::from_millis(50));
    let location = fx.location("loc-1").await;
    let cred = fx.credential("c1", Platform::Google).await;
    let listing = fx.linked(&location, &cred, "g-1").await;

    let (a, b) = tokio::join!(
        fx.engine.sync_one(&listing.id),
        fx.engine.sync_one(&listing.id)
    );
    let conflicts = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::Conflict))
        .count();
    assert_eq!(conflicts, 1);
    assert!(a.is_ok() || b.is_ok());
    assert_eq!(fx.platform(Platform::Google).fetch_count(), 1);

    // The conflicting call left the listing alone.
    assert_eq!(fx.reload(&listing).await.status, ListingStatus::Synced);
    assert_eq!(fx.engine.locks().active(), 0);
}

#[tokio::test]
async fn test_wait_policy_serializes_sync_and_publish() {
    let config = EngineConfig {
        lock_policy: LockPolicy::Wait,
        ..EngineConfig::default()
    };
    let fx = TestFixture::with_delay(config, Duration::from_millis(30));
    let location = fx.location("loc-1").await;
    let cred = fx.credential("c1", Platform::Bing).await;
    let listing = fx.linked(&location, &cred, "b-1").await;

    let (synced, published) = tokio::join!(
        fx.engine.sync_one(&listing.id),
        fx.engine.publish(&location.id, Platform::Bing, &cred.id)
    );
    assert!(synced.is_ok());
    assert!(published.is_ok());
    assert_eq!(fx.platform(Platform::Bing).max_in_flight(), 1);
}

#[tokio::test]
async fn test_cancel_before_start() {
    let fx = TestFixture::new();
    let location = fx.location("loc-1").await;
    let cred = fx.credential("c1", Platform::Google).await;
    fx.linked(&location, &cred, "g-1").await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = fx
        .engine
        .sync_all_in_workspace(&fx.workspace, &cancel)
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.summary().cancelled, 1);
    assert_eq!(fx.platform(Platform::Google).fetch_count(), 0);
}

#[tokio::test]
async fn test_cancel_mid_run_stops_dispatch() {
    let fx = TestFixture::with_delay(config(1), Duration::from_millis(100));
    let cred = fx.credential("c1", Platform::Google).await;
    for n in 0..4 {
        let location = fx.location(&format!("loc-{}", n)).await;
        fx.linked(&location, &cred, &format!("g-{}", n)).await;
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let result = fx
        .engine
        .sync_all_in_workspace(&fx.workspace, &cancel)
        .await
        .unwrap();
    let summary = result.summary();

    assert!(result.cancelled);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.cancelled, 3);
    assert_eq!(fx.platform(Platform::Google).fetch_count(), 1);

    // Cancelled listings were never touched.
    let filter = ListingFilter::workspace(&fx.workspace).status(ListingStatus::PendingSync);
    let pending = fx.store.list_listings(&filter).await.unwrap();
    assert_eq!(pending.len(), 3);
}

#[tokio::test]
async fn test_bulk_concurrency_is_bounded() {
    let fx = TestFixture::with_delay(config(2), Duration::from_millis(20));
    let cred = fx.credential("c1", Platform::Facebook).await;
    for n in 0..6 {
        let location = fx.location(&format!("loc-{}", n)).await;
        fx.linked(&location, &cred, &format!("fb-{}", n)).await;
    }

    let result = fx
        .engine
        .sync_all_in_workspace(&fx.workspace, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.summary().succeeded, 6);

    let peak = fx.platform(Platform::Facebook).max_in_flight();
    assert!(peak >= 1 && peak <= 2, "peak in-flight was {}", peak);
}

#[tokio::test]
async fn test_publish_to_all_reports_ambiguity() {
    let fx = TestFixture::new();
    let location = fx.location("loc-1").await;
    fx.credential("c-g1", Platform::Google).await;
    fx.credential("c-g2", Platform::Google).await;
    let yelp = fx.credential("c-y", Platform::Yelp).await;

    let result = fx
        .engine
        .publish_to_all_platforms(&location.id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.jobs.len(), 2);
    let published = result
        .jobs
        .iter()
        .find(|j| j.platform == Platform::Yelp)
        .unwrap();
    assert_eq!(published.credential_id.as_ref(), Some(&yelp.id));
    assert!(published.is_success());

    let ambiguous = result
        .jobs
        .iter()
        .find(|j| j.platform == Platform::Google)
        .unwrap();
    assert_eq!(ambiguous.listing_id, None);
    match &ambiguous.outcome {
        JobOutcome::Failed { error, reason } => {
            assert_eq!(*error, ErrorKind::CredentialAmbiguous);
            assert!(reason.contains("c-g1") && reason.contains("c-g2"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(fx.platform(Platform::Google).push_count(), 0);

    // Once a listing exists its pinned credential is used.
    let google = fx
        .engine
        .publish(&location.id, Platform::Google, &"c-g2".into())
        .await
        .unwrap();
    let again = fx
        .engine
        .publish_to_all_platforms(&location.id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again.summary().succeeded, 2);
    assert!(again.job(&google.id).unwrap().is_success());
}

#[tokio::test]
async fn test_invalid_location_is_never_pushed() {
    let fx = TestFixture::new();
    let mut location = fx.location("loc-1").await;
    fx.credential("c1", Platform::Bing).await;
    location.website = "bluedoor dot example".into();
    fx.store.put_location(&location).await.unwrap();

    let err = fx
        .engine
        .publish_to_all_platforms(&location.id, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(fx.platform(Platform::Bing).push_count(), 0);
}

#[tokio::test]
async fn test_retry_policy_absorbs_transient_failures() {
    let store = MemoryStore::new();
    let location = listsync_testkit::cafe("loc-1", "ws-1");
    let cred = listsync::Credential::new("c1", "ws-1", Platform::Google, "acct", "t");
    store.put_location(&location).await.unwrap();
    store.put_credential(&cred).await.unwrap();

    let google = Arc::new(MemoryPlatform::new(Platform::Google));
    let config = EngineConfig {
        retry: RetryPolicy {
            base_delay_ms: 1,
            jitter: false,
            ..RetryPolicy::default()
        },
        ..EngineConfig::default()
    };
    let engine = listsync::Engine::builder(store)
        .config(config)
        .adapter(google.clone())
        .build();

    google.fail_next(AdapterError::RateLimited { retry_after: None });
    google.fail_next(AdapterError::Transient("connection reset".into()));
    let listing = engine.publish(&location.id, Platform::Google, &cred.id).await.unwrap();
    assert_eq!(listing.status, ListingStatus::Synced);
    assert_eq!(google.push_count(), 1);
}

#[tokio::test]
async fn test_engine_new_bounds_slow_adapter_calls() {
    let store = MemoryStore::new();
    let location = listsync_testkit::cafe("loc-1", "ws-1");
    let cred = listsync::Credential::new("c1", "ws-1", Platform::Google, "acct", "t");
    let listing = listsync::Listing::linked(&location, &cred, "g-1", 1_000);
    store.put_location(&location).await.unwrap();
    store.put_credential(&cred).await.unwrap();
    store.put_listing(&listing).await.unwrap();

    let google = Arc::new(MemoryPlatform::new(Platform::Google).with_delay(Duration::from_millis(600)));
    google.insert_object("g-1", mirror(&location));
    let config = EngineConfig {
        retry: RetryPolicy {
            max_attempts: 1,
            request_timeout_ms: 20,
            ..RetryPolicy::default()
        },
        ..EngineConfig::default()
    };
    let engine = listsync::Engine::new(store, AdapterRegistry::new().with(google.clone()), config);

    let started = std::time::Instant::now();
    let err = engine.sync_one(&listing.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(started.elapsed() < Duration::from_millis(500));

    let failed = engine.get_listing(&listing.id).await.unwrap();
    assert_eq!(failed.status, ListingStatus::Error);
    assert_eq!(engine.locks().active(), 0);
}

#[tokio::test]
async fn test_sqlite_backed_engine_persists() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("listsync.db");

    let location = listsync_testkit::cafe("loc-1", "ws-1");
    let cred = listsync::Credential::new("c1", "ws-1", Platform::Bing, "acct", "t");
    let bing = Arc::new(MemoryPlatform::new(Platform::Bing));

    let listing_id = {
        let store = SqliteStore::open(&path)?;
        store.put_location(&location).await?;
        store.put_credential(&cred).await?;
        let engine = listsync::Engine::new(
            store,
            AdapterRegistry::new().with(bing.clone()),
            EngineConfig::default(),
        );
        let listing = engine.publish(&location.id, Platform::Bing, &cred.id).await?;
        bing.insert_object("bing-1", FieldValues::default());
        engine.sync_one(&listing.id).await?;
        listing.id
    };

    let store = SqliteStore::open(&path)?;
    let listing = store.get_listing(&listing_id).await?.expect("listing persisted");
    assert_eq!(listing.status, ListingStatus::Discrepant);
    assert_eq!(listing.external_id.as_deref(), Some("bing-1"));
    assert!(listing.discrepancies.contains(Field::Name));
    Ok(())
}
