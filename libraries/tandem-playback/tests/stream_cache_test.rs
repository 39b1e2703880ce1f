//! Stream cache tests
//!
//! Coalescing, persistence across restarts, the freshness horizon, capacity
//! eviction and the resolution timeout.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{
    EngineConfig, KeyValueStore, ManualClock, MemoryStore, ResolveError, StreamHandle, Track,
    TrackId,
};
use tandem_playback::{StreamCache, STREAM_CACHE_KEY};

struct Fixture {
    cache: StreamCache,
    streams: Arc<FakeStreams>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn fixture_with(config: &EngineConfig, store: Arc<MemoryStore>, clock: Arc<ManualClock>) -> Fixture {
    let streams = FakeStreams::new();
    let cache = StreamCache::new(streams.clone(), store.clone(), clock.clone(), config);
    Fixture {
        cache,
        streams,
        store,
        clock,
    }
}

fn fixture() -> Fixture {
    fixture_with(
        &EngineConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::new(Utc::now())),
    )
}

/// Reopen the cache over the same store and clock, as after a restart
fn restart(f: &Fixture) -> Fixture {
    fixture_with(&EngineConfig::default(), f.store.clone(), f.clock.clone())
}

#[tokio::test(start_paused = true)]
async fn concurrent_lookups_share_one_request() {
    let f = fixture();
    f.streams.set_delay(Duration::from_millis(200));
    let track = remote_track("x");

    let (a, b, c) = tokio::join!(
        f.cache.resolve(&track),
        f.cache.resolve(&track),
        f.cache.resolve(&track)
    );

    assert_eq!(f.streams.calls(), 1);
    assert_eq!(a.unwrap(), StreamHandle::new("h-Remote x"));
    assert_eq!(b.unwrap(), StreamHandle::new("h-Remote x"));
    assert_eq!(c.unwrap(), StreamHandle::new("h-Remote x"));
}

#[tokio::test(start_paused = true)]
async fn formatting_variants_share_an_entry() {
    let f = fixture();
    let plain = Track::new(TrackId::new("remote-1"), "Halcyon", "Orbital");
    let styled = Track::new(TrackId::new("remote-2"), "HALCYON!", "Orbital & Kirsty Hawkshaw");

    f.cache.resolve(&plain).await.unwrap();
    let handle = f.cache.resolve(&styled).await.unwrap();

    assert_eq!(handle, StreamHandle::new("h-Halcyon"));
    assert_eq!(f.streams.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn resolutions_survive_a_restart() {
    let f = fixture();
    let track = remote_track("x");
    f.cache.resolve(&track).await.unwrap();
    assert_eq!(f.cache.persisted_len(), 1);

    let reopened = restart(&f);
    assert_eq!(reopened.cache.len(), 1);
    assert_eq!(
        reopened.cache.resolve(&track).await.unwrap(),
        StreamHandle::new("h-Remote x")
    );
    assert_eq!(reopened.streams.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_entries_are_not_used() {
    let f = fixture();
    let track = remote_track("x");
    f.cache.resolve(&track).await.unwrap();

    f.clock.advance(ChronoDuration::days(7));
    let week_old = restart(&f);
    assert_eq!(week_old.cache.len(), 1);

    f.clock.advance(ChronoDuration::days(1));
    let stale = restart(&f);
    assert!(stale.cache.is_empty());
    assert!(stale.cache.cached(&track).is_none());

    stale.cache.resolve(&track).await.unwrap();
    assert_eq!(stale.streams.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn oldest_entries_are_evicted_above_capacity() {
    let mut config = EngineConfig::default();
    config.cache.stream_capacity = 3;
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let f = fixture_with(&config, store, clock);

    for n in 0..5 {
        f.cache.resolve(&remote_track(&n.to_string())).await.unwrap();
        f.clock.advance(ChronoDuration::minutes(1));
    }

    assert_eq!(f.cache.persisted_len(), 3);
    let reopened = restart(&f);
    assert!(reopened.cache.cached(&remote_track("0")).is_none());
    assert!(reopened.cache.cached(&remote_track("1")).is_none());
    assert!(reopened.cache.cached(&remote_track("4")).is_some());
}

#[tokio::test(start_paused = true)]
async fn memory_layer_is_bounded_like_the_store() {
    let f = fixture();

    for n in 0..150 {
        f.cache.resolve(&remote_track(&n.to_string())).await.unwrap();
        f.clock.advance(ChronoDuration::seconds(1));
    }

    assert_eq!(f.cache.len(), 100);
    assert_eq!(f.cache.persisted_len(), 100);
    assert!(f.cache.cached(&remote_track("0")).is_none());
    assert!(f.cache.cached(&remote_track("149")).is_some());
}

#[tokio::test(start_paused = true)]
async fn memory_hits_expire_in_a_long_session() {
    let f = fixture();
    let track = remote_track("x");
    f.cache.resolve(&track).await.unwrap();

    f.clock.advance(ChronoDuration::days(8));
    assert!(f.cache.cached(&track).is_none());

    f.cache.resolve(&track).await.unwrap();
    assert_eq!(f.streams.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_resolution_times_out() {
    let f = fixture();
    f.streams.set_delay(Duration::from_secs(60));
    let track = remote_track("slow");

    let started = tokio::time::Instant::now();
    let result = f.cache.resolve(&track).await;

    assert_eq!(result, Err(ResolveError::Timeout(15)));
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert!(started.elapsed() < Duration::from_secs(16));
    assert!(f.cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn not_found_is_not_cached() {
    let f = fixture();
    let track = remote_track("gone");
    f.streams
        .set_result(&track.title, Err(ResolveError::NotFound(track.title.clone())));

    assert!(f.cache.resolve(&track).await.unwrap_err().is_not_found());
    assert!(f.cache.resolve(&track).await.is_err());

    assert_eq!(f.streams.calls(), 2);
    assert_eq!(f.cache.persisted_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn clear_discards_in_flight_write_back() {
    let f = fixture();
    f.streams.set_delay(Duration::from_millis(300));
    let track = remote_track("x");

    let cache = f.cache.clone();
    let lookup_track = track.clone();
    let pending = tokio::spawn(async move { cache.resolve(&lookup_track).await });
    settle().await;

    f.cache.clear();
    let handle = pending.await.unwrap().unwrap();

    assert_eq!(handle, StreamHandle::new("h-Remote x"));
    assert!(f.cache.is_empty());
    assert_eq!(f.cache.persisted_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn clear_keeps_persisted_entries() {
    let f = fixture();
    let track = remote_track("x");
    f.cache.resolve(&track).await.unwrap();

    f.cache.clear();
    assert!(f.cache.is_empty());
    assert_eq!(f.cache.persisted_len(), 1);

    f.cache.resolve(&track).await.unwrap();
    assert_eq!(f.streams.calls(), 1);
    assert_eq!(f.cache.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_a_new_resolution() {
    let f = fixture();
    let track = remote_track("x");
    f.cache.resolve(&track).await.unwrap();

    f.cache.invalidate(&track);
    assert!(f.cache.cached(&track).is_none());
    assert_eq!(f.cache.persisted_len(), 0);

    f.cache.resolve(&track).await.unwrap();
    assert_eq!(f.streams.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn corrupt_persisted_entry_is_dropped_alone() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    let document = serde_json::json!({
        "good::artist": {
            "handle": "h-good",
            "timestamp": now,
            "track": { "title": "Good", "artist": "Artist" }
        },
        "bad::artist": { "handle": 42 }
    });
    store
        .set(STREAM_CACHE_KEY, &document.to_string())
        .unwrap();

    let f = fixture_with(&EngineConfig::default(), store, Arc::new(ManualClock::new(now)));

    assert_eq!(f.cache.len(), 1);
    let good = Track::new(TrackId::new("remote-g"), "Good", "Artist");
    assert_eq!(f.cache.resolve(&good).await.unwrap(), StreamHandle::new("h-good"));
    assert_eq!(f.streams.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreadable_document_starts_empty() {
    let store = Arc::new(MemoryStore::new());
    store.set(STREAM_CACHE_KEY, "not json at all").unwrap();

    let f = fixture_with(
        &EngineConfig::default(),
        store,
        Arc::new(ManualClock::new(Utc::now())),
    );
    assert!(f.cache.is_empty());

    f.cache.resolve(&remote_track("x")).await.unwrap();
    assert_eq!(f.cache.persisted_len(), 1);
}
