//! Stream resolution cache
//!
//! Maps a track fingerprint to the stream handle the remote player needs.
//! Lookup order: memory, persisted store, in-flight request, network.
//! Successful resolutions are written through to memory and to the persisted
//! store.

use crate::coalesce::InFlight;
use crate::persisted::{MemoryLayer, PersistedMap, Timestamped};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{
    Clock, EngineConfig, KeyValueStore, ResolveError, StreamHandle, StreamRequest, StreamSource,
    Track,
};
use tracing::{debug, info};

/// Key of the persisted stream cache
pub const STREAM_CACHE_KEY: &str = "stream-cache";

/// Title/artist summary kept with each entry for inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub title: String,
    pub artist: String,
}

/// One cached resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamCacheEntry {
    pub handle: StreamHandle,
    pub timestamp: DateTime<Utc>,
    pub track: TrackSummary,
}

impl Timestamped for StreamCacheEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

type Resolution = Result<StreamHandle, ResolveError>;

struct Inner {
    source: Arc<dyn StreamSource>,
    clock: Arc<dyn Clock>,
    persisted: PersistedMap<StreamCacheEntry>,
    horizon: ChronoDuration,
    timeout: Duration,
    memory: MemoryLayer<StreamCacheEntry>,
    in_flight: InFlight<Resolution>,
    epoch: AtomicU64,
}

/// Coalescing, persisted stream handle cache
#[derive(Clone)]
pub struct StreamCache {
    inner: Arc<Inner>,
}

impl StreamCache {
    /// Create the cache and load fresh persisted entries into memory
    pub fn new(
        source: Arc<dyn StreamSource>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        let capacity = config.cache.stream_capacity;
        let persisted: PersistedMap<StreamCacheEntry> =
            PersistedMap::new(STREAM_CACHE_KEY, store, capacity);
        let horizon = ChronoDuration::days(config.cache.stream_horizon_days);
        let memory = MemoryLayer::new(persisted.load_fresh(clock.now(), horizon), capacity, horizon);

        Self {
            inner: Arc::new(Inner {
                source,
                clock,
                persisted,
                horizon,
                timeout: config.server.resolve_timeout(),
                memory,
                in_flight: InFlight::new(),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Resolve the stream handle for `track`
    pub async fn resolve(&self, track: &Track) -> Resolution {
        let key = track.fingerprint();

        let hit = self.memory_hit(&key);
        if let Some(handle) = hit {
            debug!(fingerprint = %key, "Stream cache hit (memory)");
            return Ok(handle);
        }

        let inner = &self.inner;
        if let Some(entry) = inner.persisted.get_fresh(&key, inner.clock.now(), inner.horizon) {
            debug!(fingerprint = %key, "Stream cache hit (persisted)");
            let handle = entry.handle.clone();
            inner.memory.insert(key, entry);
            return Ok(handle);
        }

        let request = StreamRequest::from(track);
        let epoch = inner.epoch.load(Ordering::SeqCst);
        let pending = inner.in_flight.join_or_start(
            &key,
            || Arc::clone(inner).fetch(key.clone(), request, epoch),
            |reason| Err(ResolveError::Transport(format!("resolution task failed: {reason}"))),
        );
        pending.await
    }

    /// Handle cached for `track`, without touching the network
    pub fn cached(&self, track: &Track) -> Option<StreamHandle> {
        let key = track.fingerprint();
        if let Some(handle) = self.memory_hit(&key) {
            return Some(handle);
        }
        self.inner
            .persisted
            .get_fresh(&key, self.inner.clock.now(), self.inner.horizon)
            .map(|entry| entry.handle)
    }

    fn memory_hit(&self, key: &str) -> Option<StreamHandle> {
        self.inner
            .memory
            .get(key, self.inner.clock.now())
            .map(|entry| entry.handle)
    }

    /// Drop the entry for `track` from memory and the persisted store
    pub fn invalidate(&self, track: &Track) {
        let key = track.fingerprint();
        self.inner.memory.remove(&key);
        self.inner.persisted.remove(&key);
        info!(fingerprint = %key, "Invalidated stream handle");
    }

    /// Empty the memory layer.
    ///
    /// Requests still in flight complete for their callers but are no longer
    /// written back.
    pub fn clear(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.memory.clear();
        self.inner.in_flight.clear();
        debug!("Stream cache memory cleared");
    }

    /// Number of entries held in memory
    pub fn len(&self) -> usize {
        self.inner.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries in the persisted store
    pub fn persisted_len(&self) -> usize {
        self.inner.persisted.len()
    }
}

impl Inner {
    async fn fetch(self: Arc<Self>, key: String, request: StreamRequest, epoch: u64) -> Resolution {
        debug!(fingerprint = %key, title = %request.title, "Resolving stream");

        let result = match tokio::time::timeout(self.timeout, self.source.resolve_stream(&request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ResolveError::Timeout(self.timeout.as_secs())),
        };

        match &result {
            Ok(handle) if self.epoch.load(Ordering::SeqCst) == epoch => {
                let entry = StreamCacheEntry {
                    handle: handle.clone(),
                    timestamp: self.clock.now(),
                    track: TrackSummary {
                        title: request.title.clone(),
                        artist: request.artist.clone(),
                    },
                };
                self.memory.insert(key.clone(), entry.clone());
                self.persisted.insert(&key, entry);
                debug!(fingerprint = %key, %handle, "Stream resolved");
            }
            Ok(_) => debug!(fingerprint = %key, "Discarding resolution from a cleared cache"),
            Err(e) => debug!(fingerprint = %key, error = %e, "Stream resolution failed"),
        }

        result
    }
}
