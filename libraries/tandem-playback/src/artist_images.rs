//! Artist image enrichment cache
//!
//! Fetches imagery for an artist from the primary source, falling back to
//! the secondary source when the primary has nothing. Lookups never fail: any
//! error becomes an empty list. Empty results are not cached so a later
//! lookup can try again.

use crate::coalesce::InFlight;
use crate::persisted::{MemoryLayer, PersistedMap, Timestamped};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tandem_core::{normalize_key, primary_artist, ArtistImageSource, Clock, EngineConfig, KeyValueStore};
use tracing::debug;

/// Key of the persisted artist image cache
pub const ARTIST_IMAGES_CACHE_KEY: &str = "artist-images-cache";

/// Cached imagery for one artist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCacheEntry {
    pub images: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Timestamped for ImageCacheEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

struct Inner {
    source: Arc<dyn ArtistImageSource>,
    clock: Arc<dyn Clock>,
    persisted: PersistedMap<ImageCacheEntry>,
    horizon: ChronoDuration,
    memory: MemoryLayer<ImageCacheEntry>,
    in_flight: InFlight<Vec<String>>,
    epoch: AtomicU64,
}

/// Coalescing, persisted artist image cache
#[derive(Clone)]
pub struct ArtistImageCache {
    inner: Arc<Inner>,
}

impl ArtistImageCache {
    pub fn new(
        source: Arc<dyn ArtistImageSource>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        let capacity = config.cache.image_capacity;
        let persisted: PersistedMap<ImageCacheEntry> =
            PersistedMap::new(ARTIST_IMAGES_CACHE_KEY, store, capacity);
        let horizon = ChronoDuration::days(config.cache.image_horizon_days);
        let memory = MemoryLayer::new(persisted.load_fresh(clock.now(), horizon), capacity, horizon);

        Self {
            inner: Arc::new(Inner {
                source,
                clock,
                persisted,
                horizon,
                memory,
                in_flight: InFlight::new(),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Images for the primary artist of `artist`.
    ///
    /// With `force_refresh` the cached entry is dropped from memory and the
    /// persisted store before fetching.
    pub async fn fetch_artist_images(&self, artist: &str, force_refresh: bool) -> Vec<String> {
        let name = primary_artist(artist).to_string();
        let key = normalize_key(&name);
        if key.is_empty() {
            return Vec::new();
        }

        let inner = &self.inner;
        if force_refresh {
            debug!(artist = %name, "Forcing artist image refresh");
            inner.memory.remove(&key);
            inner.persisted.remove(&key);
        } else {
            let now = inner.clock.now();
            if let Some(entry) = inner.memory.get(&key, now) {
                return entry.images;
            }

            if let Some(entry) = inner.persisted.get_fresh(&key, now, inner.horizon) {
                let images = entry.images.clone();
                inner.memory.insert(key, entry);
                return images;
            }
        }

        let epoch = inner.epoch.load(Ordering::SeqCst);
        let pending = inner.in_flight.join_or_start(
            &key,
            || Arc::clone(inner).fetch(key.clone(), name, epoch),
            |_| Vec::new(),
        );
        pending.await
    }

    /// Empty the memory layer; in-flight results are no longer written back
    pub fn clear(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.memory.clear();
        self.inner.in_flight.clear();
    }

    /// Number of artists held in memory
    pub fn len(&self) -> usize {
        self.inner.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    async fn fetch(self: Arc<Self>, key: String, artist: String, epoch: u64) -> Vec<String> {
        let images = match self.source.artist_images(&artist).await {
            Ok(images) if !images.is_empty() => images,
            Ok(_) => self.fallback(&artist).await,
            Err(e) => {
                debug!(%artist, error = %e, "Artist image lookup failed");
                self.fallback(&artist).await
            }
        };

        if images.is_empty() {
            debug!(%artist, "No artist images found");
            return images;
        }

        if self.epoch.load(Ordering::SeqCst) == epoch {
            let entry = ImageCacheEntry {
                images: images.clone(),
                timestamp: self.clock.now(),
            };
            self.memory.insert(key.clone(), entry.clone());
            self.persisted.insert(&key, entry);
        }
        debug!(%artist, count = images.len(), "Artist images fetched");
        images
    }

    async fn fallback(&self, artist: &str) -> Vec<String> {
        match self.source.fallback_artist_images(artist).await {
            Ok(images) => images,
            Err(e) => {
                debug!(%artist, error = %e, "Fallback artist image lookup failed");
                Vec::new()
            }
        }
    }
}
