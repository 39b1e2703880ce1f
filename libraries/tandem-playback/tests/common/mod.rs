//! Shared fakes for playback integration tests
//!
//! The fakes record every command they receive and let tests push platform
//! events, so scenarios can be driven deterministically on a paused clock.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tandem_core::{
    ArtistImageSource, EngineConfig, ManualClock, MemoryStore, ResolveError, StreamHandle,
    StreamRequest, StreamSource, Track, TrackId,
};
use tandem_playback::{
    AudioElement, ElementEvent, EmbeddedPlayer, EngineDeps, MediaControls, MediaError,
    NowPlaying, PlaybackEngine, PlayerEvent, PlayerState, ReadyState,
};
use tokio::sync::broadcast;

// ============================================================================
// Tracks
// ============================================================================

pub fn local_track(id: &str) -> Track {
    Track::new(TrackId::new(format!("local-{id}")), format!("Local {id}"), "Local Artist")
        .with_file_path(format!("/music/{id}.flac"))
}

pub fn remote_track(id: &str) -> Track {
    Track::new(
        TrackId::new(format!("remote-{id}")),
        format!("Remote {id}"),
        "Remote Artist",
    )
}

static INIT: Once = Once::new();

/// Route engine logs to the test writer once per binary
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Let spawned tasks run; advances the paused clock a little
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

// ============================================================================
// Audio element
// ============================================================================

pub struct FakeAudioElement {
    pub log: Mutex<Vec<String>>,
    ready: Mutex<ReadyState>,
    auto_can_play: AtomicBool,
    play_results: Mutex<VecDeque<Result<(), MediaError>>>,
    playing: AtomicBool,
    volume: Mutex<f64>,
    position: Mutex<f64>,
    source: Mutex<Option<String>>,
    events: broadcast::Sender<ElementEvent>,
}

impl FakeAudioElement {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            ready: Mutex::new(ReadyState::HaveNothing),
            auto_can_play: AtomicBool::new(true),
            play_results: Mutex::new(VecDeque::new()),
            playing: AtomicBool::new(false),
            volume: Mutex::new(1.0),
            position: Mutex::new(0.0),
            source: Mutex::new(None),
            events: broadcast::channel(64).0,
        })
    }

    pub fn emit(&self, event: ElementEvent) {
        let _ = self.events.send(event);
    }

    /// Whether `load` should be followed by a can-play event
    pub fn set_auto_can_play(&self, enabled: bool) {
        self.auto_can_play.store(enabled, Ordering::SeqCst);
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        *self.ready.lock() = state;
    }

    /// Queue the outcome of the next `play` call
    pub fn push_play_result(&self, result: Result<(), MediaError>) {
        self.play_results.lock().push_back(result);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn current_volume(&self) -> f64 {
        *self.volume.lock()
    }

    pub fn current_source(&self) -> Option<String> {
        self.source.lock().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.log.lock().iter().filter(|c| c.as_str() == command).count()
    }
}

#[async_trait]
impl AudioElement for FakeAudioElement {
    fn pause(&self) {
        self.log.lock().push("pause".into());
        self.playing.store(false, Ordering::SeqCst);
    }

    fn set_position(&self, seconds: f64) {
        self.log.lock().push(format!("position:{seconds}"));
        *self.position.lock() = seconds;
    }

    fn position(&self) -> f64 {
        *self.position.lock()
    }

    fn duration(&self) -> f64 {
        f64::NAN
    }

    fn set_source(&self, source: &str) {
        self.log.lock().push(format!("source:{source}"));
        *self.source.lock() = Some(source.to_string());
    }

    fn load(&self) {
        self.log.lock().push("load".into());
        if self.auto_can_play.load(Ordering::SeqCst) {
            self.emit(ElementEvent::CanPlay);
        }
    }

    fn ready_state(&self) -> ReadyState {
        *self.ready.lock()
    }

    async fn play(&self) -> Result<(), MediaError> {
        self.log.lock().push("play".into());
        let result = self.play_results.lock().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.playing.store(true, Ordering::SeqCst);
        }
        result
    }

    fn set_volume(&self, volume: f64) {
        *self.volume.lock() = volume;
    }

    fn events(&self) -> broadcast::Receiver<ElementEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Embedded player
// ============================================================================

pub struct FakePlayer {
    pub api_loads: AtomicUsize,
    pub loads: Mutex<Vec<(String, u64)>>,
    pub play_calls: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub seeks: Mutex<Vec<f64>>,
    autoplay: AtomicBool,
    playing: AtomicBool,
    play_results: Mutex<VecDeque<Result<(), MediaError>>>,
    time: Mutex<f64>,
    duration: Mutex<f64>,
    volume: Mutex<f64>,
    events: broadcast::Sender<PlayerEvent>,
}

impl FakePlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            api_loads: AtomicUsize::new(0),
            loads: Mutex::new(Vec::new()),
            play_calls: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            seeks: Mutex::new(Vec::new()),
            autoplay: AtomicBool::new(true),
            playing: AtomicBool::new(false),
            play_results: Mutex::new(VecDeque::new()),
            time: Mutex::new(0.0),
            duration: Mutex::new(0.0),
            volume: Mutex::new(1.0),
            events: broadcast::channel(64).0,
        })
    }

    pub fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    /// Whether loading a handle starts playback by itself
    pub fn set_autoplay(&self, enabled: bool) {
        self.autoplay.store(enabled, Ordering::SeqCst);
    }

    pub fn push_play_result(&self, result: Result<(), MediaError>) {
        self.play_results.lock().push_back(result);
    }

    pub fn set_time(&self, seconds: f64) {
        *self.time.lock() = seconds;
    }

    pub fn set_duration(&self, seconds: f64) {
        *self.duration.lock() = seconds;
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn current_volume(&self) -> f64 {
        *self.volume.lock()
    }

    pub fn load_count(&self) -> usize {
        self.loads.lock().len()
    }
}

#[async_trait]
impl EmbeddedPlayer for FakePlayer {
    async fn load_api(&self) -> Result<(), String> {
        self.api_loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(())
    }

    fn load_by_handle(&self, handle: &StreamHandle, reload: u64) {
        self.loads.lock().push((handle.as_str().to_string(), reload));
        *self.time.lock() = 0.0;
        if self.autoplay.load(Ordering::SeqCst) {
            self.playing.store(true, Ordering::SeqCst);
            self.emit(PlayerEvent::StateChange(PlayerState::Playing));
        } else {
            self.emit(PlayerEvent::StateChange(PlayerState::Unstarted));
        }
    }

    async fn play(&self) -> Result<(), MediaError> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.play_results.lock().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.playing.store(true, Ordering::SeqCst);
            self.emit(PlayerEvent::StateChange(PlayerState::Playing));
        }
        result
    }

    fn pause(&self) {
        if self.playing.swap(false, Ordering::SeqCst) {
            self.emit(PlayerEvent::StateChange(PlayerState::Paused));
        }
    }

    fn seek_to(&self, seconds: f64) {
        self.seeks.lock().push(seconds);
        *self.time.lock() = seconds;
    }

    fn set_volume(&self, volume: f64) {
        *self.volume.lock() = volume;
    }

    fn current_time(&self) -> f64 {
        *self.time.lock()
    }

    fn duration(&self) -> f64 {
        *self.duration.lock()
    }

    fn state(&self) -> PlayerState {
        if self.playing.load(Ordering::SeqCst) {
            PlayerState::Playing
        } else {
            PlayerState::Unstarted
        }
    }

    fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Network collaborators
// ============================================================================

/// Stream resolver answering `h-<title>` unless told otherwise
pub struct FakeStreams {
    pub calls: AtomicUsize,
    delay: Mutex<Duration>,
    overrides: Mutex<HashMap<String, Result<StreamHandle, ResolveError>>>,
}

impl FakeStreams {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
            overrides: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn set_result(&self, title: &str, result: Result<StreamHandle, ResolveError>) {
        self.overrides.lock().insert(title.to_string(), result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamSource for FakeStreams {
    async fn resolve_stream(&self, request: &StreamRequest) -> Result<StreamHandle, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let answer = self.overrides.lock().get(&request.title).cloned();
        answer.unwrap_or_else(|| Ok(StreamHandle::new(format!("h-{}", request.title))))
    }
}

/// Artist image service backed by a map
pub struct FakeImages {
    pub calls: AtomicUsize,
    images: Mutex<HashMap<String, Vec<String>>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl FakeImages {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            images: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_images(&self, artist: &str, images: &[&str]) {
        self.images.lock().insert(
            artist.to_string(),
            images.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn set_delay(&self, artist: &str, delay: Duration) {
        self.delays.lock().insert(artist.to_string(), delay);
    }
}

#[async_trait]
impl ArtistImageSource for FakeImages {
    async fn artist_images(&self, artist: &str) -> Result<Vec<String>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().get(artist).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.images.lock().get(artist).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Media session
// ============================================================================

#[derive(Default)]
pub struct RecordingControls {
    pub published: Mutex<Vec<NowPlaying>>,
    pub cleared: AtomicUsize,
}

impl MediaControls for RecordingControls {
    fn publish(&self, now_playing: &NowPlaying) {
        self.published.lock().push(now_playing.clone());
    }

    fn clear(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Engine harness
// ============================================================================

pub struct Harness {
    pub engine: PlaybackEngine,
    pub audio: Arc<FakeAudioElement>,
    pub player: Arc<FakePlayer>,
    pub streams: Arc<FakeStreams>,
    pub images: Arc<FakeImages>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self::with_config(EngineConfig::default(), store)
    }

    pub fn with_config(config: EngineConfig, store: Arc<MemoryStore>) -> Self {
        init_tracing();
        let audio = FakeAudioElement::new();
        let player = FakePlayer::new();
        let streams = FakeStreams::new();
        let images = FakeImages::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let engine = PlaybackEngine::new(
            config,
            EngineDeps {
                audio: audio.clone(),
                player: player.clone(),
                streams: streams.clone(),
                images: images.clone(),
                store: store.clone(),
                clock: clock.clone(),
            },
        );

        Self {
            engine,
            audio,
            player,
            streams,
            images,
            store,
            clock,
        }
    }
}
