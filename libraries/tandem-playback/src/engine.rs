//! Playback engine - backend selection and orchestration
//!
//! Routes every transport command to whichever backend owns the current
//! track, keeps the two backends from ever sounding at the same time, and
//! drives auto-advance from end-of-media signals.

use crate::advance::{self, Advance};
use crate::artist_images::ArtistImageCache;
use crate::backend::{AudioElement, BackendSignal, EmbeddedPlayer, SignalKind, StartOutcome};
use crate::error::{PlaybackError, Result};
use crate::events::{EngineEvent, HostSignal};
use crate::generation::Generation;
use crate::local::LocalAdapter;
use crate::now_playing::MediaCommand;
use crate::remote::RemoteAdapter;
use crate::store::{sanitize_seconds, PlaybackStore, Transition};
use crate::stream_cache::StreamCache;
use crate::types::{AdapterStatus, PlaybackState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tandem_core::{
    normalize_key, ArtistImageSource, BackendKind, Clock, EngineConfig, KeyValueStore, RepeatMode,
    StreamSource, Track,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// "Previous" restarts the current track past this position (seconds)
const RESTART_THRESHOLD_SECS: f64 = 3.0;

/// Capacity of the engine event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Everything the engine needs from its host
pub struct EngineDeps {
    /// Local audio element
    pub audio: Arc<dyn AudioElement>,
    /// Embedded remote player
    pub player: Arc<dyn EmbeddedPlayer>,
    /// Stream handle resolution service
    pub streams: Arc<dyn StreamSource>,
    /// Artist imagery service
    pub images: Arc<dyn ArtistImageSource>,
    /// Client-local persistence
    pub store: Arc<dyn KeyValueStore>,
    /// Wall clock for cache timestamps
    pub clock: Arc<dyn Clock>,
}

struct EngineInner {
    config: EngineConfig,
    state: PlaybackStore,
    generation: Generation,
    local: LocalAdapter,
    remote: RemoteAdapter,
    streams: StreamCache,
    images: ArtistImageCache,
    active: Mutex<Option<BackendKind>>,
    volume: Mutex<f64>,
    enrichment: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<EngineEvent>,
    /// Generation whose end-of-media has already been acted on
    ended: AtomicU64,
    /// Generation whose start has already been announced
    announced: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(task) = self.enrichment.lock().take() {
            task.abort();
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Dual-backend playback engine
///
/// Cheap to clone; all clones drive the same engine.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    /// Create an engine.
    ///
    /// Must be called from within a Tokio runtime: the backend signal loop is
    /// spawned here.
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Self {
        let generation = Generation::new();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let local = LocalAdapter::new(
            deps.audio,
            generation.clone(),
            signal_tx.clone(),
            config.local.can_play_timeout(),
        );
        let remote = RemoteAdapter::new(
            deps.player,
            generation.clone(),
            signal_tx,
            config.remote.clone(),
        );
        let streams = StreamCache::new(
            deps.streams,
            Arc::clone(&deps.store),
            Arc::clone(&deps.clock),
            &config,
        );
        let images = ArtistImageCache::new(deps.images, Arc::clone(&deps.store), deps.clock, &config);

        let engine = Self {
            inner: Arc::new(EngineInner {
                state: PlaybackStore::new(deps.store),
                config,
                generation,
                local,
                remote,
                streams,
                images,
                active: Mutex::new(None),
                volume: Mutex::new(1.0),
                enrichment: Mutex::new(None),
                events,
                ended: AtomicU64::new(0),
                announced: AtomicU64::new(0),
                tasks: Mutex::new(Vec::new()),
            }),
        };

        let signal_loop = tokio::spawn(run_signal_loop(Arc::downgrade(&engine.inner), signal_rx));
        engine.inner.tasks.lock().push(signal_loop);

        info!(
            cached_streams = engine.inner.streams.len(),
            repeat = %engine.inner.state.repeat(),
            "Playback engine ready"
        );
        engine
    }

    fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    /// Play `track` from the beginning.
    ///
    /// Safe to call while another track is starting: the newer call wins and
    /// the older one returns `Ok(())` without touching the state again.
    /// A queued track is taken to be its first occurrence in the queue; use
    /// [`play_at`](Self::play_at) to start a later duplicate.
    pub async fn play(&self, track: Track) -> Result<()> {
        self.start(track, None).await
    }

    /// Play the queue entry at `position`
    pub async fn play_at(&self, position: usize) -> Result<()> {
        let track = self.inner.state.snapshot().queue.get(position).cloned();
        match track {
            Some(track) => self.start(track, Some(position)).await,
            None => Err(PlaybackError::NoTrackLoaded),
        }
    }

    async fn start(&self, track: Track, position: Option<usize>) -> Result<()> {
        let inner = &self.inner;
        let generation = inner.generation.advance();
        debug!(track_id = %track.id, ?position, generation, "Switching track");

        let previous = inner.active.lock().take();
        if let Some(kind) = previous {
            self.quiesce(kind);
        }
        self.cancel_enrichment();

        inner.state.dispatch(Transition::SetTrack(Some(track.clone())));
        if let Some(position) = position {
            inner.state.dispatch(Transition::SetQueuePosition(position));
        }
        inner.state.dispatch(Transition::SetTime(0.0));
        inner
            .state
            .dispatch(Transition::SetDuration(track.duration.unwrap_or(0.0)));
        inner.state.dispatch(Transition::SetFault(None));
        inner.state.dispatch(Transition::SetLoading(true));
        inner.state.dispatch(Transition::SetPlaying(true));
        self.spawn_enrichment(&track, generation);

        let backend = match track.backend() {
            Ok(backend) => backend,
            Err(e) => {
                warn!(track_id = %track.id, error = %e, "Cannot classify track");
                return self.fail_start(&track, PlaybackError::Classification(track.id.to_string()));
            }
        };
        *inner.active.lock() = Some(backend);
        let volume = *inner.volume.lock();

        let outcome = match backend {
            BackendKind::Local => {
                inner.local.set_volume(volume);
                inner.local.start(&track, generation).await
            }
            BackendKind::Remote => match inner.streams.resolve(&track).await {
                Ok(handle) if inner.generation.is_current(generation) => {
                    inner.remote.set_volume(volume);
                    inner.remote.start(&handle, generation).await
                }
                Ok(_) => Ok(StartOutcome::Superseded),
                Err(e) => Err(PlaybackError::Resolution(e)),
            },
        };

        if !inner.generation.is_current(generation) {
            debug!(track_id = %track.id, generation, "Start superseded");
            return Ok(());
        }

        match outcome {
            Ok(StartOutcome::Started) => {
                inner.state.dispatch(Transition::SetLoading(false));
                inner.state.dispatch(Transition::SetPlaying(true));
                info!(track_id = %track.id, %backend, "Track started");
                self.announce(generation, track);
                Ok(())
            }
            Ok(StartOutcome::Pending) => {
                // Announced once the backend reports audio
                inner.state.dispatch(Transition::SetLoading(false));
                debug!(track_id = %track.id, %backend, "Track loaded, waiting for playback");
                Ok(())
            }
            Ok(StartOutcome::Held) => {
                inner.state.dispatch(Transition::SetLoading(false));
                inner.state.dispatch(Transition::SetPlaying(false));
                Ok(())
            }
            Ok(StartOutcome::Superseded) => Ok(()),
            Err(e) => self.fail_start(&track, e),
        }
    }

    fn fail_start(&self, track: &Track, error: PlaybackError) -> Result<()> {
        let inner = &self.inner;
        inner.state.dispatch(Transition::SetLoading(false));
        inner.state.dispatch(Transition::SetPlaying(false));

        if error.is_fault() {
            warn!(track_id = %track.id, error = %error, "Playback failed");
            *inner.active.lock() = None;
            inner
                .state
                .dispatch(Transition::SetFault(Some(error.to_string())));
            let _ = inner.events.send(EngineEvent::PlaybackFault {
                track_id: track.id.clone(),
                message: error.to_string(),
            });
        } else {
            debug!(track_id = %track.id, "Waiting for a user gesture to start playback");
        }

        Err(error)
    }

    /// Pause or resume.
    ///
    /// With a selected track but nothing loaded (after a stop at the end of
    /// the queue or a failed start) the track is started again.
    pub async fn toggle_play(&self) -> Result<()> {
        let inner = &self.inner;
        let snapshot = inner.state.snapshot();
        let Some(track) = snapshot.current_track else {
            return Err(PlaybackError::NoTrackLoaded);
        };

        let active = *inner.active.lock();

        if snapshot.is_playing {
            inner.state.dispatch(Transition::SetPlaying(false));
            match active {
                Some(BackendKind::Local) => inner.local.pause(),
                Some(BackendKind::Remote) => inner.remote.pause(),
                None => {}
            }
            return Ok(());
        }

        let Some(kind) = active.filter(|kind| self.backend_status(*kind).is_resumable()) else {
            return self.play(track).await;
        };

        let generation = inner.generation.current();
        inner.state.dispatch(Transition::SetPlaying(true));
        let result = match kind {
            BackendKind::Local => inner.local.resume(generation).await,
            BackendKind::Remote => inner.remote.resume(generation).await,
        };

        match result {
            Ok(StartOutcome::Started) => {
                self.announce(generation, track);
                Ok(())
            }
            Ok(StartOutcome::Held) => {
                inner.state.dispatch(Transition::SetPlaying(false));
                Ok(())
            }
            Ok(StartOutcome::Pending | StartOutcome::Superseded) => Ok(()),
            Err(e) => {
                inner.state.dispatch(Transition::SetPlaying(false));
                if e.is_fault() {
                    inner.state.dispatch(Transition::SetFault(Some(e.to_string())));
                }
                Err(e)
            }
        }
    }

    /// Broadcast that `track` started, at most once per generation
    fn announce(&self, generation: u64, track: Track) {
        let inner = &self.inner;
        if !inner.generation.is_current(generation)
            || inner.announced.swap(generation, Ordering::SeqCst) == generation
        {
            return;
        }
        let _ = inner.events.send(EngineEvent::TrackPlayed { track });
    }

    /// Set the volume (clamped to 0..=1, NaN becomes 0)
    pub fn set_volume(&self, volume: f64) {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        *self.inner.volume.lock() = volume;

        let active = *self.inner.active.lock();
        match active {
            Some(BackendKind::Local) => self.inner.local.set_volume(volume),
            Some(BackendKind::Remote) => self.inner.remote.set_volume(volume),
            None => {}
        }
    }

    /// Current volume (0..=1)
    pub fn volume(&self) -> f64 {
        *self.inner.volume.lock()
    }

    /// Seek within the current track (clamped to 0..=duration)
    pub fn seek_to(&self, seconds: f64) {
        let inner = &self.inner;
        let snapshot = inner.state.snapshot();
        if snapshot.current_track.is_none() {
            return;
        }
        let target = sanitize_seconds(seconds).min(snapshot.duration);

        let active = *inner.active.lock();
        let applied = match active {
            Some(BackendKind::Local) => {
                inner.local.seek(target);
                true
            }
            Some(BackendKind::Remote) => inner.remote.seek(target),
            None => false,
        };

        if applied {
            inner.state.dispatch(Transition::SetTime(target));
        } else {
            trace!(target, "Seek ignored");
        }
    }

    /// Skip to the next queue entry
    pub async fn next(&self) -> Result<()> {
        let snapshot = self.inner.state.snapshot();
        let decision = advance::skip_forward(&snapshot, &mut rand::thread_rng());
        match decision {
            Advance::Play(position, track) => self.start(track, Some(position)).await,
            Advance::Replay(track) => self.start(track, snapshot.current_index()).await,
            Advance::Stop => {
                debug!("Already at the end of the queue");
                Ok(())
            }
        }
    }

    /// Restart the current track, or go back one queue entry near its start
    pub async fn previous(&self) -> Result<()> {
        let snapshot = self.inner.state.snapshot();
        if snapshot.current_time > RESTART_THRESHOLD_SECS {
            self.seek_to(0.0);
            return Ok(());
        }

        match advance::skip_backward(&snapshot) {
            Advance::Play(position, track) => self.start(track, Some(position)).await,
            Advance::Replay(track) => self.start(track, snapshot.current_index()).await,
            Advance::Stop => Ok(()),
        }
    }

    /// Replace the queue
    pub fn set_queue(&self, tracks: Vec<Track>) {
        self.inner.state.dispatch(Transition::SetQueue(tracks));
    }

    pub fn toggle_shuffle(&self) {
        self.inner.state.dispatch(Transition::ToggleShuffle);
    }

    /// Cycle repeat none → all → one → none
    pub fn toggle_repeat(&self) {
        self.inner.state.dispatch(Transition::ToggleRepeat);
    }

    pub fn set_repeat(&self, mode: RepeatMode) {
        self.inner.state.dispatch(Transition::SetRepeat(mode));
    }

    /// Stop everything now.
    ///
    /// Both backends are silenced, the state is reset (the repeat mode
    /// survives) and the in-memory caches are emptied. Pending starts and
    /// lookups finish without touching the state.
    pub fn force_stop(&self) {
        let inner = &self.inner;
        inner.generation.advance();
        self.cancel_enrichment();

        inner.local.quiesce();
        inner.remote.quiesce();
        *inner.active.lock() = None;

        inner.state.dispatch(Transition::Reset);
        inner.streams.clear();
        inner.images.clear();

        info!("Playback force-stopped");
        let _ = inner.events.send(EngineEvent::Stopped);
    }

    /// Listen for host signals until the channel closes
    pub fn attach_host_signals(&self, mut signals: broadcast::Receiver<HostSignal>) {
        let engine = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            loop {
                let signal = match signals.recv().await {
                    Ok(signal) => signal,
                    // A missed signal may have been a stop
                    Err(broadcast::error::RecvError::Lagged(_)) => HostSignal::ForceStop,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(inner) = engine.upgrade() else {
                    break;
                };

                match signal {
                    HostSignal::ForceStop => PlaybackEngine::from_inner(inner).force_stop(),
                }
            }
        });

        self.inner.tasks.lock().push(task);
    }

    /// Route a media-key or OS media-session command
    pub async fn handle_media_command(&self, command: MediaCommand) -> Result<()> {
        debug!(?command, "Media command");
        let is_playing = self.inner.state.snapshot().is_playing;

        match command {
            MediaCommand::Play if is_playing => Ok(()),
            MediaCommand::Pause if !is_playing => Ok(()),
            MediaCommand::Play | MediaCommand::Pause | MediaCommand::Toggle => {
                self.toggle_play().await
            }
            MediaCommand::Next => self.next().await,
            MediaCommand::Previous => self.previous().await,
        }
    }

    /// Current state
    pub fn snapshot(&self) -> PlaybackState {
        self.inner.state.snapshot()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state.subscribe()
    }

    /// Observe engine events
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Backend owning the current track, if one is loaded
    pub fn active_backend(&self) -> Option<BackendKind> {
        *self.inner.active.lock()
    }

    /// Lifecycle of one backend
    pub fn backend_status(&self, kind: BackendKind) -> AdapterStatus {
        match kind {
            BackendKind::Local => self.inner.local.status(),
            BackendKind::Remote => self.inner.remote.status(),
        }
    }

    /// The stream handle cache
    pub fn stream_cache(&self) -> &StreamCache {
        &self.inner.streams
    }

    /// The artist image cache
    pub fn artist_image_cache(&self) -> &ArtistImageCache {
        &self.inner.images
    }

    fn quiesce(&self, kind: BackendKind) {
        trace!(%kind, "Quiescing backend");
        match kind {
            BackendKind::Local => self.inner.local.quiesce(),
            BackendKind::Remote => self.inner.remote.quiesce(),
        }
    }

    fn cancel_enrichment(&self) {
        if let Some(task) = self.inner.enrichment.lock().take() {
            task.abort();
        }
    }

    fn spawn_enrichment(&self, track: &Track, generation: u64) {
        let inner = &self.inner;
        let artist = track.primary_artist().to_string();
        let key = normalize_key(&artist);
        if key.is_empty() {
            inner.state.dispatch(Transition::SetArtistImagesLoading(false));
            return;
        }

        let force_refresh = inner
            .config
            .enrichment
            .force_refresh_artists
            .iter()
            .any(|name| normalize_key(name) == key);

        inner.state.dispatch(Transition::SetArtistImagesLoading(true));

        let images = inner.images.clone();
        let state = inner.state.clone();
        let current = inner.generation.clone();
        let track_id = track.id.clone();

        let task = tokio::spawn(async move {
            let found = images.fetch_artist_images(&artist, force_refresh).await;
            if !current.is_current(generation) {
                return;
            }
            if !found.is_empty() {
                state.dispatch(Transition::AttachArtistImages {
                    track_id,
                    images: found,
                });
            }
            state.dispatch(Transition::SetArtistImagesLoading(false));
        });

        *inner.enrichment.lock() = Some(task);
    }

    fn handle_signal(&self, signal: BackendSignal) {
        let inner = &self.inner;
        if !inner.generation.is_current(signal.generation)
            || *inner.active.lock() != Some(signal.backend)
        {
            trace!(generation = signal.generation, "Dropping stale backend signal");
            return;
        }

        match signal.kind {
            SignalKind::Time(time) => inner.state.dispatch(Transition::SetTime(time)),
            SignalKind::Duration(duration) => {
                if duration.is_finite() && duration > 0.0 {
                    inner.state.dispatch(Transition::SetDuration(duration));
                }
            }
            SignalKind::Playing(playing) => {
                inner.state.dispatch(Transition::SetPlaying(playing));
                if playing {
                    if let Some(track) = inner.state.snapshot().current_track {
                        self.announce(signal.generation, track);
                    }
                }
            }
            SignalKind::Fault {
                message,
                unplayable,
            } => {
                let track = inner.state.snapshot().current_track;
                if unplayable {
                    if let Some(track) = &track {
                        inner.streams.invalidate(track);
                    }
                }

                warn!(backend = %signal.backend, %message, "Backend fault");
                inner.state.dispatch(Transition::SetPlaying(false));
                inner.state.dispatch(Transition::SetLoading(false));
                inner.state.dispatch(Transition::SetFault(Some(message.clone())));
                if let Some(track) = track {
                    let _ = inner.events.send(EngineEvent::PlaybackFault {
                        track_id: track.id,
                        message,
                    });
                }
            }
            SignalKind::Ended => {
                if inner.ended.swap(signal.generation, Ordering::SeqCst) == signal.generation {
                    trace!(generation = signal.generation, "Duplicate end-of-media");
                    return;
                }
                self.advance_after_end();
            }
        }
    }

    fn advance_after_end(&self) {
        let inner = &self.inner;
        let snapshot = inner.state.snapshot();
        let decision = advance::after_end(&snapshot, &mut rand::thread_rng());

        let next = match decision {
            Advance::Replay(track) => Some((track, snapshot.current_index())),
            Advance::Play(position, track) => Some((track, Some(position))),
            Advance::Stop => None,
        };

        match next {
            Some((track, position)) => {
                debug!(track_id = %track.id, ?position, "Auto-advancing");
                let engine = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = engine.start(track, position).await {
                        debug!(error = %e, "Auto-advance start failed");
                    }
                });
            }
            None => {
                inner.state.dispatch(Transition::SetPlaying(false));
                inner.state.dispatch(Transition::SetTime(0.0));
                info!("Reached the end of the queue");
                if let Some(track) = snapshot.current_track {
                    let _ = inner
                        .events
                        .send(EngineEvent::QueueFinished { track_id: track.id });
                }
            }
        }
    }
}

async fn run_signal_loop(
    engine: Weak<EngineInner>,
    mut signals: mpsc::UnboundedReceiver<BackendSignal>,
) {
    while let Some(signal) = signals.recv().await {
        let Some(inner) = engine.upgrade() else {
            break;
        };
        PlaybackEngine::from_inner(inner).handle_signal(signal);
    }
}
