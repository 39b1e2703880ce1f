//! Remote backend adapter
//!
//! Drives the [`EmbeddedPlayer`]. The platform API is loaded once per
//! process. Every load bumps a reload counter so the same handle can be
//! restarted, schedules one delayed auto-play retry, and starts a progress
//! poller, because the player's push events are only hints.
//!
//! ```text
//! Uninitialized -> ApiLoading -> Idle -> Loaded -> Playing <-> Paused -> Ended
//! ```

use crate::backend::{
    is_unplayable_code, BackendSignal, EmbeddedPlayer, MediaError, PlayerEvent, PlayerState,
    SignalKind, StartOutcome,
};
use crate::error::{PlaybackError, Result};
use crate::generation::Generation;
use crate::types::AdapterStatus;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tandem_core::config::RemoteSettings;
use tandem_core::{BackendKind, StreamHandle};
use tokio::sync::{broadcast, mpsc, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Lifecycle of the embedded player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Uninitialized,
    ApiLoading,
    Idle,
    Loaded,
    Playing,
    Paused,
    Ended,
}

impl RemoteState {
    fn has_media(self) -> bool {
        matches!(
            self,
            Self::Loaded | Self::Playing | Self::Paused | Self::Ended
        )
    }
}

/// Pieces shared with the adapter's background tasks
#[derive(Clone)]
struct Shared {
    player: Arc<dyn EmbeddedPlayer>,
    generation: Generation,
    signals: mpsc::UnboundedSender<BackendSignal>,
    state: Arc<Mutex<RemoteState>>,
    wants_playing: Arc<AtomicBool>,
}

impl Shared {
    fn send(&self, generation: u64, kind: SignalKind) {
        let _ = self.signals.send(BackendSignal {
            generation,
            backend: BackendKind::Remote,
            kind,
        });
    }

    fn set_state(&self, generation: u64, state: RemoteState) {
        if self.generation.is_current(generation) {
            *self.state.lock() = state;
        }
    }
}

/// Adapter for the embedded remote player
pub struct RemoteAdapter {
    shared: Shared,
    settings: RemoteSettings,
    api: OnceCell<()>,
    reload: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RemoteAdapter {
    pub fn new(
        player: Arc<dyn EmbeddedPlayer>,
        generation: Generation,
        signals: mpsc::UnboundedSender<BackendSignal>,
        settings: RemoteSettings,
    ) -> Self {
        Self {
            shared: Shared {
                player,
                generation,
                signals,
                state: Arc::new(Mutex::new(RemoteState::Uninitialized)),
                wants_playing: Arc::new(AtomicBool::new(false)),
            },
            settings,
            api: OnceCell::new(),
            reload: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Load the platform API if it is not loaded yet
    async fn ensure_api(&self) -> Result<()> {
        self.api
            .get_or_try_init(|| async {
                *self.shared.state.lock() = RemoteState::ApiLoading;
                info!("Loading embedded player API");

                match self.shared.player.load_api().await {
                    Ok(()) => {
                        *self.shared.state.lock() = RemoteState::Idle;
                        Ok(())
                    }
                    Err(e) => {
                        *self.shared.state.lock() = RemoteState::Uninitialized;
                        Err(PlaybackError::Backend(e))
                    }
                }
            })
            .await
            .map(|_| ())
    }

    /// Load `handle` and start it under `generation`.
    ///
    /// Returns [`StartOutcome::Pending`] once the load is issued; audio is
    /// reported later by a `Playing` signal.
    pub async fn start(&self, handle: &StreamHandle, generation: u64) -> Result<StartOutcome> {
        self.ensure_api().await?;
        if !self.shared.generation.is_current(generation) {
            return Ok(StartOutcome::Superseded);
        }

        self.abort_tasks();
        let reload = self.reload.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.wants_playing.store(true, Ordering::SeqCst);

        // Subscribe before loading so the first state change is seen
        let events = self.shared.player.events();
        debug!(%handle, reload, generation, "Loading remote stream");
        self.shared.player.load_by_handle(handle, reload);
        *self.shared.state.lock() = RemoteState::Loaded;

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(watch_events(
            self.shared.clone(),
            events,
            generation,
            self.settings.end_debounce(),
        )));
        tasks.push(tokio::spawn(poll_progress(
            self.shared.clone(),
            generation,
            self.settings.poll_interval(),
        )));
        tasks.push(tokio::spawn(retry_autoplay(
            self.shared.clone(),
            generation,
            self.settings.autoplay_retry(),
        )));

        Ok(StartOutcome::Pending)
    }

    /// Resume the loaded stream of `generation`
    pub async fn resume(&self, generation: u64) -> Result<StartOutcome> {
        self.shared.wants_playing.store(true, Ordering::SeqCst);
        match self.shared.player.play().await {
            Ok(()) => {
                self.shared.set_state(generation, RemoteState::Playing);
                Ok(StartOutcome::Started)
            }
            Err(MediaError::Aborted) if !self.shared.generation.is_current(generation) => {
                Ok(StartOutcome::Superseded)
            }
            Err(MediaError::Aborted) => {
                self.shared.wants_playing.store(false, Ordering::SeqCst);
                self.shared.set_state(generation, RemoteState::Paused);
                Ok(StartOutcome::Held)
            }
            Err(MediaError::NotAllowed(reason)) => {
                debug!(%reason, "Remote playback needs a user gesture");
                self.shared.wants_playing.store(false, Ordering::SeqCst);
                Err(PlaybackError::AutoplayRestricted)
            }
            Err(e) => Err(PlaybackError::Media(e.to_string())),
        }
    }

    pub fn pause(&self) {
        self.shared.wants_playing.store(false, Ordering::SeqCst);
        self.shared.player.pause();
        let mut state = self.shared.state.lock();
        if matches!(*state, RemoteState::Loaded | RemoteState::Playing) {
            *state = RemoteState::Paused;
        }
    }

    /// Seek to `seconds`.
    ///
    /// Returns `false` when the target is within the seek threshold of the
    /// reported position and nothing was sent to the player.
    pub fn seek(&self, seconds: f64) -> bool {
        let position = self.shared.player.current_time();
        if position.is_finite() && (seconds - position).abs() < self.settings.seek_threshold_secs {
            return false;
        }
        self.shared.player.seek_to(seconds);
        true
    }

    pub fn set_volume(&self, volume: f64) {
        self.shared.player.set_volume(volume);
    }

    /// Stop, drop all background tasks and release the player instance
    pub fn quiesce(&self) {
        self.abort_tasks();
        self.shared.wants_playing.store(false, Ordering::SeqCst);

        let mut state = self.shared.state.lock();
        if state.has_media() {
            self.shared.player.pause();
            self.shared.player.destroy();
            *state = RemoteState::Idle;
            debug!("Released embedded player");
        }
    }

    pub fn state(&self) -> RemoteState {
        *self.shared.state.lock()
    }

    pub fn status(&self) -> AdapterStatus {
        match self.state() {
            RemoteState::Uninitialized | RemoteState::ApiLoading | RemoteState::Idle => {
                AdapterStatus::Idle
            }
            RemoteState::Loaded => AdapterStatus::Loading,
            RemoteState::Playing => AdapterStatus::Playing,
            RemoteState::Paused => AdapterStatus::Paused,
            RemoteState::Ended => AdapterStatus::Ended,
        }
    }

    /// Number of loads issued so far
    pub fn reload_count(&self) -> u64 {
        self.reload.load(Ordering::SeqCst)
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for RemoteAdapter {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Forward player events, debouncing end-of-media
async fn watch_events(
    shared: Shared,
    mut events: broadcast::Receiver<PlayerEvent>,
    generation: u64,
    debounce: std::time::Duration,
) {
    let mut end_deadline: Option<Instant> = None;
    let mut end_delivered = false;

    loop {
        let deadline = end_deadline;
        let end_timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Remote listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !shared.generation.is_current(generation) {
                    break;
                }

                match event {
                    PlayerEvent::StateChange(PlayerState::Playing) => {
                        end_deadline = None;
                        shared.set_state(generation, RemoteState::Playing);
                        shared.send(generation, SignalKind::Playing(true));
                    }
                    PlayerEvent::StateChange(PlayerState::Paused) => {
                        shared.set_state(generation, RemoteState::Paused);
                        shared.send(generation, SignalKind::Playing(false));
                    }
                    PlayerEvent::StateChange(PlayerState::Ended) => {
                        if !end_delivered && end_deadline.is_none() {
                            end_deadline = Some(Instant::now() + debounce);
                        }
                    }
                    PlayerEvent::StateChange(_) => {}
                    PlayerEvent::Error(code) => {
                        warn!(code, "Embedded player reported an error");
                        shared.send(generation, SignalKind::Fault {
                            message: format!("Embedded player error {code}"),
                            unplayable: is_unplayable_code(code),
                        });
                    }
                }
            }
            () = end_timer => {
                end_deadline = None;
                if !end_delivered && shared.generation.is_current(generation) {
                    end_delivered = true;
                    shared.set_state(generation, RemoteState::Ended);
                    shared.send(generation, SignalKind::Ended);
                }
            }
        }
    }
}

/// Poll position and duration from the player
async fn poll_progress(shared: Shared, generation: u64, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.generation.is_current(generation) {
            break;
        }

        let duration = shared.player.duration();
        if duration.is_finite() && duration > 0.0 {
            shared.send(generation, SignalKind::Duration(duration));
        }
        if *shared.state.lock() == RemoteState::Playing {
            shared.send(generation, SignalKind::Time(shared.player.current_time()));
        }
    }
}

/// Single delayed play attempt in case the load did not autoplay
async fn retry_autoplay(shared: Shared, generation: u64, delay: std::time::Duration) {
    tokio::time::sleep(delay).await;

    if !shared.generation.is_current(generation)
        || !shared.wants_playing.load(Ordering::SeqCst)
        || shared.player.state() == PlayerState::Playing
    {
        return;
    }

    debug!(generation, "Retrying remote autoplay");
    match shared.player.play().await {
        Ok(()) | Err(MediaError::Aborted) => {}
        Err(MediaError::NotAllowed(reason)) => {
            debug!(%reason, "Remote autoplay refused");
            shared.wants_playing.store(false, Ordering::SeqCst);
            shared.set_state(generation, RemoteState::Paused);
            shared.send(generation, SignalKind::Playing(false));
        }
        Err(e) => shared.send(
            generation,
            SignalKind::Fault {
                message: e.to_string(),
                unplayable: false,
            },
        ),
    }
}
