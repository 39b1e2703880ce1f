//! Local backend adapter
//!
//! Drives the single reusable [`AudioElement`]. Every switch pauses the
//! element, rewinds it, drops the listeners of the previous track and attaches
//! fresh ones before assigning the new source.

use crate::backend::{
    AudioElement, BackendSignal, ElementEvent, MediaError, ReadyState, SignalKind, StartOutcome,
};
use crate::error::{PlaybackError, Result};
use crate::generation::Generation;
use crate::types::AdapterStatus;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{BackendKind, Track};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Adapter for the local audio element
pub struct LocalAdapter {
    element: Arc<dyn AudioElement>,
    generation: Generation,
    signals: mpsc::UnboundedSender<BackendSignal>,
    can_play_timeout: Duration,
    status: Arc<Mutex<AdapterStatus>>,
    wants_playing: AtomicBool,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl LocalAdapter {
    pub fn new(
        element: Arc<dyn AudioElement>,
        generation: Generation,
        signals: mpsc::UnboundedSender<BackendSignal>,
        can_play_timeout: Duration,
    ) -> Self {
        Self {
            element,
            generation,
            signals,
            can_play_timeout,
            status: Arc::new(Mutex::new(AdapterStatus::Idle)),
            wants_playing: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Load `track` and start it under `generation`
    pub async fn start(&self, track: &Track, generation: u64) -> Result<StartOutcome> {
        let source = track
            .local_source()
            .ok_or_else(|| PlaybackError::MissingSource(track.id.to_string()))?;

        self.detach();
        self.element.pause();
        self.element.set_position(0.0);

        // Subscribe before loading so an early can-play is not missed
        let mut ready_events = self.element.events();
        self.attach(generation);

        self.wants_playing.store(true, Ordering::SeqCst);
        *self.status.lock() = AdapterStatus::Loading;
        debug!(track_id = %track.id, %source, generation, "Loading local track");

        self.element.set_source(&source);
        self.element.load();

        if self.element.ready_state() < ReadyState::HaveFutureData {
            match tokio::time::timeout(self.can_play_timeout, wait_for_can_play(&mut ready_events))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return self.fail(e, generation),
                Err(_) => warn!(
                    track_id = %track.id,
                    timeout_ms = self.can_play_timeout.as_millis() as u64,
                    "No can-play event, starting anyway"
                ),
            }
        }
        drop(ready_events);

        if !self.generation.is_current(generation) {
            return Ok(StartOutcome::Superseded);
        }
        if !self.wants_playing.load(Ordering::SeqCst) {
            *self.status.lock() = AdapterStatus::Paused;
            return Ok(StartOutcome::Held);
        }

        match self.element.play().await {
            Ok(()) => {
                *self.status.lock() = AdapterStatus::Playing;
                Ok(StartOutcome::Started)
            }
            Err(e) => self.fail(e, generation),
        }
    }

    /// Resume the loaded track of `generation`
    pub async fn resume(&self, generation: u64) -> Result<StartOutcome> {
        self.wants_playing.store(true, Ordering::SeqCst);
        match self.element.play().await {
            Ok(()) => {
                *self.status.lock() = AdapterStatus::Playing;
                Ok(StartOutcome::Started)
            }
            Err(e) => self.fail(e, generation),
        }
    }

    pub fn pause(&self) {
        self.wants_playing.store(false, Ordering::SeqCst);
        self.element.pause();
        let mut status = self.status.lock();
        if status.is_resumable() {
            *status = AdapterStatus::Paused;
        }
    }

    /// Seek to `seconds` (already clamped by the caller)
    pub fn seek(&self, seconds: f64) {
        self.element.set_position(seconds);
    }

    pub fn set_volume(&self, volume: f64) {
        self.element.set_volume(volume);
    }

    /// Silence the element and drop all listeners
    pub fn quiesce(&self) {
        self.detach();
        self.wants_playing.store(false, Ordering::SeqCst);
        self.element.pause();
        *self.status.lock() = AdapterStatus::Idle;
    }

    pub fn status(&self) -> AdapterStatus {
        *self.status.lock()
    }

    fn fail(&self, error: MediaError, generation: u64) -> Result<StartOutcome> {
        match error {
            MediaError::Aborted if !self.generation.is_current(generation) => {
                debug!("Local playback aborted by a newer load");
                Ok(StartOutcome::Superseded)
            }
            MediaError::Aborted => {
                // Interrupted by a pause; the element is loaded but silent
                debug!("Local playback interrupted");
                self.wants_playing.store(false, Ordering::SeqCst);
                *self.status.lock() = AdapterStatus::Paused;
                Ok(StartOutcome::Held)
            }
            MediaError::NotAllowed(reason) => {
                debug!(%reason, "Local playback needs a user gesture");
                self.wants_playing.store(false, Ordering::SeqCst);
                *self.status.lock() = AdapterStatus::Paused;
                Err(PlaybackError::AutoplayRestricted)
            }
            other => {
                warn!(error = %other, "Local playback failed");
                *self.status.lock() = AdapterStatus::Idle;
                Err(PlaybackError::Media(other.to_string()))
            }
        }
    }

    fn detach(&self) {
        for listener in self.listeners.lock().drain(..) {
            listener.abort();
        }
    }

    fn attach(&self, generation: u64) {
        let mut events = self.element.events();
        let signals = self.signals.clone();
        let status = Arc::clone(&self.status);
        let is_current = self.generation.clone();

        let listener = tokio::spawn(async move {
            let send = |kind: SignalKind| {
                let _ = signals.send(BackendSignal {
                    generation,
                    backend: BackendKind::Local,
                    kind,
                });
            };

            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Local listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !is_current.is_current(generation) {
                    break;
                }

                match event {
                    ElementEvent::TimeUpdate(time) => send(SignalKind::Time(time)),
                    ElementEvent::LoadedMetadata(duration) => send(SignalKind::Duration(duration)),
                    ElementEvent::CanPlay => {}
                    ElementEvent::Ended => {
                        *status.lock() = AdapterStatus::Ended;
                        send(SignalKind::Ended);
                    }
                    ElementEvent::Error(MediaError::Aborted) => {}
                    // Failures while loading are reported by `start`
                    ElementEvent::Error(_) if *status.lock() == AdapterStatus::Loading => {}
                    ElementEvent::Error(e) => {
                        *status.lock() = AdapterStatus::Idle;
                        send(SignalKind::Fault {
                            message: e.to_string(),
                            unplayable: false,
                        });
                    }
                }
            }
        });

        self.listeners.lock().push(listener);
    }
}

impl Drop for LocalAdapter {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn wait_for_can_play(
    events: &mut broadcast::Receiver<ElementEvent>,
) -> std::result::Result<(), MediaError> {
    loop {
        match events.recv().await {
            Ok(ElementEvent::CanPlay) => return Ok(()),
            Ok(ElementEvent::Error(e)) => return Err(e),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => {
                return Err(MediaError::Aborted);
            }
        }
    }
}
