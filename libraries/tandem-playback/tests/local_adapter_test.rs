//! Local adapter tests
//!
//! Exercise the audio element adapter directly: load sequencing, the
//! can-play wait, failure classification and listener hygiene.

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tandem_playback::{
    AdapterStatus, BackendSignal, ElementEvent, Generation, LocalAdapter, MediaError,
    PlaybackError, ReadyState, SignalKind, StartOutcome,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

struct Fixture {
    adapter: Arc<LocalAdapter>,
    audio: Arc<FakeAudioElement>,
    generation: Generation,
    signals: mpsc::UnboundedReceiver<BackendSignal>,
}

fn fixture() -> Fixture {
    let audio = FakeAudioElement::new();
    let generation = Generation::new();
    let (tx, signals) = mpsc::unbounded_channel();
    let adapter = Arc::new(LocalAdapter::new(
        audio.clone(),
        generation.clone(),
        tx,
        Duration::from_secs(10),
    ));

    Fixture {
        adapter,
        audio,
        generation,
        signals,
    }
}

fn drain(signals: &mut mpsc::UnboundedReceiver<BackendSignal>) -> Vec<BackendSignal> {
    let mut seen = Vec::new();
    while let Ok(signal) = signals.try_recv() {
        seen.push(signal);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn start_waits_for_can_play() {
    let f = fixture();
    let generation = f.generation.advance();

    let outcome = f.adapter.start(&local_track("a"), generation).await.unwrap();

    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(f.adapter.status(), AdapterStatus::Playing);
    assert_eq!(
        *f.audio.log.lock(),
        vec!["pause", "position:0", "source:/music/a.flac", "load", "play"]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_can_play_times_out_and_plays_anyway() {
    let f = fixture();
    f.audio.set_auto_can_play(false);
    let generation = f.generation.advance();

    let started = Instant::now();
    let outcome = f.adapter.start(&local_track("a"), generation).await.unwrap();

    assert_eq!(outcome, StartOutcome::Started);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(f.audio.is_playing());
}

#[tokio::test(start_paused = true)]
async fn ready_element_skips_the_wait() {
    let f = fixture();
    f.audio.set_auto_can_play(false);
    f.audio.set_ready_state(ReadyState::HaveEnoughData);
    let generation = f.generation.advance();

    let started = Instant::now();
    f.adapter.start(&local_track("a"), generation).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(1));
    assert!(f.audio.is_playing());
}

#[tokio::test(start_paused = true)]
async fn track_without_source_is_rejected() {
    let f = fixture();
    let generation = f.generation.advance();
    let track = tandem_core::Track::new(tandem_core::TrackId::new("local-x"), "X", "Y");

    let result = f.adapter.start(&track, generation).await;

    assert!(matches!(result, Err(PlaybackError::MissingSource(_))));
    assert_eq!(f.audio.count("load"), 0);
}

#[tokio::test(start_paused = true)]
async fn error_while_loading_fails_the_start() {
    let f = fixture();
    f.audio.set_auto_can_play(false);
    let generation = f.generation.advance();

    let adapter = f.adapter.clone();
    let start = tokio::spawn(async move { adapter.start(&local_track("a"), generation).await });
    settle().await;
    f.audio
        .emit(ElementEvent::Error(MediaError::Unsupported("audio/x-weird".into())));

    let result = start.await.unwrap();
    assert!(matches!(result, Err(PlaybackError::Media(_))));
    assert_eq!(f.adapter.status(), AdapterStatus::Idle);
    assert_eq!(f.audio.count("play"), 0);
}

#[tokio::test(start_paused = true)]
async fn interrupted_play_holds_the_track() {
    let f = fixture();
    f.audio.push_play_result(Err(MediaError::Aborted));
    let generation = f.generation.advance();

    let outcome = f.adapter.start(&local_track("a"), generation).await.unwrap();

    assert_eq!(outcome, StartOutcome::Held);
    assert_eq!(f.adapter.status(), AdapterStatus::Paused);
    assert!(!f.audio.is_playing());

    // Still loaded: resuming plays in place
    let outcome = f.adapter.resume(generation).await.unwrap();
    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(f.audio.count("load"), 1);
}

#[tokio::test(start_paused = true)]
async fn abort_after_newer_switch_is_superseded() {
    let f = fixture();
    f.audio.set_auto_can_play(false);
    let generation = f.generation.advance();

    let adapter = f.adapter.clone();
    let start = tokio::spawn(async move { adapter.start(&local_track("a"), generation).await });
    settle().await;
    f.generation.advance();
    f.audio.emit(ElementEvent::Error(MediaError::Aborted));

    let outcome = start.await.unwrap().unwrap();
    assert_eq!(outcome, StartOutcome::Superseded);
    assert_eq!(f.audio.count("play"), 0);
}

#[tokio::test(start_paused = true)]
async fn refused_play_leaves_track_paused() {
    let f = fixture();
    f.audio
        .push_play_result(Err(MediaError::NotAllowed("no gesture".into())));
    let generation = f.generation.advance();

    let result = f.adapter.start(&local_track("a"), generation).await;

    assert!(matches!(result, Err(PlaybackError::AutoplayRestricted)));
    assert_eq!(f.adapter.status(), AdapterStatus::Paused);

    f.adapter.resume(generation).await.unwrap();
    assert_eq!(f.adapter.status(), AdapterStatus::Playing);
}

#[tokio::test(start_paused = true)]
async fn pause_during_load_holds_the_track() {
    let f = fixture();
    f.audio.set_auto_can_play(false);
    let generation = f.generation.advance();

    let adapter = f.adapter.clone();
    let start = tokio::spawn(async move { adapter.start(&local_track("a"), generation).await });
    settle().await;

    f.adapter.pause();
    f.audio.emit(ElementEvent::CanPlay);

    assert_eq!(start.await.unwrap().unwrap(), StartOutcome::Held);
    assert_eq!(f.adapter.status(), AdapterStatus::Paused);
    assert_eq!(f.audio.count("play"), 0);
}

#[tokio::test(start_paused = true)]
async fn newer_generation_supersedes_pending_start() {
    let f = fixture();
    f.audio.set_auto_can_play(false);
    let generation = f.generation.advance();

    let adapter = f.adapter.clone();
    let start = tokio::spawn(async move { adapter.start(&local_track("a"), generation).await });
    settle().await;

    f.generation.advance();
    f.audio.emit(ElementEvent::CanPlay);

    assert_eq!(start.await.unwrap().unwrap(), StartOutcome::Superseded);
    assert_eq!(f.audio.count("play"), 0);
}

#[tokio::test(start_paused = true)]
async fn switching_tracks_drops_old_listeners() {
    let mut f = fixture();

    let first = f.generation.advance();
    f.adapter.start(&local_track("a"), first).await.unwrap();
    let second = f.generation.advance();
    f.adapter.start(&local_track("b"), second).await.unwrap();
    settle().await;
    drain(&mut f.signals);

    f.audio.emit(ElementEvent::TimeUpdate(5.0));
    settle().await;

    let signals = drain(&mut f.signals);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].generation, second);
    assert_eq!(signals[0].kind, SignalKind::Time(5.0));
}

#[tokio::test(start_paused = true)]
async fn end_of_media_is_reported() {
    let mut f = fixture();
    let generation = f.generation.advance();
    f.adapter.start(&local_track("a"), generation).await.unwrap();

    f.audio.emit(ElementEvent::Ended);
    settle().await;

    let signals = drain(&mut f.signals);
    assert!(signals
        .iter()
        .any(|s| s.generation == generation && s.kind == SignalKind::Ended));
    assert_eq!(f.adapter.status(), AdapterStatus::Ended);
}

#[tokio::test(start_paused = true)]
async fn error_after_start_is_a_fault_signal() {
    let mut f = fixture();
    let generation = f.generation.advance();
    f.adapter.start(&local_track("a"), generation).await.unwrap();

    f.audio
        .emit(ElementEvent::Error(MediaError::Network("connection reset".into())));
    settle().await;

    let signals = drain(&mut f.signals);
    assert!(signals.iter().any(|s| matches!(
        &s.kind,
        SignalKind::Fault { message, unplayable: false } if message.contains("connection reset")
    )));
    assert_eq!(f.adapter.status(), AdapterStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn quiesce_silences_and_detaches() {
    let mut f = fixture();
    let generation = f.generation.advance();
    f.adapter.start(&local_track("a"), generation).await.unwrap();

    f.adapter.quiesce();
    assert!(!f.audio.is_playing());
    assert_eq!(f.adapter.status(), AdapterStatus::Idle);

    settle().await;
    drain(&mut f.signals);
    f.audio.emit(ElementEvent::Ended);
    settle().await;
    assert!(drain(&mut f.signals).is_empty());
}
