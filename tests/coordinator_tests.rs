use std::sync::Arc;
use std::time::Duration;

use sangeet_audio::config::{CoordinatorConfig, ReaderConfig};
use sangeet_audio::core::{ObserverSet, PlayerEvent, PlayerObserver};
use sangeet_audio::player::{
    Command, CommandReceiver, Coordinator, PlaybackSession, PlaybackState, Received, SendPolicy,
    command_channel,
};
use sangeet_audio::ring::StreamBuffer;
use sangeet_audio::testing::{MemoryStorage, RecordingObserver, wait_until, wav_bytes};

const SETTLE: Duration = Duration::from_secs(2);
const TRACK: &str = "/sdcard/TEST_00.WAV";

struct Rig {
    coordinator: Coordinator,
    session: Arc<PlaybackSession>,
    storage: Arc<MemoryStorage>,
    commands: CommandReceiver,
    observer: Arc<RecordingObserver>,
}

/// The coordinator is driven by hand so every transition is deterministic.
fn rig(capacity: usize) -> Rig {
    let storage = Arc::new(MemoryStorage::new());
    let buffer = Arc::new(StreamBuffer::new(capacity));
    let (tx, rx) = command_channel(8, SendPolicy::Drop);
    let observer = RecordingObserver::new();
    let observers = ObserverSet::new(vec![observer.clone() as Arc<dyn PlayerObserver>]);

    let reader = ReaderConfig {
        write_timeout_ms: 10,
        backoff_ms: 5,
        ..ReaderConfig::default()
    };
    let session = Arc::new(PlaybackSession::new(
        storage.clone(),
        buffer,
        tx,
        observers.clone(),
        reader,
    ));
    let coordinator = Coordinator::new(
        session.clone(),
        observers,
        TRACK,
        &CoordinatorConfig::default(),
    );

    Rig {
        coordinator,
        session,
        storage,
        commands: rx,
        observer,
    }
}

#[test]
fn test_play_then_end_of_stream_resets_to_idle() {
    let mut rig = rig(32 * 1024);
    rig.storage.insert(TRACK, wav_bytes(10_000));

    assert_eq!(rig.coordinator.handle(Command::Play), PlaybackState::Playing);
    assert_eq!(rig.coordinator.state_cell().get(), PlaybackState::Playing);

    let eos = rig.commands.recv_timeout(SETTLE);
    assert_eq!(eos, Received::Command(Command::EndOfStream));
    assert_eq!(rig.coordinator.handle(Command::EndOfStream), PlaybackState::Stopped);

    assert!(!rig.session.is_playing());
    assert_eq!(rig.observer.count(|e| matches!(e, PlayerEvent::ResetToIdle)), 1);
    assert_eq!(
        rig.observer.count(|e| matches!(
            e,
            PlayerEvent::StateChanged {
                from: PlaybackState::Playing,
                to: PlaybackState::Stopped,
                command: Command::EndOfStream,
            }
        )),
        1
    );

    // Stopped accepts a fresh Play
    assert_eq!(rig.coordinator.handle(Command::Play), PlaybackState::Playing);
    assert_eq!(rig.session.session_id(), 2);
    rig.session.stop();
    assert!(rig.session.wait_stopped(SETTLE));
}

#[test]
fn test_pause_then_play_restarts_from_beginning() {
    let mut rig = rig(4096);
    rig.storage.insert(TRACK, wav_bytes(500_000));

    assert_eq!(rig.coordinator.handle(Command::Play), PlaybackState::Playing);
    assert_eq!(rig.coordinator.handle(Command::Pause), PlaybackState::Paused);
    assert!(rig.session.wait_stopped(SETTLE));
    assert_eq!(rig.storage.open_handles(), 0);

    assert_eq!(rig.coordinator.handle(Command::Play), PlaybackState::Playing);
    assert!(rig.session.is_playing());
    assert_eq!(rig.session.session_id(), 2);
    assert_eq!(rig.storage.opens(), 2);
    assert_eq!(rig.storage.max_open_handles(), 1);

    // restart means from the top of the data section
    let buffer = rig.session.buffer().clone();
    assert!(wait_until(SETTLE, || buffer.len() >= 16));
    let head = buffer.read(16);
    assert_eq!(head, (0u8..16).collect::<Vec<_>>());

    rig.session.stop();
    assert!(rig.session.wait_stopped(SETTLE));
}

#[test]
fn test_play_straight_after_pause_waits_for_teardown() {
    let mut rig = rig(2048);
    rig.storage
        .insert_slow(TRACK, wav_bytes(100_000), Duration::from_millis(20));

    rig.coordinator.handle(Command::Play);
    rig.coordinator.handle(Command::Pause);
    // no wait here: the old worker may still be mid-read
    assert_eq!(rig.coordinator.handle(Command::Play), PlaybackState::Playing);
    assert_eq!(rig.storage.max_open_handles(), 1);

    rig.session.stop();
    assert!(rig.session.wait_stopped(SETTLE));
    assert_eq!(rig.session.active_workers(), 0);
}

#[test]
fn test_start_failure_keeps_state() {
    let mut rig = rig(4096);

    assert_eq!(rig.coordinator.handle(Command::Play), PlaybackState::Idle);
    assert!(!rig.session.is_playing());
    assert!(rig.observer.wait_for(SETTLE, |e| matches!(
        e,
        PlayerEvent::StartFailed { path, reason } if path == TRACK && reason == "open_failure"
    )));
    assert_eq!(
        rig.observer.count(|e| matches!(e, PlayerEvent::StateChanged { .. })),
        0
    );

    // the card shows up later
    rig.storage.insert(TRACK, wav_bytes(100));
    assert_eq!(rig.coordinator.handle(Command::Play), PlaybackState::Playing);
    assert!(rig.session.wait_stopped(SETTLE));
}

#[test]
fn test_commands_outside_the_table_change_nothing() {
    let mut rig = rig(4096);
    rig.storage.insert(TRACK, wav_bytes(500_000));

    for cmd in [
        Command::Pause,
        Command::Stop,
        Command::EndOfStream,
        Command::BluetoothDisconnected,
        Command::None,
    ] {
        assert_eq!(rig.coordinator.handle(cmd), PlaybackState::Idle);
    }
    assert_eq!(rig.storage.opens(), 0);

    rig.coordinator.handle(Command::Play);
    for cmd in [Command::Play, Command::Stop, Command::BluetoothConnected, Command::None] {
        assert_eq!(rig.coordinator.handle(cmd), PlaybackState::Playing);
    }
    assert_eq!(rig.storage.opens(), 1);
    assert!(rig.session.is_playing());

    rig.coordinator.handle(Command::Pause);
    assert_eq!(rig.coordinator.handle(Command::Stop), PlaybackState::Stopped);
    assert_eq!(rig.coordinator.handle(Command::Pause), PlaybackState::Stopped);
    assert!(rig.session.wait_stopped(SETTLE));
}

#[test]
fn test_bluetooth_connected_starts_playback() {
    let mut rig = rig(4096);
    rig.storage.insert(TRACK, wav_bytes(500_000));

    assert_eq!(
        rig.coordinator.handle(Command::BluetoothConnected),
        PlaybackState::Playing
    );
    assert!(rig.session.is_playing());

    rig.session.stop();
    assert!(rig.session.wait_stopped(SETTLE));
}

#[test]
fn test_set_current_track() {
    let mut rig = rig(32 * 1024);
    rig.storage.insert("/sdcard/OTHER.WAV", wav_bytes(64));

    rig.coordinator.set_current_track("/sdcard/OTHER.WAV");
    assert_eq!(rig.coordinator.handle(Command::Play), PlaybackState::Playing);
    assert_eq!(rig.session.source().as_deref(), Some("/sdcard/OTHER.WAV"));
    assert!(rig.session.wait_stopped(SETTLE));
}

#[test]
fn test_end_of_stream_from_previous_session_is_ignored() {
    let mut rig = rig(32 * 1024);
    rig.storage.insert(TRACK, wav_bytes(100));
    rig.storage.insert("/sdcard/LONG.WAV", wav_bytes(1_000_000));

    // session 1 runs out while the coordinator still believes it is playing
    assert_eq!(rig.coordinator.handle(Command::Play), PlaybackState::Playing);
    let stale = rig.commands.recv_timeout(SETTLE);
    assert_eq!(stale, Received::Command(Command::EndOfStream));
    assert_eq!(rig.session.ended_session(), 1);

    // Pause and Play are handled before that EndOfStream
    assert_eq!(rig.coordinator.handle(Command::Pause), PlaybackState::Paused);
    rig.coordinator.set_current_track("/sdcard/LONG.WAV");
    assert_eq!(rig.coordinator.handle(Command::Play), PlaybackState::Playing);
    assert_eq!(rig.session.session_id(), 2);

    assert_eq!(rig.coordinator.handle(Command::EndOfStream), PlaybackState::Playing);
    assert!(rig.session.is_playing());
    assert_eq!(rig.observer.count(|e| matches!(e, PlayerEvent::ResetToIdle)), 0);

    // the live session can still be paused normally
    assert_eq!(rig.coordinator.handle(Command::Pause), PlaybackState::Paused);
    assert!(rig.session.wait_stopped(SETTLE));
    rig.session.join();
}
