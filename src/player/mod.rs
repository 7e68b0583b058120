//! Playback control: the session, the command queue and the coordinator
//! thread, wired together by [`AudioPlayer`].

pub mod command;
pub mod coordinator;
pub mod session;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

pub use command::{Command, CommandReceiver, CommandSender, Received, SendPolicy, command_channel};
pub use coordinator::{Coordinator, PlaybackState, StateCell, Transition, plan};
pub use session::PlaybackSession;

use crate::config::Config;
use crate::core::{ObserverSet, PlayerError, PlayerObserver, PlayerResult};
use crate::ring::StreamBuffer;
use crate::storage::Storage;

/// The audio subsystem: stream buffer, command queue, coordinator thread and
/// playback session.
///
/// Every instance is independent; there is no global player.
pub struct AudioPlayer {
    config: Config,
    buffer: Arc<StreamBuffer>,
    session: Arc<PlaybackSession>,
    commands: CommandSender,
    state: Arc<StateCell>,
    shutdown: Arc<AtomicBool>,
    coordinator: Option<JoinHandle<()>>,
}

impl AudioPlayer {
    /// Allocates the stream buffer and command queue and starts the
    /// coordinator thread. Observers are fixed from here on.
    pub fn init(
        config: Config,
        storage: Arc<dyn Storage>,
        observers: Vec<Arc<dyn PlayerObserver>>,
    ) -> PlayerResult<Self> {
        let buffer = Arc::new(StreamBuffer::new(config.buffer.capacity));
        let (commands, receiver) =
            command_channel(config.commands.queue_depth, SendPolicy::from_config(&config.commands));
        let observers = ObserverSet::new(observers);

        let session = Arc::new(PlaybackSession::new(
            storage,
            buffer.clone(),
            commands.clone(),
            observers.clone(),
            config.reader.clone(),
        ));

        let coordinator = Coordinator::new(
            session.clone(),
            observers,
            &config.current_track,
            &config.coordinator,
        );
        let state = coordinator.state_cell();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = coordinator
            .spawn(receiver, shutdown.clone())
            .map_err(PlayerError::Spawn)?;

        log::info!(
            "audio player ready: buffer={}B chunk={}B queue={} track={}",
            config.buffer.capacity,
            config.reader.chunk_size,
            config.commands.queue_depth,
            config.current_track
        );

        Ok(Self {
            config,
            buffer,
            session,
            commands,
            state,
            shutdown,
            coordinator: Some(handle),
        })
    }

    /// Starts `path` directly, bypassing the coordinator. `false` if a
    /// session is already active or the file cannot be opened.
    pub fn start(&self, path: &str) -> bool {
        self.session.start(path).is_ok()
    }

    pub fn stop(&self) {
        self.session.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.session.is_playing()
    }

    /// Injects a command for the coordinator. `false` if it was dropped.
    pub fn send(&self, command: Command) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }
        self.commands.send(command)
    }

    /// A sender for an external event source (UI, wireless bridge).
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.state.get()
    }

    pub fn buffer(&self) -> Arc<StreamBuffer> {
        self.buffer.clone()
    }

    pub fn session(&self) -> &Arc<PlaybackSession> {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stops playback, ends the coordinator loop and joins both threads.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        log::info!("audio player shutting down");
        self.session.stop();

        if let Some(handle) = self.coordinator.take() {
            if let Err(e) = handle.join() {
                log::error!("Failed to join coordinator thread: {:?}", e);
            }
        }

        if self.session.wait_stopped(self.config.reader.write_timeout() * 10) {
            self.session.join();
        } else {
            log::warn!("reader worker did not stop in time, leaving it detached");
        }
        log::info!("audio player shut down");
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
