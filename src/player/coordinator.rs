use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::CoordinatorConfig;
use crate::core::{ComponentLogger, LogContext, ObserverSet, PlayerEvent};
use crate::player::command::{Command, CommandReceiver, Received};
use crate::player::session::PlaybackSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
    Stopped,
}

impl PlaybackState {
    fn as_u8(self) -> u8 {
        match self {
            PlaybackState::Idle => 0,
            PlaybackState::Playing => 1,
            PlaybackState::Paused => 2,
            PlaybackState::Stopped => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            3 => PlaybackState::Stopped,
            _ => PlaybackState::Idle,
        }
    }
}

/// What the coordinator has to do for a (state, command) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Ignore,
    /// Start the current track; becomes Playing only if the start succeeds.
    Start,
    /// Stop the session, go to Paused.
    Pause,
    /// Stop the session, reset the front-end, go to Stopped.
    EndOfStream,
    /// State change only; the session is already stopped.
    Stop,
}

impl Transition {
    /// State reached when the action succeeds.
    pub fn target(self, from: PlaybackState) -> PlaybackState {
        match self {
            Transition::Ignore => from,
            Transition::Start => PlaybackState::Playing,
            Transition::Pause => PlaybackState::Paused,
            Transition::EndOfStream | Transition::Stop => PlaybackState::Stopped,
        }
    }
}

/// A wireless link coming up is an implicit Play.
pub fn normalize(command: Command) -> Command {
    match command {
        Command::BluetoothConnected => Command::Play,
        other => other,
    }
}

/// The transition table. Pairs not listed leave the state unchanged.
pub fn plan(state: PlaybackState, command: Command) -> Transition {
    use PlaybackState::*;

    match (state, normalize(command)) {
        (Idle | Stopped, Command::Play) => Transition::Start,
        (Playing, Command::Pause) => Transition::Pause,
        (Playing, Command::EndOfStream) => Transition::EndOfStream,
        (Paused, Command::Play) => Transition::Start,
        (Paused, Command::Stop) => Transition::Stop,
        _ => Transition::Ignore,
    }
}

/// Read-only view of the coordinator's state for other threads.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn get(&self) -> PlaybackState {
        PlaybackState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: PlaybackState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// Single writer of [`PlaybackState`].
///
/// Commands are handled one at a time to completion, so at most one
/// transition is ever in flight.
pub struct Coordinator {
    state: PlaybackState,
    published: Arc<StateCell>,
    session: Arc<PlaybackSession>,
    observers: ObserverSet,
    current_track: String,
    poll_interval: Duration,
    restart_grace: Duration,
}

impl Coordinator {
    pub fn new(
        session: Arc<PlaybackSession>,
        observers: ObserverSet,
        current_track: &str,
        config: &CoordinatorConfig,
    ) -> Self {
        Self {
            state: PlaybackState::Idle,
            published: Arc::new(StateCell::default()),
            session,
            observers,
            current_track: current_track.to_string(),
            poll_interval: config.poll_interval(),
            restart_grace: config.restart_grace(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn state_cell(&self) -> Arc<StateCell> {
        self.published.clone()
    }

    pub fn set_current_track(&mut self, path: &str) {
        self.current_track = path.to_string();
    }

    /// Runs the coordinator on its own thread until `shutdown` is set or every
    /// command sender is gone.
    pub fn spawn(
        self,
        commands: CommandReceiver,
        shutdown: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("audio-ctrl".to_string())
            .spawn(move || self.run(commands, shutdown))
    }

    pub fn run(mut self, commands: CommandReceiver, shutdown: Arc<AtomicBool>) {
        self.info("audio control loop started");

        while !shutdown.load(Ordering::Acquire) {
            match commands.recv_timeout(self.poll_interval) {
                Received::Command(command) => {
                    self.handle(command);
                }
                Received::Timeout => {}
                Received::Disconnected => {
                    self.info("command channel closed");
                    break;
                }
            }
        }

        self.info(&format!("audio control loop exiting in state {:?}", self.state));
    }

    /// Applies one command. Returns the resulting state.
    pub fn handle(&mut self, command: Command) -> PlaybackState {
        self.debug(&format!("Audio CMD {} in state {:?}", command, self.state));

        if self.state == PlaybackState::Playing {
            self.trace_buffer(self.session.buffer());
        }

        let from = self.state;
        let transition = plan(from, command);
        let to = transition.target(from);
        match transition {
            Transition::Ignore => {
                self.debug(&format!("{} ignored in state {:?}", command, from));
            }
            Transition::Start => {
                if from == PlaybackState::Paused
                    && !self.session.wait_stopped(self.restart_grace)
                {
                    self.warn("previous reader still tearing down");
                }
                match self.session.start(&self.current_track) {
                    Ok(_) => self.enter(to, command),
                    Err(e) => {
                        self.error(&format!("start of '{}' failed: {}", self.current_track, e));
                        self.observers.publish(&PlayerEvent::StartFailed {
                            path: self.current_track.clone(),
                            reason: e.kind().to_string(),
                        });
                    }
                }
            }
            Transition::Pause => {
                self.session.stop();
                self.enter(to, command);
            }
            Transition::EndOfStream => {
                // stale if a newer session started after that one ended
                let ended = self.session.ended_session();
                let current = self.session.session_id();
                if ended != current {
                    self.info(&format!(
                        "stale EndOfStream (session {} ended, session {} playing)",
                        ended, current
                    ));
                    return self.state;
                }
                self.session.stop();
                self.enter(to, command);
                self.observers.publish(&PlayerEvent::ResetToIdle);
            }
            Transition::Stop => {
                self.enter(to, command);
            }
        }

        self.state
    }

    fn enter(&mut self, to: PlaybackState, command: Command) {
        let from = self.state;
        self.state = to;
        self.published.set(to);
        self.info(&format!("{:?} -> {:?} on {}", from, to, command));
        self.observers
            .publish(&PlayerEvent::StateChanged { from, to, command });
    }
}

impl ComponentLogger for Coordinator {
    fn log_context(&self) -> LogContext {
        LogContext::new("Coordinator", "audio_ctrl")
    }
}
