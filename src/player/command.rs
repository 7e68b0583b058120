use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::channel::{
    self, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};
use serde::{Deserialize, Serialize};

use crate::config::{CommandConfig, SendPolicyKind};

/// Playback command delivered to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Play,
    Pause,
    Stop,
    EndOfStream,
    BluetoothConnected,
    BluetoothDisconnected,
    None,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::EndOfStream => "eos",
            Command::BluetoothConnected => "bt-up",
            Command::BluetoothDisconnected => "bt-down",
            Command::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "play" => Ok(Command::Play),
            "pause" => Ok(Command::Pause),
            "stop" => Ok(Command::Stop),
            "eos" | "end" => Ok(Command::EndOfStream),
            "bt-up" | "bt_connected" => Ok(Command::BluetoothConnected),
            "bt-down" | "bt_disconnected" => Ok(Command::BluetoothDisconnected),
            "none" => Ok(Command::None),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

/// What `CommandSender::send` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPolicy {
    /// Drop the command and count it.
    Drop,
    /// Wait up to the given time for room, then drop.
    Block(Duration),
}

impl SendPolicy {
    pub fn from_config(config: &CommandConfig) -> Self {
        match config.send_policy {
            SendPolicyKind::Drop => SendPolicy::Drop,
            SendPolicyKind::Block => SendPolicy::Block(config.send_timeout()),
        }
    }
}

/// Producer handle of the bounded command queue. Cheap to clone; every UI or
/// bridge thread gets its own.
#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<Command>,
    policy: SendPolicy,
    dropped: Arc<AtomicU64>,
}

pub struct CommandReceiver {
    rx: Receiver<Command>,
}

/// Receive outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    Command(Command),
    Timeout,
    Disconnected,
}

pub fn command_channel(depth: usize, policy: SendPolicy) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = channel::bounded(depth.max(1));
    (
        CommandSender {
            tx,
            policy,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        CommandReceiver { rx },
    )
}

impl CommandSender {
    /// Queues `command` according to the sender's policy. Returns `false` if
    /// it was dropped (queue full or coordinator gone).
    pub fn send(&self, command: Command) -> bool {
        match self.policy {
            SendPolicy::Drop => match self.tx.try_send(command) {
                Ok(()) => true,
                Err(TrySendError::Full(cmd)) => self.record_drop(cmd, "queue full"),
                Err(TrySendError::Disconnected(cmd)) => self.record_drop(cmd, "coordinator gone"),
            },
            SendPolicy::Block(timeout) => self.send_timeout(command, timeout),
        }
    }

    pub fn send_timeout(&self, command: Command, timeout: Duration) -> bool {
        match self.tx.send_timeout(command, timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(cmd)) => self.record_drop(cmd, "queue full"),
            Err(SendTimeoutError::Disconnected(cmd)) => self.record_drop(cmd, "coordinator gone"),
        }
    }

    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    /// Commands dropped by this queue so far, across all clones.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_drop(&self, command: Command, reason: &str) -> bool {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        log::warn!("command {} dropped ({}), {} dropped so far", command, reason, total);
        false
    }
}

impl CommandReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> Received {
        match self.rx.recv_timeout(timeout) {
            Ok(cmd) => Received::Command(cmd),
            Err(RecvTimeoutError::Timeout) => Received::Timeout,
            Err(RecvTimeoutError::Disconnected) => Received::Disconnected,
        }
    }

    pub fn try_recv(&self) -> Option<Command> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = command_channel(8, SendPolicy::Drop);
        assert!(tx.send(Command::Play));
        assert!(tx.send(Command::Pause));
        assert!(tx.send(Command::Stop));

        assert_eq!(rx.try_recv(), Some(Command::Play));
        assert_eq!(rx.try_recv(), Some(Command::Pause));
        assert_eq!(rx.try_recv(), Some(Command::Stop));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn test_drop_policy_drops_when_full() {
        let (tx, rx) = command_channel(2, SendPolicy::Drop);
        assert!(tx.send(Command::Play));
        assert!(tx.send(Command::Pause));
        assert!(!tx.send(Command::Stop));
        assert_eq!(tx.dropped(), 1);
        assert_eq!(tx.pending(), 2);

        assert_eq!(rx.try_recv(), Some(Command::Play));
        assert!(tx.send(Command::Stop));
    }

    #[test]
    fn test_block_policy_waits_for_room() {
        let (tx, rx) = command_channel(1, SendPolicy::Block(Duration::from_secs(2)));
        assert!(tx.send(Command::Play));

        let drainer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let first = rx.recv_timeout(Duration::from_secs(1));
            let second = rx.recv_timeout(Duration::from_secs(1));
            (first, second)
        });

        assert!(tx.send(Command::Pause));
        let (first, second) = drainer.join().unwrap();
        assert_eq!(first, Received::Command(Command::Play));
        assert_eq!(second, Received::Command(Command::Pause));
    }

    #[test]
    fn test_block_policy_gives_up_after_timeout() {
        let (tx, _rx) = command_channel(1, SendPolicy::Block(Duration::from_millis(10)));
        assert!(tx.send(Command::Play));
        assert!(!tx.send(Command::Play));
        assert_eq!(tx.dropped(), 1);
    }

    #[test]
    fn test_disconnected_receiver() {
        let (tx, rx) = command_channel(4, SendPolicy::Drop);
        drop(rx);
        assert!(!tx.send(Command::Play));

        let (tx, rx) = command_channel(4, SendPolicy::Drop);
        drop(tx);
        assert_eq!(rx.recv_timeout(Duration::from_millis(5)), Received::Disconnected);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("PLAY".parse::<Command>(), Ok(Command::Play));
        assert_eq!(" bt-up ".parse::<Command>(), Ok(Command::BluetoothConnected));
        assert!("rewind".parse::<Command>().is_err());
        assert_eq!(Command::EndOfStream.to_string(), "eos");
    }
}
