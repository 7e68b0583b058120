// src/lib.rs
pub mod config;
pub mod consumers;
pub mod core;
pub mod player;
pub mod producers;
pub mod ring;
pub mod storage;
pub mod testing;

pub use crate::config::Config;
pub use crate::core::{ComponentLogger, LogContext, PlayerError, PlayerEvent, PlayerObserver};
pub use crate::player::{AudioPlayer, Command, CommandSender, PlaybackSession, PlaybackState};
pub use crate::ring::StreamBuffer;
pub use crate::storage::{FsStorage, Storage};
