use std::io;

use thiserror::Error;

pub type PlayerResult<T> = Result<T, PlayerError>;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("audio already playing")]
    AlreadyPlaying,
    #[error("failed to open '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to skip {header_size} byte header of '{path}': {source}")]
    Seek {
        path: String,
        header_size: u64,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn reader worker: {0}")]
    Spawn(#[source] io::Error),
}

impl PlayerError {
    /// Short machine-readable tag, used in player events.
    pub fn kind(&self) -> &'static str {
        match self {
            PlayerError::AlreadyPlaying => "already_playing",
            PlayerError::Open { .. } => "open_failure",
            PlayerError::Seek { .. } => "seek_failure",
            PlayerError::Spawn(_) => "spawn_failure",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{message}")]
    Message { message: String },
}

impl ConfigError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}
