// src/core/events.rs
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::timestamp::utc_ns_now;
use crate::player::{Command, PlaybackState};

/// Notifications published by the player to its registered observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
        command: Command,
    },
    /// End of stream was processed; front-ends should reset their
    /// play/pause indicator.
    ResetToIdle,
    StartFailed {
        path: String,
        reason: String,
    },
    ConsumerStalled {
        consecutive_full: u32,
    },
    EndOfStream {
        session: u64,
        bytes_streamed: u64,
        read_error: bool,
    },
}

impl PlayerEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Callback interface registered once at player init.
///
/// Handlers run on the thread that produced the event (coordinator or reader
/// worker) and must not block.
pub trait PlayerObserver: Send + Sync {
    fn name(&self) -> &str;
    fn on_event(&self, event: &PlayerEvent) -> Result<()>;
}

/// Adapter so closures can be registered as observers.
pub struct FnObserver<F> {
    name: String,
    handler: F,
}

impl<F> FnObserver<F>
where
    F: Fn(&PlayerEvent) + Send + Sync,
{
    pub fn new(name: &str, handler: F) -> Self {
        Self {
            name: name.to_string(),
            handler,
        }
    }
}

impl<F> PlayerObserver for FnObserver<F>
where
    F: Fn(&PlayerEvent) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: &PlayerEvent) -> Result<()> {
        (self.handler)(event);
        Ok(())
    }
}

/// Fixed set of observers. Built before the player starts, immutable after.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn PlayerObserver>>,
}

impl ObserverSet {
    pub fn new(observers: Vec<Arc<dyn PlayerObserver>>) -> Self {
        Self { observers }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn publish(&self, event: &PlayerEvent) {
        log::debug!("[event][{}] {}", utc_ns_now(), event.to_json());

        for observer in &self.observers {
            if let Err(e) = observer.on_event(event) {
                log::error!("observer '{}' failed on {:?}: {}", observer.name(), event, e);
            }
        }
    }
}
