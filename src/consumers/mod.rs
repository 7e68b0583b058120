// src/consumers/mod.rs
use std::sync::Arc;

use anyhow::Result;

use crate::ring::StreamBuffer;

pub mod drain;

pub use drain::OutputDrain;

/// Reader side of the stream buffer (the audio output).
pub trait Consumer: Send {
    fn name(&self) -> &str;
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn status(&self) -> ConsumerStatus;
    fn attach_input_buffer(&mut self, buffer: Arc<StreamBuffer>);
}

#[derive(Debug, Clone)]
pub struct ConsumerStatus {
    pub running: bool,
    pub connected: bool,
    pub bytes_consumed: u64,
    /// Ticks where the buffer had nothing to give.
    pub underruns: u64,
}
