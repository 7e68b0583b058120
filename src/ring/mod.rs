// src/ring/mod.rs
pub mod stream_buffer;

pub use stream_buffer::StreamBuffer;
pub use stream_buffer::StreamBufferStats;
