//! Test doubles shared by unit and integration tests.
pub mod mocks;

pub use mocks::{MemoryStorage, RecordingObserver, wait_until, wav_bytes};
