// src/producers/mod.rs
pub mod reader;
pub mod wait;

pub use reader::ReaderWorker;
pub use wait::StopWait;
