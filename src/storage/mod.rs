//! Storage seam used by the playback session.
//!
//! A stream is closed by dropping it, so whoever owns the box owns the open
//! handle.

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::PathBuf;

pub trait AudioStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> AudioStream for T {}

pub trait Storage: Send + Sync {
    fn open(&self, path: &str) -> io::Result<Box<dyn AudioStream>>;
}

/// Opens tracks from the local filesystem, optionally relative to a mount
/// point (e.g. an SD card mounted somewhere other than `/sdcard`).
#[derive(Debug, Clone, Default)]
pub struct FsStorage {
    root: Option<PathBuf>,
}

impl FsStorage {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.trim_start_matches('/')),
            None => PathBuf::from(path),
        }
    }
}

impl Storage for FsStorage {
    fn open(&self, path: &str) -> io::Result<Box<dyn AudioStream>> {
        let resolved = self.resolve(path);
        log::debug!("FsStorage: opening {}", resolved.display());
        let file = File::open(&resolved)?;
        Ok(Box::new(file))
    }
}
