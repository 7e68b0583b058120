use std::io::{Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::ReaderConfig;
use crate::core::lock::lock_mutex;
use crate::core::{ComponentLogger, LogContext, ObserverSet, PlayerError, PlayerResult};
use crate::player::command::CommandSender;
use crate::producers::reader::ReaderWorker;
use crate::producers::wait::StopWait;
use crate::ring::StreamBuffer;
use crate::storage::{AudioStream, Storage};

/// State shared between the session (coordinator side) and its reader
/// worker. The two flags are the only memory touched by both threads outside
/// a queue.
pub struct SessionShared {
    pub(crate) playing: AtomicBool,
    pub(crate) stop_requested: AtomicBool,
    pub(crate) active_workers: AtomicUsize,
    /// Id of the last session whose worker reached end of stream.
    pub(crate) ended_session: AtomicU64,
    /// Wakes a worker sleeping in its buffer-full backoff.
    pub(crate) wake: StopWait,
    /// Signalled by the worker once teardown is complete.
    pub(crate) teardown: StopWait,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            active_workers: AtomicUsize::new(0),
            ended_session: AtomicU64::new(0),
            wake: StopWait::new(),
            teardown: StopWait::new(),
        }
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

/// One track being streamed from storage into the [`StreamBuffer`].
///
/// `start` opens the source and hands the stream to a freshly spawned
/// [`ReaderWorker`]; from then on the worker alone closes it. `stop` only
/// raises the cooperative stop flag, so `is_playing` turns false some time
/// after `stop` returns (at most one chunk read plus one buffer write
/// timeout later).
pub struct PlaybackSession {
    storage: Arc<dyn Storage>,
    buffer: Arc<StreamBuffer>,
    commands: CommandSender,
    observers: ObserverSet,
    reader: ReaderConfig,
    shared: Arc<SessionShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    source: Mutex<Option<String>>,
    session_counter: AtomicU64,
}

impl PlaybackSession {
    pub fn new(
        storage: Arc<dyn Storage>,
        buffer: Arc<StreamBuffer>,
        commands: CommandSender,
        observers: ObserverSet,
        reader: ReaderConfig,
    ) -> Self {
        Self {
            storage,
            buffer,
            commands,
            observers,
            reader,
            shared: Arc::new(SessionShared::new()),
            workers: Mutex::new(Vec::new()),
            source: Mutex::new(None),
            session_counter: AtomicU64::new(0),
        }
    }

    /// Starts streaming `path`. Fails with [`PlayerError::AlreadyPlaying`]
    /// while a session (or its teardown) is in progress; there is no
    /// implicit stop-then-restart. Returns the new session id.
    pub fn start(&self, path: &str) -> PlayerResult<u64> {
        if self
            .shared
            .playing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.warn("Audio already playing");
            return Err(PlayerError::AlreadyPlaying);
        }

        let stream = match self.open_source(path) {
            Ok(stream) => stream,
            Err(e) => {
                self.error(&e.to_string());
                self.release();
                return Err(e);
            }
        };

        let session_id = self.session_counter.fetch_add(1, Ordering::Relaxed) + 1;
        *lock_mutex(&self.source, "PlaybackSession::start") = Some(path.to_string());

        self.buffer.clear();
        self.shared.stop_requested.store(false, Ordering::Release);
        self.shared.active_workers.fetch_add(1, Ordering::AcqRel);
        self.trace_buffer(&self.buffer);

        let worker = ReaderWorker::new(
            session_id,
            path,
            stream,
            self.shared.clone(),
            self.buffer.clone(),
            self.commands.clone(),
            self.observers.clone(),
            &self.reader,
        );

        // A previous worker may still be handing EndOfStream to the
        // coordinator, which is usually the thread calling us. Only threads
        // that already returned are joined here.
        let mut workers = lock_mutex(&self.workers, "PlaybackSession::start");
        self.reap_finished(&mut workers);

        let spawned = std::thread::Builder::new()
            .name(format!("audio-reader-{}", session_id))
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                workers.push(handle);
                drop(workers);
                self.info(&format!("Audio playback started (session {})", session_id));
                Ok(session_id)
            }
            Err(e) => {
                // Dropping the unspawned worker already ran its teardown.
                self.error(&format!("failed to spawn reader worker: {}", e));
                Err(PlayerError::Spawn(e))
            }
        }
    }

    /// Requests the running worker to stop. No-op when not playing.
    pub fn stop(&self) {
        if !self.shared.playing.load(Ordering::Acquire) {
            return;
        }

        self.shared.stop_requested.store(true, Ordering::Release);
        self.shared.wake.notify_all();
        self.info("Audio playback stopped");
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    /// Waits up to `timeout` for the worker's teardown. Returns `true` once
    /// the session is no longer playing.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let shared = &self.shared;
        shared
            .teardown
            .wait_while(timeout, || shared.playing.load(Ordering::Acquire))
    }

    /// Joins every reader thread spawned so far, including one that is
    /// still delivering EndOfStream.
    pub fn join(&self) {
        let handles = std::mem::take(&mut *lock_mutex(&self.workers, "PlaybackSession::join"));
        for handle in handles {
            self.join_worker(handle);
        }
    }

    pub fn active_workers(&self) -> usize {
        self.shared.active_workers.load(Ordering::Acquire)
    }

    /// Path of the most recently started session.
    pub fn source(&self) -> Option<String> {
        lock_mutex(&self.source, "PlaybackSession::source").clone()
    }

    /// Id of the last session that reached end of stream or a read error
    /// (0 if none has).
    pub fn ended_session(&self) -> u64 {
        self.shared.ended_session.load(Ordering::Acquire)
    }

    /// Id of the most recently started session (0 before the first start).
    pub fn session_id(&self) -> u64 {
        self.session_counter.load(Ordering::Relaxed)
    }

    pub fn buffer(&self) -> &Arc<StreamBuffer> {
        &self.buffer
    }

    fn open_source(&self, path: &str) -> PlayerResult<Box<dyn AudioStream>> {
        let mut stream = self.storage.open(path).map_err(|source| PlayerError::Open {
            path: path.to_string(),
            source,
        })?;

        let header_size = self.reader.header_size;
        stream
            .seek(SeekFrom::Start(header_size))
            .map_err(|source| PlayerError::Seek {
                path: path.to_string(),
                header_size,
                source,
            })?;

        Ok(stream)
    }

    fn release(&self) {
        self.shared.playing.store(false, Ordering::Release);
        self.shared.teardown.notify_all();
    }

    fn reap_finished(&self, workers: &mut Vec<JoinHandle<()>>) {
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(workers)
            .into_iter()
            .partition(|handle| handle.is_finished());
        *workers = running;
        for handle in finished {
            self.join_worker(handle);
        }
    }

    fn join_worker(&self, handle: JoinHandle<()>) {
        if let Err(e) = handle.join() {
            self.error(&format!("reader worker panicked: {:?}", e));
        }
    }
}

impl ComponentLogger for PlaybackSession {
    fn log_context(&self) -> LogContext {
        let source = lock_mutex(&self.source, "PlaybackSession::log_context")
            .clone()
            .unwrap_or_else(|| "-".to_string());
        LogContext::new("Session", &source)
    }
}
