use std::io::{self, Read};
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::config::ReaderConfig;
use crate::core::{ComponentLogger, LogContext, ObserverSet, PlayerEvent};
use crate::player::command::{Command, CommandSender};
use crate::player::session::SessionShared;
use crate::ring::StreamBuffer;
use crate::storage::AudioStream;

/// End-of-stream must reach the coordinator even when UI events fill the
/// queue, so the worker waits for room instead of dropping it.
const EOS_SEND_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum Exit {
    Stopped,
    EndOfSource,
    ReadFailure(io::Error),
}

/// Pulls fixed-size chunks from the open stream into the stream buffer on its
/// own thread.
///
/// The worker owns the stream. Dropping the worker is its teardown: the
/// stream is closed, the stop flag reset and `playing` cleared, in that
/// order. This also runs if the loop panics.
pub struct ReaderWorker {
    session_id: u64,
    path: String,
    stream: Option<Box<dyn AudioStream>>,
    shared: Arc<SessionShared>,
    buffer: Arc<StreamBuffer>,
    commands: CommandSender,
    observers: ObserverSet,
    chunk_size: usize,
    write_timeout: Duration,
    backoff: Duration,
    stall_warn_after: u32,
}

impl ReaderWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: u64,
        path: &str,
        stream: Box<dyn AudioStream>,
        shared: Arc<SessionShared>,
        buffer: Arc<StreamBuffer>,
        commands: CommandSender,
        observers: ObserverSet,
        config: &ReaderConfig,
    ) -> Self {
        Self {
            session_id,
            path: path.to_string(),
            stream: Some(stream),
            shared,
            buffer,
            commands,
            observers,
            chunk_size: config.chunk_size.max(1),
            write_timeout: config.write_timeout(),
            backoff: config.backoff(),
            stall_warn_after: config.stall_warn_after.max(1),
        }
    }

    pub fn run(mut self) {
        self.info("Audio reader task started");

        let (exit, streamed) = self.stream_loop();
        let session_id = self.session_id;
        let commands = self.commands.clone();
        let observers = self.observers.clone();

        let read_error = match &exit {
            Exit::Stopped => {
                self.info(&format!("stop requested after {} bytes", streamed));
                drop(self);
                return;
            }
            Exit::EndOfSource => {
                self.info(&format!("End of WAV file ({} bytes streamed)", streamed));
                false
            }
            Exit::ReadFailure(e) => {
                self.error(&format!("storage read failed after {} bytes: {}", streamed, e));
                true
            }
        };

        self.shared
            .ended_session
            .store(session_id, Ordering::Release);

        // Tear down first so the coordinator never sees EndOfStream for a
        // session that still holds its stream.
        drop(self);

        if !commands.send_timeout(Command::EndOfStream, EOS_SEND_TIMEOUT) {
            log::error!("session {}: EndOfStream could not be delivered", session_id);
        }
        observers.publish(&PlayerEvent::EndOfStream {
            session: session_id,
            bytes_streamed: streamed,
            read_error,
        });
    }

    fn stream_loop(&mut self) -> (Exit, u64) {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut pending: Range<usize> = 0..0;
        let mut consecutive_full: u32 = 0;
        let mut streamed: u64 = 0;

        while !self.shared.stop_requested() {
            if pending.is_empty() {
                match self.read_chunk(&mut chunk) {
                    Ok(0) => return (Exit::EndOfSource, streamed),
                    Ok(n) => pending = 0..n,
                    Err(e) => return (Exit::ReadFailure(e), streamed),
                }
            }

            let written = self.buffer.write(&chunk[pending.clone()], self.write_timeout);
            pending.start += written;
            streamed += written as u64;

            if pending.is_empty() {
                consecutive_full = 0;
                continue;
            }

            // Unwritten bytes stay pending and are retried, never skipped.
            consecutive_full += 1;
            self.debug(&format!(
                "Ring buffer full ({} bytes pending, attempt {})",
                pending.len(),
                consecutive_full
            ));
            if consecutive_full % self.stall_warn_after == 0 {
                self.warn(&format!(
                    "output consumer stalled: buffer full for {} consecutive writes",
                    consecutive_full
                ));
                self.observers
                    .publish(&PlayerEvent::ConsumerStalled { consecutive_full });
            }

            let shared = &self.shared;
            shared.wake.wait_while(self.backoff, || !shared.stop_requested());
        }

        (Exit::Stopped, streamed)
    }

    fn read_chunk(&mut self, chunk: &mut [u8]) -> io::Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };

        loop {
            match stream.read(chunk) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }
}

impl Drop for ReaderWorker {
    fn drop(&mut self) {
        self.info("Audio reader task exiting");

        drop(self.stream.take());
        self.shared.stop_requested.store(false, Ordering::Release);
        self.shared.active_workers.fetch_sub(1, Ordering::AcqRel);
        self.shared.playing.store(false, Ordering::Release);
        self.shared.teardown.notify_all();
    }
}

impl ComponentLogger for ReaderWorker {
    fn log_context(&self) -> LogContext {
        LogContext::new("Reader", &self.path).with_session(self.session_id)
    }
}
