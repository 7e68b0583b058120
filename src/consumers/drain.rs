use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};

use super::{Consumer, ConsumerStatus};
use crate::config::OutputConfig;
use crate::producers::wait::StopWait;
use crate::ring::StreamBuffer;

const TICK: Duration = Duration::from_millis(20);

type PcmSink = Box<dyn FnMut(&[u8]) + Send>;

/// Drains the stream buffer at the PCM byte rate of the output, the way an
/// I2S or A2DP callback would. Drained bytes go to an optional sink.
pub struct OutputDrain {
    name: String,
    bytes_per_tick: usize,
    running: Arc<AtomicBool>,
    bytes_consumed: Arc<AtomicU64>,
    underruns: Arc<AtomicU64>,
    input_buffer: Option<Arc<StreamBuffer>>,
    sink: Option<PcmSink>,
    stop_wait: Arc<StopWait>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl OutputDrain {
    pub fn new(name: &str, output: &OutputConfig) -> Self {
        let per_tick = output.bytes_per_second() * TICK.as_millis() as usize / 1000;
        Self::with_rate(name, per_tick)
    }

    /// Drain `bytes_per_tick` every 20 ms.
    pub fn with_rate(name: &str, bytes_per_tick: usize) -> Self {
        Self {
            name: name.to_string(),
            bytes_per_tick: bytes_per_tick.max(1),
            running: Arc::new(AtomicBool::new(false)),
            bytes_consumed: Arc::new(AtomicU64::new(0)),
            underruns: Arc::new(AtomicU64::new(0)),
            input_buffer: None,
            sink: None,
            stop_wait: Arc::new(StopWait::new()),
            thread_handle: None,
        }
    }

    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.sink = Some(Box::new(sink));
        self
    }
}

impl Consumer for OutputDrain {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let buffer = self
            .input_buffer
            .clone()
            .ok_or_else(|| anyhow!("OutputDrain '{}' missing input buffer", self.name))?;

        log::info!(
            "OutputDrain '{}' starting ({} bytes per {:?})",
            self.name,
            self.bytes_per_tick,
            TICK
        );
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let bytes_consumed = self.bytes_consumed.clone();
        let underruns = self.underruns.clone();
        let stop_wait = self.stop_wait.clone();
        let mut sink = self.sink.take();
        let mut scratch = vec![0u8; self.bytes_per_tick];

        let handle = std::thread::Builder::new()
            .name(format!("drain-{}", self.name))
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    let n = buffer.read_timeout(&mut scratch, TICK);
                    if n == 0 {
                        underruns.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }

                    bytes_consumed.fetch_add(n as u64, Ordering::Relaxed);
                    if let Some(sink) = sink.as_mut() {
                        sink(&scratch[..n]);
                    }

                    stop_wait.wait_while(TICK, || running.load(Ordering::Relaxed));
                }
            })?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        log::info!("OutputDrain '{}' stopping...", self.name);
        self.running.store(false, Ordering::SeqCst);
        self.stop_wait.notify_all();

        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                log::error!("Failed to join drain thread: {:?}", e);
            }
        }

        Ok(())
    }

    fn status(&self) -> ConsumerStatus {
        ConsumerStatus {
            running: self.running.load(Ordering::Relaxed),
            connected: self.input_buffer.is_some(),
            bytes_consumed: self.bytes_consumed.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }

    fn attach_input_buffer(&mut self, buffer: Arc<StreamBuffer>) {
        self.input_buffer = Some(buffer);
    }
}

impl Drop for OutputDrain {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            let _ = self.stop();
        }
    }
}
