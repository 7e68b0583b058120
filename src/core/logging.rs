// src/core/logging.rs
use std::sync::atomic::{AtomicU64, Ordering};

use super::timestamp::utc_ns_now;
use crate::ring::StreamBuffer;

// Global sequence number for correlating lines across threads
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub session_id: Option<u64>,
    pub sequence: u64,
    pub timestamp_ns: u64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            session_id: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            timestamp_ns: utc_ns_now(),
        }
    }

    pub fn with_session(mut self, session_id: u64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn format(&self, level: &str, message: &str) -> String {
        let session_info = match self.session_id {
            Some(id) => format!(" session={}", id),
            None => String::new(),
        };

        format!(
            "[{}][seq={:06}][{}:{}{}] {}",
            level, self.sequence, self.component, self.instance_id, session_info, message
        )
    }
}

/// Shared logging helper: every component prefixes its lines the same way.
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        let ctx = self.log_context();
        log::debug!("{}", ctx.format("DEBUG", message));
    }

    fn info(&self, message: &str) {
        let ctx = self.log_context();
        log::info!("{}", ctx.format("INFO", message));
    }

    fn warn(&self, message: &str) {
        let ctx = self.log_context();
        log::warn!("{}", ctx.format("WARN", message));
    }

    fn error(&self, message: &str) {
        let ctx = self.log_context();
        log::error!("{}", ctx.format("ERROR", message));
    }

    fn trace_buffer(&self, buffer: &StreamBuffer) {
        let stats = buffer.stats();
        let ctx = self.log_context();

        let buffer_info = format!(
            "stream buffer fill={}/{} written={} read={} full_events={}",
            stats.fill, stats.capacity, stats.bytes_written, stats.bytes_read, stats.full_events
        );

        log::info!("{}", ctx.format("BUFFER", &buffer_info));
    }
}
