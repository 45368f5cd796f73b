//! Observability and Metrics
//!
//! Counters for the wire layer: frames parsed, framing rejections, documents
//! extracted, replies built, identifiers minted.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for wire operations
#[derive(Debug)]
pub struct WireMetrics {
    /// Frames a cursor was opened on
    pub frames_parsed: AtomicU64,
    /// Requests rejected for framing errors
    pub framing_errors: AtomicU64,
    /// Embedded documents extracted
    pub documents_read: AtomicU64,
    /// Replies completed and handed off
    pub replies_built: AtomicU64,
    /// Total bytes of completed replies
    pub reply_bytes: AtomicU64,
    /// Object ids created
    pub ids_minted: AtomicU64,
    /// Successful re-identifications
    pub reidentifications: AtomicU64,
    start_time: Instant,
}

impl WireMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            frames_parsed: AtomicU64::new(0),
            framing_errors: AtomicU64::new(0),
            documents_read: AtomicU64::new(0),
            replies_built: AtomicU64::new(0),
            reply_bytes: AtomicU64::new(0),
            ids_minted: AtomicU64::new(0),
            reidentifications: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn frame_parsed(&self) {
        self.frames_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn document_read(&self) {
        self.documents_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed reply of `byte_count` bytes
    pub fn reply_built(&self, byte_count: u64) {
        self.replies_built.fetch_add(1, Ordering::Relaxed);
        self.reply_bytes.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn id_minted(&self) {
        self.ids_minted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reidentified(&self) {
        self.reidentifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_parsed: self.frames_parsed.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            documents_read: self.documents_read.load(Ordering::Relaxed),
            replies_built: self.replies_built.load(Ordering::Relaxed),
            reply_bytes: self.reply_bytes.load(Ordering::Relaxed),
            ids_minted: self.ids_minted.load(Ordering::Relaxed),
            reidentifications: self.reidentifications.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            frames_parsed = snapshot.frames_parsed,
            framing_errors = snapshot.framing_errors,
            documents_read = snapshot.documents_read,
            replies_built = snapshot.replies_built,
            reply_bytes = snapshot.reply_bytes,
            ids_minted = snapshot.ids_minted,
            reidentifications = snapshot.reidentifications,
            uptime_seconds = snapshot.uptime_seconds,
            "Wire metrics snapshot"
        );
    }
}

impl Default for WireMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub frames_parsed: u64,
    pub framing_errors: u64,
    pub documents_read: u64,
    pub replies_built: u64,
    pub reply_bytes: u64,
    pub ids_minted: u64,
    pub reidentifications: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<WireMetrics> = once_cell::sync::Lazy::new(WireMetrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static WireMetrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = WireMetrics::new();
        metrics.frame_parsed();
        metrics.framing_error();
        metrics.reply_built(36);
        metrics.reply_built(64);

        let snap = metrics.snapshot();
        assert_eq!(snap.frames_parsed, 1);
        assert_eq!(snap.framing_errors, 1);
        assert_eq!(snap.replies_built, 2);
        assert_eq!(snap.reply_bytes, 100);
        assert_eq!(snap.ids_minted, 0);
    }
}
