//! Metrics module
//!
//! Provides Prometheus metrics for chunk and file uploads.
//!
//! Recording is on by default; [`set_enabled`] turns every `record_*`
//! function into a no-op.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};
use std::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Switch metric recording on or off process-wide
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

lazy_static! {
    // Chunk metrics
    pub static ref CHUNKS_TOTAL: CounterVec = register_counter_vec!(
        "resumable_chunks_total",
        "Total number of chunk uploads",
        &["status"]
    ).unwrap();

    pub static ref CHUNK_BYTES_TOTAL: Counter = register_counter!(
        "resumable_chunk_bytes_total",
        "Total bytes uploaded in chunks"
    ).unwrap();

    pub static ref CHUNK_DURATION: Histogram = register_histogram!(
        "resumable_chunk_duration_seconds",
        "Chunk upload duration in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // File metrics
    pub static ref FILES_TOTAL: CounterVec = register_counter_vec!(
        "resumable_files_total",
        "Total number of file uploads",
        &["status"]
    ).unwrap();

    pub static ref FILE_DURATION: HistogramVec = register_histogram_vec!(
        "resumable_file_duration_seconds",
        "File upload duration in seconds, chunks and finalize",
        &["status"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0, 300.0]
    ).unwrap();

    pub static ref FILE_CHUNKS: Histogram = register_histogram!(
        "resumable_file_chunks",
        "Number of chunks per uploaded file",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    ).unwrap();

    pub static ref FINALIZE_DURATION: Histogram = register_histogram!(
        "resumable_finalize_duration_seconds",
        "Finalize call duration in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "resumable_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a successful chunk upload
pub fn record_chunk_success(bytes: u64, duration_secs: f64) {
    if !is_enabled() {
        return;
    }
    CHUNKS_TOTAL.with_label_values(&["success"]).inc();
    CHUNK_BYTES_TOTAL.inc_by(bytes as f64);
    CHUNK_DURATION.observe(duration_secs);
}

/// Record a rejected chunk upload
pub fn record_chunk_failure() {
    if !is_enabled() {
        return;
    }
    CHUNKS_TOTAL.with_label_values(&["failure"]).inc();
}

/// Record a finalized file
pub fn record_file_success(chunks: u32, duration_secs: f64) {
    if !is_enabled() {
        return;
    }
    FILES_TOTAL.with_label_values(&["success"]).inc();
    FILE_DURATION
        .with_label_values(&["success"])
        .observe(duration_secs);
    FILE_CHUNKS.observe(chunks as f64);
}

/// Record a failed file upload
pub fn record_file_failure(duration_secs: f64) {
    if !is_enabled() {
        return;
    }
    FILES_TOTAL.with_label_values(&["failure"]).inc();
    FILE_DURATION
        .with_label_values(&["failure"])
        .observe(duration_secs);
}

/// Record finalize duration
pub fn record_finalize_duration(duration_secs: f64) {
    if !is_enabled() {
        return;
    }
    FINALIZE_DURATION.observe(duration_secs);
}

/// Record an error
pub fn record_error(error_type: &str) {
    if !is_enabled() {
        return;
    }
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_chunk_success() {
        record_chunk_success(1024, 0.01);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_file_outcomes() {
        record_file_success(10, 1.5);
        record_file_failure(0.2);
        // Just verify it doesn't panic
    }

    #[test]
    #[serial_test::serial]
    fn test_gather_text_contains_metrics() {
        record_error("invalid_response");
        let text = gather_text();
        assert!(text.contains("resumable_errors_total"));
    }

    #[test]
    #[serial_test::serial]
    fn test_disabled_recording_is_noop() {
        let before = ERRORS_TOTAL.with_label_values(&["configuration"]).get();

        set_enabled(false);
        record_error("configuration");
        let while_disabled = ERRORS_TOTAL.with_label_values(&["configuration"]).get();
        set_enabled(true);
        record_error("configuration");

        assert_eq!(while_disabled, before);
        assert_eq!(
            ERRORS_TOTAL.with_label_values(&["configuration"]).get(),
            before + 1.0
        );
    }
}
