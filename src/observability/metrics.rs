//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count requests and observe their latency by method, route and status
//! - Count errors by category
//! - Render everything, plus process gauges, in the Prometheus text format
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, path, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `frontend_errors_total` (counter): errors by type
//! - `process_uptime_seconds`, `process_start_time_seconds`,
//!   `process_resident_memory_bytes`, `process_cpu_seconds_total`,
//!   `process_open_fds` (gauges): refreshed on export, the last three only
//!   where `/proc` is available
//!
//! # Design Decisions
//! - The recorder is owned by the service, not installed globally, so each
//!   server instance (and each test) has isolated state
//! - Low-overhead metric updates (atomic operations inside the recorder)
//! - Each distinct label combination keeps its own series for the process
//!   lifetime; callers must only pass bounded label values

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const ERRORS_TOTAL: &str = "frontend_errors_total";
pub const PROCESS_UPTIME_SECONDS: &str = "process_uptime_seconds";
pub const PROCESS_START_TIME_SECONDS: &str = "process_start_time_seconds";
pub const PROCESS_RESIDENT_MEMORY_BYTES: &str = "process_resident_memory_bytes";
pub const PROCESS_CPU_SECONDS_TOTAL: &str = "process_cpu_seconds_total";
pub const PROCESS_OPEN_FDS: &str = "process_open_fds";

/// Kernel clock ticks per second used by `/proc/self/stat`.
const CLOCK_TICKS_PER_SECOND: f64 = 100.0;

/// Histogram buckets for request latency, in seconds. `+Inf` is implicit.
pub const DURATION_BUCKETS: [f64; 6] = [0.1, 0.5, 1.0, 2.0, 5.0, 10.0];

/// Request and error metrics for one service instance.
pub struct Metrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    started_at: Instant,
    start_time: f64,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new() -> Result<Self, BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
                &DURATION_BUCKETS,
            )?
            .build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests");
            describe_histogram!(
                HTTP_REQUEST_DURATION_SECONDS,
                Unit::Seconds,
                "HTTP request duration in seconds"
            );
            describe_counter!(ERRORS_TOTAL, "Total number of frontend errors");
            describe_gauge!(PROCESS_UPTIME_SECONDS, Unit::Seconds, "Process uptime in seconds");
            describe_gauge!(
                PROCESS_START_TIME_SECONDS,
                Unit::Seconds,
                "Start time of the process since unix epoch in seconds"
            );
            describe_gauge!(
                PROCESS_RESIDENT_MEMORY_BYTES,
                Unit::Bytes,
                "Resident memory size in bytes"
            );
            describe_gauge!(
                PROCESS_CPU_SECONDS_TOTAL,
                Unit::Seconds,
                "Total user and system CPU time spent in seconds"
            );
            describe_gauge!(PROCESS_OPEN_FDS, "Number of open file descriptors");
        });

        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();

        Ok(Self {
            recorder,
            handle,
            started_at: Instant::now(),
            start_time,
        })
    }

    /// Count one completed request and observe its duration.
    pub fn record_request(&self, method: &str, path: &str, status: u16, duration_seconds: f64) {
        let labels = [
            ("method", method.to_string()),
            ("path", path.to_string()),
            ("status", status.to_string()),
        ];
        metrics::with_local_recorder(&self.recorder, || {
            counter!(HTTP_REQUESTS_TOTAL, &labels).increment(1);
            histogram!(HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_seconds);
        });
    }

    /// Count one error under a caller-supplied category.
    pub fn increment_error(&self, error_type: &str) {
        let error_type = error_type.to_string();
        metrics::with_local_recorder(&self.recorder, || {
            counter!(ERRORS_TOTAL, "type" => error_type).increment(1);
        });
    }

    /// Render all series in the Prometheus text exposition format.
    ///
    /// Safe to call while other tasks are recording.
    pub fn export(&self) -> String {
        metrics::with_local_recorder(&self.recorder, || {
            gauge!(PROCESS_UPTIME_SECONDS).set(self.started_at.elapsed().as_secs_f64());
            gauge!(PROCESS_START_TIME_SECONDS).set(self.start_time);
            if let Some(rss) = resident_memory_bytes() {
                gauge!(PROCESS_RESIDENT_MEMORY_BYTES).set(rss as f64);
            }
            if let Some(cpu) = cpu_seconds() {
                gauge!(PROCESS_CPU_SECONDS_TOTAL).set(cpu);
            }
            if let Some(fds) = open_fds() {
                gauge!(PROCESS_OPEN_FDS).set(fds as f64);
            }
        });
        self.handle.render()
    }
}

/// Resident set size from `/proc/self/status`, where available.
fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

/// User plus system CPU time from `/proc/self/stat`.
fn cpu_seconds() -> Option<f64> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    parse_cpu_seconds(&stat)
}

fn parse_cpu_seconds(stat: &str) -> Option<f64> {
    // The command name may contain spaces; fields restart after its ')'.
    let (_, rest) = stat.rsplit_once(')')?;
    let mut fields = rest.split_whitespace().skip(11);
    let utime: u64 = fields.next()?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some((utime + stime) as f64 / CLOCK_TICKS_PER_SECOND)
}

fn open_fds() -> Option<usize> {
    Some(std::fs::read_dir("/proc/self/fd").ok()?.count())
}
