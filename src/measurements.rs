use crate::units::SizeUnit;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Rate in "Mbps" computed from the unit-converted transfer size.
///
/// This is `to_unit(bytes) * 8 / seconds`, so the scale of the result follows
/// the display unit: with `MB` it is true megabits per second, with `KB` it is
/// kilobits per second. The server summary and the fixed byte count summary
/// both report this value.
///
/// Returns 0.0 when `elapsed` is zero.
///
/// # Examples
///
/// ```
/// use simpleperf::measurements::unit_rate_mbps;
/// use simpleperf::SizeUnit;
/// use std::time::Duration;
///
/// let rate = unit_rate_mbps(2_000_000, SizeUnit::MB, Duration::from_secs(2));
/// assert_eq!(rate, 8.0);
/// ```
pub fn unit_rate_mbps(bytes: u64, unit: SizeUnit, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        unit.to_unit(bytes) * 8.0 / secs
    } else {
        0.0
    }
}

/// Rate in megabits per second, independent of the display unit.
///
/// Used for interval windows (with the nominal interval length) and for the
/// interval-mode aggregate (with the measured elapsed time).
///
/// Returns 0.0 when `elapsed` is zero.
pub fn megabit_rate(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 * 8.0) / (secs * 1_000_000.0)
    } else {
        0.0
    }
}

/// Formats a window boundary in seconds: `5` for whole seconds, `0.25` otherwise.
pub fn format_secs(d: Duration) -> String {
    format!("{}", d.as_secs_f64())
}

/// Label for an interval window: `"<start>-<end>"`.
pub fn window_label(start: Duration, end: Duration) -> String {
    format!("{}-{}", format_secs(start), format_secs(end))
}

/// Which sending mode produced a stream result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamMode {
    /// Fixed byte count (`-n`)
    ByteCount,
    /// Consecutive interval windows plus an aggregate
    Interval,
    /// Interval unset: iteration-based windows, no aggregate
    SingleWindow,
}

/// Statistics for one reporting window, or for a whole stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalSample {
    pub label: String,
    pub start: Duration,
    pub end: Duration,
    pub bytes: u64,
    /// `bytes` converted to `unit`
    pub transfer: f64,
    pub unit: SizeUnit,
    pub rate_mbps: f64,
}

impl IntervalSample {
    pub fn new(
        label: String,
        start: Duration,
        end: Duration,
        bytes: u64,
        unit: SizeUnit,
        rate_mbps: f64,
    ) -> Self {
        Self {
            label,
            start,
            end,
            bytes,
            transfer: unit.to_unit(bytes),
            unit,
            rate_mbps,
        }
    }
}

/// Result of one client stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamResult {
    pub stream_id: usize,
    /// Local endpoint of the connection; identifies the stream in reports
    pub local_addr: SocketAddr,
    pub mode: StreamMode,
    pub bytes_sent: u64,
    pub duration: Duration,
    pub intervals: Vec<IntervalSample>,
    /// Whole-run line; absent in [`StreamMode::SingleWindow`]
    pub summary: Option<IntervalSample>,
}

/// Final statistics the server computes for one accepted connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub peer: SocketAddr,
    /// `"0.0 - <whole seconds>"`
    pub label: String,
    pub bytes_received: u64,
    pub duration: Duration,
    pub transfer: f64,
    pub unit: SizeUnit,
    pub rate_mbps: f64,
    /// Whether the stream ended on a `BYE` rather than a close
    pub sentinel_seen: bool,
}

impl SessionSummary {
    pub fn new(
        peer: SocketAddr,
        bytes_received: u64,
        duration: Duration,
        unit: SizeUnit,
        sentinel_seen: bool,
    ) -> Self {
        Self {
            peer,
            label: format!("0.0 - {}", duration.as_secs()),
            bytes_received,
            duration,
            transfer: unit.to_unit(bytes_received),
            unit,
            rate_mbps: unit_rate_mbps(bytes_received, unit, duration),
            sentinel_seen,
        }
    }
}
