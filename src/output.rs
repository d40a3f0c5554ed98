//! Human-readable report lines.
//!
//! Every function returns the formatted line; callers decide whether to print
//! it (text mode) or skip it (JSON mode).

use crate::measurements::{IntervalSample, SessionSummary};
use std::net::SocketAddr;

/// Horizontal rule used between report sections.
pub fn separator() -> String {
    "-".repeat(60)
}

pub fn server_listening(port: u16) -> String {
    format!("A simpleperf server is listening on port {}", port)
}

pub fn server_client_connected(peer: SocketAddr) -> String {
    format!("A simpleperf client with {} is connected.", peer)
}

pub fn server_header() -> String {
    format!("{:<21} {:<12} {:>10} {:<2} {:>10}", "ID", "Interval", "Received", "", "Rate")
}

/// Summary line for one finished server session.
///
/// # Examples
///
/// ```
/// use simpleperf::measurements::SessionSummary;
/// use simpleperf::output::server_summary_line;
/// use simpleperf::SizeUnit;
/// use std::time::Duration;
///
/// let summary = SessionSummary::new(
///     "127.0.0.1:50000".parse().unwrap(),
///     2_000_000,
///     Duration::from_secs(1),
///     SizeUnit::MB,
///     false,
/// );
/// let line = server_summary_line(&summary);
/// assert!(line.contains(" 2 MB"));
/// assert!(line.ends_with("16.00 Mbps"));
/// ```
pub fn server_summary_line(summary: &SessionSummary) -> String {
    format!(
        "{:<21} {:<12} {:>10.0} {:<2} {:>10.2} Mbps",
        summary.peer.to_string(),
        summary.label,
        summary.transfer,
        summary.unit,
        summary.rate_mbps
    )
}

pub fn client_connecting(server: &str, port: u16) -> String {
    format!(
        "Simpleperf client connecting to server {}, port {}",
        server, port
    )
}

pub fn client_header() -> String {
    format!(
        "{:<25} {:<10} {:<15} {:<15}",
        "ID", "Interval", "Transfer", "Bandwidth"
    )
}

/// One interval or aggregate line for a client stream.
///
/// # Examples
///
/// ```
/// use simpleperf::measurements::IntervalSample;
/// use simpleperf::output::client_line;
/// use simpleperf::SizeUnit;
/// use std::time::Duration;
///
/// let sample = IntervalSample::new(
///     "0-5".to_string(),
///     Duration::ZERO,
///     Duration::from_secs(5),
///     5_000_000,
///     SizeUnit::MB,
///     8.0,
/// );
/// let line = client_line("127.0.0.1:50000".parse().unwrap(), &sample);
/// assert!(line.contains("5.0 MB"));
/// assert!(line.ends_with("8.00 Mbps"));
/// ```
pub fn client_line(local_addr: SocketAddr, sample: &IntervalSample) -> String {
    format!(
        "{:<25} {:<10} {:<15} {:.2} Mbps",
        local_addr.to_string(),
        sample.label,
        format!("{:.1} {}", sample.transfer, sample.unit),
        sample.rate_mbps
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::SizeUnit;
    use std::time::Duration;

    #[test]
    fn test_separator_width() {
        assert_eq!(separator().len(), 60);
    }

    #[test]
    fn test_server_summary_uses_unit() {
        let summary = SessionSummary::new(
            "192.168.1.10:51234".parse().unwrap(),
            2_500,
            Duration::from_secs(2),
            SizeUnit::KB,
            true,
        );
        let line = server_summary_line(&summary);
        assert!(line.starts_with("192.168.1.10:51234"));
        assert!(line.contains("0.0 - 2"));
        assert!(line.contains(" KB "));
        assert!(line.ends_with("10.00 Mbps"));
    }

    #[test]
    fn test_client_line_columns() {
        let sample = IntervalSample::new(
            "10-15".to_string(),
            Duration::from_secs(10),
            Duration::from_secs(15),
            12_345,
            SizeUnit::KB,
            0.02,
        );
        let line = client_line("10.0.0.1:40000".parse().unwrap(), &sample);
        assert_eq!(&line[..14], "10.0.0.1:40000");
        assert_eq!(&line[26..31], "10-15");
        assert!(line.contains("12.3 KB"));
        assert!(line.ends_with("0.02 Mbps"));
    }
}
