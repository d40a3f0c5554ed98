use crate::units::SizeUnit;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Highest number of parallel client streams.
pub const MAX_PARALLEL: usize = 5;

/// Test mode: client or server.
///
/// Determines whether this instance acts as a server (listening for connections)
/// or as a client (initiating connections to a server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Server mode - listens for incoming connections
    Server,
    /// Client mode - connects to a server and generates traffic
    Client,
}

/// Configuration for simpleperf throughput tests.
///
/// The configuration is built once, validated, and then shared read-only by
/// the server accept loop and every client stream.
///
/// # Examples
///
/// ## Interval-reporting client
///
/// ```
/// use simpleperf::{Config, SizeUnit};
/// use std::time::Duration;
///
/// let config = Config::client("192.168.1.100".to_string(), 8088)
///     .with_duration(Duration::from_secs(10))
///     .with_interval(Some(Duration::from_secs(5)))
///     .with_format(SizeUnit::KB);
/// assert!(config.validate().is_ok());
/// ```
///
/// ## Fixed byte count
///
/// ```
/// use simpleperf::Config;
///
/// let config = Config::client("127.0.0.1".to_string(), 8088)
///     .with_num_bytes(Some(2_000_000))
///     .with_parallel(3);
/// assert_eq!(config.parallel, 3);
/// ```
///
/// ## Server
///
/// ```
/// use simpleperf::Config;
///
/// let config = Config::server(8088);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server mode or client mode
    pub mode: Mode,

    /// Port to listen on (server) or connect to (client)
    pub port: u16,

    /// Server address (for client mode)
    pub server_addr: Option<String>,

    /// Bind address (for server mode)
    pub bind_addr: IpAddr,

    /// Unit used for reported transfer sizes
    pub format: SizeUnit,

    /// Total test duration
    pub duration: Duration,

    /// Reporting interval; `None` falls back to a single window spanning the test
    pub interval: Option<Duration>,

    /// Number of parallel streams
    pub parallel: usize,

    /// Fixed number of bytes to send instead of a timed test
    pub num_bytes: Option<u64>,

    /// Delay between starting consecutive parallel streams
    pub stagger: Duration,

    /// Append the `BYE` sentinel after the last chunk and wait for the ack
    pub send_sentinel: bool,

    /// Deadline for each individual socket read or write
    pub io_timeout: Option<Duration>,

    /// Output in JSON format
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Client,
            port: 8088,
            server_addr: None,
            bind_addr: IpAddr::from([127, 0, 0, 1]),
            format: SizeUnit::MB,
            duration: Duration::from_secs(25),
            interval: Some(Duration::from_secs(1)),
            parallel: 1,
            num_bytes: None,
            stagger: Duration::from_secs(1),
            send_sentinel: false,
            io_timeout: None,
            json: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new server configuration listening on `port`.
    pub fn server(port: u16) -> Self {
        Self {
            mode: Mode::Server,
            port,
            ..Default::default()
        }
    }

    /// Creates a new client configuration targeting `server_addr:port`.
    pub fn client(server_addr: String, port: u16) -> Self {
        Self {
            mode: Mode::Client,
            server_addr: Some(server_addr),
            port,
            ..Default::default()
        }
    }

    /// Sets the address the server binds to.
    pub fn with_bind_addr(mut self, bind_addr: IpAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Sets the unit used for reported transfer sizes.
    pub fn with_format(mut self, format: SizeUnit) -> Self {
        self.format = format;
        self
    }

    /// Sets the total test duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the reporting interval.
    ///
    /// Passing `None` selects the single-window fallback in which no
    /// aggregate line is produced.
    pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the number of parallel streams (1 to 5).
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    /// Switches the client to fixed byte count mode.
    ///
    /// When set, the client ignores duration and interval and sends until
    /// at least this many bytes have been written.
    pub fn with_num_bytes(mut self, num_bytes: Option<u64>) -> Self {
        self.num_bytes = num_bytes;
        self
    }

    /// Sets the delay between starting consecutive parallel streams.
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Enables or disables sending the `BYE` sentinel at the end of a stream.
    pub fn with_sentinel(mut self, send_sentinel: bool) -> Self {
        self.send_sentinel = send_sentinel;
        self
    }

    /// Sets a per-operation socket timeout. `None` blocks indefinitely.
    pub fn with_io_timeout(mut self, io_timeout: Option<Duration>) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    /// Enables or disables JSON output format.
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Checks the configuration for values the engines cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the duration, interval or timeout is zero, the
    /// parallelism is outside `1..=5`, or a client configuration has no
    /// server address.
    pub fn validate(&self) -> Result<()> {
        if self.duration.is_zero() {
            return Err(Error::Config("Duration must be greater than zero".to_string()));
        }

        if self.interval.is_some_and(|i| i.is_zero()) {
            return Err(Error::Config("Interval must be greater than zero".to_string()));
        }

        if self.io_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Config("Timeout must be greater than zero".to_string()));
        }

        if !(1..=MAX_PARALLEL).contains(&self.parallel) {
            return Err(Error::Config(format!(
                "Parallel streams must be between 1 and {}, got {}",
                MAX_PARALLEL, self.parallel
            )));
        }

        if self.mode == Mode::Client && self.server_addr.is_none() {
            return Err(Error::Config(
                "Server address is required for client mode".to_string(),
            ));
        }

        Ok(())
    }
}
