use crate::config::Config;
use crate::measurements::{
    megabit_rate, unit_rate_mbps, window_label, IntervalSample, SessionSummary, StreamMode,
    StreamResult,
};
use crate::output;
use crate::protocol::{contains_sentinel, payload_chunk, stream_id_for_index, SENTINEL};
use crate::session::ConnectionSession;
use crate::{Error, Result};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time;

/// Progress event types reported during test execution.
///
/// Client streams emit `StreamConnected`, one `IntervalUpdate` per reporting
/// window, and `StreamCompleted`; failed streams emit `Error`. The server emits
/// `SessionCompleted` for every connection it finishes.
///
/// # Examples
///
/// ```no_run
/// use simpleperf::{Client, Config, ProgressEvent};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::client("127.0.0.1".to_string(), 8088)
///     .with_duration(Duration::from_secs(10))
///     .with_interval(Some(Duration::from_secs(2)));
///
/// let client = Client::new(config)?
///     .with_callback(|event: ProgressEvent| match event {
///         ProgressEvent::IntervalUpdate { sample, .. } => {
///             println!("{}: {:.2} Mbps", sample.label, sample.rate_mbps);
///         }
///         ProgressEvent::Error(msg) => eprintln!("Error: {}", msg),
///         _ => {}
///     });
///
/// client.run().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A client stream connected to the server.
    StreamConnected {
        stream_id: usize,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
    },
    /// A client stream finished a reporting window.
    IntervalUpdate {
        stream_id: usize,
        local_addr: SocketAddr,
        sample: IntervalSample,
    },
    /// A client stream finished sending.
    ///
    /// `summary` is `None` when the interval was unset and only the
    /// per-iteration lines were produced.
    StreamCompleted {
        stream_id: usize,
        local_addr: SocketAddr,
        bytes_sent: u64,
        duration: Duration,
        summary: Option<IntervalSample>,
    },
    /// The server finished measuring one connection.
    SessionCompleted(SessionSummary),
    /// A stream or session failed. Other streams keep running.
    Error(String),
}

/// Callback trait for receiving progress updates during test execution.
///
/// The trait is automatically implemented for any function or closure with the
/// correct signature.
///
/// # Examples
///
/// ```
/// use simpleperf::ProgressCallback;
/// use simpleperf::ProgressEvent;
///
/// struct MyCallback;
///
/// impl ProgressCallback for MyCallback {
///     fn on_progress(&self, event: ProgressEvent) {
///         // Custom handling
///     }
/// }
/// ```
pub trait ProgressCallback: Send + Sync {
    /// Called when a progress event occurs.
    fn on_progress(&self, event: ProgressEvent);
}

/// Simple function-based callback
impl<F> ProgressCallback for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

pub type CallbackRef = Arc<dyn ProgressCallback>;

/// Traffic generator client.
///
/// A `Client` drives `parallel` independent streams against one server. Each
/// stream owns its own connection and counters; the only coordination between
/// streams is the staggered start and the final wait in [`Client::run`].
///
/// # Examples
///
/// ## Interval test
///
/// ```no_run
/// use simpleperf::{Client, Config};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::client("192.168.1.100".to_string(), 8088)
///     .with_duration(Duration::from_secs(10))
///     .with_interval(Some(Duration::from_secs(5)));
///
/// let client = Client::new(config)?;
/// for result in client.run().await {
///     let result = result?;
///     println!("{} sent {} bytes", result.local_addr, result.bytes_sent);
/// }
/// # Ok(())
/// # }
/// ```
///
/// ## Fixed byte count over three streams
///
/// ```no_run
/// use simpleperf::{Client, Config};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::client("192.168.1.100".to_string(), 8088)
///     .with_num_bytes(Some(10_000_000))
///     .with_parallel(3);
///
/// let results = Client::new(config)?.run().await;
/// assert_eq!(results.len(), 3);
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: Config,
    callback: Option<CallbackRef>,
}

impl Client {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails [`Config::validate`].
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            callback: None,
        })
    }

    /// Attaches a progress callback shared by all streams.
    pub fn with_callback<C: ProgressCallback + 'static>(mut self, callback: C) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(callback) = &self.callback {
            callback.on_progress(event);
        }
    }

    /// Runs all parallel streams and waits for every one of them.
    ///
    /// Stream `k` (zero-based) starts `k * stagger` after the first. The
    /// returned vector holds one entry per stream, in start order; a failed
    /// stream yields an `Err` entry without affecting the others.
    pub async fn run(&self) -> Vec<Result<StreamResult>> {
        let server_addr = self.config.server_addr.clone().unwrap_or_default();
        let full_addr = format!("{}:{}", server_addr, self.config.port);

        info!(
            "Starting {} stream(s) against {}",
            self.config.parallel, full_addr
        );

        let mut handles = Vec::with_capacity(self.config.parallel);
        for index in 0..self.config.parallel {
            if index > 0 {
                time::sleep(self.config.stagger).await;
            }

            let addr = full_addr.clone();
            let config = self.config.clone();
            let callback = self.callback.clone();
            handles.push(tokio::spawn(async move {
                run_stream(&addr, index, &config, callback.as_ref()).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(Error::Task(e.to_string())));

            if let Err(e) = &result {
                let stream_id = stream_id_for_index(index);
                error!("Stream {} failed: {}", stream_id, e);
                self.notify(ProgressEvent::Error(format!("stream {}: {}", stream_id, e)));
            }
            results.push(result);
        }

        results
    }
}

/// Per-stream reporting context.
struct StreamContext<'a> {
    stream_id: usize,
    local_addr: SocketAddr,
    config: &'a Config,
    callback: Option<&'a CallbackRef>,
}

impl StreamContext<'_> {
    fn notify(&self, event: ProgressEvent) {
        if let Some(callback) = self.callback {
            callback.on_progress(event);
        }
    }

    fn emit_interval(&self, sample: &IntervalSample) {
        self.notify(ProgressEvent::IntervalUpdate {
            stream_id: self.stream_id,
            local_addr: self.local_addr,
            sample: sample.clone(),
        });

        if !self.config.json {
            println!("{}", output::client_line(self.local_addr, sample));
        }
    }

    fn emit_summary(&self, sample: &IntervalSample) {
        if !self.config.json {
            println!("{}", output::separator());
            println!("{}", output::client_line(self.local_addr, sample));
        }
    }
}

/// Runs one traffic generator stream against `addr`.
///
/// Connects once, sends according to the configured mode, and closes the
/// connection on every exit path. Interval samples are delivered through
/// `callback` as they are produced.
///
/// # Errors
///
/// - [`Error::Connect`] if the connection cannot be established
/// - [`Error::SendFailure`] if a send fails mid-transfer; no aggregate is
///   produced in that case
pub async fn run_stream(
    addr: &str,
    index: usize,
    config: &Config,
    callback: Option<&CallbackRef>,
) -> Result<StreamResult> {
    let stream_id = stream_id_for_index(index);
    let mut session = ConnectionSession::connect(addr)
        .await?
        .with_io_timeout(config.io_timeout);

    let ctx = StreamContext {
        stream_id,
        local_addr: session.local_addr(),
        config,
        callback,
    };

    info!(
        "Stream {} connected: local {} -> {}",
        stream_id,
        session.local_addr(),
        session.peer_addr()
    );
    ctx.notify(ProgressEvent::StreamConnected {
        stream_id,
        local_addr: session.local_addr(),
        peer_addr: session.peer_addr(),
    });

    if !config.json {
        let server = config.server_addr.as_deref().unwrap_or_default();
        println!("{}", output::client_connecting(server, config.port));
        println!("{}", output::separator());
        println!("{}", output::client_header());
    }

    // An early return drops the session, which closes the socket.
    let result = match (config.num_bytes, config.interval) {
        (Some(target), _) => send_byte_count(&mut session, target, &ctx).await?,
        (None, Some(interval)) => send_intervals(&mut session, interval, &ctx).await?,
        (None, None) => send_single_window(&mut session, &ctx).await?,
    };

    if config.send_sentinel {
        finish_with_sentinel(&mut session).await;
    }
    session.close().await;

    ctx.notify(ProgressEvent::StreamCompleted {
        stream_id,
        local_addr: result.local_addr,
        bytes_sent: result.bytes_sent,
        duration: result.duration,
        summary: result.summary.clone(),
    });

    if config.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    Ok(result)
}

/// Number of interval windows covering `total`: `ceil(total / interval)`.
///
/// The last window may end past `total`; its label is not clamped.
///
/// # Examples
///
/// ```
/// use simpleperf::client::window_count;
/// use std::time::Duration;
///
/// assert_eq!(window_count(Duration::from_secs(10), Duration::from_secs(5)), 2);
/// assert_eq!(window_count(Duration::from_secs(10), Duration::from_secs(3)), 4);
/// ```
pub fn window_count(total: Duration, interval: Duration) -> u32 {
    let interval = interval.as_nanos().max(1);
    let windows = total.as_nanos().div_ceil(interval);
    u32::try_from(windows).unwrap_or(u32::MAX)
}

fn aggregate_label(duration: Duration) -> String {
    format!("0-{:.1}", duration.as_secs() as f64)
}

async fn send_byte_count<S>(
    session: &mut ConnectionSession<S>,
    target: u64,
    ctx: &StreamContext<'_>,
) -> Result<StreamResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let chunk = payload_chunk();
    let unit = ctx.config.format;

    while session.bytes_transferred() < target {
        session.send_chunk(&chunk).await.map_err(|e| {
            error!("Stream {}: error sending data: {}", ctx.stream_id, e);
            Error::SendFailure(e)
        })?;
    }

    let duration = session.elapsed();
    let bytes_sent = session.bytes_transferred();
    let summary = IntervalSample::new(
        aggregate_label(duration),
        Duration::ZERO,
        duration,
        bytes_sent,
        unit,
        unit_rate_mbps(bytes_sent, unit, duration),
    );
    ctx.emit_summary(&summary);

    Ok(StreamResult {
        stream_id: ctx.stream_id,
        local_addr: ctx.local_addr,
        mode: StreamMode::ByteCount,
        bytes_sent,
        duration,
        intervals: Vec::new(),
        summary: Some(summary),
    })
}

async fn send_intervals<S>(
    session: &mut ConnectionSession<S>,
    interval: Duration,
    ctx: &StreamContext<'_>,
) -> Result<StreamResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let chunk = payload_chunk();
    let unit = ctx.config.format;
    let windows = window_count(ctx.config.duration, interval);
    let mut intervals = Vec::new();

    for window in 1..=windows {
        let mut window_bytes = 0u64;
        while session.window_elapsed() <= interval {
            session.send_chunk(&chunk).await.map_err(|e| {
                error!("Stream {}: error sending data: {}", ctx.stream_id, e);
                Error::SendFailure(e)
            })?;
            window_bytes += chunk.len() as u64;
        }

        let start = interval * (window - 1);
        let end = interval * window;
        let sample = IntervalSample::new(
            window_label(start, end),
            start,
            end,
            window_bytes,
            unit,
            megabit_rate(window_bytes, interval),
        );
        ctx.emit_interval(&sample);
        intervals.push(sample);

        session.reset_window();
    }

    let duration = session.elapsed();
    let bytes_sent = session.bytes_transferred();
    let summary = IntervalSample::new(
        aggregate_label(duration),
        Duration::ZERO,
        duration,
        bytes_sent,
        unit,
        megabit_rate(bytes_sent, duration),
    );
    ctx.emit_summary(&summary);

    Ok(StreamResult {
        stream_id: ctx.stream_id,
        local_addr: ctx.local_addr,
        mode: StreamMode::Interval,
        bytes_sent,
        duration,
        intervals,
        summary: Some(summary),
    })
}

/// Interval unset: one window spanning the whole test, labelled with an
/// inclusive end second, and no aggregate line.
async fn send_single_window<S>(
    session: &mut ConnectionSession<S>,
    ctx: &StreamContext<'_>,
) -> Result<StreamResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let chunk = payload_chunk();
    let unit = ctx.config.format;
    let window = ctx.config.duration;

    session.reset_window();
    let mut window_bytes = 0u64;

    // At least one chunk goes out even if the window has already passed.
    loop {
        session.send_chunk(&chunk).await.map_err(|e| {
            error!("Stream {}: error sending data: {}", ctx.stream_id, e);
            Error::SendFailure(e)
        })?;
        window_bytes += chunk.len() as u64;

        if session.window_elapsed() > window {
            break;
        }
    }

    let sample = IntervalSample::new(
        window_label(Duration::ZERO, window.saturating_sub(Duration::from_secs(1))),
        Duration::ZERO,
        window,
        window_bytes,
        unit,
        megabit_rate(window_bytes, window),
    );
    ctx.emit_interval(&sample);

    Ok(StreamResult {
        stream_id: ctx.stream_id,
        local_addr: ctx.local_addr,
        mode: StreamMode::SingleWindow,
        bytes_sent: session.bytes_transferred(),
        duration: session.elapsed(),
        intervals: vec![sample],
        summary: None,
    })
}

/// Sends `BYE` and waits for the server's acknowledgment or a close.
///
/// Failures are logged only; the data has already been delivered.
async fn finish_with_sentinel<S>(session: &mut ConnectionSession<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = session.send_control(SENTINEL).await {
        warn!("Could not send end-of-stream marker: {}", e);
        return;
    }

    let mut buf = [0u8; 64];
    let mut received = Vec::new();
    loop {
        match session.read_chunk(&mut buf).await {
            Ok(0) => {
                debug!("Server closed the connection without acknowledgment");
                return;
            }
            Ok(n) => {
                received.extend_from_slice(&buf[..n]);
                if contains_sentinel(&received) {
                    debug!("Server acknowledged end of stream");
                    return;
                }
            }
            Err(e) => {
                warn!("Error waiting for acknowledgment: {}", e);
                return;
            }
        }
    }
}
