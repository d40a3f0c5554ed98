//! A single measured TCP connection.
//!
//! A [`ConnectionSession`] owns its socket for the whole measurement. The
//! socket is closed when the session is dropped or consumed by
//! [`ConnectionSession::close`], so every exit path (completion, sentinel,
//! I/O error) releases it exactly once.

use crate::{Error, Result};
use log::debug;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// One live connection plus its byte counter and timing state.
///
/// Generic over the transport so the server handler can be driven by an
/// in-memory stream in tests; in production `S` is [`TcpStream`].
pub struct ConnectionSession<S = TcpStream> {
    stream: S,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    bytes_transferred: u64,
    start_time: Instant,
    last_interval_start: Instant,
    io_timeout: Option<Duration>,
}

impl ConnectionSession<TcpStream> {
    /// Wraps a stream returned by `accept()`.
    pub fn accepted(stream: TcpStream, peer_addr: SocketAddr) -> Result<Self> {
        let local_addr = stream.local_addr()?;
        Ok(Self::new(stream, peer_addr, local_addr))
    }

    /// Connects to `addr` and starts the session clock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the connection cannot be established
    /// (refused, unreachable, unresolvable).
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| Error::Connect {
                addr: addr.to_string(),
                source,
            })?;
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        Ok(Self::new(stream, peer_addr, local_addr))
    }
}

impl<S> ConnectionSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an established stream and starts the session clock.
    pub fn new(stream: S, peer_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            stream,
            peer_addr,
            local_addr,
            bytes_transferred: 0,
            start_time: now,
            last_interval_start: now,
            io_timeout: None,
        }
    }

    /// Bounds every subsequent read and write by `io_timeout`.
    pub fn with_io_timeout(mut self, io_timeout: Option<Duration>) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bytes counted so far. Never decreases.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Adds `bytes` to the counter.
    pub fn record(&mut self, bytes: u64) {
        self.bytes_transferred = self.bytes_transferred.saturating_add(bytes);
    }

    /// Time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Time since the current interval window started.
    pub fn window_elapsed(&self) -> Duration {
        self.last_interval_start.elapsed()
    }

    /// Starts a new interval window now.
    pub fn reset_window(&mut self) {
        self.last_interval_start = Instant::now();
    }

    /// Reads up to `buf.len()` bytes. Does not touch the counter.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = self.io_timeout;
        with_timeout(limit, self.stream.read(buf)).await
    }

    /// Writes the whole chunk and counts it.
    pub async fn send_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let limit = self.io_timeout;
        with_timeout(limit, self.stream.write_all(chunk)).await?;
        self.record(chunk.len() as u64);
        Ok(())
    }

    /// Writes bytes that are not payload (sentinel, acknowledgment).
    pub async fn send_control(&mut self, bytes: &[u8]) -> io::Result<()> {
        let limit = self.io_timeout;
        with_timeout(limit, async {
            self.stream.write_all(bytes).await?;
            self.stream.flush().await
        })
        .await
    }

    /// Shuts down the write side and releases the socket.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Shutdown of {} failed: {}", self.peer_addr, e);
        }
    }
}

async fn with_timeout<F, T>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("socket operation exceeded {:?}", limit),
            )
        })?,
        None => fut.await,
    }
}
