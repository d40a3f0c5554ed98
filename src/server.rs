use crate::client::{CallbackRef, ProgressCallback, ProgressEvent};
use crate::config::Config;
use crate::measurements::SessionSummary;
use crate::output;
use crate::protocol::{Scan, SentinelScanner, CHUNK_SIZE, SENTINEL};
use crate::session::ConnectionSession;
use crate::units::SizeUnit;
use crate::{Error, Result};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

/// Pause before retrying after a failed accept.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Throughput test server.
///
/// The `Server` accepts connections forever and measures each one in its own
/// task: it counts received bytes until the client closes the connection or
/// sends `BYE`, prints a summary, and acknowledges with `BYE` before closing.
///
/// # Examples
///
/// ## Basic server
///
/// ```no_run
/// use simpleperf::{Config, Server};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::server(8088);
/// let server = Server::new(config);
///
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Ephemeral port with a callback
///
/// ```no_run
/// use simpleperf::{Config, ProgressEvent, Server};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = Server::new(Config::server(0)).with_callback(|event| {
///     if let ProgressEvent::SessionCompleted(summary) = event {
///         println!("{} sent {} bytes", summary.peer, summary.bytes_received);
///     }
/// });
///
/// let listener = server.bind().await?;
/// println!("listening on {}", listener.local_addr()?);
/// server.serve(listener).await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    config: Config,
    callback: Option<CallbackRef>,
}

impl Server {
    /// Creates a new server with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            callback: None,
        }
    }

    /// Attaches a callback that receives a `SessionCompleted` event per
    /// finished connection and an `Error` event per failed one.
    pub fn with_callback<C: ProgressCallback + 'static>(mut self, callback: C) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Binds the listening socket on the configured address and port.
    pub async fn bind(&self) -> Result<TcpListener> {
        let bind_addr = SocketAddr::new(self.config.bind_addr, self.config.port);
        let listener = TcpListener::bind(bind_addr).await?;
        info!("TCP server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Binds and serves forever.
    ///
    /// # Errors
    ///
    /// Returns an error only if the listening socket cannot be bound.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections on `listener` forever, one task per connection.
    ///
    /// Accept errors are logged and the loop retries after a short pause.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if !self.config.json {
            println!("{}", output::separator());
            println!("{}", output::server_listening(listener.local_addr()?.port()));
            println!("{}", output::separator());
        }

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };

            info!("New connection from {}", addr);
            if !self.config.json {
                println!("{}", output::separator());
                println!("{}", output::server_client_connected(addr));
                println!("{}", output::separator());
            }

            let session = match ConnectionSession::accepted(stream, addr) {
                Ok(session) => session.with_io_timeout(self.config.io_timeout),
                Err(e) => {
                    error!("Error setting up session for {}: {}", addr, e);
                    continue;
                }
            };

            let unit = self.config.format;
            let json = self.config.json;
            let callback = self.callback.clone();
            tokio::spawn(async move {
                match handle_connection(session, unit).await {
                    Ok(summary) => report_session(&summary, json, callback.as_ref()),
                    Err(e) => {
                        error!("Error handling client {}: {}", addr, e);
                        if let Some(cb) = &callback {
                            cb.on_progress(ProgressEvent::Error(format!("{}: {}", addr, e)));
                        }
                    }
                }
            });
        }
    }
}

/// Measures one connection until the peer closes it or sends `BYE`.
///
/// Reads chunks of up to [`CHUNK_SIZE`] bytes. The sentinel is found even
/// when it is split across reads; the bytes in front of it are counted and
/// reading stops. After the
/// summary is computed, `BYE` is sent back as an acknowledgment; a failure to
/// send it is logged and otherwise ignored. The connection is closed on every
/// path.
///
/// # Errors
///
/// Returns [`Error::Io`] if a read fails (for example a reset connection). No
/// summary is produced in that case.
pub async fn handle_connection<S>(
    mut session: ConnectionSession<S>,
    unit: SizeUnit,
) -> Result<SessionSummary>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let peer = session.peer_addr();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut scanner = SentinelScanner::new();
    let mut sentinel_seen = false;

    loop {
        let n = session.read_chunk(&mut buffer).await?;
        if n == 0 {
            debug!("{} closed the connection", peer);
            session.record(scanner.finish() as u64);
            break;
        }

        match scanner.scan(&buffer[..n]) {
            Scan::Data(payload) => session.record(payload as u64),
            Scan::Sentinel(payload) => {
                debug!("{} sent end-of-stream marker", peer);
                session.record(payload as u64);
                sentinel_seen = true;
                break;
            }
        }
    }

    let summary = SessionSummary::new(
        peer,
        session.bytes_transferred(),
        session.elapsed(),
        unit,
        sentinel_seen,
    );

    if let Err(e) = session.send_control(SENTINEL).await {
        warn!("{}: {}", peer, Error::AckSendFailure(e));
    }
    session.close().await;

    info!(
        "Test completed for {}: {} bytes, {:.2} Mbps",
        peer, summary.bytes_received, summary.rate_mbps
    );

    Ok(summary)
}

fn report_session(summary: &SessionSummary, json: bool, callback: Option<&CallbackRef>) {
    if let Some(cb) = callback {
        cb.on_progress(ProgressEvent::SessionCompleted(summary.clone()));
    }

    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Could not serialize session summary: {}", e),
        }
    } else {
        println!("{}", output::server_header());
        println!("{}", output::server_summary_line(summary));
    }
}
