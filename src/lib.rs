//! simpleperf - a simple TCP throughput measurement tool
//!
//! A client streams fixed-size zero-filled chunks to a server over plain TCP.
//! Both sides count bytes and time independently and report the transfer size
//! and bandwidth, either as one aggregate figure or as per-interval samples.
//!
//! # Features
//!
//! - Fixed byte count tests (`-n 10MB`) and timed tests with interval reports
//! - Up to five parallel streams with a staggered start
//! - Transfer sizes in B, KB or MB (decimal multipliers)
//! - Text or JSON output, plus progress callbacks for library users
//! - Asynchronous I/O using tokio, one task per connection

pub mod client;
pub mod config;
pub mod error;
pub mod measurements;
pub mod output;
pub mod protocol;
pub mod server;
pub mod session;
pub mod units;

pub use client::{Client, ProgressCallback, ProgressEvent};
pub use config::{Config, Mode};
pub use error::{Error, Result};
pub use measurements::{IntervalSample, SessionSummary, StreamMode, StreamResult};
pub use server::Server;
pub use session::ConnectionSession;
pub use units::{parse_sized, SizeUnit};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
