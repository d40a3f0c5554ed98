//! Wire-level constants shared by the client and server.
//!
//! The measurement channel is plain TCP with no framing: the client writes
//! zero-filled chunks and the stream ends either when the client closes its
//! socket or when the three ASCII bytes `BYE` show up in a received chunk.
//! The server answers with the same `BYE` before closing.

/// Number of payload bytes written per send and read per receive.
pub const CHUNK_SIZE: usize = 1000;

/// End-of-stream marker and server acknowledgment.
pub const SENTINEL: &[u8] = b"BYE";

/// ID of the first stream. Later streams count up in steps of two.
pub const DEFAULT_STREAM_ID: usize = 5;

/// Generates a stream ID for parallel streams.
///
/// # Examples
///
/// ```
/// use simpleperf::protocol::stream_id_for_index;
///
/// assert_eq!(stream_id_for_index(0), 5);
/// assert_eq!(stream_id_for_index(1), 7);
/// assert_eq!(stream_id_for_index(2), 9);
/// ```
pub fn stream_id_for_index(index: usize) -> usize {
    DEFAULT_STREAM_ID + (index * 2)
}

/// Returns the offset of the first `BYE` in `chunk`, if any.
///
/// The sentinel may sit anywhere in the chunk, including appended to the
/// tail of the final data chunk.
///
/// # Examples
///
/// ```
/// use simpleperf::protocol::find_sentinel;
///
/// assert_eq!(find_sentinel(b"xyzBYE"), Some(3));
/// assert_eq!(find_sentinel(b"BYEXYZ"), Some(0));
/// assert_eq!(find_sentinel(b"BY"), None);
/// ```
pub fn find_sentinel(chunk: &[u8]) -> Option<usize> {
    chunk
        .windows(SENTINEL.len())
        .position(|window| window == SENTINEL)
}

/// Returns true if `chunk` contains the sentinel anywhere.
pub fn contains_sentinel(chunk: &[u8]) -> bool {
    find_sentinel(chunk).is_some()
}

/// Result of feeding one received chunk to a [`SentinelScanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// No sentinel yet; this many bytes are confirmed payload.
    Data(usize),
    /// The sentinel completed; this many payload bytes preceded it.
    Sentinel(usize),
}

/// Finds `BYE` in a byte stream regardless of how reads split it.
///
/// The last `SENTINEL.len() - 1` bytes of each read are held back until the
/// next read shows whether they start the sentinel, so a held byte is only
/// reported as payload once it is known not to be part of `BYE`.
///
/// # Examples
///
/// ```
/// use simpleperf::protocol::{Scan, SentinelScanner};
///
/// let mut scanner = SentinelScanner::new();
/// assert_eq!(scanner.scan(b"\0\0\0BY"), Scan::Data(3));
/// assert_eq!(scanner.scan(b"E"), Scan::Sentinel(0));
/// ```
#[derive(Debug, Default)]
pub struct SentinelScanner {
    held: Vec<u8>,
}

impl SentinelScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next received chunk.
    pub fn scan(&mut self, chunk: &[u8]) -> Scan {
        let mut joined = std::mem::take(&mut self.held);
        joined.extend_from_slice(chunk);

        if let Some(offset) = find_sentinel(&joined) {
            return Scan::Sentinel(offset);
        }

        let keep = joined.len().min(SENTINEL.len() - 1);
        let confirmed = joined.len() - keep;
        self.held = joined.split_off(confirmed);
        Scan::Data(confirmed)
    }

    /// Releases the held-back bytes as payload once the stream has ended.
    pub fn finish(&mut self) -> usize {
        std::mem::take(&mut self.held).len()
    }
}

/// Returns a zero-filled payload chunk.
pub fn payload_chunk() -> Vec<u8> {
    vec![0u8; CHUNK_SIZE]
}
